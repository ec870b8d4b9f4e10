use serde_json::{Value, json};
use std::sync::Arc;
use trellis_conf::Coercions;
use trellis_conf::coerce::coerce_bool;
use trellis_core::{Position, Result};
use trellis_middleware::{ApplicationWrapper, RequestLoggingWrapper};
use tracing_subscriber::EnvFilter;

use super::{coercions, defaults};
use crate::component::{BuildContext, ConfigurationComponent, Phase};
use crate::configurator::Configurator;

/// Installs a `tracing` subscriber when `logging.init` is set and logs
/// every request unless `logging.requests` is turned off.
///
/// The subscriber filter comes from `logging.level`, an [`EnvFilter`]
/// directive such as `info` or `trellis_controllers=debug,info`. An already
/// installed global subscriber is left in place.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingComponent;

impl LoggingComponent {
	pub fn new() -> Self {
		Self
	}

	fn init_subscriber(level: &str) {
		let (filter, invalid) = match EnvFilter::try_new(level) {
			Ok(filter) => (filter, None),
			Err(err) => (EnvFilter::new("info"), Some(err)),
		};
		match tracing_subscriber::fmt().with_env_filter(filter).try_init() {
			Ok(()) => tracing::info!(level, "logging initialized"),
			Err(_) => tracing::debug!("a global subscriber is already installed"),
		}
		if let Some(err) = invalid {
			tracing::warn!(level, error = %err, "invalid logging.level, using info");
		}
	}
}

impl ConfigurationComponent for LoggingComponent {
	fn id(&self) -> &str {
		"logging"
	}

	fn defaults(&self) -> Vec<(String, Value)> {
		defaults(vec![
			("logging.init", json!(false)),
			("logging.level", json!("info")),
			("logging.requests", json!(true)),
		])
	}

	fn coercions(&self) -> Coercions {
		coercions(&[("logging.init", coerce_bool), ("logging.requests", coerce_bool)])
	}

	fn on_bind(&self, configurator: &mut Configurator) {
		configurator.register_wrapper_factory(
			"request_logging",
			|config| {
				Ok(config
					.bool_or("logging.requests", true)
					.then(|| Arc::new(RequestLoggingWrapper::new()) as Arc<dyn ApplicationWrapper>))
			},
			Position::First,
		);
	}

	fn on_phase(&self, phase: Phase, ctx: &mut BuildContext) -> Result<()> {
		// Before the other components so their setup is logged.
		if phase == Phase::ConfigReady && ctx.blueprint.bool_or("logging.init", false) {
			Self::init_subscriber(ctx.blueprint.str_or("logging.level", "info"));
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;
	use serial_test::serial;
	use trellis_conf::Blueprint;
	use trellis_controllers::ControllerNode;

	#[rstest]
	#[serial]
	fn test_init_is_idempotent() {
		let conf: Blueprint = [("logging.init", "true"), ("logging.level", "debug")]
			.into_iter()
			.collect();
		let configurator = Configurator::minimal();
		configurator.make_app(ControllerNode::new("Root"), Some(&conf)).unwrap();
		configurator.make_app(ControllerNode::new("Root"), Some(&conf)).unwrap();
		assert!(tracing::dispatcher::has_been_set());
	}

	#[rstest]
	#[serial]
	fn test_invalid_level_does_not_fail() {
		let conf: Blueprint = [("logging.init", "true"), ("logging.level", "[[nope")]
			.into_iter()
			.collect();
		assert!(Configurator::minimal().make_app(ControllerNode::new("Root"), Some(&conf)).is_ok());
	}

	#[rstest]
	#[case("true", vec!["request_logging"])]
	#[case("false", vec![])]
	fn test_request_logging_switch(#[case] requests: &str, #[case] expected: Vec<&str>) {
		let conf: Blueprint = [("logging.requests", requests)].into_iter().collect();
		let app = Configurator::minimal().make_app(ControllerNode::new("Root"), Some(&conf)).unwrap();
		assert_eq!(app.wrapper_names(), expected);
	}
}
