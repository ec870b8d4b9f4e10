use serde_json::{Value, json};
use std::sync::Arc;
use trellis_conf::Coercions;
use trellis_conf::coerce::coerce_bool;
use trellis_core::Result;
use trellis_validation::ValidatorRegistry;

use super::{coercions, defaults};
use crate::component::{BuildContext, ConfigurationComponent, Phase};

/// Options read by the dispatcher and the controller pipeline.
#[derive(Debug, Clone, Copy, Default)]
pub struct DispatchComponent;

impl ConfigurationComponent for DispatchComponent {
	fn id(&self) -> &str {
		"dispatch"
	}

	fn defaults(&self) -> Vec<(String, Value)> {
		defaults(vec![
			("debug", json!(false)),
			("disable_request_extensions", json!(false)),
			("tg.strict_tmpl_context", json!(true)),
		])
	}

	fn coercions(&self) -> Coercions {
		coercions(&[
			("debug", coerce_bool),
			("disable_request_extensions", coerce_bool),
			("tg.strict_tmpl_context", coerce_bool),
			("make_body_seekable", coerce_bool),
			("serve_static", coerce_bool),
		])
	}
}

type ValidatorSetup = Arc<dyn Fn(&ValidatorRegistry) + Send + Sync>;

/// Registers validators and failure types, and publishes the failure type
/// names as `validation.exceptions`.
///
/// # Examples
///
/// ```
/// use trellis_apps::{Configurator, ValidationComponent};
/// use trellis_controllers::ControllerNode;
/// use trellis_core::Position;
/// use trellis_validation::Explosion;
///
/// #[derive(Debug, thiserror::Error)]
/// #[error("bad coupon")]
/// struct BadCoupon;
///
/// let mut configurator = Configurator::minimal();
/// configurator.register(
///     ValidationComponent::new().setup(|registry| {
///         registry.register_exception("BadCoupon", |err: &BadCoupon| Explosion {
///             errors: Default::default(),
///             values: serde_json::Value::Null,
///             message: err.to_string(),
///         });
///     }),
///     Position::Middle,
/// );
///
/// let app = configurator.make_app(ControllerNode::new("Root"), None).unwrap();
/// assert_eq!(app.config().get_list("validation.exceptions"), ["ValidationError", "BadCoupon"]);
/// ```
#[derive(Default)]
pub struct ValidationComponent {
	setups: Vec<ValidatorSetup>,
}

impl ValidationComponent {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn setup<F>(mut self, setup: F) -> Self
	where
		F: Fn(&ValidatorRegistry) + Send + Sync + 'static,
	{
		self.setups.push(Arc::new(setup));
		self
	}
}

impl ConfigurationComponent for ValidationComponent {
	fn id(&self) -> &str {
		"validation"
	}

	fn on_phase(&self, phase: Phase, ctx: &mut BuildContext) -> Result<()> {
		if phase == Phase::ConfigReady {
			for setup in &self.setups {
				setup(&ctx.validators);
			}
			ctx.blueprint
				.set("validation.exceptions", ctx.validators.exception_names());
		}
		Ok(())
	}
}

impl std::fmt::Debug for ValidationComponent {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ValidationComponent")
			.field("setups", &self.setups.len())
			.finish()
	}
}
