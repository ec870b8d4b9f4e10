use parking_lot::Mutex;
use serde_json::{Value, json};
use std::sync::Arc;
use trellis_conf::Coercions;
use trellis_conf::coerce::{coerce_bool, coerce_list};
use trellis_core::Result;
use trellis_render::RendererFactory;

use super::{coercions, defaults};
use crate::component::{BuildContext, ConfigurationComponent, Phase};

/// Sets up the engines listed in `renderers` once the configuration is
/// ready, and picks the default renderer.
///
/// Extra engines are made available with [`RenderingComponent::factory`];
/// they still need to be listed in `renderers`.
#[derive(Default)]
pub struct RenderingComponent {
	factories: Mutex<Vec<Arc<dyn RendererFactory>>>,
}

impl RenderingComponent {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn factory(self, factory: Arc<dyn RendererFactory>) -> Self {
		self.factories.lock().push(factory);
		self
	}
}

impl ConfigurationComponent for RenderingComponent {
	fn id(&self) -> &str {
		"rendering"
	}

	fn defaults(&self) -> Vec<(String, Value)> {
		defaults(vec![
			("renderers", json!(["json"])),
			("default_renderer", json!("json")),
			("auto_reload_templates", json!(false)),
			("use_dotted_templatenames", json!(false)),
			("paths.templates", json!([])),
			("json.allow_lists", json!(false)),
			("jsonp.callback_param", json!("callback")),
		])
	}

	fn coercions(&self) -> Coercions {
		coercions(&[
			("renderers", coerce_list),
			("auto_reload_templates", coerce_bool),
			("use_dotted_templatenames", coerce_bool),
			("paths.templates", coerce_list),
			("json.allow_lists", coerce_bool),
		])
	}

	fn on_phase(&self, phase: Phase, ctx: &mut BuildContext) -> Result<()> {
		if phase != Phase::ConfigReady {
			return Ok(());
		}
		for factory in self.factories.lock().iter() {
			ctx.renderers.register_factory(Arc::clone(factory));
		}
		ctx.renderers.setup(&ctx.blueprint)?;

		let wanted = ctx.blueprint.str_or("default_renderer", "json").to_string();
		let default_renderer = if ctx.renderers.is_available(&wanted) {
			wanted
		} else {
			tracing::warn!(renderer = %wanted, "default renderer is not available, using json");
			"json".to_string()
		};
		ctx.decorations.set_default_renderer(default_renderer);
		tracing::info!(renderers = ?ctx.renderers.names(), "renderers ready");
		Ok(())
	}
}

impl std::fmt::Debug for RenderingComponent {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("RenderingComponent")
			.field("factories", &self.factories.lock().len())
			.finish()
	}
}

#[cfg(test)]
mod tests {
	use crate::Configurator;
	use rstest::rstest;
	use trellis_conf::Blueprint;
	use trellis_controllers::{ControllerNode, ExposedMethod, Reply};
	use trellis_http::{Handler, Request};

	fn root() -> ControllerNode {
		ControllerNode::new("Root").method(
			ExposedMethod::new("data", |_, _| Ok(Reply::from(serde_json::json!({"a": 1}))))
				.expose("json")
				.expose("tera:data.html"),
		)
	}

	#[rstest]
	#[tokio::test]
	async fn test_unknown_default_renderer_falls_back_to_json() {
		let conf: Blueprint = [("default_renderer", "mako"), ("renderers", "json, mako")]
			.into_iter()
			.collect();
		let app = Configurator::minimal().make_app(root(), Some(&conf)).unwrap();
		let response = app
			.handle(Request::builder().uri("/data").build().unwrap())
			.await
			.unwrap();
		assert_eq!(response.header("content-type"), Some("application/json; charset=utf-8"));
		assert_eq!(response.text(), r#"{"a":1}"#);
	}

	#[rstest]
	fn test_renderers_are_coerced_to_a_list() {
		let conf: Blueprint = [("renderers", "json jsonp")].into_iter().collect();
		let app = Configurator::minimal().make_app(root(), Some(&conf)).unwrap();
		assert_eq!(app.config().get_list("renderers"), ["json", "jsonp"]);
	}
}
