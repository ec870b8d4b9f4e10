//! JSON rendering.

use indexmap::IndexMap;
use serde_json::Value;
use std::sync::Arc;
use trellis_conf::Blueprint;
use trellis_core::{Error, Result};

use crate::engine::{EngineSpec, RenderCall, RendererFactory, RenderingEngine};

/// Serializes controller output as JSON.
///
/// Top level arrays are refused unless `allow_lists` is set: a JSON array
/// response can be hijacked cross-site by older browsers.
#[derive(Debug, Clone, Default)]
pub struct JsonRenderer {
	allow_lists: bool,
}

impl JsonRenderer {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn allow_lists(mut self, allow: bool) -> Self {
		self.allow_lists = allow;
		self
	}

	/// Serializes `data`, honoring the `indent` option.
	///
	/// # Examples
	///
	/// ```
	/// use trellis_render::JsonRenderer;
	/// use serde_json::json;
	///
	/// let renderer = JsonRenderer::new();
	/// assert_eq!(renderer.encode(&json!({"a": 1}), false).unwrap(), r#"{"a":1}"#);
	/// assert!(renderer.encode(&json!([1, 2]), false).is_err());
	/// ```
	pub fn encode(&self, data: &Value, pretty: bool) -> Result<String> {
		if data.is_array() && !self.allow_lists {
			return Err(Error::Render(
				"returning a list as JSON is not allowed, set json.allow_lists to enable it"
					.to_string(),
			));
		}
		let body = if pretty {
			serde_json::to_string_pretty(data)?
		} else {
			serde_json::to_string(data)?
		};
		Ok(body)
	}
}

impl RenderingEngine for JsonRenderer {
	fn render(&self, call: &RenderCall<'_>) -> Result<String> {
		let pretty = call
			.options
			.get("indent")
			.and_then(Value::as_bool)
			.unwrap_or(false);
		self.encode(call.data, pretty)
	}
}

/// Factory for the `json` engine.
#[derive(Debug, Clone, Default)]
pub struct JsonFactory;

impl RendererFactory for JsonFactory {
	fn engines(&self) -> Vec<EngineSpec> {
		vec![EngineSpec::new("json", "application/json")]
	}

	fn with_tg_vars(&self) -> bool {
		false
	}

	fn create(&self, blueprint: &Blueprint) -> Result<IndexMap<String, Arc<dyn RenderingEngine>>> {
		let renderer = JsonRenderer::new().allow_lists(blueprint.bool_or("json.allow_lists", false));
		let mut engines: IndexMap<String, Arc<dyn RenderingEngine>> = IndexMap::new();
		engines.insert("json".to_string(), Arc::new(renderer));
		Ok(engines)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;
	use serde_json::json;

	#[rstest]
	fn test_render_object() {
		let data = json!({"name": "Bob", "age": 3});
		let body = JsonRenderer::new().render(&RenderCall::data(&data)).unwrap();
		assert_eq!(body, r#"{"name":"Bob","age":3}"#);
	}

	#[rstest]
	fn test_lists_refused_by_default() {
		let data = json!([1, 2, 3]);
		let err = JsonRenderer::new().render(&RenderCall::data(&data)).unwrap_err();
		assert!(matches!(err, Error::Render(_)));
	}

	#[rstest]
	fn test_lists_allowed_by_configuration() {
		let mut blueprint = Blueprint::new();
		blueprint.set("json.allow_lists", true);
		let engines = JsonFactory.create(&blueprint).unwrap();

		let data = json!([1, 2]);
		assert_eq!(engines["json"].render(&RenderCall::data(&data)).unwrap(), "[1,2]");
	}

	#[rstest]
	fn test_indent_option() {
		let data = json!({"a": 1});
		let mut options = serde_json::Map::new();
		options.insert("indent".into(), json!(true));
		let body = JsonRenderer::new()
			.render(&RenderCall::data(&data).with_options(&options))
			.unwrap();
		assert_eq!(body, "{\n  \"a\": 1\n}");
	}
}
