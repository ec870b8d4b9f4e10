//! JSONP rendering.

use http::StatusCode;
use indexmap::IndexMap;
use serde_json::Value;
use std::sync::Arc;
use trellis_conf::Blueprint;
use trellis_core::{Error, HttpError, Result};

use crate::engine::{EngineSpec, RenderCall, RendererFactory, RenderingEngine};
use crate::json::JsonRenderer;

/// Wraps JSON output in a callback named by a request parameter.
#[derive(Debug, Clone)]
pub struct JsonpRenderer {
	json: JsonRenderer,
	callback_param: String,
}

impl JsonpRenderer {
	pub fn new(callback_param: impl Into<String>) -> Self {
		Self {
			json: JsonRenderer::new(),
			callback_param: callback_param.into(),
		}
	}

	pub fn allow_lists(mut self, allow: bool) -> Self {
		self.json = self.json.allow_lists(allow);
		self
	}
}

fn valid_callback(name: &str) -> bool {
	!name.is_empty()
		&& name
			.chars()
			.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '$'))
}

impl RenderingEngine for JsonpRenderer {
	fn render(&self, call: &RenderCall<'_>) -> Result<String> {
		let callback = call
			.params
			.get(&self.callback_param)
			.and_then(Value::as_str)
			.ok_or_else(|| {
				Error::Http(HttpError::new(StatusCode::BAD_REQUEST).with_detail(format!(
					"JSONP requires a \"{}\" parameter with callback name",
					self.callback_param
				)))
			})?;
		if !valid_callback(callback) {
			return Err(Error::Http(
				HttpError::new(StatusCode::BAD_REQUEST).with_detail("invalid JSONP callback name"),
			));
		}
		let body = self.json.encode(call.data, false)?;
		Ok(format!("{callback}({body});"))
	}
}

/// Factory for the `jsonp` engine.
#[derive(Debug, Clone, Default)]
pub struct JsonpFactory;

impl RendererFactory for JsonpFactory {
	fn engines(&self) -> Vec<EngineSpec> {
		vec![EngineSpec::new("jsonp", "application/javascript")]
	}

	fn with_tg_vars(&self) -> bool {
		false
	}

	fn create(&self, blueprint: &Blueprint) -> Result<IndexMap<String, Arc<dyn RenderingEngine>>> {
		let renderer = JsonpRenderer::new(blueprint.str_or("jsonp.callback_param", "callback"))
			.allow_lists(blueprint.bool_or("json.allow_lists", false));
		let mut engines: IndexMap<String, Arc<dyn RenderingEngine>> = IndexMap::new();
		engines.insert("jsonp".to_string(), Arc::new(renderer));
		Ok(engines)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;
	use serde_json::json;
	use trellis_core::Params;

	fn params(callback: &str) -> Params {
		let mut params = Params::new();
		params.insert("callback".into(), json!(callback));
		params
	}

	#[rstest]
	fn test_wraps_in_callback() {
		let data = json!({"value": 5});
		let params = params("handle");
		let body = JsonpRenderer::new("callback")
			.render(&RenderCall::data(&data).with_params(&params))
			.unwrap();
		assert_eq!(body, r#"handle({"value":5});"#);
	}

	#[rstest]
	#[case("")]
	#[case("alert(1)//")]
	fn test_invalid_callback(#[case] callback: &str) {
		let data = json!({});
		let params = params(callback);
		let err = JsonpRenderer::new("callback")
			.render(&RenderCall::data(&data).with_params(&params))
			.unwrap_err();
		assert_eq!(err.status_code().as_u16(), 400);
	}

	#[rstest]
	fn test_missing_callback() {
		let data = json!({});
		let err = JsonpRenderer::new("cb").render(&RenderCall::data(&data)).unwrap_err();
		assert_eq!(err.status_code().as_u16(), 400);
		assert!(err.to_string().contains("\"cb\""));
	}
}
