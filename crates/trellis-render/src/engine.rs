//! The rendering engine contract.

use indexmap::IndexMap;
use serde_json::{Map, Value};
use std::sync::Arc;
use trellis_conf::Blueprint;
use trellis_core::{Params, Result};

/// Everything an engine needs to render one response.
#[derive(Debug, Clone, Copy)]
pub struct RenderCall<'a> {
	/// Template name, `None` for engines that do not use templates.
	pub template: Option<&'a str>,
	/// The value returned by the controller, merged with framework variables
	/// unless the engine is vars-free.
	pub data: &'a Value,
	/// Render params of the exposition.
	pub options: &'a Map<String, Value>,
	/// Request parameters, for engines reading them (JSONP callbacks).
	pub params: &'a Params,
	/// Mount point of the application, used to build URLs.
	pub script_name: &'a str,
}

impl<'a> RenderCall<'a> {
	/// A call with no template, options or parameters.
	pub fn data(data: &'a Value) -> Self {
		static EMPTY: std::sync::OnceLock<Map<String, Value>> = std::sync::OnceLock::new();
		let empty = EMPTY.get_or_init(Map::new);
		Self {
			template: None,
			data,
			options: empty,
			params: empty,
			script_name: "",
		}
	}

	pub fn with_template(mut self, template: &'a str) -> Self {
		self.template = Some(template);
		self
	}

	pub fn with_options(mut self, options: &'a Map<String, Value>) -> Self {
		self.options = options;
		self
	}

	pub fn with_params(mut self, params: &'a Params) -> Self {
		self.params = params;
		self
	}

	pub fn with_script_name(mut self, script_name: &'a str) -> Self {
		self.script_name = script_name;
		self
	}
}

/// Turns controller output into a response body.
pub trait RenderingEngine: Send + Sync {
	/// Renders the call into a body.
	///
	/// # Errors
	///
	/// Returns [`Error::Render`](trellis_core::Error::Render) when the data or
	/// template cannot be rendered.
	fn render(&self, call: &RenderCall<'_>) -> Result<String>;
}

/// An engine name and the content type it produces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSpec {
	pub name: String,
	pub content_type: String,
}

impl EngineSpec {
	pub fn new(name: impl Into<String>, content_type: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			content_type: content_type.into(),
		}
	}
}

/// Builds rendering engines from configuration.
pub trait RendererFactory: Send + Sync {
	/// Engines this factory can create.
	fn engines(&self) -> Vec<EngineSpec>;

	/// Whether the engines consume the framework template variables.
	fn with_tg_vars(&self) -> bool {
		true
	}

	/// Creates the engines, keyed by name.
	///
	/// # Errors
	///
	/// Fails when the configuration prevents building an engine.
	fn create(&self, blueprint: &Blueprint) -> Result<IndexMap<String, Arc<dyn RenderingEngine>>>;
}
