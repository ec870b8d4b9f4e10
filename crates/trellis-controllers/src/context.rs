//! Per-request state.
//!
//! A [`RequestContext`] is created by the dispatch core for every request and
//! passed explicitly through dispatch, hooks, validation, the controller
//! method and rendering. Code that cannot receive the context reads the
//! current request and configuration through [`current_request`] and
//! [`current_config`], backed by a task-local scope entered for the duration
//! of the pipeline. Scopes nest, so a request dispatched while handling
//! another one sees its own values.

use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use serde::Serialize;
use serde_json::{Map, Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use trellis_conf::Blueprint;
use trellis_core::{Error, Params, Result};
use trellis_http::{
	CacheHandle, Extensions, Identity, Locale, NullTranslator, Request, SessionHandle,
	TranslatorHandle,
};

use crate::method::{ErrorHandler, MethodId, ValidationIntent};

const FLASH_SESSION_KEY: &str = "_flash";

/// The request and configuration visible to code without a context.
#[derive(Clone)]
pub struct RequestSnapshot {
	pub request: Arc<Request>,
	pub config: Arc<Blueprint>,
}

tokio::task_local! {
	static CURRENT: RequestSnapshot;
}

/// Runs `f` with `snapshot` as the current request.
pub fn with_request_scope<R>(snapshot: RequestSnapshot, f: impl FnOnce() -> R) -> R {
	CURRENT.sync_scope(snapshot, f)
}

/// The request being handled, if any.
pub fn current_request() -> Option<Arc<Request>> {
	CURRENT.try_with(|s| Arc::clone(&s.request)).ok()
}

/// The configuration of the application handling the current request.
pub fn current_config() -> Option<Arc<Blueprint>> {
	CURRENT.try_with(|s| Arc::clone(&s.config)).ok()
}

/// A flash message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Flash {
	pub message: String,
	pub status: String,
}

/// Variables shared with templates.
///
/// In strict mode reading an unset attribute fails; otherwise it yields an
/// empty string.
#[derive(Debug, Clone, Default)]
pub struct TmplContext {
	values: Map<String, Value>,
	strict: bool,
}

impl TmplContext {
	pub fn new(strict: bool) -> Self {
		Self {
			values: Map::new(),
			strict,
		}
	}

	pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
		self.values.insert(name.into(), value.into());
	}

	/// # Errors
	///
	/// Fails in strict mode when `name` is unset.
	///
	/// # Examples
	///
	/// ```
	/// use trellis_controllers::TmplContext;
	///
	/// let mut strict = TmplContext::new(true);
	/// strict.set("title", "Home");
	/// assert_eq!(strict.get("title").unwrap(), "Home");
	/// assert!(strict.get("missing").is_err());
	///
	/// let lax = TmplContext::new(false);
	/// assert_eq!(lax.get("missing").unwrap(), "");
	/// ```
	pub fn get(&self, name: &str) -> Result<Value> {
		match self.values.get(name) {
			Some(value) => Ok(value.clone()),
			None if self.strict => Err(Error::Internal(format!(
				"tmpl_context has no attribute \"{name}\""
			))),
			None => Ok(Value::String(String::new())),
		}
	}

	pub fn get_mut(&mut self, name: &str) -> Option<&mut Value> {
		self.values.get_mut(name)
	}

	pub fn contains(&self, name: &str) -> bool {
		self.values.contains_key(name)
	}

	pub fn is_strict(&self) -> bool {
		self.strict
	}

	pub fn to_value(&self) -> Value {
		Value::Object(self.values.clone())
	}
}

/// Validation record of the current request.
#[derive(Clone, Default)]
pub struct ValidationStatus {
	/// Messages per field.
	pub errors: Params,
	/// Clean values after success, rejected input after failure.
	pub values: Value,
	/// Message of the failure, if any.
	pub exception: Option<String>,
	/// The intent currently running.
	pub intent: Option<ValidationIntent>,
	/// The handler selected after a failure.
	pub error_handler: Option<ErrorHandler>,
}

impl ValidationStatus {
	pub fn failed(&self) -> bool {
		self.exception.is_some()
	}

	pub fn record(&self) -> ValidationRecord {
		ValidationRecord {
			values: self.values.clone(),
			errors: self.errors.clone(),
			exception: self.exception.clone(),
		}
	}
}

/// Outcome of validation, published to the request extensions once it is
/// settled so that application wrappers can read it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationRecord {
	pub values: Value,
	pub errors: Params,
	pub exception: Option<String>,
}

impl std::fmt::Debug for ValidationStatus {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ValidationStatus")
			.field("errors", &self.errors)
			.field("values", &self.values)
			.field("exception", &self.exception)
			.finish_non_exhaustive()
	}
}

/// Everything the pipeline knows about one request.
pub struct RequestContext {
	pub request: Arc<Request>,
	pub config: Arc<Blueprint>,
	/// Merged query and body parameters.
	pub params: Params,
	pub status: StatusCode,
	pub headers: HeaderMap,
	/// Content type set explicitly by the controller.
	pub content_type: Option<String>,
	/// Content type hinted by the URL extension.
	pub response_type: Option<String>,
	pub tmpl_context: TmplContext,
	pub validation: ValidationStatus,
	pub identity: Identity,
	pub session: Option<SessionHandle>,
	pub cache: Option<CacheHandle>,
	pub translator: TranslatorHandle,
	pub locale: Locale,
	/// Typed storage local to this request.
	pub locals: Extensions,
	current_method: Option<MethodId>,
	custom_formats: HashMap<MethodId, String>,
	override_templates: HashMap<MethodId, String>,
	flashes: Vec<Flash>,
}

impl RequestContext {
	/// Builds the context, picking up the collaborators upstream wrappers
	/// stored in the request extensions.
	pub fn new(request: Arc<Request>, config: Arc<Blueprint>) -> Self {
		let extensions = &request.extensions;
		let identity = Identity::from_extensions(extensions);
		let session = extensions.get::<SessionHandle>();
		let cache = extensions.get::<CacheHandle>();
		let translator = extensions
			.get::<TranslatorHandle>()
			.unwrap_or_else(|| TranslatorHandle(Arc::new(NullTranslator)));
		let locale = extensions.get::<Locale>().unwrap_or_default();
		let params = request.params();
		let strict = config.bool_or("tg.strict_tmpl_context", true);
		Self {
			params,
			status: StatusCode::OK,
			headers: HeaderMap::new(),
			content_type: None,
			response_type: None,
			tmpl_context: TmplContext::new(strict),
			validation: ValidationStatus::default(),
			identity,
			session,
			cache,
			translator,
			locale,
			locals: Extensions::new(),
			current_method: None,
			custom_formats: HashMap::new(),
			override_templates: HashMap::new(),
			flashes: Vec::new(),
			request,
			config,
		}
	}

	pub fn snapshot(&self) -> RequestSnapshot {
		RequestSnapshot {
			request: Arc::clone(&self.request),
			config: Arc::clone(&self.config),
		}
	}

	pub fn set_status(&mut self, status: StatusCode) {
		self.status = status;
	}

	/// Sets a response header.
	///
	/// # Errors
	///
	/// Fails with 500 on an invalid header name or value.
	pub fn set_header(&mut self, name: &str, value: &str) -> Result<()> {
		let name = HeaderName::from_bytes(name.as_bytes())
			.map_err(|e| Error::Internal(format!("invalid header name {name}: {e}")))?;
		let value = HeaderValue::from_str(value)
			.map_err(|e| Error::Internal(format!("invalid header value: {e}")))?;
		self.headers.insert(name, value);
		Ok(())
	}

	/// Forces the response content type, which also selects the matching
	/// exposition.
	pub fn set_content_type(&mut self, content_type: impl Into<String>) {
		self.content_type = Some(content_type.into());
	}

	pub fn current_method(&self) -> Option<&MethodId> {
		self.current_method.as_ref()
	}

	pub(crate) fn set_current_method(&mut self, id: MethodId) {
		self.current_method = Some(id);
	}

	/// Renders the current method with its custom format `format`.
	pub fn use_custom_format(&mut self, format: impl Into<String>) {
		if let Some(id) = self.current_method.clone() {
			self.custom_formats.insert(id, format.into());
		}
	}

	pub fn use_custom_format_for(&mut self, method: &MethodId, format: impl Into<String>) {
		self.custom_formats.insert(method.clone(), format.into());
	}

	pub fn custom_format(&self, method: &MethodId) -> Option<&str> {
		self.custom_formats.get(method).map(String::as_str)
	}

	/// Replaces the template of the current method for this request.
	/// `engine:template` also switches the engine.
	pub fn override_template(&mut self, template: impl Into<String>) {
		if let Some(id) = self.current_method.clone() {
			self.override_templates.insert(id, template.into());
		}
	}

	pub fn override_template_for(&mut self, method: &MethodId, template: impl Into<String>) {
		self.override_templates.insert(method.clone(), template.into());
	}

	pub fn template_override(&self, method: &MethodId) -> Option<&str> {
		self.override_templates.get(method).map(String::as_str)
	}

	/// Queues a message for the next page shown to the user. With a session
	/// the message survives redirects.
	pub fn flash(&mut self, message: impl Into<String>, status: impl Into<String>) {
		let flash = Flash {
			message: message.into(),
			status: status.into(),
		};
		match &self.session {
			Some(session) => {
				let mut stored = match session.0.get(FLASH_SESSION_KEY) {
					Some(Value::Array(items)) => items,
					_ => Vec::new(),
				};
				stored.push(json!({"message": flash.message, "status": flash.status}));
				session.0.set(FLASH_SESSION_KEY, Value::Array(stored));
			}
			None => self.flashes.push(flash),
		}
	}

	/// Takes the pending flash messages.
	pub fn pop_flashes(&mut self) -> Vec<Flash> {
		let mut flashes = Vec::new();
		if let Some(session) = &self.session
			&& let Some(Value::Array(items)) = session.0.remove(FLASH_SESSION_KEY)
		{
			for item in items {
				flashes.push(Flash {
					message: item["message"].as_str().unwrap_or_default().to_string(),
					status: item["status"].as_str().unwrap_or("ok").to_string(),
				});
			}
		}
		flashes.append(&mut self.flashes);
		flashes
	}

	/// Translates through the request translator.
	pub fn gettext(&self, message: &str) -> String {
		self.translator.0.gettext(message)
	}

	/// Builds an application URL for `path`.
	pub fn url(&self, path: &str, params: Option<&Params>) -> String {
		trellis_render::tera_renderer::build_url(&self.request.script_name, path, params)
	}
}

impl std::fmt::Debug for RequestContext {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("RequestContext")
			.field("method", &self.request.method)
			.field("path", &self.request.path())
			.field("status", &self.status)
			.field("identity", &self.identity)
			.finish_non_exhaustive()
	}
}
