//! Error-page substitution.
//!
//! Responses whose status is listed in `errorpage.status_codes` get their
//! body replaced by the output of the error controller, reached through an
//! internal GET on `errorpage.path` with `code` and `message` parameters.
//! The original status is kept. With `errorpage.handle_exceptions` uncaught
//! application errors are turned into a 500 error page as well.

use async_trait::async_trait;
use http::{Method, StatusCode};
use std::sync::Arc;
use trellis_conf::Blueprint;
use trellis_core::Result;
use trellis_http::{Handler, Request, Response, SkipErrorPage};

use crate::wrapper::ApplicationWrapper;

#[derive(Debug, Clone)]
pub struct ErrorPageWrapper {
	status_codes: Vec<u16>,
	path: String,
	handle_exceptions: bool,
	debug: bool,
}

impl ErrorPageWrapper {
	pub fn new(path: impl Into<String>, status_codes: Vec<u16>) -> Self {
		Self {
			status_codes,
			path: path.into(),
			handle_exceptions: false,
			debug: false,
		}
	}

	pub fn handle_exceptions(mut self, enabled: bool) -> Self {
		self.handle_exceptions = enabled;
		self
	}

	/// Reads the `errorpage.*` options. `None` unless `errorpage.enabled`.
	pub fn from_config(config: &Blueprint) -> Option<Self> {
		if !config.bool_or("errorpage.enabled", false) {
			return None;
		}
		let mut status_codes: Vec<u16> = config
			.get_list("errorpage.status_codes")
			.iter()
			.filter_map(|code| code.parse().ok())
			.collect();
		if !config.contains("errorpage.status_codes") {
			status_codes = vec![403, 404];
		}
		let handle_exceptions = config.bool_or("errorpage.handle_exceptions", !config.bool_or("debug", false));
		if handle_exceptions && !status_codes.contains(&500) {
			status_codes.push(500);
		}
		let mut wrapper = Self::new(config.str_or("errorpage.path", "/error/document"), status_codes)
			.handle_exceptions(handle_exceptions);
		wrapper.debug = config.bool_or("debug", false);
		Some(wrapper)
	}

	pub fn status_codes(&self) -> &[u16] {
		&self.status_codes
	}

	fn handles(&self, status: StatusCode) -> bool {
		self.status_codes.contains(&status.as_u16())
	}

	async fn render_page(&self, request: &Request, original: Response, next: &Arc<dyn Handler>) -> Response {
		let message = String::from_utf8_lossy(&original.body).into_owned();
		let query = serde_urlencoded::to_string([
			("code", original.status.as_u16().to_string()),
			("message", message),
		])
		.unwrap_or_default();
		let subrequest = match request.subrequest(Method::GET, &format!("{}?{}", self.path, query)) {
			Ok(subrequest) => subrequest,
			Err(err) => {
				tracing::warn!(error = %err, "cannot build error page request");
				return original;
			}
		};

		match next.handle(subrequest).await {
			Ok(page) if page.status.is_success() => {
				let mut response = page.with_status(original.status);
				for (name, value) in &original.headers {
					if !response.headers.contains_key(name) {
						response.headers.insert(name.clone(), value.clone());
					}
				}
				response
			}
			Ok(page) => {
				tracing::warn!(status = %page.status, path = %self.path, "error page controller failed");
				original
			}
			Err(err) => {
				tracing::warn!(error = %err, path = %self.path, "error page controller failed");
				original
			}
		}
	}
}

#[async_trait]
impl ApplicationWrapper for ErrorPageWrapper {
	fn name(&self) -> &str {
		"errorpage"
	}

	async fn process(&self, request: Request, next: Arc<dyn Handler>) -> Result<Response> {
		let page_request = request.clone();
		let response = match next.handle(request).await {
			Ok(response) => response,
			Err(err) if self.handle_exceptions => {
				tracing::error!(error = %err, "uncaught error replaced by an error page");
				Response::from_error(&err, self.debug)
			}
			Err(err) => return Err(err),
		};

		if !self.handles(response.status) || page_request.extensions.contains::<SkipErrorPage>() {
			return Ok(response);
		}
		Ok(self.render_page(&page_request, response, &next).await)
	}
}
