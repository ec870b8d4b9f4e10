//! Abort, redirect and URL helpers usable from controller code.

use http::StatusCode;
use serde::{Serialize, Serializer};
use trellis_core::{Error, HttpError, Params};
use trellis_render::tera_renderer::build_url;

use crate::context::current_request;
use crate::method::ErrorHandler;

/// An error aborting the request with `status`.
///
/// # Examples
///
/// ```
/// use http::StatusCode;
/// use trellis_controllers::helpers::abort;
///
/// let err = abort(StatusCode::FORBIDDEN, "not yours");
/// assert_eq!(err.status_code(), StatusCode::FORBIDDEN);
/// ```
pub fn abort(status: StatusCode, detail: impl Into<String>) -> Error {
	Error::Http(HttpError::new(status).with_detail(detail))
}

/// An abort used as validation error handler: the failing request answers
/// with `status` instead of reaching the method.
pub fn abort_handler(status: StatusCode, detail: impl Into<String>) -> ErrorHandler {
	ErrorHandler::Abort(HttpError::new(status).with_detail(detail))
}

/// A 302 redirect to an application URL.
pub fn redirect(path: &str, params: Option<&Params>) -> Error {
	redirect_with(StatusCode::FOUND, path, params)
}

pub fn redirect_with(status: StatusCode, path: &str, params: Option<&Params>) -> Error {
	let location = if path.contains("://") {
		path.to_string()
	} else {
		url(path, params)
	};
	Error::Http(HttpError::redirect(status, location))
}

/// Builds an application URL, prefixed with the script name of the current
/// request if any.
pub fn url(path: &str, params: Option<&Params>) -> String {
	let script_name = current_request()
		.map(|r| r.script_name.clone())
		.unwrap_or_default();
	build_url(&script_name, path, params)
}

/// A URL rendered only when used, against the request current at that time.
///
/// # Examples
///
/// ```
/// use trellis_controllers::LazyUrl;
///
/// let login = LazyUrl::new("/login").param("came_from", "/");
/// // Outside a request there is no script name to prefix.
/// assert_eq!(login.to_string(), "/login?came_from=%2F");
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LazyUrl {
	pub base: String,
	pub params: Params,
	/// Includes scheme and host.
	pub qualified: bool,
}

impl LazyUrl {
	pub fn new(base: impl Into<String>) -> Self {
		Self {
			base: base.into(),
			..Self::default()
		}
	}

	pub fn param(mut self, name: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
		self.params.insert(name.into(), value.into());
		self
	}

	pub fn qualified(mut self) -> Self {
		self.qualified = true;
		self
	}

	pub fn render(&self) -> String {
		let params = (!self.params.is_empty()).then_some(&self.params);
		let path = url(&self.base, params);
		if self.qualified
			&& let Some(request) = current_request()
		{
			return format!("{}{}", request.host_url(), path);
		}
		path
	}
}

impl std::fmt::Display for LazyUrl {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(&self.render())
	}
}

impl Serialize for LazyUrl {
	fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
		serializer.serialize_str(&self.render())
	}
}

impl From<LazyUrl> for String {
	fn from(url: LazyUrl) -> Self {
		url.render()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::context::{RequestSnapshot, with_request_scope};
	use rstest::rstest;
	use std::sync::Arc;
	use trellis_conf::Blueprint;
	use trellis_http::Request;

	fn in_request<R>(f: impl FnOnce() -> R) -> R {
		let request = Request::builder()
			.uri("/shop/cart")
			.header("host", "example.org")
			.script_name("/shop")
			.build()
			.unwrap();
		let snapshot = RequestSnapshot {
			request: Arc::new(request),
			config: Arc::new(Blueprint::new()),
		};
		with_request_scope(snapshot, f)
	}

	#[rstest]
	fn test_lazy_url_renders_in_request() {
		let cart = LazyUrl::new("/cart");
		assert_eq!(cart.to_string(), "/cart");
		assert_eq!(in_request(|| cart.to_string()), "/shop/cart");
		assert_eq!(in_request(|| cart.clone().qualified().render()), "http://example.org/shop/cart");
	}

	#[rstest]
	fn test_redirect_location() {
		let err = in_request(|| redirect("/login", None));
		match err {
			Error::Http(http) => {
				assert_eq!(http.status, StatusCode::FOUND);
				assert_eq!(http.headers, vec![("Location".to_string(), "/shop/login".to_string())]);
			}
			other => panic!("unexpected {other:?}"),
		}
	}

	#[rstest]
	fn test_external_redirect_is_kept() {
		let Error::Http(http) = redirect("https://example.com/", None) else {
			panic!("expected an HTTP error");
		};
		assert_eq!(http.headers[0].1, "https://example.com/");
	}

	#[rstest]
	fn test_lazy_url_serializes_as_string() {
		let value = serde_json::to_value(LazyUrl::new("/a").param("x", 1)).unwrap();
		assert_eq!(value, "/a?x=1");
	}
}
