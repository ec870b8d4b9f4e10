//! Incoming HTTP request.

use bytes::Bytes;
use http::header::{ACCEPT, ACCEPT_LANGUAGE, CONTENT_TYPE, COOKIE, HOST};
use http::{HeaderMap, HeaderName, HeaderValue, Method, Uri, Version};
use indexmap::IndexMap;
use serde_json::Value;
use std::net::SocketAddr;
use trellis_core::{Error, HttpError, Params, Result};

use crate::Extensions;

/// An HTTP request as seen by the framework.
///
/// Cloning is cheap: the body is reference counted and clones share the
/// same [`Extensions`].
#[derive(Debug, Clone)]
pub struct Request {
	pub method: Method,
	pub uri: Uri,
	pub version: Version,
	pub headers: HeaderMap,
	pub body: Bytes,
	/// Mount point of the application, prepended to generated URLs.
	pub script_name: String,
	pub remote_addr: Option<SocketAddr>,
	pub extensions: Extensions,
}

impl Request {
	pub fn new(method: Method, uri: Uri, version: Version, headers: HeaderMap, body: Bytes) -> Self {
		Self {
			method,
			uri,
			version,
			headers,
			body,
			script_name: String::new(),
			remote_addr: None,
			extensions: Extensions::new(),
		}
	}

	/// Starts building a request.
	///
	/// # Examples
	///
	/// ```
	/// use trellis_http::Request;
	/// use http::Method;
	///
	/// let request = Request::builder()
	///     .method(Method::POST)
	///     .uri("/users?page=2")
	///     .header("content-type", "application/x-www-form-urlencoded")
	///     .body("name=Bob")
	///     .build()
	///     .unwrap();
	///
	/// assert_eq!(request.path(), "/users");
	/// assert_eq!(request.params()["name"], "Bob");
	/// assert_eq!(request.params()["page"], "2");
	/// ```
	pub fn builder() -> RequestBuilder {
		RequestBuilder::default()
	}

	pub fn path(&self) -> &str {
		self.uri.path()
	}

	pub fn query_string(&self) -> &str {
		self.uri.query().unwrap_or("")
	}

	pub fn header(&self, name: &str) -> Option<&str> {
		self.headers.get(name).and_then(|v| v.to_str().ok())
	}

	pub fn accept(&self) -> Option<&str> {
		self.headers.get(ACCEPT).and_then(|v| v.to_str().ok())
	}

	pub fn accept_language(&self) -> Option<&str> {
		self.headers.get(ACCEPT_LANGUAGE).and_then(|v| v.to_str().ok())
	}

	pub fn content_type(&self) -> Option<&str> {
		self.headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok())
	}

	/// Decoded query parameters. Repeated keys become arrays.
	pub fn query_params(&self) -> Params {
		parse_urlencoded(self.query_string())
	}

	/// Decoded body parameters, from a form or a JSON object body.
	pub fn body_params(&self) -> Params {
		if self.body.is_empty() {
			return Params::new();
		}
		let content_type = self.content_type().unwrap_or("");
		if content_type.starts_with("application/x-www-form-urlencoded") {
			return parse_urlencoded(&String::from_utf8_lossy(&self.body));
		}
		if content_type.starts_with("application/json") {
			return match serde_json::from_slice::<Value>(&self.body) {
				Ok(Value::Object(map)) => map,
				Ok(_) => Params::new(),
				Err(err) => {
					tracing::debug!(error = %err, "ignoring malformed JSON body");
					Params::new()
				}
			};
		}
		Params::new()
	}

	/// Query and body parameters merged, body values added after query values.
	pub fn params(&self) -> Params {
		let mut params = self.query_params();
		for (key, value) in self.body_params() {
			merge_param(&mut params, key, value);
		}
		params
	}

	/// Cookies sent by the client.
	pub fn cookies(&self) -> IndexMap<String, String> {
		let mut cookies = IndexMap::new();
		for header in self.headers.get_all(COOKIE) {
			let Ok(raw) = header.to_str() else { continue };
			for pair in raw.split(';') {
				if let Some((name, value)) = pair.trim().split_once('=') {
					let value = percent_encoding::percent_decode_str(value.trim())
						.decode_utf8_lossy()
						.into_owned();
					cookies.insert(name.trim().to_string(), value);
				}
			}
		}
		cookies
	}

	pub fn cookie(&self, name: &str) -> Option<String> {
		self.cookies().shift_remove(name)
	}

	pub fn host(&self) -> &str {
		self.uri
			.host()
			.or_else(|| self.headers.get(HOST).and_then(|v| v.to_str().ok()))
			.unwrap_or("localhost")
	}

	/// `scheme://host` of the request.
	pub fn host_url(&self) -> String {
		let scheme = self.uri.scheme_str().unwrap_or("http");
		match (self.uri.host(), self.uri.port_u16()) {
			(Some(host), Some(port)) => format!("{scheme}://{host}:{port}"),
			_ => format!("{scheme}://{}", self.host()),
		}
	}

	/// Full URL of the request, query string included.
	pub fn url(&self) -> String {
		let mut url = format!("{}{}{}", self.host_url(), self.script_name, self.path());
		if let Some(query) = self.uri.query() {
			url.push('?');
			url.push_str(query);
		}
		url
	}

	pub fn is_xhr(&self) -> bool {
		self.header("x-requested-with")
			.is_some_and(|v| v.eq_ignore_ascii_case("XMLHttpRequest"))
	}

	/// Copy of this request pointed at another path, with its own fresh
	/// extensions. Used for internal re-dispatches such as error pages.
	pub fn subrequest(&self, method: Method, path_and_query: &str) -> Result<Self> {
		let uri: Uri = path_and_query
			.parse()
			.map_err(|e| Error::Internal(format!("invalid sub-request URI {path_and_query}: {e}")))?;
		Ok(Self {
			method,
			uri,
			version: self.version,
			headers: self.headers.clone(),
			body: Bytes::new(),
			script_name: self.script_name.clone(),
			remote_addr: self.remote_addr,
			extensions: Extensions::new(),
		})
	}
}

fn parse_urlencoded(input: &str) -> Params {
	let pairs: Vec<(String, String)> = serde_urlencoded::from_str(input).unwrap_or_default();
	let mut params = Params::new();
	for (key, value) in pairs {
		merge_param(&mut params, key, Value::String(value));
	}
	params
}

fn merge_param(params: &mut Params, key: String, value: Value) {
	match params.get_mut(&key) {
		Some(Value::Array(items)) => items.push(value),
		Some(existing) => {
			let first = existing.take();
			*existing = Value::Array(vec![first, value]);
		}
		None => {
			params.insert(key, value);
		}
	}
}

/// Builder for [`Request`], mostly used by tests and the server adapter.
#[derive(Debug)]
pub struct RequestBuilder {
	method: Method,
	uri: String,
	version: Version,
	headers: HeaderMap,
	body: Bytes,
	script_name: String,
	extensions: Extensions,
}

impl Default for RequestBuilder {
	fn default() -> Self {
		Self {
			method: Method::GET,
			uri: "/".to_string(),
			version: Version::HTTP_11,
			headers: HeaderMap::new(),
			body: Bytes::new(),
			script_name: String::new(),
			extensions: Extensions::new(),
		}
	}
}

impl RequestBuilder {
	pub fn method(mut self, method: Method) -> Self {
		self.method = method;
		self
	}

	pub fn uri(mut self, uri: impl Into<String>) -> Self {
		self.uri = uri.into();
		self
	}

	pub fn version(mut self, version: Version) -> Self {
		self.version = version;
		self
	}

	/// Appends a header. Invalid names or values are skipped.
	pub fn header(mut self, name: &str, value: &str) -> Self {
		match (
			HeaderName::from_bytes(name.as_bytes()),
			HeaderValue::from_str(value),
		) {
			(Ok(name), Ok(value)) => {
				self.headers.append(name, value);
			}
			_ => tracing::warn!(name, "skipping invalid request header"),
		}
		self
	}

	pub fn headers(mut self, headers: HeaderMap) -> Self {
		self.headers = headers;
		self
	}

	pub fn body(mut self, body: impl Into<Bytes>) -> Self {
		self.body = body.into();
		self
	}

	pub fn script_name(mut self, script_name: impl Into<String>) -> Self {
		self.script_name = script_name.into();
		self
	}

	pub fn extensions(mut self, extensions: Extensions) -> Self {
		self.extensions = extensions;
		self
	}

	/// Builds the request.
	///
	/// # Errors
	///
	/// Returns a 400 error when the URI cannot be parsed.
	pub fn build(self) -> Result<Request> {
		let uri: Uri = self.uri.parse().map_err(|e| {
			Error::Http(
				HttpError::new(http::StatusCode::BAD_REQUEST)
					.with_detail(format!("invalid URI {}: {e}", self.uri)),
			)
		})?;
		Ok(Request {
			method: self.method,
			uri,
			version: self.version,
			headers: self.headers,
			body: self.body,
			script_name: self.script_name,
			remote_addr: None,
			extensions: self.extensions,
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;
	use serde_json::json;

	#[rstest]
	fn test_repeated_query_keys_become_arrays() {
		let request = Request::builder()
			.uri("/search?tag=a&tag=b&tag=c&q=rust%20lang")
			.build()
			.unwrap();
		let params = request.query_params();
		assert_eq!(params["tag"], json!(["a", "b", "c"]));
		assert_eq!(params["q"], "rust lang");
	}

	#[rstest]
	fn test_json_body_params() {
		let request = Request::builder()
			.method(Method::POST)
			.uri("/items?x=1")
			.header("content-type", "application/json")
			.body(r#"{"name": "widget", "count": 3}"#)
			.build()
			.unwrap();
		let params = request.params();
		assert_eq!(params["name"], "widget");
		assert_eq!(params["count"], 3);
		assert_eq!(params["x"], "1");
	}

	#[rstest]
	fn test_cookies() {
		let request = Request::builder()
			.uri("/")
			.header("cookie", "a=1; session=abc%20def")
			.build()
			.unwrap();
		assert_eq!(request.cookie("session").as_deref(), Some("abc def"));
		assert_eq!(request.cookie("a").as_deref(), Some("1"));
		assert!(request.cookie("missing").is_none());
	}

	#[rstest]
	fn test_url_parts() {
		let request = Request::builder()
			.uri("/path/here?x=1")
			.header("host", "example.com")
			.script_name("/app")
			.build()
			.unwrap();
		assert_eq!(request.host_url(), "http://example.com");
		assert_eq!(request.url(), "http://example.com/app/path/here?x=1");
	}

	#[rstest]
	fn test_subrequest_has_fresh_extensions() {
		let request = Request::builder().uri("/a").build().unwrap();
		request.extensions.insert(1u8);
		let sub = request.subrequest(Method::GET, "/error/document").unwrap();
		assert_eq!(sub.path(), "/error/document");
		assert!(!sub.extensions.contains::<u8>());
	}

	#[rstest]
	fn test_invalid_uri_is_bad_request() {
		let err = Request::builder().uri("http://[::1").build().unwrap_err();
		assert_eq!(err.status_code(), http::StatusCode::BAD_REQUEST);
	}
}
