//! Test response wrapper with assertion helpers

use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use serde::de::DeserializeOwned;
use trellis_core::{Error, Result};
use trellis_http::Response;

/// A response returned by [`TestApp`](crate::TestApp).
#[derive(Debug, Clone)]
pub struct TestResponse {
	status: StatusCode,
	headers: HeaderMap,
	body: Bytes,
}

impl TestResponse {
	pub fn status(&self) -> StatusCode {
		self.status
	}

	pub fn status_code(&self) -> u16 {
		self.status.as_u16()
	}

	pub fn headers(&self) -> &HeaderMap {
		&self.headers
	}

	/// First value of header `name`.
	pub fn header(&self, name: &str) -> Option<&str> {
		self.headers.get(name).and_then(|v| v.to_str().ok())
	}

	/// Every value of header `name`, such as repeated `Set-Cookie`.
	pub fn header_all(&self, name: &str) -> Vec<&str> {
		self.headers
			.get_all(name)
			.iter()
			.filter_map(|v| v.to_str().ok())
			.collect()
	}

	pub fn body(&self) -> &Bytes {
		&self.body
	}

	pub fn text(&self) -> String {
		String::from_utf8_lossy(&self.body).to_string()
	}

	/// Decodes the body as JSON.
	///
	/// # Examples
	///
	/// ```
	/// use serde_json::Value;
	/// use trellis_http::Response;
	/// use trellis_test::TestResponse;
	///
	/// let response = TestResponse::from(Response::ok().with_body(r#"{"ok":true}"#));
	/// let body: Value = response.json().unwrap();
	/// assert_eq!(body["ok"], true);
	/// ```
	pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
		serde_json::from_slice(&self.body).map_err(Error::from)
	}

	/// Panics unless the status is `expected`, showing the body.
	#[track_caller]
	pub fn assert_status(&self, expected: u16) -> &Self {
		assert_eq!(
			self.status_code(),
			expected,
			"unexpected status, body: {}",
			self.text()
		);
		self
	}

	/// Panics unless the body contains `needle`.
	#[track_caller]
	pub fn assert_contains(&self, needle: &str) -> &Self {
		let text = self.text();
		assert!(text.contains(needle), "{needle:?} not found in body: {text}");
		self
	}
}

impl From<Response> for TestResponse {
	fn from(response: Response) -> Self {
		Self {
			status: response.status,
			headers: response.headers,
			body: response.body,
		}
	}
}
