use bytes::Bytes;
use http::header::{CONTENT_TYPE, LOCATION, SET_COOKIE};
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use trellis_core::{Error, HttpError, Result};

/// HTTP response.
#[derive(Debug, Clone)]
pub struct Response {
	pub status: StatusCode,
	pub headers: HeaderMap,
	pub body: Bytes,
}

impl Response {
	/// Creates an empty response with the given status.
	///
	/// # Examples
	///
	/// ```
	/// use trellis_http::Response;
	/// use http::StatusCode;
	///
	/// let response = Response::new(StatusCode::ACCEPTED);
	/// assert_eq!(response.status, StatusCode::ACCEPTED);
	/// assert!(response.body.is_empty());
	/// ```
	pub fn new(status: StatusCode) -> Self {
		Self {
			status,
			headers: HeaderMap::new(),
			body: Bytes::new(),
		}
	}

	pub fn ok() -> Self {
		Self::new(StatusCode::OK)
	}

	pub fn not_found() -> Self {
		Self::new(StatusCode::NOT_FOUND)
	}

	pub fn internal_server_error() -> Self {
		Self::new(StatusCode::INTERNAL_SERVER_ERROR)
	}

	/// Redirect with the given 3xx status.
	///
	/// # Examples
	///
	/// ```
	/// use trellis_http::Response;
	/// use http::StatusCode;
	///
	/// let response = Response::redirect(StatusCode::FOUND, "/login");
	/// assert_eq!(response.header("location"), Some("/login"));
	/// ```
	pub fn redirect(status: StatusCode, location: &str) -> Self {
		Self::new(status).with_location(location)
	}

	pub fn with_status(mut self, status: StatusCode) -> Self {
		self.status = status;
		self
	}

	pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
		self.body = body.into();
		self
	}

	/// Sets a header, replacing previous values. Invalid names or values are
	/// ignored.
	///
	/// # Examples
	///
	/// ```
	/// use trellis_http::Response;
	///
	/// let response = Response::ok().with_header("X-Custom-Header", "custom-value");
	/// assert_eq!(response.header("x-custom-header"), Some("custom-value"));
	/// ```
	pub fn with_header(mut self, name: &str, value: &str) -> Self {
		self.set_header(name, value);
		self
	}

	pub fn set_header(&mut self, name: &str, value: &str) {
		if let Ok(header_name) = HeaderName::from_bytes(name.as_bytes())
			&& let Ok(header_value) = HeaderValue::from_str(value)
		{
			self.headers.insert(header_name, header_value);
		}
	}

	pub fn with_location(mut self, location: &str) -> Self {
		if let Ok(value) = HeaderValue::from_str(location) {
			self.headers.insert(LOCATION, value);
		}
		self
	}

	pub fn with_content_type(mut self, content_type: &str) -> Self {
		self.set_header(CONTENT_TYPE.as_str(), content_type);
		self
	}

	/// Serializes `data` as the JSON body.
	///
	/// # Examples
	///
	/// ```
	/// use trellis_http::Response;
	/// use serde_json::json;
	///
	/// let response = Response::ok().with_json(&json!({"ok": true})).unwrap();
	/// assert_eq!(response.content_type(), Some("application/json"));
	/// assert_eq!(response.text(), r#"{"ok":true}"#);
	/// ```
	pub fn with_json<T: Serialize>(mut self, data: &T) -> Result<Self> {
		self.body = Bytes::from(serde_json::to_vec(data)?);
		self.headers
			.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
		Ok(self)
	}

	/// Appends a `Set-Cookie` header.
	pub fn set_cookie(&mut self, name: &str, value: &str, path: &str) {
		let encoded =
			percent_encoding::utf8_percent_encode(value, percent_encoding::NON_ALPHANUMERIC);
		let cookie = format!("{name}={encoded}; Path={path}; HttpOnly");
		if let Ok(value) = HeaderValue::from_str(&cookie) {
			self.headers.append(SET_COOKIE, value);
		}
	}

	pub fn header(&self, name: &str) -> Option<&str> {
		self.headers.get(name).and_then(|v| v.to_str().ok())
	}

	pub fn content_type(&self) -> Option<&str> {
		self.headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok())
	}

	/// Body decoded as UTF-8, lossily.
	pub fn text(&self) -> String {
		String::from_utf8_lossy(&self.body).into_owned()
	}

	/// Body parsed as JSON.
	pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
		Ok(serde_json::from_slice(&self.body)?)
	}

	/// Response for an intentional HTTP error.
	pub fn from_http_error(err: &HttpError) -> Self {
		let mut response = Response::new(err.status)
			.with_content_type("text/plain; charset=utf-8")
			.with_body(err.message());
		for (name, value) in &err.headers {
			response.set_header(name, value);
		}
		response
	}

	/// Response for any framework error. Application failures only expose
	/// their message when `debug` is set.
	pub fn from_error(err: &Error, debug: bool) -> Self {
		match err {
			Error::Http(http_err) => Self::from_http_error(http_err),
			Error::NotFound(detail) | Error::MethodNotAllowed(detail) => Self::from_http_error(
				&HttpError::new(err.status_code()).with_detail(detail.clone()),
			),
			Error::NotAuthorized { message, .. } => Self::from_http_error(
				&HttpError::new(err.status_code()).with_detail(message.clone()),
			),
			_ => {
				let body = if debug {
					debug_body(err)
				} else {
					"The server encountered an internal error.".to_string()
				};
				Response::new(err.status_code())
					.with_content_type("text/plain; charset=utf-8")
					.with_body(body)
			}
		}
	}
}

fn debug_body(err: &Error) -> String {
	let mut body = format!("{err}\n");
	let mut source = std::error::Error::source(err);
	while let Some(cause) = source {
		body.push_str(&format!("caused by: {cause}\n"));
		source = cause.source();
	}
	body
}

impl From<Error> for Response {
	fn from(error: Error) -> Self {
		Response::from_error(&error, false)
	}
}
