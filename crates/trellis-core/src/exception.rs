//! Error taxonomy shared across trellis.
//!
//! Errors fall in two families. HTTP outcomes ([`Error::NotFound`],
//! [`Error::MethodNotAllowed`], [`Error::Http`], [`Error::NotAuthorized`]) are
//! turned into responses by the dispatch core. Everything else is an
//! application failure and travels outwards through the application wrappers,
//! where the transaction manager, error pages and error reporters observe it.

use http::StatusCode;

/// Result alias used throughout the framework.
pub type Result<T> = std::result::Result<T, Error>;

/// An HTTP error raised on purpose, usually through `abort` or `redirect`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpError {
	pub status: StatusCode,
	pub detail: Option<String>,
	pub headers: Vec<(String, String)>,
	/// When set, error page substitution leaves the response untouched.
	pub passthrough: bool,
}

impl HttpError {
	/// Creates an error for the given status without detail.
	///
	/// # Examples
	///
	/// ```
	/// use trellis_core::HttpError;
	/// use http::StatusCode;
	///
	/// let err = HttpError::new(StatusCode::NOT_FOUND);
	/// assert_eq!(err.status, StatusCode::NOT_FOUND);
	/// assert!(err.detail.is_none());
	/// ```
	pub fn new(status: StatusCode) -> Self {
		Self {
			status,
			detail: None,
			headers: Vec::new(),
			passthrough: false,
		}
	}

	pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
		self.detail = Some(detail.into());
		self
	}

	pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.headers.push((name.into(), value.into()));
		self
	}

	pub fn with_passthrough(mut self, passthrough: bool) -> Self {
		self.passthrough = passthrough;
		self
	}

	/// Builds a redirect error carrying a `Location` header.
	///
	/// # Examples
	///
	/// ```
	/// use trellis_core::HttpError;
	/// use http::StatusCode;
	///
	/// let err = HttpError::redirect(StatusCode::MOVED_PERMANENTLY, "/hello/");
	/// assert_eq!(err.headers, vec![("Location".to_string(), "/hello/".to_string())]);
	/// ```
	pub fn redirect(status: StatusCode, location: impl Into<String>) -> Self {
		Self::new(status).with_header("Location", location)
	}

	/// Text used as response body: the detail, or the canonical reason phrase.
	pub fn message(&self) -> String {
		match &self.detail {
			Some(detail) => detail.clone(),
			None => self
				.status
				.canonical_reason()
				.unwrap_or("Unknown Status")
				.to_string(),
		}
	}
}

impl std::fmt::Display for HttpError {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{} {}", self.status.as_u16(), self.message())
	}
}

/// The framework error.
#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Not found: {0}")]
	NotFound(String),

	#[error("Method not allowed: {0}")]
	MethodNotAllowed(String),

	#[error("HTTP error: {0}")]
	Http(HttpError),

	#[error("Not authorized: {message}")]
	NotAuthorized { message: String, authenticated: bool },

	#[error("Validation error: {0}")]
	Validation(String),

	#[error("Render error: {0}")]
	Render(String),

	#[error("Configuration error: {0}")]
	Configuration(String),

	/// Failure a transaction manager may retry.
	#[error("Transient error: {0}")]
	Transient(String),

	#[error("Internal error: {0}")]
	Internal(String),

	#[error("Serialization error: {0}")]
	Serialization(#[from] serde_json::Error),
}

impl Error {
	/// HTTP status this error maps to.
	///
	/// # Examples
	///
	/// ```
	/// use trellis_core::Error;
	/// use http::StatusCode;
	///
	/// assert_eq!(Error::NotFound("/missing".into()).status_code(), StatusCode::NOT_FOUND);
	/// let denied = Error::NotAuthorized { message: "no".into(), authenticated: true };
	/// assert_eq!(denied.status_code(), StatusCode::FORBIDDEN);
	/// ```
	pub fn status_code(&self) -> StatusCode {
		match self {
			Error::NotFound(_) => StatusCode::NOT_FOUND,
			Error::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
			Error::Http(err) => err.status,
			Error::NotAuthorized { authenticated, .. } => {
				if *authenticated {
					StatusCode::FORBIDDEN
				} else {
					StatusCode::UNAUTHORIZED
				}
			}
			Error::Validation(_) => StatusCode::PRECONDITION_FAILED,
			Error::Render(_)
			| Error::Configuration(_)
			| Error::Transient(_)
			| Error::Internal(_)
			| Error::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
		}
	}

	/// Whether this error is an HTTP outcome rather than an application failure.
	pub fn is_http(&self) -> bool {
		matches!(
			self,
			Error::NotFound(_)
				| Error::MethodNotAllowed(_)
				| Error::Http(_)
				| Error::NotAuthorized { .. }
		)
	}

	/// Shortcut for `Error::Http(HttpError::new(status))`.
	pub fn http(status: StatusCode) -> Self {
		Error::Http(HttpError::new(status))
	}
}

impl From<HttpError> for Error {
	fn from(err: HttpError) -> Self {
		Error::Http(err)
	}
}
