use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use trellis_core::Result;
use trellis_http::{Handler, Request, Response};

use crate::wrapper::ApplicationWrapper;

/// Logs each request with its method, path, status and latency.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use trellis_http::{Handler, Request, Response};
/// use trellis_middleware::{ApplicationWrapper, RequestLoggingWrapper};
///
/// struct Hello;
///
/// #[async_trait::async_trait]
/// impl Handler for Hello {
///     async fn handle(&self, _request: Request) -> trellis_core::Result<Response> {
///         Ok(Response::ok().with_body("hello"))
///     }
/// }
///
/// # tokio_test::block_on(async {
/// let request = Request::builder().uri("/api/users").build().unwrap();
/// let response = RequestLoggingWrapper::new().process(request, Arc::new(Hello)).await.unwrap();
/// assert_eq!(response.text(), "hello");
/// # });
/// ```
#[derive(Debug, Clone, Default)]
pub struct RequestLoggingWrapper;

impl RequestLoggingWrapper {
	pub fn new() -> Self {
		Self
	}
}

#[async_trait]
impl ApplicationWrapper for RequestLoggingWrapper {
	fn name(&self) -> &str {
		"request_logging"
	}

	async fn process(&self, request: Request, next: Arc<dyn Handler>) -> Result<Response> {
		let start = Utc::now();
		let method = request.method.to_string();
		let path = request.path().to_string();

		let result = next.handle(request).await;

		let elapsed_ms = Utc::now().signed_duration_since(start).num_milliseconds();
		match &result {
			Ok(response) => tracing::info!(
				%method,
				%path,
				status = response.status.as_u16(),
				elapsed_ms,
				"request served"
			),
			Err(err) => tracing::warn!(
				%method,
				%path,
				status = err.status_code().as_u16(),
				error = %err,
				elapsed_ms,
				"request failed"
			),
		}
		result
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;
	use trellis_core::Error;

	struct Failing;

	#[async_trait]
	impl Handler for Failing {
		async fn handle(&self, _request: Request) -> Result<Response> {
			Err(Error::Internal("database went away".into()))
		}
	}

	#[rstest]
	#[tokio::test]
	async fn test_errors_pass_through_unchanged() {
		let request = Request::builder().uri("/orders").build().unwrap();
		let err = RequestLoggingWrapper::new()
			.process(request, Arc::new(Failing))
			.await
			.unwrap_err();
		assert!(matches!(err, Error::Internal(message) if message == "database went away"));
	}
}
