//! The handler abstraction every layer of the request chain implements.

use async_trait::async_trait;
use std::sync::Arc;
use trellis_core::Result;

use crate::{Request, Response};

/// Processes a request into a response.
///
/// The dispatch core, every application wrapper in the chain and the final
/// [`Application`](https://docs.rs/trellis-apps) all implement this trait.
#[async_trait]
pub trait Handler: Send + Sync {
	/// Handles a request.
	///
	/// # Errors
	///
	/// Returns an application error the outer layers may observe.
	async fn handle(&self, request: Request) -> Result<Response>;
}

/// Blanket implementation so `Arc<dyn Handler>` is itself a handler.
#[async_trait]
impl<T: Handler + ?Sized> Handler for Arc<T> {
	async fn handle(&self, request: Request) -> Result<Response> {
		(**self).handle(request).await
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;

	struct Echo;

	#[async_trait]
	impl Handler for Echo {
		async fn handle(&self, request: Request) -> Result<Response> {
			Ok(Response::ok().with_body(request.path().to_string()))
		}
	}

	#[rstest]
	#[tokio::test]
	async fn test_arc_dyn_handler_delegates() {
		let handler: Arc<dyn Handler> = Arc::new(Echo);
		let request = Request::builder().uri("/echo/me").build().unwrap();

		let response = handler.handle(request).await.unwrap();
		assert_eq!(response.text(), "/echo/me");
	}
}
