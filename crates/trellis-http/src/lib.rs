//! HTTP surface of trellis.
//!
//! This crate holds the request and response types that travel through the
//! application-wrapper chain, the [`Handler`] trait every layer implements,
//! the request [`Extensions`] used as the per-request environment, and the
//! interfaces of the collaborators the core consumes without implementing
//! (identity, sessions, translators, cache regions).
//!
//! ## Handler
//!
//! ```rust
//! use trellis_http::{Handler, Request, Response};
//! use async_trait::async_trait;
//!
//! struct Hello;
//!
//! #[async_trait]
//! impl Handler for Hello {
//!     async fn handle(&self, _request: Request) -> trellis_core::Result<Response> {
//!         Ok(Response::ok().with_body("Hello!"))
//!     }
//! }
//! ```

pub mod extensions;
pub mod handler;
pub mod identity;
pub mod request;
pub mod response;
pub mod services;

pub use extensions::{Extensions, SkipErrorPage};
pub use handler::Handler;
pub use identity::Identity;
pub use request::{Request, RequestBuilder};
pub use response::Response;
pub use services::{
	CacheHandle, CacheRegion, Locale, NullTranslator, Session, SessionHandle, Translator,
	TranslatorHandle,
};

pub use http::{HeaderMap, Method, StatusCode, Uri, Version};
pub use trellis_core::{Error, Params, Result};
