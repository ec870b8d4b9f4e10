//! # trellis
//!
//! An object-dispatch web framework core. Applications are trees of
//! controllers: the path of a request is walked segment by segment through
//! the tree until an exposed method is found, which is then called through a
//! pipeline of validation, hooks and rendering.
//!
//! This crate re-exports the workspace crates behind feature flags.
//!
//! ## Feature Flags
//!
//! - `minimal` - Dispatch, rendering, validation and application assembly
//! - `middleware` - Application wrappers (transactions, sessions, caching,
//!   error pages, i18n, identity, error reporting)
//! - `server` - HTTP/1 server adapter on hyper
//! - `test` - In-process test client
//! - `full` (default) - Everything above
//!
//! ## Quick Example
//!
//! ```
//! use trellis::prelude::*;
//!
//! let root = ControllerNode::new("Root")
//!     .method(ExposedMethod::new("index", |_, _| Ok(Reply::from("Hello World"))).expose(""))
//!     .method(
//!         ExposedMethod::new("hello", |_, args| {
//!             Ok(Reply::from(serde_json::json!({"greeting": format!("Hello {}", args.require_str("name")?)})))
//!         })
//!         .expose("json")
//!         .arg("name"),
//!     );
//!
//! let app = Configurator::minimal().make_app(root, None).unwrap();
//! let request = Request::builder().uri("/hello/Bob").build().unwrap();
//! let response = app.dispatch_core().process(request).unwrap();
//! assert_eq!(response.text(), r#"{"greeting":"Hello Bob"}"#);
//! ```

pub mod apps;
pub mod conf;
pub mod controllers;
pub mod core;
pub mod http;
#[cfg(feature = "middleware")]
pub mod middleware;
pub mod render;
#[cfg(feature = "server")]
pub mod server;
pub mod validation;

// Re-export the types most applications touch
pub use trellis_apps::{Application, ConfigurationComponent, Configurator, Phase};
pub use trellis_conf::Blueprint;
pub use trellis_controllers::{
	CallArgs, ControllerNode, ExposeSpec, ExposedMethod, HookName, Reply, RequestContext,
};
pub use trellis_core::{Error, Position, Result};
pub use trellis_http::{Handler, Request, Response};

#[cfg(feature = "server")]
pub use trellis_server::HttpServer;

#[cfg(feature = "test")]
pub use trellis_test::{TestApp, TestResponse};

// Re-export common external dependencies
pub use async_trait::async_trait;
pub use serde_json;

pub mod prelude {
	pub use crate::{
		Application, Blueprint, CallArgs, ConfigurationComponent, Configurator, ControllerNode,
		Error, ExposeSpec, ExposedMethod, Handler, HookName, Phase, Position, Reply, Request,
		RequestContext, Response, Result,
	};

	pub use async_trait::async_trait;

	#[cfg(feature = "server")]
	pub use crate::HttpServer;

	#[cfg(feature = "test")]
	pub use crate::{TestApp, TestResponse};
}
