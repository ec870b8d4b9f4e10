//! # trellis-controllers
//!
//! Controllers, dispatch and the controller pipeline.
//!
//! A tree of [`ControllerNode`]s maps URL segments to sub-controllers and
//! [`ExposedMethod`]s. Each exposed method records decoration requests
//! (`expose`, `validate`, `require`, hooks, wrappers, pagination) which the
//! [`DecorationRegistry`] turns into a [`Decoration`] once the rendering
//! engines are ready. For each request the [`Dispatcher`] resolves a method
//! and the [`Pipeline`] runs it: hooks, validation, the wrapped call, content
//! negotiation and rendering.
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use trellis_conf::Blueprint;
//! use trellis_controllers::{
//!     ControllerNode, DecorationRegistry, DispatchCore, Dispatcher, ExposedMethod, HookNamespace,
//!     Pipeline, Reply,
//! };
//! use trellis_core::Milestone;
//! use trellis_http::{Handler, Request};
//! use trellis_render::RenderingRegistry;
//! use trellis_validation::ValidatorRegistry;
//!
//! # tokio_test::block_on(async {
//! let root = ControllerNode::new("Root").child(
//!     "sub",
//!     ControllerNode::new("Sub").method(
//!         ExposedMethod::new("hello", |_, args| Ok(Reply::from(format!("Hello {}", args.require_str("name")?))))
//!             .expose("")
//!             .arg("name"),
//!     ),
//! );
//!
//! let renderers = RenderingRegistry::with_defaults();
//! renderers.setup(&Blueprint::new()).unwrap();
//! let ready = Arc::new(Milestone::new("renderers_ready"));
//! ready.reach();
//! let decorations = DecorationRegistry::new(Arc::new(renderers), ready);
//! let pipeline = Pipeline::new(
//!     decorations.clone(),
//!     Arc::new(ValidatorRegistry::with_defaults()),
//!     Arc::new(HookNamespace::new()),
//! );
//! let core = DispatchCore::new(Dispatcher::new(Arc::new(root), decorations), pipeline, Arc::new(Blueprint::new()));
//!
//! let request = Request::builder().uri("/sub/hello/Bob").build().unwrap();
//! let response = core.handle(request).await.unwrap();
//! assert_eq!(response.text(), "Hello Bob");
//! # });
//! ```

pub mod context;
pub mod controller;
pub mod decoration;
pub mod dispatch;
pub mod dispatch_core;
pub mod helpers;
pub mod hooks;
pub mod method;
pub mod paginate;
pub mod pipeline;
pub mod predicates;
pub mod render;
pub mod reply;
pub mod signature;

pub use context::{
	Flash, RequestContext, RequestSnapshot, TmplContext, ValidationRecord, ValidationStatus,
	current_config, current_request, with_request_scope,
};
pub use controller::{ControllerKind, ControllerNode, LookupFn, LookupResult};
pub use decoration::{Decoration, DecorationRegistry, Exposition};
pub use dispatch::{DispatchTarget, Dispatcher, PathInfo, RoutingState, split_path};
pub use dispatch_core::DispatchCore;
pub use helpers::{LazyUrl, abort, abort_handler, redirect, url};
pub use hooks::{
	ControllerEvent, ControllerHook, HookName, HookNamespace, LifecycleHook, NamedHook,
	controller_hook,
};
pub use method::{
	ControllerCaller, ControllerWrapper, DecorationOp, ErrorHandler, ExposeSpec, ExposedMethod,
	MethodFn, MethodId, ValidateInContext, ValidationIntent, base_caller, controller_wrapper,
};
pub use paginate::{Page, PageLinks, PaginateSpec};
pub use pipeline::Pipeline;
pub use predicates::{All, Any, HasPermission, InGroup, IsUser, NotAnonymous, Not, Predicate};
pub use reply::Reply;
pub use signature::{Arg, CallArgs, Signature};
