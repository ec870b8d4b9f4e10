//! # trellis-apps
//!
//! Assembles trellis applications.
//!
//! A [`Configurator`] owns an ordered list of [`ConfigurationComponent`]s.
//! Components contribute defaults and coercions to the configuration,
//! register application wrappers when bound, and act at each [`Phase`] of
//! [`Configurator::make_app`], which returns an [`Application`]: the wrapper
//! chain around the dispatch core, ready to serve requests.
//!
//! ```
//! use trellis_apps::Configurator;
//! use trellis_conf::Blueprint;
//! use trellis_controllers::{ControllerNode, ExposedMethod, Reply};
//! use trellis_http::{Handler, Request};
//!
//! # tokio_test::block_on(async {
//! let root = ControllerNode::new("Root").method(
//!     ExposedMethod::new("data", |_, _| Ok(Reply::from(serde_json::json!({"ok": true})))).expose("json"),
//! );
//!
//! let conf: Blueprint = [("debug", "true"), ("session.enabled", "true")].into_iter().collect();
//! let app = Configurator::full_stack().make_app(root, Some(&conf)).unwrap();
//! assert_eq!(app.wrapper_names(), ["request_logging", "session"]);
//!
//! let response = app.handle(Request::builder().uri("/data").build().unwrap()).await.unwrap();
//! assert_eq!(response.text(), r#"{"ok":true}"#);
//! app.shutdown().unwrap();
//! # });
//! ```

pub mod application;
pub mod component;
pub mod components;
pub mod configurator;

pub use application::Application;
pub use component::{BuildContext, ConfigurationComponent, Phase};
pub use components::{
	CachingComponent, DispatchComponent, ErrorPageComponent, ErrorReportingComponent,
	I18nComponent, IdentityComponent, LoggingComponent, RenderingComponent, SessionComponent,
	TransactionComponent, ValidationComponent,
};
pub use configurator::Configurator;
