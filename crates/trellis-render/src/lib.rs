//! # trellis-render
//!
//! Rendering engines for trellis.
//!
//! An engine turns the value returned by a controller method into a response
//! body. Engines are built by a [`RendererFactory`] once the configuration is
//! ready, and looked up by name through the [`RenderingRegistry`].
//!
//! ## Shipped engines
//!
//! | Name | Content type | Framework variables |
//! |------|--------------|---------------------|
//! | `json` | `application/json` | no |
//! | `jsonp` | `application/javascript` | no |
//! | `tera` | `text/html` | yes |

pub mod engine;
pub mod json;
pub mod jsonp;
pub mod registry;
pub mod tera_renderer;

pub use engine::{EngineSpec, RenderCall, RendererFactory, RenderingEngine};
pub use json::{JsonFactory, JsonRenderer};
pub use jsonp::{JsonpFactory, JsonpRenderer};
pub use registry::{RegisteredEngine, RenderingRegistry};
pub use tera_renderer::{TeraFactory, TeraRenderer};
