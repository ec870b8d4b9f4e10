//! Rendering engines and their registry.

pub use trellis_render::*;
