//! Configuration blueprints and value coercion.

pub use trellis_conf::*;
