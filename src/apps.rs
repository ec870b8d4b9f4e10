//! Application assembly.
//!
//! See [`Configurator`] for building an [`Application`] out of a controller
//! tree and a configuration.

pub use trellis_apps::*;
