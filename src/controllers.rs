//! Controller trees, object dispatch and the request pipeline.

pub use trellis_controllers::*;
