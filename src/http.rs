//! Requests, responses and the [`Handler`] trait.

pub use trellis_http::*;
