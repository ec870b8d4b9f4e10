//! HTTP/1 server adapter.

pub use trellis_server::*;
