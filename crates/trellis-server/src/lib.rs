//! # trellis-server
//!
//! Serves trellis applications over HTTP/1 with hyper.
//!
//! Each connection runs on its own tokio task. Request bodies are read in
//! full before the application is called, and the response is written in
//! one piece.

pub mod http;

pub use http::{HttpServer, ServerError, serve, shutdown_signal};
