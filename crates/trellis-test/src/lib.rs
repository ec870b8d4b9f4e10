//! # trellis-test
//!
//! Testing utilities for trellis applications: an in-process client
//! ([`TestApp`]) returning [`TestResponse`]s, and [`init_test_logging`].

pub mod client;
pub mod logging;
pub mod response;

pub use client::TestApp;
pub use logging::init_test_logging;
pub use response::TestResponse;
