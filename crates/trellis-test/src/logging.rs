//! Logging for tests.

use std::sync::Once;
use tracing_subscriber::EnvFilter;

static INIT: Once = Once::new();

/// Installs a fmt subscriber writing through the test harness, filtered by
/// `RUST_LOG` (default `debug`). Safe to call from every test.
///
/// # Examples
///
/// ```
/// use trellis_test::init_test_logging;
///
/// init_test_logging();
/// init_test_logging();
/// tracing::debug!("visible with --nocapture");
/// ```
pub fn init_test_logging() {
	INIT.call_once(|| {
		let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));
		let _ = tracing_subscriber::fmt()
			.with_env_filter(filter)
			.with_test_writer()
			.try_init();
	});
}
