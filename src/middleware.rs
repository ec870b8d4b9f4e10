//! Application wrappers: transactions, sessions, caching, error pages, i18n,
//! identity and error reporting.

pub use trellis_middleware::*;
