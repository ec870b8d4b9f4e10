//! The application wrappers shipped with trellis.

pub mod cache;
pub mod error_page;
pub mod i18n;
pub mod identity;
pub mod logging;
pub mod reporting;
pub mod session;
pub mod transaction;
