//! # trellis-middleware
//!
//! Application wrappers: the layers between the server and the dispatch
//! core.
//!
//! Wrappers implement [`ApplicationWrapper`] and are ordered by a
//! [`WrapperRegistry`]. Each one usually reads its `*.enabled` switch from the
//! configuration and stays out of the chain when disabled.
//!
//! ## Available wrappers
//!
//! | Wrapper | Configuration | Provides |
//! |---|---|---|
//! | [`IdentityWrapper`] | `identity.*`, `sa_auth.*` | [`Identity`](trellis_http::Identity) |
//! | [`SessionWrapper`] | `session.*` | [`SessionHandle`](trellis_http::SessionHandle) |
//! | [`I18nWrapper`] | `i18n.*` | [`Locale`](trellis_http::Locale), [`TranslatorHandle`](trellis_http::TranslatorHandle) |
//! | [`CacheWrapper`] | `cache.*` | [`CacheHandle`](trellis_http::CacheHandle) |
//! | [`TransactionWrapper`] | `tm.*` | [`TransactionHandle`] |
//! | [`ErrorPageWrapper`] | `errorpage.*` | error page substitution |
//! | [`ErrorReportingWrapper`] | `trace_errors.*` | error reports |
//! | [`SlowRequestsWrapper`] | `trace_slowreqs.*` | slow request reports |
//! | [`RequestLoggingWrapper`] | | access log |

pub mod wrapper;
pub mod wrappers;

pub use wrapper::{ApplicationWrapper, WrapperChain, WrapperFactory, WrapperRegistry};
pub use wrappers::cache::{CacheWrapper, MemoryCache};
pub use wrappers::error_page::ErrorPageWrapper;
pub use wrappers::i18n::{CatalogTranslator, Catalogs, I18nWrapper};
pub use wrappers::identity::{IdentityProvider, IdentityWrapper, RemoteUserProvider};
pub use wrappers::logging::RequestLoggingWrapper;
pub use wrappers::reporting::{
	ErrorReport, ErrorReporter, ErrorReportingWrapper, ReportKind, SlowRequestsWrapper,
	TracingReporter,
};
pub use wrappers::session::{MemorySessionStore, SessionStore, SessionWrapper};
pub use wrappers::transaction::{
	CommitVeto, MemoryTransactionBackend, Transaction, TransactionBackend, TransactionHandle,
	TransactionStats, TransactionWrapper, header_commit_veto,
};
