//! The configuration components shipped with trellis.
//!
//! | Component | Id | Contributes |
//! |---|---|---|
//! | [`LoggingComponent`] | `logging` | tracing subscriber, `request_logging` wrapper |
//! | [`DispatchComponent`] | `dispatch` | `debug`, `disable_request_extensions`, `tg.strict_tmpl_context` |
//! | [`RenderingComponent`] | `rendering` | engines from `renderers`, the default renderer |
//! | [`ValidationComponent`] | `validation` | validators and failure types |
//! | [`ErrorPageComponent`] | `errorpage` | `errorpage` wrapper |
//! | [`ErrorReportingComponent`] | `error_reporting` | `trace_errors` and `trace_slowreqs` wrappers |
//! | [`IdentityComponent`] | `identity` | `identity` wrapper |
//! | [`SessionComponent`] | `session` | `session` wrapper |
//! | [`I18nComponent`] | `i18n` | `i18n` wrapper |
//! | [`CachingComponent`] | `caching` | `cache` wrapper |
//! | [`TransactionComponent`] | `tm` | `tm` wrapper |

mod dispatch;
mod logging;
mod rendering;
mod wrappers;

pub use dispatch::{DispatchComponent, ValidationComponent};
pub use logging::LoggingComponent;
pub use rendering::RenderingComponent;
pub use wrappers::{
	CachingComponent, ErrorPageComponent, ErrorReportingComponent, I18nComponent,
	IdentityComponent, SessionComponent, TransactionComponent,
};

use serde_json::Value;
use trellis_conf::{Coercer, Coercions};

fn coercions(entries: &[(&str, Coercer)]) -> Coercions {
	entries
		.iter()
		.map(|(key, coercer)| ((*key).to_string(), *coercer))
		.collect()
}

fn defaults(entries: Vec<(&str, Value)>) -> Vec<(String, Value)> {
	entries
		.into_iter()
		.map(|(key, value)| (key.to_string(), value))
		.collect()
}
