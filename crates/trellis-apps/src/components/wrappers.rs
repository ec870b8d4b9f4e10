//! Components registering the application wrappers of `trellis-middleware`.
//!
//! Each one contributes the defaults and coercions of its option group and a
//! wrapper factory returning nothing until the group is enabled.

use parking_lot::Mutex;
use serde_json::{Value, json};
use std::sync::Arc;
use trellis_conf::Coercions;
use trellis_conf::coerce::{coerce_bool, coerce_int, coerce_int_list, coerce_list};
use trellis_core::Position;
use trellis_middleware::{
	ApplicationWrapper, CacheWrapper, Catalogs, CommitVeto, ErrorPageWrapper, ErrorReporter,
	ErrorReportingWrapper, I18nWrapper, IdentityProvider, IdentityWrapper,
	MemoryTransactionBackend, SessionWrapper, SlowRequestsWrapper, TracingReporter,
	TransactionBackend, TransactionWrapper,
};

use super::{coercions, defaults};
use crate::component::ConfigurationComponent;
use crate::configurator::Configurator;

fn shared(wrapper: impl ApplicationWrapper + 'static) -> Arc<dyn ApplicationWrapper> {
	Arc::new(wrapper)
}

/// Serves error documents for `errorpage.status_codes`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ErrorPageComponent;

impl ConfigurationComponent for ErrorPageComponent {
	fn id(&self) -> &str {
		"errorpage"
	}

	fn defaults(&self) -> Vec<(String, Value)> {
		defaults(vec![
			("errorpage.enabled", json!(false)),
			("errorpage.status_codes", json!([403, 404])),
			("errorpage.path", json!("/error/document")),
		])
	}

	fn coercions(&self) -> Coercions {
		coercions(&[
			("errorpage.enabled", coerce_bool),
			("errorpage.status_codes", coerce_int_list),
			("errorpage.handle_exceptions", coerce_bool),
		])
	}

	fn on_bind(&self, configurator: &mut Configurator) {
		configurator.register_wrapper_factory(
			"errorpage",
			|config| Ok(ErrorPageWrapper::from_config(config).map(shared)),
			Position::First,
		);
	}
}

/// Reports uncaught errors (`trace_errors.*`) and slow requests
/// (`trace_slowreqs.*`) to a list of [`ErrorReporter`]s, by default a
/// [`TracingReporter`].
pub struct ErrorReportingComponent {
	reporters: Arc<Mutex<Vec<Arc<dyn ErrorReporter>>>>,
}

impl ErrorReportingComponent {
	pub fn new() -> Self {
		Self {
			reporters: Arc::new(Mutex::new(vec![Arc::new(TracingReporter) as Arc<dyn ErrorReporter>])),
		}
	}

	/// Replaces the reporters.
	pub fn reporters(self, reporters: Vec<Arc<dyn ErrorReporter>>) -> Self {
		*self.reporters.lock() = reporters;
		self
	}
}

impl Default for ErrorReportingComponent {
	fn default() -> Self {
		Self::new()
	}
}

impl ConfigurationComponent for ErrorReportingComponent {
	fn id(&self) -> &str {
		"error_reporting"
	}

	fn defaults(&self) -> Vec<(String, Value)> {
		defaults(vec![
			("trace_errors.enable", json!(false)),
			("trace_slowreqs.enable", json!(false)),
			("trace_slowreqs.interval", json!(25)),
			("trace_slowreqs.exclude", json!([])),
		])
	}

	fn coercions(&self) -> Coercions {
		coercions(&[
			("trace_errors.enable", coerce_bool),
			("trace_slowreqs.enable", coerce_bool),
			("trace_slowreqs.interval", coerce_int),
			("trace_slowreqs.exclude", coerce_list),
		])
	}

	fn on_bind(&self, configurator: &mut Configurator) {
		let reporters = Arc::clone(&self.reporters);
		configurator.register_wrapper_factory(
			"trace_errors",
			move |config| Ok(ErrorReportingWrapper::from_config(config, reporters.lock().clone()).map(shared)),
			Position::First,
		);
		let reporters = Arc::clone(&self.reporters);
		configurator.register_wrapper_factory(
			"trace_slowreqs",
			move |config| Ok(SlowRequestsWrapper::from_config(config, reporters.lock().clone()).map(shared)),
			Position::First,
		);
	}
}

/// Resolves the request identity, from `sa_auth.*` unless a provider is
/// given.
#[derive(Default)]
pub struct IdentityComponent {
	provider: Option<Arc<dyn IdentityProvider>>,
}

impl IdentityComponent {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_provider(provider: Arc<dyn IdentityProvider>) -> Self {
		Self {
			provider: Some(provider),
		}
	}
}

impl ConfigurationComponent for IdentityComponent {
	fn id(&self) -> &str {
		"identity"
	}

	fn defaults(&self) -> Vec<(String, Value)> {
		defaults(vec![("identity.enabled", json!(false))])
	}

	fn coercions(&self) -> Coercions {
		coercions(&[("identity.enabled", coerce_bool)])
	}

	fn on_bind(&self, configurator: &mut Configurator) {
		let provider = self.provider.clone();
		configurator.register_wrapper_factory(
			"identity",
			move |config| {
				let wrapper = match &provider {
					Some(provider) => config
						.bool_or("identity.enabled", false)
						.then(|| IdentityWrapper::new(Arc::clone(provider))),
					None => IdentityWrapper::from_config(config),
				};
				Ok(wrapper.map(shared))
			},
			Position::Middle,
		);
	}
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SessionComponent;

impl ConfigurationComponent for SessionComponent {
	fn id(&self) -> &str {
		"session"
	}

	fn defaults(&self) -> Vec<(String, Value)> {
		defaults(vec![
			("session.enabled", json!(false)),
			("session.key", json!("trellis.session")),
			("session.cookie_path", json!("/")),
		])
	}

	fn coercions(&self) -> Coercions {
		coercions(&[
			("session.enabled", coerce_bool),
			("session.auto", coerce_bool),
			("session.timeout", coerce_int),
		])
	}

	fn on_bind(&self, configurator: &mut Configurator) {
		configurator.register_wrapper_factory(
			"session",
			|config| Ok(SessionWrapper::from_config(config).map(shared)),
			Position::Middle,
		);
	}
}

/// Selects the request languages and translates through `catalogs`. Runs
/// inside the session wrapper so the session language is seen.
#[derive(Debug, Default)]
pub struct I18nComponent {
	catalogs: Catalogs,
}

impl I18nComponent {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_catalogs(catalogs: Catalogs) -> Self {
		Self { catalogs }
	}
}

impl ConfigurationComponent for I18nComponent {
	fn id(&self) -> &str {
		"i18n"
	}

	fn defaults(&self) -> Vec<(String, Value)> {
		defaults(vec![
			("i18n.enabled", json!(false)),
			("i18n.lang_session_key", json!("tg_lang")),
		])
	}

	fn coercions(&self) -> Coercions {
		coercions(&[("i18n.enabled", coerce_bool), ("i18n.languages", coerce_list)])
	}

	fn on_bind(&self, configurator: &mut Configurator) {
		let catalogs = self.catalogs.clone();
		configurator.register_wrapper_factory(
			"i18n",
			move |config| Ok(I18nWrapper::from_config(config, catalogs.clone()).map(shared)),
			Position::After("session".to_string()),
		);
	}
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CachingComponent;

impl ConfigurationComponent for CachingComponent {
	fn id(&self) -> &str {
		"caching"
	}

	fn defaults(&self) -> Vec<(String, Value)> {
		defaults(vec![("cache.enabled", json!(false))])
	}

	fn coercions(&self) -> Coercions {
		coercions(&[("cache.enabled", coerce_bool), ("cache.expire", coerce_int)])
	}

	fn on_bind(&self, configurator: &mut Configurator) {
		configurator.register_wrapper_factory(
			"cache",
			|config| Ok(CacheWrapper::from_config(config).map(shared)),
			Position::Middle,
		);
	}
}

/// Runs each request in a transaction of `backend`, innermost of all
/// wrappers.
pub struct TransactionComponent {
	backend: Arc<dyn TransactionBackend>,
	commit_veto: Option<CommitVeto>,
}

impl TransactionComponent {
	/// Uses a [`MemoryTransactionBackend`].
	pub fn new() -> Self {
		Self::with_backend(Arc::new(MemoryTransactionBackend::new()))
	}

	pub fn with_backend(backend: Arc<dyn TransactionBackend>) -> Self {
		Self {
			backend,
			commit_veto: None,
		}
	}

	pub fn commit_veto(mut self, veto: CommitVeto) -> Self {
		self.commit_veto = Some(veto);
		self
	}
}

impl Default for TransactionComponent {
	fn default() -> Self {
		Self::new()
	}
}

impl ConfigurationComponent for TransactionComponent {
	fn id(&self) -> &str {
		"tm"
	}

	fn defaults(&self) -> Vec<(String, Value)> {
		defaults(vec![("tm.enabled", json!(false)), ("tm.attempts", json!(1))])
	}

	fn coercions(&self) -> Coercions {
		coercions(&[("tm.enabled", coerce_bool), ("tm.attempts", coerce_int)])
	}

	fn on_bind(&self, configurator: &mut Configurator) {
		let backend = Arc::clone(&self.backend);
		let veto = self.commit_veto.clone();
		configurator.register_wrapper_factory(
			"tm",
			move |config| {
				let wrapper = TransactionWrapper::from_config(config, Arc::clone(&backend))
					.map(|wrapper| match &veto {
						Some(veto) => wrapper.commit_veto(Arc::clone(veto)),
						None => wrapper,
					});
				Ok(wrapper.map(shared))
			},
			Position::Last,
		);
	}
}
