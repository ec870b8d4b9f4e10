//! Transaction management around the inner chain.
//!
//! Each attempt begins a transaction, exposes it to the application as a
//! [`TransactionHandle`] and runs the rest of the chain. The outcome decides:
//!
//! | Outcome | Action |
//! |---|---|
//! | transaction doomed | rollback |
//! | error response (status >= 400, except 403) | rollback |
//! | commit veto answers `true` | rollback |
//! | anything else | commit |
//! | error, retryable, attempts left | rollback, run again |
//! | error | rollback, propagate |
//!
//! Every attempt sees the request extensions as they were before the first
//! one. Entries left by the attempt that settles are copied back.

use async_trait::async_trait;
use http::StatusCode;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use trellis_conf::Blueprint;
use trellis_core::{Error, Result};
use trellis_http::{Handler, Request, Response};

use crate::wrapper::ApplicationWrapper;

/// A unit of work started by a [`TransactionBackend`].
pub trait Transaction: Send + Sync {
	fn commit(&self) -> Result<()>;

	fn rollback(&self) -> Result<()>;

	/// Marks the transaction so that it can only be rolled back.
	fn doom(&self);

	fn is_doomed(&self) -> bool;
}

/// Starts transactions and tells which failures are worth a retry.
pub trait TransactionBackend: Send + Sync {
	fn begin(&self) -> Result<Arc<dyn Transaction>>;

	fn is_retryable(&self, error: &Error) -> bool {
		matches!(error, Error::Transient(_))
	}
}

/// The transaction of the current attempt, stored in request extensions.
#[derive(Clone)]
pub struct TransactionHandle(pub Arc<dyn Transaction>);

/// Decides from the final request and response whether to roll back a
/// transaction that would otherwise commit.
pub type CommitVeto = Arc<dyn Fn(&Request, &Response) -> bool + Send + Sync>;

/// A veto rolling back when the response carries `x-tm` set to anything but
/// `commit`, the way an application signals "do not commit" from a
/// controller without failing the request.
pub fn header_commit_veto() -> CommitVeto {
	Arc::new(|_request: &Request, response: &Response| {
		response
			.header("x-tm")
			.is_some_and(|value| !value.eq_ignore_ascii_case("commit"))
	})
}

pub struct TransactionWrapper {
	backend: Arc<dyn TransactionBackend>,
	attempts: usize,
	commit_veto: Option<CommitVeto>,
}

impl TransactionWrapper {
	pub fn new(backend: Arc<dyn TransactionBackend>) -> Self {
		Self {
			backend,
			attempts: 1,
			commit_veto: None,
		}
	}

	pub fn attempts(mut self, attempts: usize) -> Self {
		self.attempts = attempts.max(1);
		self
	}

	pub fn commit_veto(mut self, veto: CommitVeto) -> Self {
		self.commit_veto = Some(veto);
		self
	}

	/// Reads `tm.attempts`. `None` unless `tm.enabled`.
	pub fn from_config(config: &Blueprint, backend: Arc<dyn TransactionBackend>) -> Option<Self> {
		if !config.bool_or("tm.enabled", false) {
			return None;
		}
		let attempts = usize::try_from(config.int_or("tm.attempts", 1)).unwrap_or(1);
		Some(Self::new(backend).attempts(attempts))
	}

	fn should_rollback(&self, transaction: &dyn Transaction, request: &Request, response: &Response) -> bool {
		if transaction.is_doomed() {
			return true;
		}
		let status = response.status;
		if status.as_u16() >= 400 && status != StatusCode::FORBIDDEN {
			return true;
		}
		self.commit_veto
			.as_ref()
			.is_some_and(|veto| veto(request, response))
	}
}

#[async_trait]
impl ApplicationWrapper for TransactionWrapper {
	fn name(&self) -> &str {
		"tm"
	}

	async fn process(&self, request: Request, next: Arc<dyn Handler>) -> Result<Response> {
		let mut attempt = 1;
		loop {
			let transaction = self.backend.begin()?;
			// Each attempt starts from the extensions the request came with.
			let mut attempt_request = request.clone();
			attempt_request.extensions = request.extensions.fork();
			let attempt_extensions = attempt_request.extensions.clone();
			attempt_extensions.insert(TransactionHandle(Arc::clone(&transaction)));

			match next.handle(attempt_request).await {
				Ok(response) => {
					attempt_extensions.remove::<TransactionHandle>();
					request.extensions.adopt(&attempt_extensions);
					if self.should_rollback(transaction.as_ref(), &request, &response) {
						tracing::debug!(status = %response.status, "rolling back transaction");
						transaction.rollback()?;
					} else {
						transaction.commit()?;
					}
					return Ok(response);
				}
				Err(err) => {
					if let Err(rollback_err) = transaction.rollback() {
						tracing::error!(error = %rollback_err, cause = %err, "transaction rollback failed");
						return Err(err);
					}
					if attempt < self.attempts && self.backend.is_retryable(&err) {
						tracing::info!(attempt, error = %err, "retrying request after a retryable error");
						attempt += 1;
						continue;
					}
					attempt_extensions.remove::<TransactionHandle>();
					request.extensions.adopt(&attempt_extensions);
					return Err(err);
				}
			}
		}
	}
}

/// Backend whose transactions only count what happens to them.
#[derive(Debug, Default)]
pub struct MemoryTransactionBackend {
	stats: Arc<TransactionStats>,
}

/// Counters shared by the transactions of a [`MemoryTransactionBackend`].
#[derive(Debug, Default)]
pub struct TransactionStats {
	pub begun: AtomicUsize,
	pub committed: AtomicUsize,
	pub rolled_back: AtomicUsize,
}

impl MemoryTransactionBackend {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn stats(&self) -> &TransactionStats {
		&self.stats
	}
}

impl TransactionBackend for MemoryTransactionBackend {
	fn begin(&self) -> Result<Arc<dyn Transaction>> {
		self.stats.begun.fetch_add(1, Ordering::SeqCst);
		Ok(Arc::new(MemoryTransaction {
			stats: Arc::clone(&self.stats),
			doomed: AtomicBool::new(false),
			finished: Mutex::new(false),
		}))
	}
}

#[derive(Debug)]
struct MemoryTransaction {
	stats: Arc<TransactionStats>,
	doomed: AtomicBool,
	finished: Mutex<bool>,
}

impl MemoryTransaction {
	fn finish(&self, counter: &AtomicUsize) -> Result<()> {
		let mut finished = self.finished.lock();
		if *finished {
			return Err(Error::Internal("transaction already finished".into()));
		}
		*finished = true;
		counter.fetch_add(1, Ordering::SeqCst);
		Ok(())
	}
}

impl Transaction for MemoryTransaction {
	fn commit(&self) -> Result<()> {
		if self.is_doomed() {
			return Err(Error::Internal("cannot commit a doomed transaction".into()));
		}
		self.finish(&self.stats.committed)
	}

	fn rollback(&self) -> Result<()> {
		self.finish(&self.stats.rolled_back)
	}

	fn doom(&self) {
		self.doomed.store(true, Ordering::SeqCst);
	}

	fn is_doomed(&self) -> bool {
		self.doomed.load(Ordering::SeqCst)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::{fixture, rstest};

	#[derive(Clone, Debug, PartialEq)]
	struct Scratch(usize);

	/// Behaves according to the request path.
	struct Scripted {
		calls: AtomicUsize,
	}

	#[async_trait]
	impl Handler for Scripted {
		async fn handle(&self, request: Request) -> Result<Response> {
			let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
			let TransactionHandle(transaction) = request
				.extensions
				.get::<TransactionHandle>()
				.ok_or_else(|| Error::Internal("no transaction".into()))?;
			match request.path() {
				"/missing" => Ok(Response::not_found()),
				"/forbidden" => Ok(Response::new(StatusCode::FORBIDDEN)),
				"/doom" => {
					transaction.doom();
					Ok(Response::ok())
				}
				"/vetoed" => Ok(Response::ok().with_header("x-tm", "abort")),
				"/flaky" if call < 3 => Err(Error::Transient("deadlock".into())),
				"/broken" => Err(Error::Internal("bug".into())),
				"/leaky" => {
					if request.extensions.contains::<Scratch>() {
						return Err(Error::Internal("state of a failed attempt".into()));
					}
					request.extensions.insert(Scratch(call));
					if call < 2 {
						Err(Error::Transient("deadlock".into()))
					} else {
						Ok(Response::ok())
					}
				}
				_ => Ok(Response::ok().with_body(format!("call {call}"))),
			}
		}
	}

	#[fixture]
	fn handler() -> Arc<Scripted> {
		Arc::new(Scripted {
			calls: AtomicUsize::new(0),
		})
	}

	fn get(uri: &str) -> Request {
		Request::builder().uri(uri).build().unwrap()
	}

	fn counts(backend: &MemoryTransactionBackend) -> (usize, usize, usize) {
		let stats = backend.stats();
		(
			stats.begun.load(Ordering::SeqCst),
			stats.committed.load(Ordering::SeqCst),
			stats.rolled_back.load(Ordering::SeqCst),
		)
	}

	#[rstest]
	#[case("/", (1, 1, 0))]
	#[case("/missing", (1, 0, 1))]
	#[case("/forbidden", (1, 1, 0))]
	#[case("/doom", (1, 0, 1))]
	#[case("/vetoed", (1, 0, 1))]
	#[tokio::test]
	async fn test_commit_or_rollback(
		handler: Arc<Scripted>,
		#[case] uri: &str,
		#[case] expected: (usize, usize, usize),
	) {
		let backend = Arc::new(MemoryTransactionBackend::new());
		let wrapper = TransactionWrapper::new(backend.clone()).commit_veto(header_commit_veto());
		wrapper.process(get(uri), handler).await.unwrap();
		assert_eq!(counts(&backend), expected);
	}

	#[rstest]
	#[tokio::test]
	async fn test_doomed_transaction_ignores_veto(handler: Arc<Scripted>) {
		let backend = Arc::new(MemoryTransactionBackend::new());
		let never_veto: CommitVeto = Arc::new(|_request: &Request, _response: &Response| false);
		let wrapper = TransactionWrapper::new(backend.clone()).commit_veto(never_veto);
		wrapper.process(get("/doom"), handler).await.unwrap();
		assert_eq!(counts(&backend), (1, 0, 1));
	}

	#[rstest]
	#[tokio::test]
	async fn test_retryable_errors_rerun_the_chain(handler: Arc<Scripted>) {
		let backend = Arc::new(MemoryTransactionBackend::new());
		let wrapper = TransactionWrapper::new(backend.clone()).attempts(3);
		let response = wrapper.process(get("/flaky"), handler).await.unwrap();
		assert_eq!(response.text(), "call 3");
		assert_eq!(counts(&backend), (3, 1, 2));
	}

	#[rstest]
	#[tokio::test]
	async fn test_attempts_exhausted(handler: Arc<Scripted>) {
		let backend = Arc::new(MemoryTransactionBackend::new());
		let wrapper = TransactionWrapper::new(backend.clone()).attempts(2);
		let err = wrapper.process(get("/flaky"), handler).await.unwrap_err();
		assert!(matches!(err, Error::Transient(_)));
		assert_eq!(counts(&backend), (2, 0, 2));
	}

	#[rstest]
	#[tokio::test]
	async fn test_other_errors_are_not_retried(handler: Arc<Scripted>) {
		let backend = Arc::new(MemoryTransactionBackend::new());
		let wrapper = TransactionWrapper::new(backend.clone()).attempts(5);
		let err = wrapper.process(get("/broken"), handler).await.unwrap_err();
		assert!(matches!(err, Error::Internal(_)));
		assert_eq!(counts(&backend), (1, 0, 1));
	}

	#[rstest]
	#[tokio::test]
	async fn test_attempts_start_from_clean_extensions(handler: Arc<Scripted>) {
		let backend = Arc::new(MemoryTransactionBackend::new());
		let wrapper = TransactionWrapper::new(backend.clone()).attempts(2);
		let request = get("/leaky");
		let extensions = request.extensions.clone();
		wrapper.process(request, handler).await.unwrap();
		assert_eq!(counts(&backend), (2, 1, 1));
		assert_eq!(extensions.get::<Scratch>(), Some(Scratch(2)));
		assert!(!extensions.contains::<TransactionHandle>());
	}

	struct BrokenRollback;

	impl Transaction for BrokenRollback {
		fn commit(&self) -> Result<()> {
			Ok(())
		}

		fn rollback(&self) -> Result<()> {
			Err(Error::Internal("connection lost".into()))
		}

		fn doom(&self) {}

		fn is_doomed(&self) -> bool {
			false
		}
	}

	struct BrokenRollbackBackend;

	impl TransactionBackend for BrokenRollbackBackend {
		fn begin(&self) -> Result<Arc<dyn Transaction>> {
			Ok(Arc::new(BrokenRollback))
		}
	}

	#[rstest]
	#[tokio::test]
	async fn test_failed_rollback_keeps_the_original_error(handler: Arc<Scripted>) {
		let wrapper = TransactionWrapper::new(Arc::new(BrokenRollbackBackend)).attempts(3);
		let err = wrapper.process(get("/flaky"), handler.clone()).await.unwrap_err();
		assert!(matches!(err, Error::Transient(ref message) if message == "deadlock"));
		assert_eq!(handler.calls.load(Ordering::SeqCst), 1);

		let err = wrapper.process(get("/broken"), handler).await.unwrap_err();
		assert!(matches!(err, Error::Internal(ref message) if message == "bug"));
	}

	#[rstest]
	fn test_from_config() {
		let backend: Arc<dyn TransactionBackend> = Arc::new(MemoryTransactionBackend::new());
		assert!(TransactionWrapper::from_config(&Blueprint::new(), Arc::clone(&backend)).is_none());

		let config: Blueprint = [("tm.enabled", "true"), ("tm.attempts", "3")].into_iter().collect();
		let wrapper = TransactionWrapper::from_config(&config, backend).unwrap();
		assert_eq!(wrapper.attempts, 3);
	}
}
