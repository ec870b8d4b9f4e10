//! Error and slow-request reporting.
//!
//! Reporters receive an [`ErrorReport`] describing a failed or slow request.
//! The shipped [`TracingReporter`] writes it to the log; applications plug
//! their own (mail, issue trackers) through the [`ErrorReporter`] trait.

use async_trait::async_trait;
use chrono::Utc;
use std::future::Future;
use std::pin::pin;
use std::sync::Arc;
use std::time::Duration;
use trellis_conf::Blueprint;
use trellis_core::{Error, Result};
use trellis_http::{Handler, Request, Response};

use crate::wrapper::ApplicationWrapper;

/// What went wrong with a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportKind {
	Error,
	SlowRequest,
}

/// A request worth reporting.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorReport {
	pub kind: ReportKind,
	pub method: String,
	pub path: String,
	/// Status the client is going to see, unknown while a slow request
	/// is still running.
	pub status: Option<u16>,
	pub message: String,
	/// Messages of the error sources, outermost first.
	pub chain: Vec<String>,
	pub elapsed: Duration,
}

impl ErrorReport {
	fn for_request(kind: ReportKind, method: &str, path: &str) -> Self {
		Self {
			kind,
			method: method.to_string(),
			path: path.to_string(),
			status: None,
			message: String::new(),
			chain: Vec::new(),
			elapsed: Duration::ZERO,
		}
	}
}

/// Receives reports of failed and slow requests.
pub trait ErrorReporter: Send + Sync {
	fn report(&self, report: &ErrorReport);
}

/// Writes reports to the `tracing` log.
#[derive(Debug, Clone, Default)]
pub struct TracingReporter;

impl ErrorReporter for TracingReporter {
	fn report(&self, report: &ErrorReport) {
		match report.kind {
			ReportKind::Error => tracing::error!(
				method = %report.method,
				path = %report.path,
				status = ?report.status,
				chain = ?report.chain,
				"{}",
				report.message
			),
			ReportKind::SlowRequest => tracing::warn!(
				method = %report.method,
				path = %report.path,
				elapsed_ms = report.elapsed.as_millis() as u64,
				"{}",
				report.message
			),
		}
	}
}

fn error_chain(err: &Error) -> Vec<String> {
	let mut chain = Vec::new();
	let mut source = std::error::Error::source(err);
	while let Some(cause) = source {
		chain.push(cause.to_string());
		source = cause.source();
	}
	chain
}

/// Reports uncaught application errors, then lets them propagate.
///
/// Enabled by `trace_errors.enable`.
pub struct ErrorReportingWrapper {
	reporters: Vec<Arc<dyn ErrorReporter>>,
}

impl ErrorReportingWrapper {
	pub fn new(reporters: Vec<Arc<dyn ErrorReporter>>) -> Self {
		Self { reporters }
	}

	pub fn from_config(config: &Blueprint, reporters: Vec<Arc<dyn ErrorReporter>>) -> Option<Self> {
		config
			.bool_or("trace_errors.enable", false)
			.then(|| Self::new(reporters))
	}
}

#[async_trait]
impl ApplicationWrapper for ErrorReportingWrapper {
	fn name(&self) -> &str {
		"trace_errors"
	}

	async fn process(&self, request: Request, next: Arc<dyn Handler>) -> Result<Response> {
		let method = request.method.to_string();
		let path = request.path().to_string();
		let start = Utc::now();

		let result = next.handle(request).await;
		if let Err(err) = &result {
			let mut report = ErrorReport::for_request(ReportKind::Error, &method, &path);
			report.status = Some(err.status_code().as_u16());
			report.message = err.to_string();
			report.chain = error_chain(err);
			report.elapsed = Utc::now()
				.signed_duration_since(start)
				.to_std()
				.unwrap_or_default();
			for reporter in &self.reporters {
				reporter.report(&report);
			}
		}
		result
	}
}

/// Reports requests still running after an interval. The request itself
/// keeps running and completes normally.
///
/// Enabled by `trace_slowreqs.enable`; `trace_slowreqs.interval` is in
/// seconds (default 25) and paths starting with an entry of
/// `trace_slowreqs.exclude` are never reported.
pub struct SlowRequestsWrapper {
	interval: Duration,
	exclude: Vec<String>,
	reporters: Vec<Arc<dyn ErrorReporter>>,
}

impl SlowRequestsWrapper {
	pub fn new(interval: Duration, reporters: Vec<Arc<dyn ErrorReporter>>) -> Self {
		Self {
			interval,
			exclude: Vec::new(),
			reporters,
		}
	}

	pub fn exclude(mut self, prefix: impl Into<String>) -> Self {
		self.exclude.push(prefix.into());
		self
	}

	pub fn from_config(config: &Blueprint, reporters: Vec<Arc<dyn ErrorReporter>>) -> Option<Self> {
		if !config.bool_or("trace_slowreqs.enable", false) {
			return None;
		}
		let seconds = config.get_float("trace_slowreqs.interval").unwrap_or(25.0).max(0.0);
		let mut wrapper = Self::new(Duration::from_secs_f64(seconds), reporters);
		wrapper.exclude = config.get_list("trace_slowreqs.exclude");
		Some(wrapper)
	}

	async fn watch<F>(&self, method: &str, path: &str, request_future: F) -> Result<Response>
	where
		F: Future<Output = Result<Response>>,
	{
		let mut request_future = pin!(request_future);
		tokio::select! {
			result = &mut request_future => return result,
			() = tokio::time::sleep(self.interval) => {}
		}

		let mut report = ErrorReport::for_request(ReportKind::SlowRequest, method, path);
		report.message = format!("request still running after {:?}", self.interval);
		report.elapsed = self.interval;
		for reporter in &self.reporters {
			reporter.report(&report);
		}
		request_future.await
	}
}

#[async_trait]
impl ApplicationWrapper for SlowRequestsWrapper {
	fn name(&self) -> &str {
		"trace_slowreqs"
	}

	async fn process(&self, request: Request, next: Arc<dyn Handler>) -> Result<Response> {
		let method = request.method.to_string();
		let path = request.path().to_string();
		self.watch(&method, &path, next.handle(request)).await
	}

	fn should_continue(&self, request: &Request) -> bool {
		let path = request.path();
		!self.exclude.iter().any(|prefix| path.starts_with(prefix.as_str()))
	}
}
