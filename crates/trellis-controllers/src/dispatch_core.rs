//! The innermost handler: dispatch followed by the controller pipeline.

use async_trait::async_trait;
use std::sync::Arc;
use trellis_conf::Blueprint;
use trellis_core::{Error, Result};
use trellis_http::{Handler, Request, Response, SkipErrorPage};

use crate::context::{RequestContext, with_request_scope};
use crate::dispatch::Dispatcher;
use crate::pipeline::Pipeline;

/// Resolves and runs the controller method of each request.
///
/// HTTP outcomes (not found, aborts, authorization failures) become
/// responses here. Application failures are returned to the wrappers.
#[derive(Debug, Clone)]
pub struct DispatchCore {
	dispatcher: Dispatcher,
	pipeline: Pipeline,
	config: Arc<Blueprint>,
}

impl DispatchCore {
	pub fn new(dispatcher: Dispatcher, pipeline: Pipeline, config: Arc<Blueprint>) -> Self {
		Self {
			dispatcher,
			pipeline,
			config,
		}
	}

	pub fn dispatcher(&self) -> &Dispatcher {
		&self.dispatcher
	}

	pub fn pipeline(&self) -> &Pipeline {
		&self.pipeline
	}

	/// Runs dispatch and the pipeline for one request, synchronously.
	pub fn process(&self, request: Request) -> Result<Response> {
		let mut ctx = RequestContext::new(Arc::new(request), Arc::clone(&self.config));
		with_request_scope(ctx.snapshot(), || {
			let target = self.dispatcher.dispatch(&mut ctx)?;
			self.pipeline.call(&mut ctx, &target.method, &target.remainder)
		})
	}
}

#[async_trait]
impl Handler for DispatchCore {
	async fn handle(&self, request: Request) -> Result<Response> {
		let extensions = request.extensions.clone();
		match self.process(request) {
			Ok(response) => Ok(response),
			Err(err) if err.is_http() => {
				if let Error::Http(http) = &err
					&& http.passthrough
				{
					extensions.insert(SkipErrorPage);
				}
				tracing::debug!(status = %err.status_code(), error = %err, "request answered with an HTTP error");
				Ok(Response::from_error(&err, self.config.bool_or("debug", false)))
			}
			Err(err) => Err(err),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::controller::ControllerNode;
	use crate::decoration::DecorationRegistry;
	use crate::hooks::HookNamespace;
	use crate::context::ValidationRecord;
	use crate::method::{ErrorHandler, ExposedMethod, ValidationIntent};
	use crate::reply::Reply;
	use http::StatusCode;
	use rstest::{fixture, rstest};
	use serde_json::json;
	use trellis_core::{Error, Milestone};
	use trellis_render::RenderingRegistry;
	use trellis_validation::fields::Int;
	use trellis_validation::{Fields, ValidatorRegistry};

	#[fixture]
	fn core() -> DispatchCore {
		let renderers = RenderingRegistry::with_defaults();
		renderers.setup(&Blueprint::new()).unwrap();
		let milestone = Arc::new(Milestone::new("renderers_ready"));
		milestone.reach();
		let decorations = DecorationRegistry::new(Arc::new(renderers), milestone);
		let root = ControllerNode::new("Root")
			.method(ExposedMethod::new("index", |_, _| Ok(Reply::from("home"))).expose(""))
			.method(
				ExposedMethod::new("where", |_, _| {
					let request = crate::context::current_request().ok_or_else(|| Error::Internal("no request".into()))?;
					Ok(Reply::from(request.path().to_string()))
				})
				.expose(""),
			)
			.method(ExposedMethod::new("boom", |_, _| Err(Error::Internal("boom".into()))).expose(""))
			.method(
				ExposedMethod::new("raw", |_, _| {
					Err(Error::Http(
						trellis_core::HttpError::new(StatusCode::FORBIDDEN).with_passthrough(true),
					))
				})
				.expose(""),
			)
			.method(
				ExposedMethod::new("add", |_, args| Ok(Reply::from(serde_json::Value::Object(args.named.clone()))))
					.expose("json")
					.validate_with(
						ValidationIntent::new(Fields::new().field("a", Int::new()))
							.error_handler(ErrorHandler::ValidationErrorsResponse),
					),
			)
			.child(
				"blog",
				ControllerNode::new("Blog").lookup(|_, remainder| {
					let Some((slug, rest)) = remainder.split_first() else {
						return Ok(None);
					};
					let post = ControllerNode::new(format!("Post[{slug}]"))
						.method(ExposedMethod::new("index", |_, _| Ok(Reply::from("post"))).expose(""));
					Ok(Some((Arc::new(post), rest.to_vec())))
				}),
			);
		let pipeline = Pipeline::new(
			decorations.clone(),
			Arc::new(ValidatorRegistry::with_defaults()),
			Arc::new(HookNamespace::new()),
		);
		let root = Arc::new(root);
		for method in root.all_methods() {
			decorations.register_method(&method);
		}
		DispatchCore::new(Dispatcher::new(root, decorations), pipeline, Arc::new(Blueprint::new()))
	}

	fn get(uri: &str) -> Request {
		Request::builder().uri(uri).build().unwrap()
	}

	#[rstest]
	#[tokio::test]
	async fn test_serves_index(core: DispatchCore) {
		let response = core.handle(get("/")).await.unwrap();
		assert_eq!(response.text(), "home");
	}

	#[rstest]
	#[tokio::test]
	async fn test_current_request_is_visible(core: DispatchCore) {
		let response = core.handle(get("/where")).await.unwrap();
		assert_eq!(response.text(), "/where");
	}

	#[rstest]
	#[tokio::test]
	async fn test_not_found_becomes_response(core: DispatchCore) {
		let response = core.handle(get("/missing")).await.unwrap();
		assert_eq!(response.status, StatusCode::NOT_FOUND);
	}

	#[rstest]
	#[tokio::test]
	async fn test_application_errors_propagate(core: DispatchCore) {
		let err = core.handle(get("/boom")).await.unwrap_err();
		assert!(matches!(err, Error::Internal(_)));
	}

	#[rstest]
	#[tokio::test]
	async fn test_passthrough_marks_request(core: DispatchCore) {
		let request = get("/raw");
		let extensions = request.extensions.clone();
		let response = core.handle(request).await.unwrap();
		assert_eq!(response.status, StatusCode::FORBIDDEN);
		assert!(extensions.contains::<SkipErrorPage>());

		let request = get("/missing");
		let extensions = request.extensions.clone();
		core.handle(request).await.unwrap();
		assert!(!extensions.contains::<SkipErrorPage>());
	}

	#[rstest]
	#[tokio::test]
	async fn test_lookup_requests_leave_decorations_untouched(core: DispatchCore) {
		let decorations = core.pipeline().decorations().clone();
		let registered = decorations.len();
		assert_eq!(registered, core.dispatcher().root().all_methods().len());

		for i in 0..50 {
			let response = core.handle(get(&format!("/blog/p{i}"))).await.unwrap();
			assert_eq!(response.status, StatusCode::OK);
			assert_eq!(response.text(), "post");
		}
		assert_eq!(decorations.len(), registered);
	}

	/// Reads the validation record after the inner handler, the way an
	/// application wrapper does.
	struct RecordReader {
		inner: DispatchCore,
	}

	impl RecordReader {
		async fn run(&self, uri: &str) -> (Response, Option<ValidationRecord>) {
			let request = get(uri);
			let extensions = request.extensions.clone();
			let response = self.inner.handle(request).await.unwrap();
			(response, extensions.get::<ValidationRecord>())
		}
	}

	#[rstest]
	#[tokio::test]
	async fn test_validation_record_reaches_wrappers(core: DispatchCore) {
		let reader = RecordReader { inner: core };

		let (response, record) = reader.run("/add?a=4").await;
		assert_eq!(response.status, StatusCode::OK);
		let record = record.unwrap();
		assert_eq!(record.values, json!({"a": 4}));
		assert!(record.errors.is_empty());
		assert_eq!(record.exception, None);

		let (response, record) = reader.run("/add?a=x").await;
		assert_eq!(response.status, StatusCode::PRECONDITION_FAILED);
		let record = record.unwrap();
		assert_eq!(record.values, json!({"a": "x"}));
		assert_eq!(record.errors["a"], "Please enter an integer value");
		assert!(record.exception.is_some());

		let (_, record) = reader.run("/").await;
		assert_eq!(record, Some(ValidationRecord::default()));
	}
}
