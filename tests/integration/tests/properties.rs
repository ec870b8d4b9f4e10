//! Ordering and lifecycle guarantees of assembled applications.

use async_trait::async_trait;
use parking_lot::Mutex;
use rstest::rstest;
use serde_json::{Value, json};
use serial_test::serial;
use std::sync::Arc;
use trellis_apps::Configurator;
use trellis_conf::Blueprint;
use trellis_controllers::{
	CallArgs, ExposedMethod, HookName, LifecycleHook, MethodFn, Reply, RequestContext, controller_hook,
	controller_wrapper,
};
use trellis_core::{Position, Result};
use trellis_http::{Handler, Request, Response};
use trellis_integration_tests::*;
use trellis_middleware::ApplicationWrapper;
use trellis_test::{TestApp, init_test_logging};

/// Appends its name to the `x-trail` header on the way out.
struct Trail(&'static str);

#[async_trait]
impl ApplicationWrapper for Trail {
	fn name(&self) -> &str {
		self.0
	}

	async fn process(&self, request: Request, next: Arc<dyn Handler>) -> Result<Response> {
		let response = next.handle(request).await?;
		let trail = match response.header("x-trail") {
			Some(inner) => format!("{inner},{}", self.0),
			None => self.0.to_string(),
		};
		Ok(response.with_header("x-trail", &trail))
	}
}

fn everything_enabled() -> Blueprint {
	[
		("errorpage.enabled", "true"),
		("trace_errors.enable", "true"),
		("trace_slowreqs.enable", "true"),
		("identity.enabled", "true"),
		("session.enabled", "true"),
		("i18n.enabled", "true"),
		("cache.enabled", "true"),
		("tm.enabled", "true"),
	]
	.into_iter()
	.collect()
}

#[rstest]
fn test_full_stack_wrapper_order() {
	let app = Configurator::full_stack()
		.make_app(hello_root(), Some(&everything_enabled()))
		.unwrap();
	assert_eq!(
		app.wrapper_names(),
		[
			"request_logging",
			"errorpage",
			"trace_errors",
			"trace_slowreqs",
			"identity",
			"session",
			"i18n",
			"cache",
			"tm",
		]
	);
}

#[rstest]
#[tokio::test]
async fn test_wrappers_nest_by_position() {
	let mut configurator = Configurator::minimal();
	configurator.register_wrapper(Arc::new(Trail("inner")), Position::Last);
	configurator.register_wrapper(Arc::new(Trail("outer")), Position::First);
	configurator.register_wrapper(Arc::new(Trail("middle")), Position::After("outer".into()));
	let app = TestApp::new(configurator.make_app(hello_root(), None).unwrap());

	let response = app.get("/").await.unwrap();
	assert_eq!(response.header("x-trail"), Some("inner,middle,outer"));
}

#[rstest]
#[tokio::test]
async fn test_application_hooks_run_before_method_hooks() {
	let fired = Arc::new(Mutex::new(Vec::<String>::new()));
	let record = |label: &'static str| {
		let fired = Arc::clone(&fired);
		controller_hook(move |_, event| {
			fired.lock().push(format!("{label}:{}", event.name().as_str()));
			Ok(())
		})
	};

	let mut configurator = Configurator::minimal();
	configurator.register_controller_hook(HookName::BeforeCall, record("app"));
	configurator.register_controller_hook(HookName::AfterRender, record("app"));
	let root = trellis_controllers::ControllerNode::new("Root").method(
		ExposedMethod::new("index", |_, _| Ok(Reply::from("ok")))
			.expose("")
			.hook(HookName::BeforeCall, record("method"))
			.hook(HookName::AfterRender, record("method")),
	);
	let app = TestApp::new(configurator.make_app(root, None).unwrap());
	app.get("/").await.unwrap().assert_status(200);

	assert_eq!(
		*fired.lock(),
		["app:before_call", "method:before_call", "app:after_render", "method:after_render"]
	);
}

#[rstest]
#[tokio::test]
async fn test_controller_wrappers_apply_to_every_method() {
	let mut configurator = Configurator::minimal();
	configurator.register_controller_wrapper(controller_wrapper(|next| {
		Arc::new(move |ctx: &mut RequestContext, func: &MethodFn, args: &CallArgs| {
			let mut reply = next(ctx, func, args)?;
			if let Some(object) = reply.as_object_mut() {
				object.insert("wrapped".into(), Value::Bool(true));
			}
			Ok(reply)
		})
	}));
	let app = TestApp::new(configurator.make_app(movies_root(), None).unwrap());

	for path in ["/movies", "/movies/3"] {
		let payload = app.get(path).await.unwrap().json::<Value>().unwrap();
		assert_eq!(payload["wrapped"], json!(true), "{path}");
	}
}

#[rstest]
fn test_milestones_are_reached_once() {
	let app = Configurator::minimal().make_app(hello_root(), None).unwrap();
	let milestones = app.milestones();
	assert!(milestones.all().iter().all(|m| m.is_reached()));

	let runs = Arc::new(Mutex::new(0));
	let counter = Arc::clone(&runs);
	milestones.app_ready.register(move || *counter.lock() += 1);
	assert_eq!(*runs.lock(), 1);

	milestones.app_ready.reach();
	assert_eq!(*runs.lock(), 1);
}

#[rstest]
#[serial(logging)]
fn test_lifecycle_hooks_in_registration_order() {
	init_test_logging();
	let events = Arc::new(Mutex::new(Vec::<&'static str>::new()));
	let push = |event: &'static str| -> LifecycleHook {
		let events = Arc::clone(&events);
		Arc::new(move || {
			events.lock().push(event);
			Ok(())
		})
	};

	let mut configurator = Configurator::minimal();
	configurator.on_startup(push("start db"));
	configurator.on_startup(push("start cache"));
	configurator.on_shutdown(push("stop cache"));
	configurator.on_shutdown(push("stop db"));

	let app = configurator.make_app(hello_root(), None).unwrap();
	assert_eq!(*events.lock(), ["start db", "start cache"]);

	app.shutdown().unwrap();
	app.shutdown().unwrap();
	assert_eq!(
		*events.lock(),
		["start db", "start cache", "stop cache", "stop db"]
	);
}

#[rstest]
#[tokio::test]
async fn test_bare_dispatch_core_skips_wrappers() {
	let mut configurator = Configurator::minimal();
	configurator.register_wrapper(Arc::new(Trail("outer")), Position::First);
	let app = Arc::new(configurator.make_app(hello_root(), None).unwrap());

	let core = TestApp::from_handler(app.dispatch_core().clone());
	let response = core.get("/").await.unwrap();
	assert_eq!(response.text(), "Hello World");
	assert_eq!(response.header("x-trail"), None);
}
