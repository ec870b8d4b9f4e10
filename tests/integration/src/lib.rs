//! Sample controller trees shared by the integration tests.
//!
//! Each function builds the root of a small application exercising one area
//! of the framework end to end: dispatch, REST verbs, validation, pagination,
//! custom formats and transactions.

use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use trellis_apps::{Configurator, RenderingComponent, TransactionComponent};
use trellis_conf::Blueprint;
use trellis_controllers::{
	ControllerNode, ErrorHandler, ExposeSpec, ExposedMethod, Reply, ValidationIntent,
};
use trellis_core::{Error, Position};
use trellis_middleware::TransactionBackend;
use trellis_render::TeraFactory;
use trellis_validation::Fields;
use trellis_validation::fields::{Int, Str};

/// `index` says hello, `hello/<name>` greets in JSON.
pub fn hello_root() -> ControllerNode {
	ControllerNode::new("Root")
		.method(ExposedMethod::new("index", |_, _| Ok(Reply::from("Hello World"))).expose(""))
		.method(
			ExposedMethod::new("hello", |_, args| {
				Ok(Reply::from(json!({"greeting": format!("Hello {}", args.require_str("name")?)})))
			})
			.expose("json")
			.arg("name"),
		)
}

/// A REST controller mounted at `/movies`.
pub fn movies_root() -> ControllerNode {
	let movies = ControllerNode::rest("Movies")
		.method(
			ExposedMethod::new("get_all", |_, _| Ok(Reply::from(json!({"movies": ["Alien", "Heat"]}))))
				.expose("json"),
		)
		.method(
			ExposedMethod::new("get_one", |_, args| {
				Ok(Reply::from(json!({"movie": args.require_str("movie_id")?})))
			})
			.expose("json")
			.arg("movie_id"),
		)
		.method(
			ExposedMethod::new("put", |_, args| {
				Ok(Reply::from(json!({"updated": args.require_str("movie_id")?})))
			})
			.expose("json")
			.arg("movie_id"),
		)
		.method(
			ExposedMethod::new("post_delete", |_, args| {
				Ok(Reply::from(json!({"deleted": args.require_str("movie_id")?})))
			})
			.expose("json")
			.arg("movie_id"),
		);
	ControllerNode::new("Root").child("movies", movies)
}

/// `add` validates `a` as an integer and hands failures to `add_failed`.
pub fn validated_root() -> ControllerNode {
	let failed = Arc::new(
		ExposedMethod::new("add_failed", |ctx, args| {
			Ok(Reply::from(json!({
				"submitted": args.named.clone(),
				"errors": ctx.validation.errors.clone(),
			})))
		})
		.expose("json"),
	);
	let schema = Fields::new().field("a", Int::new()).field("b", Str::new());
	ControllerNode::new("Root").method(
		ExposedMethod::new("add", |_, args| {
			Ok(Reply::from(json!({"a": args.get("a").cloned(), "b": args.get("b").cloned()})))
		})
		.expose("json")
		.validate_with(ValidationIntent::new(schema).error_handler(ErrorHandler::Method(failed))),
	)
}

/// `list` returns 42 numbers, ten per page.
pub fn paginated_root() -> ControllerNode {
	ControllerNode::new("Root").method(
		ExposedMethod::new("list", |_, _| Ok(Reply::from(json!({"items": (1..=42).collect::<Vec<_>>()}))))
			.expose("json")
			.paginate("items", 10),
	)
}

/// `feed` renders HTML, or XML through a custom format when requested as
/// `feed.xml`.
pub fn feed_root() -> ControllerNode {
	ControllerNode::new("Root").method(
		ExposedMethod::new("feed", |ctx, _| {
			if ctx.response_type.as_deref() == Some("text/xml") {
				ctx.use_custom_format("xml");
			}
			Ok(Reply::from(json!({"entries": ["first", "second"]})))
		})
		.expose_with(ExposeSpec::new("tera:feed.html").content_type("text/html"))
		.expose_with(
			ExposeSpec::new("tera:feed.xml")
				.content_type("text/xml")
				.custom_format("xml"),
		),
	)
}

/// A minimal configurator able to render the templates of [`feed_root`].
pub fn feed_configurator() -> Configurator {
	let templates = TeraFactory::new()
		.with_template(
			"feed.html",
			"<ul>{% for entry in entries %}<li>{{ entry }}</li>{% endfor %}</ul>",
		)
		.with_template(
			"feed.xml",
			"<feed>{% for entry in entries %}<entry>{{ entry }}</entry>{% endfor %}</feed>",
		);
	let mut configurator = Configurator::minimal();
	configurator.register(
		RenderingComponent::new().factory(Arc::new(templates)),
		Position::Middle,
	);
	configurator.set("renderers", json!(["json", "tera"]));
	configurator.set("default_renderer", "tera");
	configurator
}

/// `flaky` fails with a transient error until its `failures` are used up.
pub fn flaky_root(calls: Arc<AtomicUsize>, failures: usize) -> ControllerNode {
	ControllerNode::new("Root").method(
		ExposedMethod::new("flaky", move |_, _| {
			let call = calls.fetch_add(1, Ordering::SeqCst) + 1;
			if call <= failures {
				return Err(Error::Transient(format!("deadlock on call {call}")));
			}
			Ok(Reply::from(format!("done after {call} calls")))
		})
		.expose(""),
	)
}

/// A minimal configurator whose transactions go through `backend`, retried
/// up to `attempts` times.
pub fn transactional(backend: Arc<dyn TransactionBackend>, attempts: i64) -> (Configurator, Blueprint) {
	let mut configurator = Configurator::minimal();
	configurator.register(TransactionComponent::with_backend(backend), Position::Last);
	let conf: Blueprint = [("tm.enabled", json!(true)), ("tm.attempts", json!(attempts))]
		.into_iter()
		.collect();
	(configurator, conf)
}
