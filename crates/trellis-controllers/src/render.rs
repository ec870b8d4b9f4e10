//! Content negotiation and rendering of controller output.

use bytes::Bytes;
use http::header::CONTENT_TYPE;
use serde_json::{Map, Value, json};
use trellis_core::negotiation::with_charset;
use trellis_core::{AcceptHeader, Error, Result};
use trellis_http::Response;
use trellis_render::{RenderCall, RenderingRegistry};

use crate::context::RequestContext;
use crate::decoration::{Decoration, Exposition};
use crate::method::MethodId;
use crate::reply::Reply;

fn essence(content_type: &str) -> &str {
	content_type.split(';').next().unwrap_or("").trim()
}

/// Picks the exposition used for this request.
///
/// A custom format selected on the request wins, then an explicitly set
/// content type, then the type hinted by the URL extension, then the best
/// `Accept` match, with ties going to the content type sorting last. When
/// nothing matches the first exposition is used.
pub fn negotiate(decoration: &Decoration, ctx: &RequestContext, method: &MethodId) -> Option<Exposition> {
	if let Some(format) = ctx.custom_format(method) {
		match decoration.custom_engines.get(format) {
			Some(exposition) => return Some(exposition.clone()),
			None => tracing::warn!(method = %method, %format, "custom format not registered"),
		}
	}

	if let Some(content_type) = &ctx.content_type
		&& let Some(exposition) = find_by_type(decoration, essence(content_type))
	{
		return Some(exposition);
	}

	if let Some(response_type) = &ctx.response_type
		&& let Some(exposition) = find_by_type(decoration, response_type)
	{
		return Some(exposition);
	}

	if !decoration.engines.is_empty() {
		let mut offers: Vec<&str> = decoration.engines.keys().map(String::as_str).collect();
		offers.sort_unstable_by(|a, b| b.cmp(a));
		let accept = AcceptHeader::from_header(ctx.request.accept());
		if let Some(best) = accept.best_match(&offers) {
			return decoration.engines.get(best).cloned();
		}
	}

	decoration
		.engines
		.values()
		.next()
		.or_else(|| decoration.custom_engines.values().next())
		.cloned()
}

fn find_by_type(decoration: &Decoration, content_type: &str) -> Option<Exposition> {
	decoration
		.engines
		.iter()
		.find(|(key, _)| essence(key) == content_type)
		.map(|(_, exposition)| exposition)
		.or_else(|| {
			decoration
				.custom_engines
				.values()
				.find(|e| essence(&e.content_type) == content_type)
		})
		.cloned()
}

/// Framework variables merged into the namespace of engines using them.
pub fn framework_vars(ctx: &mut RequestContext) -> Map<String, Value> {
	let flashes = ctx.pop_flashes();
	let request = &ctx.request;
	let mut vars = Map::new();
	vars.insert(
		"tg".to_string(),
		json!({
			"errors": ctx.validation.errors,
			"inputs": ctx.validation.values,
			"flash": flashes,
			"identity": ctx.identity,
			"locale": ctx.locale.primary(),
			"debug": ctx.config.bool_or("debug", false),
			"script_name": request.script_name,
			"request": {
				"method": request.method.as_str(),
				"path": request.path(),
				"url": request.url(),
				"params": ctx.params,
			},
		}),
	);
	vars.insert("tmpl_context".to_string(), ctx.tmpl_context.to_value());
	vars
}

/// Turns the method output into a response.
///
/// # Errors
///
/// [`Error::Render`] when structured output has no engine to go through, or
/// the engine fails.
pub fn render(
	ctx: &mut RequestContext,
	renderers: &RenderingRegistry,
	method: &MethodId,
	exposition: Option<&Exposition>,
	output: Reply,
) -> Result<Response> {
	let content_type = ctx
		.content_type
		.clone()
		.or_else(|| exposition.map(|e| e.content_type.clone()))
		.unwrap_or_else(|| "text/html".to_string());

	let body = match output {
		Reply::Response(response) => return Ok(response),
		Reply::Bytes(bytes) => bytes,
		Reply::Value(Value::Null) => Bytes::new(),
		Reply::Value(Value::String(text)) => Bytes::from(text),
		Reply::Value(scalar @ (Value::Bool(_) | Value::Number(_))) => Bytes::from(scalar.to_string()),
		Reply::Value(data) => Bytes::from(render_data(ctx, renderers, method, exposition, data)?),
	};

	let mut response = Response::new(ctx.status).with_body(body);
	response.headers = ctx.headers.clone();
	if !response.headers.contains_key(CONTENT_TYPE) {
		response.set_header(CONTENT_TYPE.as_str(), &with_charset(&content_type));
	}
	Ok(response)
}

fn render_data(
	ctx: &mut RequestContext,
	renderers: &RenderingRegistry,
	method: &MethodId,
	exposition: Option<&Exposition>,
	mut data: Value,
) -> Result<String> {
	let exposition = exposition.ok_or_else(|| {
		Error::Render(format!("{method} returned structured data but has no exposition"))
	})?;

	let mut engine_name = exposition.engine.clone();
	let mut template = exposition.template.clone();
	if let Some(override_) = ctx.template_override(method) {
		match override_.split_once(':') {
			Some((engine, name)) => {
				engine_name = Some(engine.to_string());
				template = Some(name.to_string());
			}
			None => template = Some(override_.to_string()),
		}
	}

	let engine_name = engine_name.ok_or_else(|| {
		Error::Render(format!("{method} returned structured data to a raw exposition"))
	})?;
	let engine = renderers
		.get(&engine_name)
		.ok_or_else(|| Error::Render(format!("rendering engine {engine_name} is not available")))?;

	if let Value::Object(map) = &mut data {
		for name in &exposition.exclude_names {
			map.remove(name);
		}
		if engine.with_tg_vars {
			let mut namespace = framework_vars(ctx);
			for (key, value) in std::mem::take(map) {
				namespace.insert(key, value);
			}
			*map = namespace;
		}
	}

	tracing::debug!(%method, engine = %engine_name, template = ?template, "rendering");
	let mut call = RenderCall::data(&data)
		.with_options(&exposition.render_params)
		.with_params(&ctx.params)
		.with_script_name(&ctx.request.script_name);
	if let Some(template) = &template {
		call = call.with_template(template);
	}
	engine.engine.render(&call)
}

/// The 412 response listing validation errors.
pub fn validation_errors_response(ctx: &RequestContext) -> Result<Response> {
	let body = json!({
		"errors": ctx.validation.errors,
		"values": ctx.validation.values,
	});
	Response::new(http::StatusCode::PRECONDITION_FAILED).with_json(&body)
}

#[cfg(test)]
mod tests {
	use super::*;
	use indexmap::IndexMap;
	use rstest::{fixture, rstest};
	use std::sync::Arc;
	use trellis_conf::Blueprint;
	use trellis_http::Request;
	use trellis_render::TeraFactory;

	fn exposition(content_type: &str, engine: Option<&str>, template: Option<&str>) -> Exposition {
		Exposition {
			content_type: content_type.to_string(),
			engine: engine.map(str::to_string),
			template: template.map(str::to_string),
			exclude_names: Vec::new(),
			render_params: Map::new(),
		}
	}

	fn decoration() -> Decoration {
		let mut engines = IndexMap::new();
		engines.insert(
			"application/json".to_string(),
			exposition("application/json", Some("json"), None),
		);
		engines.insert(
			"text/html".to_string(),
			exposition("text/html", Some("tera"), Some("page.html")),
		);
		let mut custom_engines = IndexMap::new();
		custom_engines.insert("xml".to_string(), exposition("text/xml", Some("tera"), Some("page.xml")));
		Decoration {
			engines,
			custom_engines,
			..Decoration::default()
		}
	}

	fn context(accept: Option<&str>) -> RequestContext {
		let mut builder = Request::builder().uri("/page");
		if let Some(accept) = accept {
			builder = builder.header("accept", accept);
		}
		RequestContext::new(Arc::new(builder.build().unwrap()), Arc::new(Blueprint::new()))
	}

	#[fixture]
	fn renderers() -> RenderingRegistry {
		let registry = RenderingRegistry::new();
		registry.register_factory(Arc::new(trellis_render::JsonFactory));
		registry.register_factory(Arc::new(
			TeraFactory::new()
				.with_template("page.html", "<p>{{ title }} {{ tg.request.path | safe }}</p>")
				.with_template("page.xml", "<page>{{ title }}</page>")
				.with_template("other.html", "other {{ title }}"),
		));
		let config: Blueprint = [("renderers", json!(["json", "tera"]))].into_iter().collect();
		registry.setup(&config).unwrap();
		registry
	}

	#[rstest]
	#[case(None, "text/html")]
	#[case(Some("application/json"), "application/json")]
	#[case(Some("application/json, text/html"), "text/html")]
	#[case(Some("text/html;q=0.5, application/json"), "application/json")]
	#[case(Some("image/png"), "application/json")]
	fn test_accept_negotiation(#[case] accept: Option<&str>, #[case] expected: &str) {
		let ctx = context(accept);
		let picked = negotiate(&decoration(), &ctx, &MethodId::new("page")).unwrap();
		assert_eq!(picked.content_type, expected);
	}

	#[rstest]
	fn test_override_precedence() {
		let method = MethodId::new("page");
		let mut ctx = context(Some("application/json"));
		ctx.response_type = Some("text/xml".into());
		assert_eq!(negotiate(&decoration(), &ctx, &method).unwrap().content_type, "text/xml");

		ctx.set_content_type("text/html; charset=utf-8");
		assert_eq!(negotiate(&decoration(), &ctx, &method).unwrap().content_type, "text/html");

		ctx.use_custom_format_for(&method, "xml");
		let picked = negotiate(&decoration(), &ctx, &method).unwrap();
		assert_eq!(picked.template.as_deref(), Some("page.xml"));
	}

	#[rstest]
	fn test_render_with_framework_vars(renderers: RenderingRegistry) {
		let method = MethodId::new("page");
		let mut ctx = context(None);
		let decoration = decoration();
		let html = &decoration.engines["text/html"];
		let response = render(&mut ctx, &renderers, &method, Some(html), json!({"title": "Hi"}).into()).unwrap();
		assert_eq!(response.text(), "<p>Hi /page</p>");
		assert_eq!(response.content_type(), Some("text/html; charset=utf-8"));
	}

	#[rstest]
	fn test_json_excludes_names_and_skips_vars(renderers: RenderingRegistry) {
		let method = MethodId::new("page");
		let mut ctx = context(None);
		let mut json_exposition = exposition("application/json", Some("json"), None);
		json_exposition.exclude_names.push("secret".into());
		let response = render(
			&mut ctx,
			&renderers,
			&method,
			Some(&json_exposition),
			json!({"a": 1, "secret": "x"}).into(),
		)
		.unwrap();
		assert_eq!(response.json::<Value>().unwrap(), json!({"a": 1}));
	}

	#[rstest]
	fn test_bare_list_rejected_by_json(renderers: RenderingRegistry) {
		let mut ctx = context(None);
		let json_exposition = exposition("application/json", Some("json"), None);
		let err = render(&mut ctx, &renderers, &MethodId::new("l"), Some(&json_exposition), json!([1, 2]).into())
			.unwrap_err();
		assert!(matches!(err, Error::Render(_)));
	}

	#[rstest]
	fn test_template_override(renderers: RenderingRegistry) {
		let method = MethodId::new("page");
		let mut ctx = context(None);
		ctx.override_template_for(&method, "tera:other.html");
		let decoration = decoration();
		let response = render(
			&mut ctx,
			&renderers,
			&method,
			Some(&decoration.engines["application/json"]),
			json!({"title": "T"}).into(),
		)
		.unwrap();
		assert_eq!(response.text(), "other T");
	}

	#[rstest]
	#[case(Reply::from("plain"), "plain")]
	#[case(Reply::Value(json!(42)), "42")]
	#[case(Reply::Value(Value::Null), "")]
	#[case(Reply::from(vec![104u8, 105]), "hi")]
	fn test_verbatim_outputs(renderers: RenderingRegistry, #[case] output: Reply, #[case] body: &str) {
		let mut ctx = context(None);
		ctx.set_status(http::StatusCode::CREATED);
		let response = render(&mut ctx, &renderers, &MethodId::new("raw"), None, output).unwrap();
		assert_eq!(response.text(), body);
		assert_eq!(response.status.as_u16(), 201);
	}

	#[rstest]
	fn test_structured_output_needs_exposition(renderers: RenderingRegistry) {
		let mut ctx = context(None);
		let err = render(&mut ctx, &renderers, &MethodId::new("m"), None, json!({"a": 1}).into()).unwrap_err();
		assert!(matches!(err, Error::Render(_)));
	}
}
