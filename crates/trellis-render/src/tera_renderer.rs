//! Tera-based template rendering.
//!
//! Templates come from the directories listed in `paths.templates` and from
//! raw templates registered on the [`TeraFactory`]. With
//! `auto_reload_templates` the template set is rebuilt on every render, which
//! picks up edits during development.
//!
//! A `url(path=..., params=...)` function is available in templates. It
//! prefixes the path with the mount point of the application serving the
//! current request.
//!
//! # Examples
//!
//! ```
//! use trellis_conf::Blueprint;
//! use trellis_render::{RenderCall, RendererFactory, TeraFactory};
//! use serde_json::json;
//!
//! let factory = TeraFactory::new().with_template("hello.html", "Hello {{ name }}");
//! let engines = factory.create(&Blueprint::new()).unwrap();
//!
//! let data = json!({"name": "Bob"});
//! let body = engines["tera"]
//!     .render(&RenderCall::data(&data).with_template("hello.html"))
//!     .unwrap();
//! assert_eq!(body, "Hello Bob");
//! ```

use indexmap::IndexMap;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tera::{Context, Tera};
use trellis_conf::Blueprint;
use trellis_core::{Error, Result};

use crate::engine::{EngineSpec, RenderCall, RendererFactory, RenderingEngine};

tokio::task_local! {
	static SCRIPT_NAME: String;
}

/// Joins the mount point, a path and an optional query.
///
/// # Examples
///
/// ```
/// use trellis_render::tera_renderer::build_url;
/// use serde_json::json;
///
/// let params = json!({"page": 2});
/// assert_eq!(build_url("/app", "/users", params.as_object()), "/app/users?page=2");
/// assert_eq!(build_url("", "users", None), "/users");
/// ```
pub fn build_url(script_name: &str, path: &str, params: Option<&serde_json::Map<String, Value>>) -> String {
	let mut url = String::from(script_name.trim_end_matches('/'));
	if !path.starts_with('/') {
		url.push('/');
	}
	url.push_str(path);
	if let Some(params) = params.filter(|p| !p.is_empty()) {
		let pairs: Vec<(String, String)> = params
			.iter()
			.map(|(key, value)| {
				let value = match value {
					Value::String(s) => s.clone(),
					other => other.to_string(),
				};
				(key.clone(), value)
			})
			.collect();
		if let Ok(query) = serde_urlencoded::to_string(pairs) {
			url.push('?');
			url.push_str(&query);
		}
	}
	url
}

fn url_function(args: &HashMap<String, Value>) -> tera::Result<Value> {
	let path = args
		.get("path")
		.and_then(Value::as_str)
		.ok_or_else(|| tera::Error::msg("url() requires a `path` argument"))?;
	let params = args.get("params").and_then(Value::as_object);
	let script_name = SCRIPT_NAME.try_with(Clone::clone).unwrap_or_default();
	Ok(Value::String(build_url(&script_name, path, params)))
}

fn collect_templates(root: &Path, dir: &Path, out: &mut Vec<(PathBuf, String)>) -> std::io::Result<()> {
	for entry in std::fs::read_dir(dir)? {
		let path = entry?.path();
		let hidden = path
			.file_name()
			.and_then(|n| n.to_str())
			.is_some_and(|n| n.starts_with('.'));
		if hidden {
			continue;
		}
		if path.is_dir() {
			collect_templates(root, &path, out)?;
		} else if let Ok(relative) = path.strip_prefix(root) {
			let name = relative
				.components()
				.map(|c| c.as_os_str().to_string_lossy().into_owned())
				.collect::<Vec<_>>()
				.join("/");
			out.push((path.clone(), name));
		}
	}
	Ok(())
}

fn describe(err: &tera::Error) -> String {
	let mut message = err.to_string();
	let mut source = std::error::Error::source(err);
	while let Some(cause) = source {
		message.push_str(": ");
		message.push_str(&cause.to_string());
		source = cause.source();
	}
	message
}

/// Renders Tera templates.
pub struct TeraRenderer {
	dirs: Vec<PathBuf>,
	raw: IndexMap<String, String>,
	auto_reload: bool,
	dotted_names: bool,
	cached: RwLock<Option<Arc<Tera>>>,
}

impl TeraRenderer {
	/// Loads the templates once so syntax errors surface at startup.
	pub fn new(dirs: Vec<PathBuf>, raw: IndexMap<String, String>) -> Result<Self> {
		let renderer = Self {
			dirs,
			raw,
			auto_reload: false,
			dotted_names: false,
			cached: RwLock::new(None),
		};
		let tera = renderer.build()?;
		*renderer.cached.write() = Some(Arc::new(tera));
		Ok(renderer)
	}

	pub fn auto_reload(mut self, enabled: bool) -> Self {
		self.auto_reload = enabled;
		self
	}

	pub fn dotted_names(mut self, enabled: bool) -> Self {
		self.dotted_names = enabled;
		self
	}

	/// Maps `pkg.templates.index` to `pkg/templates/index.html` when dotted
	/// template names are enabled. Names with a slash are left alone.
	pub fn resolve_name(&self, name: &str) -> String {
		if !self.dotted_names || name.contains('/') || self.raw.contains_key(name) {
			return name.to_string();
		}
		match name.rsplit_once('.') {
			Some((_, ext)) if matches!(ext, "html" | "htm" | "xml" | "txt") => name.to_string(),
			_ => format!("{}.html", name.replace('.', "/")),
		}
	}

	fn build(&self) -> Result<Tera> {
		let mut tera = Tera::default();
		let mut files = Vec::new();
		for dir in &self.dirs {
			if !dir.is_dir() {
				tracing::debug!(dir = %dir.display(), "skipping missing template directory");
				continue;
			}
			collect_templates(dir, dir, &mut files).map_err(|e| {
				Error::Configuration(format!("cannot read templates in {}: {e}", dir.display()))
			})?;
		}
		tracing::debug!(count = files.len() + self.raw.len(), "loading templates");
		tera.add_template_files(
			files
				.iter()
				.map(|(path, name)| (path.as_path(), Some(name.as_str())))
				.collect::<Vec<_>>(),
		)
		.map_err(|e| Error::Configuration(describe(&e)))?;
		tera.add_raw_templates(self.raw.iter().map(|(n, s)| (n.as_str(), s.as_str())))
			.map_err(|e| Error::Configuration(describe(&e)))?;
		tera.register_function("url", url_function);
		Ok(tera)
	}

	fn tera(&self) -> Result<Arc<Tera>> {
		if !self.auto_reload
			&& let Some(tera) = self.cached.read().as_ref()
		{
			return Ok(Arc::clone(tera));
		}
		let tera = Arc::new(self.build()?);
		*self.cached.write() = Some(Arc::clone(&tera));
		Ok(tera)
	}
}

impl RenderingEngine for TeraRenderer {
	fn render(&self, call: &RenderCall<'_>) -> Result<String> {
		let template = call
			.template
			.ok_or_else(|| Error::Render("the tera engine requires a template".to_string()))?;
		let name = self.resolve_name(template);
		let context = Context::from_value(call.data.clone())
			.map_err(|e| Error::Render(format!("{name}: {}", describe(&e))))?;
		let tera = self.tera()?;
		SCRIPT_NAME
			.sync_scope(call.script_name.to_string(), || tera.render(&name, &context))
			.map_err(|e| Error::Render(format!("{name}: {}", describe(&e))))
	}
}

/// Factory for the `tera` engine.
#[derive(Debug, Clone, Default)]
pub struct TeraFactory {
	raw: IndexMap<String, String>,
}

impl TeraFactory {
	pub fn new() -> Self {
		Self::default()
	}

	/// Registers a template from source.
	pub fn with_template(mut self, name: impl Into<String>, source: impl Into<String>) -> Self {
		self.raw.insert(name.into(), source.into());
		self
	}
}

impl RendererFactory for TeraFactory {
	fn engines(&self) -> Vec<EngineSpec> {
		vec![EngineSpec::new("tera", "text/html")]
	}

	fn create(&self, blueprint: &Blueprint) -> Result<IndexMap<String, Arc<dyn RenderingEngine>>> {
		let dirs = blueprint
			.get_list("paths.templates")
			.into_iter()
			.map(PathBuf::from)
			.collect();
		let renderer = TeraRenderer::new(dirs, self.raw.clone())?
			.auto_reload(blueprint.bool_or("auto_reload_templates", false))
			.dotted_names(blueprint.bool_or("use_dotted_templatenames", false));
		let mut engines: IndexMap<String, Arc<dyn RenderingEngine>> = IndexMap::new();
		engines.insert("tera".to_string(), Arc::new(renderer));
		Ok(engines)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;
	use serde_json::json;

	fn raw(templates: &[(&str, &str)]) -> IndexMap<String, String> {
		templates
			.iter()
			.map(|(n, s)| (n.to_string(), s.to_string()))
			.collect()
	}

	#[rstest]
	fn test_url_function_uses_script_name() {
		let renderer = TeraRenderer::new(
			Vec::new(),
			raw(&[("link.html", r#"{{ url(path="/users", params={"page": 2}) | safe }}"#)]),
		)
		.unwrap();
		let data = json!({});
		let body = renderer
			.render(
				&RenderCall::data(&data)
					.with_template("link.html")
					.with_script_name("/app"),
			)
			.unwrap();
		assert_eq!(body, "/app/users?page=2");
	}

	#[rstest]
	fn test_templates_from_directory() {
		let dir = tempfile::tempdir().unwrap();
		std::fs::create_dir(dir.path().join("pages")).unwrap();
		std::fs::write(dir.path().join("pages/about.html"), "About {{ who }}").unwrap();

		let mut blueprint = Blueprint::new();
		blueprint.set(
			"paths.templates",
			json!([dir.path().to_string_lossy(), "/does/not/exist"]),
		);
		let engines = TeraFactory::new().create(&blueprint).unwrap();
		let data = json!({"who": "us"});
		let body = engines["tera"]
			.render(&RenderCall::data(&data).with_template("pages/about.html"))
			.unwrap();
		assert_eq!(body, "About us");
	}

	#[rstest]
	fn test_auto_reload_picks_up_edits() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("page.html");
		std::fs::write(&path, "v1").unwrap();

		let renderer = TeraRenderer::new(vec![dir.path().to_path_buf()], IndexMap::new())
			.unwrap()
			.auto_reload(true);
		let data = json!({});
		let call = RenderCall::data(&data).with_template("page.html");
		assert_eq!(renderer.render(&call).unwrap(), "v1");

		std::fs::write(&path, "v2").unwrap();
		assert_eq!(renderer.render(&call).unwrap(), "v2");
	}

	#[rstest]
	#[case(false, "app.index", "app.index")]
	#[case(true, "app.templates.index", "app/templates/index.html")]
	#[case(true, "index.html", "index.html")]
	#[case(true, "app/index", "app/index")]
	fn test_resolve_name(#[case] dotted: bool, #[case] name: &str, #[case] expected: &str) {
		let renderer = TeraRenderer::new(Vec::new(), IndexMap::new())
			.unwrap()
			.dotted_names(dotted);
		assert_eq!(renderer.resolve_name(name), expected);
	}

	#[rstest]
	fn test_missing_template_is_render_error() {
		let renderer = TeraRenderer::new(Vec::new(), IndexMap::new()).unwrap();
		let data = json!({});
		let err = renderer
			.render(&RenderCall::data(&data).with_template("nope.html"))
			.unwrap_err();
		assert!(matches!(err, Error::Render(_)));

		let err = renderer.render(&RenderCall::data(&data)).unwrap_err();
		assert!(err.to_string().contains("requires a template"));
	}

	#[rstest]
	fn test_syntax_error_fails_at_creation() {
		let result = TeraRenderer::new(Vec::new(), raw(&[("bad.html", "{% if %}")]));
		assert!(matches!(result, Err(Error::Configuration(_))));
	}
}
