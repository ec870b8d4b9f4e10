//! The rendering registry.
//!
//! Factories are registered by engine name. When the configuration is ready,
//! [`RenderingRegistry::setup`] instantiates the engines listed in
//! `renderers`. The `json` engine is always enabled.

use indexmap::IndexMap;
use parking_lot::RwLock;
use std::sync::Arc;
use trellis_conf::Blueprint;
use trellis_core::Result;

use crate::engine::{RendererFactory, RenderingEngine};
use crate::json::JsonFactory;
use crate::jsonp::JsonpFactory;
use crate::tera_renderer::TeraFactory;

/// An instantiated engine with its registration metadata.
#[derive(Clone)]
pub struct RegisteredEngine {
	pub name: String,
	pub engine: Arc<dyn RenderingEngine>,
	pub content_type: String,
	/// Whether framework variables are merged into the namespace.
	pub with_tg_vars: bool,
}

impl std::fmt::Debug for RegisteredEngine {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("RegisteredEngine")
			.field("name", &self.name)
			.field("content_type", &self.content_type)
			.field("with_tg_vars", &self.with_tg_vars)
			.finish()
	}
}

/// Engines available to expositions, keyed by name.
#[derive(Default)]
pub struct RenderingRegistry {
	factories: RwLock<IndexMap<String, Arc<dyn RendererFactory>>>,
	engines: RwLock<IndexMap<String, RegisteredEngine>>,
}

impl RenderingRegistry {
	/// A registry without factories.
	pub fn new() -> Self {
		Self::default()
	}

	/// A registry knowing the `json`, `jsonp` and `tera` factories.
	///
	/// # Examples
	///
	/// ```
	/// use trellis_conf::Blueprint;
	/// use trellis_render::RenderingRegistry;
	///
	/// let registry = RenderingRegistry::with_defaults();
	/// registry.setup(&Blueprint::new()).unwrap();
	///
	/// assert!(registry.is_available("json"));
	/// assert!(!registry.is_available("tera"));
	/// assert_eq!(registry.content_type_for("json").as_deref(), Some("application/json"));
	/// ```
	pub fn with_defaults() -> Self {
		let registry = Self::new();
		registry.register_factory(Arc::new(JsonFactory));
		registry.register_factory(Arc::new(JsonpFactory));
		registry.register_factory(Arc::new(TeraFactory::new()));
		registry
	}

	/// Registers a factory for every engine it declares, replacing previous
	/// factories for the same names.
	pub fn register_factory(&self, factory: Arc<dyn RendererFactory>) {
		let mut factories = self.factories.write();
		for spec in factory.engines() {
			factories.insert(spec.name, Arc::clone(&factory));
		}
	}

	/// Whether a factory for `name` is registered.
	pub fn knows(&self, name: &str) -> bool {
		self.factories.read().contains_key(name)
	}

	/// Instantiates the engines listed in `renderers`.
	///
	/// Names without a factory are skipped with a warning.
	///
	/// # Errors
	///
	/// Fails when a factory cannot build its engines.
	pub fn setup(&self, blueprint: &Blueprint) -> Result<()> {
		let mut wanted = blueprint.get_list("renderers");
		if !wanted.iter().any(|name| name == "json") {
			wanted.insert(0, "json".to_string());
		}

		let factories = self.factories.read().clone();
		let mut created: Vec<(*const (), IndexMap<String, Arc<dyn RenderingEngine>>)> = Vec::new();
		let mut engines = IndexMap::new();

		for name in wanted {
			let Some(factory) = factories.get(&name) else {
				tracing::warn!(renderer = %name, "no factory registered for renderer, skipping");
				continue;
			};
			let key = Arc::as_ptr(factory) as *const ();
			let index = match created.iter().position(|(k, _)| *k == key) {
				Some(index) => index,
				None => {
					created.push((key, factory.create(blueprint)?));
					created.len() - 1
				}
			};
			let Some(engine) = created[index].1.get(&name) else {
				tracing::warn!(renderer = %name, "factory did not create the renderer, skipping");
				continue;
			};
			let content_type = factory
				.engines()
				.into_iter()
				.find(|spec| spec.name == name)
				.map(|spec| spec.content_type)
				.unwrap_or_else(|| "text/html".to_string());
			tracing::debug!(renderer = %name, content_type = %content_type, "renderer enabled");
			engines.insert(
				name.clone(),
				RegisteredEngine {
					name,
					engine: Arc::clone(engine),
					content_type,
					with_tg_vars: factory.with_tg_vars(),
				},
			);
		}

		*self.engines.write() = engines;
		Ok(())
	}

	/// Adds an already built engine.
	pub fn insert(&self, engine: RegisteredEngine) {
		self.engines.write().insert(engine.name.clone(), engine);
	}

	/// Drops an engine.
	pub fn remove(&self, name: &str) -> Option<RegisteredEngine> {
		self.engines.write().shift_remove(name)
	}

	pub fn get(&self, name: &str) -> Option<RegisteredEngine> {
		self.engines.read().get(name).cloned()
	}

	pub fn is_available(&self, name: &str) -> bool {
		self.engines.read().contains_key(name)
	}

	pub fn content_type_for(&self, name: &str) -> Option<String> {
		self.engines.read().get(name).map(|e| e.content_type.clone())
	}

	/// Names of the enabled engines, in configuration order.
	pub fn names(&self) -> Vec<String> {
		self.engines.read().keys().cloned().collect()
	}
}

impl std::fmt::Debug for RenderingRegistry {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("RenderingRegistry")
			.field("factories", &self.factories.read().keys().collect::<Vec<_>>())
			.field("engines", &self.names())
			.finish()
	}
}
