//! The decoration side table.
//!
//! Decorations are computed from the ops recorded on each [`ExposedMethod`]
//! once the rendering engines are configured. Registering a method before
//! the `renderers_ready` milestone queues the computation; afterwards it
//! runs immediately.

use indexmap::IndexMap;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use trellis_core::{Error, HttpError, Milestone, Result};
use trellis_render::RenderingRegistry;

use crate::context::RequestContext;
use crate::hooks::{ControllerEvent, ControllerHook, HookName};
use crate::method::{
	ControllerCaller, ControllerWrapper, DecorationOp, ErrorHandler, ExposeSpec, ExposedMethod,
	MethodId, ValidationIntent, base_caller,
};
use crate::predicates::{Predicate, check};

/// A rendering registered on a method.
#[derive(Debug, Clone, PartialEq)]
pub struct Exposition {
	pub content_type: String,
	/// `None` for raw output.
	pub engine: Option<String>,
	pub template: Option<String>,
	pub exclude_names: Vec<String>,
	pub render_params: Map<String, Value>,
}

/// Metadata driving the pipeline for one method.
#[derive(Clone)]
pub struct Decoration {
	/// Expositions keyed by content type.
	pub engines: IndexMap<String, Exposition>,
	/// Expositions keyed by custom format tag.
	pub custom_engines: IndexMap<String, Exposition>,
	pub validations: Vec<ValidationIntent>,
	pub requirements: Vec<Arc<dyn Predicate>>,
	pub hooks: IndexMap<HookName, Vec<ControllerHook>>,
	/// Wrappers of this method, in registration order.
	pub wrappers: Vec<ControllerWrapper>,
	pub caller: ControllerCaller,
	pub inherit: bool,
}

impl Default for Decoration {
	fn default() -> Self {
		Self {
			engines: IndexMap::new(),
			custom_engines: IndexMap::new(),
			validations: Vec::new(),
			requirements: Vec::new(),
			hooks: IndexMap::new(),
			wrappers: Vec::new(),
			caller: base_caller(),
			inherit: false,
		}
	}
}

impl Decoration {
	/// A method is exposed when at least one rendering is registered.
	pub fn exposed(&self) -> bool {
		!self.engines.is_empty() || !self.custom_engines.is_empty()
	}

	pub fn hooks_for(&self, name: HookName) -> &[ControllerHook] {
		self.hooks.get(&name).map(Vec::as_slice).unwrap_or_default()
	}

	fn add_hook(&mut self, name: HookName, hook: ControllerHook) {
		self.hooks.entry(name).or_default().push(hook);
	}

	/// Merges a parent decoration underneath this one.
	///
	/// Parent hooks, validations, requirements and wrappers come first.
	/// Expositions of the child replace those of the parent for the same
	/// key. Entries already present are not duplicated, so merging the same
	/// parent twice changes nothing.
	pub fn merge_parent(&mut self, parent: &Decoration) {
		let mut engines = parent.engines.clone();
		for (key, exposition) in std::mem::take(&mut self.engines) {
			engines.insert(key, exposition);
		}
		self.engines = engines;

		let mut custom = parent.custom_engines.clone();
		for (key, exposition) in std::mem::take(&mut self.custom_engines) {
			custom.insert(key, exposition);
		}
		self.custom_engines = custom;

		self.validations = prepend_unique(&parent.validations, &self.validations, |a, b| {
			a.schema.ptr_eq(&b.schema)
		});
		self.requirements = prepend_unique(&parent.requirements, &self.requirements, Arc::ptr_eq);
		self.wrappers = prepend_unique(&parent.wrappers, &self.wrappers, Arc::ptr_eq);

		let mut hooks = IndexMap::new();
		for name in parent.hooks.keys().chain(self.hooks.keys()) {
			if hooks.contains_key(name) {
				continue;
			}
			let merged = prepend_unique(parent.hooks_for(*name), self.hooks_for(*name), Arc::ptr_eq);
			hooks.insert(*name, merged);
		}
		self.hooks = hooks;
	}

	/// Composes the caller from the base caller, then the application
	/// wrappers, then the method wrappers. The last one registered ends up
	/// outermost.
	fn compose_caller(&mut self, app_wrappers: &[ControllerWrapper]) {
		let mut caller = base_caller();
		for wrapper in app_wrappers.iter().chain(self.wrappers.iter()) {
			caller = wrapper(caller);
		}
		self.caller = caller;
	}
}

fn prepend_unique<T: Clone>(parent: &[T], child: &[T], same: impl Fn(&T, &T) -> bool) -> Vec<T> {
	let mut merged: Vec<T> = parent.to_vec();
	for item in child {
		if !merged.iter().any(|existing| same(existing, item)) {
			merged.push(item.clone());
		}
	}
	merged
}

impl std::fmt::Debug for Decoration {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Decoration")
			.field("engines", &self.engines)
			.field("custom_engines", &self.custom_engines)
			.field("validations", &self.validations.len())
			.field("requirements", &self.requirements.len())
			.field(
				"hooks",
				&self
					.hooks
					.iter()
					.map(|(k, v)| (k.as_str(), v.len()))
					.collect::<Vec<_>>(),
			)
			.field("wrappers", &self.wrappers.len())
			.field("inherit", &self.inherit)
			.finish()
	}
}

/// Decorations of unregistered methods, kept for one request.
#[derive(Clone, Default)]
struct RequestDecorations(HashMap<MethodId, Arc<Decoration>>);

struct Inner {
	renderers: Arc<RenderingRegistry>,
	default_renderer: RwLock<String>,
	renderers_ready: Arc<Milestone>,
	decorations: RwLock<HashMap<MethodId, Arc<Decoration>>>,
	queued: RwLock<HashSet<MethodId>>,
	app_wrappers: RwLock<Vec<ControllerWrapper>>,
	extra_hooks: RwLock<HashMap<MethodId, Vec<(HookName, ControllerHook)>>>,
}

/// Decorations of every registered method, keyed by [`MethodId`].
#[derive(Clone)]
pub struct DecorationRegistry {
	inner: Arc<Inner>,
}

impl DecorationRegistry {
	pub fn new(renderers: Arc<RenderingRegistry>, renderers_ready: Arc<Milestone>) -> Self {
		Self {
			inner: Arc::new(Inner {
				renderers,
				default_renderer: RwLock::new("json".to_string()),
				renderers_ready,
				decorations: RwLock::new(HashMap::new()),
				queued: RwLock::new(HashSet::new()),
				app_wrappers: RwLock::new(Vec::new()),
				extra_hooks: RwLock::new(HashMap::new()),
			}),
		}
	}

	pub fn renderers(&self) -> &Arc<RenderingRegistry> {
		&self.inner.renderers
	}

	/// Engine used by `expose` calls naming a bare template.
	pub fn set_default_renderer(&self, name: impl Into<String>) {
		*self.inner.default_renderer.write() = name.into();
	}

	pub fn default_renderer(&self) -> String {
		self.inner.default_renderer.read().clone()
	}

	/// Queues the decoration of `method`, its inherited parent and the
	/// methods it names as error handlers. Registering twice is a no-op.
	pub fn register_method(&self, method: &Arc<ExposedMethod>) {
		if !self.inner.queued.write().insert(method.id.clone()) {
			return;
		}
		if let Some(parent) = &method.parent {
			self.register_method(parent);
		}
		for op in &method.ops {
			if let DecorationOp::Validate(ValidationIntent {
				error_handler: Some(ErrorHandler::Method(handler)),
				..
			}) = op
			{
				self.register_method(handler);
			}
		}
		let registry = self.clone();
		let method = Arc::clone(method);
		self.inner
			.renderers_ready
			.register(move || registry.apply(&method));
	}

	/// Adds a hook to one method. Applied with the rest of its decoration.
	pub fn register_hook(&self, method: &MethodId, name: HookName, hook: ControllerHook) {
		let mut decorations = self.inner.decorations.write();
		if let Some(existing) = decorations.get(method) {
			let mut updated = Decoration::clone(existing);
			updated.add_hook(name, hook);
			decorations.insert(method.clone(), Arc::new(updated));
			return;
		}
		drop(decorations);
		self.inner
			.extra_hooks
			.write()
			.entry(method.clone())
			.or_default()
			.push((name, hook));
	}

	/// Registers a wrapper applied to every method, beneath the method's own
	/// wrappers.
	pub fn register_controller_wrapper(&self, wrapper: ControllerWrapper) {
		self.inner.app_wrappers.write().push(wrapper);
		let app_wrappers = self.inner.app_wrappers.read().clone();
		let mut decorations = self.inner.decorations.write();
		for decoration in decorations.values_mut() {
			let mut updated = Decoration::clone(decoration);
			updated.compose_caller(&app_wrappers);
			*decoration = Arc::new(updated);
		}
	}

	pub fn decoration(&self, method: &MethodId) -> Option<Arc<Decoration>> {
		self.inner.decorations.read().get(method).cloned()
	}

	/// Number of decorations in the table.
	pub fn len(&self) -> usize {
		self.inner.decorations.read().len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// The decoration of `method`.
	///
	/// Registered methods are served from the table. Other methods, such as
	/// those of subtrees built by a lookup, are decorated on the fly and
	/// never stored.
	///
	/// # Errors
	///
	/// Fails when the rendering engines are not configured yet.
	pub fn decoration_for(&self, method: &Arc<ExposedMethod>) -> Result<Arc<Decoration>> {
		if let Some(decoration) = self.decoration(&method.id) {
			return Ok(decoration);
		}
		if !self.inner.renderers_ready.is_reached() {
			return Err(Error::Configuration(format!(
				"decoration of {} requested before the renderers are ready",
				method.id
			)));
		}
		tracing::trace!(method = %method.id, "decorating unregistered method");
		Ok(Arc::new(self.build(method)))
	}

	/// Like [`decoration_for`](Self::decoration_for), keeping decorations
	/// of unregistered methods in the request locals for the rest of the
	/// request.
	pub fn decoration_in(&self, ctx: &RequestContext, method: &Arc<ExposedMethod>) -> Result<Arc<Decoration>> {
		if let Some(decoration) = self.decoration(&method.id) {
			return Ok(decoration);
		}
		let mut local = ctx.locals.get::<RequestDecorations>().unwrap_or_default();
		if let Some(decoration) = local.0.get(&method.id) {
			return Ok(Arc::clone(decoration));
		}
		let decoration = self.decoration_for(method)?;
		local.0.insert(method.id.clone(), Arc::clone(&decoration));
		ctx.locals.insert(local);
		Ok(decoration)
	}

	fn apply(&self, method: &Arc<ExposedMethod>) {
		let decoration = self.build(method);
		self.inner.extra_hooks.write().remove(&method.id);
		self.inner
			.decorations
			.write()
			.insert(method.id.clone(), Arc::new(decoration));
	}

	fn build(&self, method: &Arc<ExposedMethod>) -> Decoration {
		let mut decoration = Decoration {
			inherit: method.inherit,
			..Decoration::default()
		};

		for op in &method.ops {
			match op {
				DecorationOp::Expose(spec) => self.register_exposition(&mut decoration, method, spec),
				DecorationOp::Validate(intent) => decoration.validations.push(intent.clone()),
				DecorationOp::Require(predicate) => {
					decoration.requirements.push(Arc::clone(predicate));
					decoration.add_hook(HookName::BeforeCall, requirement_hook(Arc::clone(predicate)));
				}
				DecorationOp::Hook(name, hook) => decoration.add_hook(*name, Arc::clone(hook)),
				DecorationOp::Wrap(wrapper) => decoration.wrappers.push(Arc::clone(wrapper)),
				DecorationOp::Paginate(spec) => {
					for (name, hook) in spec.hooks() {
						decoration.add_hook(name, hook);
					}
				}
				DecorationOp::TrailingSlash(with) => {
					decoration.add_hook(HookName::BeforeValidate, trailing_slash_hook(*with));
				}
			}
		}

		if method.inherit
			&& let Some(parent) = &method.parent
		{
			match self.decoration_for(parent) {
				Ok(parent_decoration) => decoration.merge_parent(&parent_decoration),
				Err(err) => {
					tracing::warn!(method = %method.id, parent = %parent.id, error = %err, "parent decoration missing, not inherited");
				}
			}
		}

		if let Some(extra) = self.inner.extra_hooks.read().get(&method.id) {
			for (name, hook) in extra {
				decoration.add_hook(*name, Arc::clone(hook));
			}
		}

		if method.declares_exposition() && !decoration.exposed() {
			tracing::warn!(method = %method.id, "no exposition left available, method is not exposed");
		}

		let app_wrappers = self.inner.app_wrappers.read().clone();
		decoration.compose_caller(&app_wrappers);
		tracing::debug!(method = %method.id, ?decoration, "decoration built");
		decoration
	}

	fn register_exposition(&self, decoration: &mut Decoration, method: &ExposedMethod, spec: &ExposeSpec) {
		let renderers = &self.inner.renderers;
		let (engine, template) = if renderers.knows(&spec.template) || renderers.is_available(&spec.template) {
			(Some(spec.template.clone()), None)
		} else if let Some((engine, template)) = spec.template.split_once(':') {
			(Some(engine.to_string()), Some(template.to_string()))
		} else if !spec.template.is_empty() {
			(Some(self.default_renderer()), Some(spec.template.clone()))
		} else {
			(None, None)
		};

		if let Some(name) = &engine
			&& !renderers.is_available(name)
		{
			tracing::warn!(method = %method.id, engine = %name, "exposition discarded, engine not available");
			return;
		}

		let content_type = match (&spec.content_type, &engine) {
			(Some(content_type), _) => content_type.clone(),
			(None, Some(name)) if name == "json" => "application/json".to_string(),
			(None, Some(name)) => renderers
				.content_type_for(name)
				.unwrap_or_else(|| "text/html".to_string()),
			(None, None) => "text/html".to_string(),
		};

		let exposition = Exposition {
			content_type: content_type.clone(),
			engine,
			template: template.filter(|t| !t.is_empty()),
			exclude_names: spec.exclude_names.clone(),
			render_params: spec.render_params.clone(),
		};
		match &spec.custom_format {
			Some(format) => {
				decoration.custom_engines.insert(format.clone(), exposition);
			}
			None => {
				decoration.engines.insert(content_type, exposition);
			}
		}
	}
}

impl std::fmt::Debug for DecorationRegistry {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("DecorationRegistry")
			.field("decorations", &self.inner.decorations.read().len())
			.field("app_wrappers", &self.inner.app_wrappers.read().len())
			.field("renderers_ready", &self.inner.renderers_ready.is_reached())
			.finish()
	}
}

/// Checks a predicate before the call, flashing its message on failure.
pub(crate) fn requirement_hook(predicate: Arc<dyn Predicate>) -> ControllerHook {
	Arc::new(move |ctx: &mut RequestContext, _event: &mut ControllerEvent<'_>| {
		enforce(ctx, predicate.as_ref())
	})
}

pub(crate) fn enforce(ctx: &mut RequestContext, predicate: &dyn Predicate) -> Result<()> {
	let result = check(predicate, &ctx.identity);
	if let Err(Error::NotAuthorized { message, .. }) = &result {
		tracing::debug!(user = ?ctx.identity.user_id, %message, "requirement not met");
		ctx.flash(message.clone(), "warning");
	}
	result
}

fn trailing_slash_hook(with: bool) -> ControllerHook {
	Arc::new(move |ctx: &mut RequestContext, _event: &mut ControllerEvent<'_>| {
		if ctx.request.method != http::Method::GET {
			return Ok(());
		}
		let path = ctx.request.path();
		let target = if with && !path.ends_with('/') {
			format!("{path}/")
		} else if !with && path.ends_with('/') && path.len() > 1 {
			path.trim_end_matches('/').to_string()
		} else {
			return Ok(());
		};
		let mut location = format!("{}{target}", ctx.request.script_name);
		if let Some(query) = ctx.request.uri.query() {
			location.push('?');
			location.push_str(query);
		}
		Err(HttpError::redirect(http::StatusCode::MOVED_PERMANENTLY, location).into())
	})
}
