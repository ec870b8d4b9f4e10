//! The configurator: ordered configuration components producing an
//! [`Application`].

use serde_json::Value;
use std::sync::Arc;
use trellis_conf::{Blueprint, Coercions};
use trellis_controllers::{
	ControllerHook, ControllerNode, ControllerWrapper, DispatchCore, Dispatcher, HookName,
	HookNamespace, LifecycleHook, NamedHook, Pipeline,
};
use trellis_core::{DependenciesList, Position, Result};
use trellis_http::Handler;
use trellis_middleware::{ApplicationWrapper, WrapperRegistry};

use crate::application::Application;
use crate::component::{BuildContext, ConfigurationComponent, Phase};
use crate::components::{
	CachingComponent, DispatchComponent, ErrorPageComponent, ErrorReportingComponent,
	I18nComponent, IdentityComponent, LoggingComponent, RenderingComponent, SessionComponent,
	TransactionComponent, ValidationComponent,
};

/// Builds applications from a blueprint and a list of configuration
/// components.
///
/// # Examples
///
/// ```
/// use trellis_apps::Configurator;
/// use trellis_controllers::{ControllerNode, ExposedMethod, Reply};
/// use trellis_http::{Handler, Request};
///
/// # tokio_test::block_on(async {
/// let root = ControllerNode::new("Root")
///     .method(ExposedMethod::new("index", |_, _| Ok(Reply::from("Hello World"))).expose(""));
///
/// let app = Configurator::minimal().make_app(root, None).unwrap();
///
/// let response = app.handle(Request::builder().uri("/").build().unwrap()).await.unwrap();
/// assert_eq!(response.text(), "Hello World");
/// # });
/// ```
pub struct Configurator {
	blueprint: Blueprint,
	components: DependenciesList<String, Arc<dyn ConfigurationComponent>>,
	wrappers: WrapperRegistry,
	controller_wrappers: Vec<ControllerWrapper>,
	hooks: Arc<HookNamespace>,
}

impl Configurator {
	/// A configurator without components.
	pub fn new() -> Self {
		Self {
			blueprint: Blueprint::new(),
			components: DependenciesList::new(),
			wrappers: WrapperRegistry::new(),
			controller_wrappers: Vec::new(),
			hooks: Arc::new(HookNamespace::new()),
		}
	}

	/// Dispatch, rendering, validation and logging.
	pub fn minimal() -> Self {
		let mut configurator = Self::new();
		configurator.register(LoggingComponent::new(), Position::First);
		configurator.register(DispatchComponent, Position::Middle);
		configurator.register(RenderingComponent::new(), Position::Middle);
		configurator.register(ValidationComponent::new(), Position::Middle);
		configurator
	}

	/// [`minimal`](Self::minimal) plus every shipped application wrapper,
	/// each disabled until its `*.enabled` option is set.
	pub fn full_stack() -> Self {
		let mut configurator = Self::minimal();
		configurator.register(ErrorPageComponent, Position::Last);
		configurator.register(ErrorReportingComponent::new(), Position::Last);
		configurator.register(IdentityComponent::new(), Position::Last);
		configurator.register(SessionComponent, Position::Last);
		configurator.register(I18nComponent::new(), Position::Last);
		configurator.register(CachingComponent, Position::Last);
		configurator.register(TransactionComponent::new(), Position::Last);
		configurator
	}

	/// Registers a component and binds it. A component with the same id is
	/// replaced.
	pub fn register(&mut self, component: impl ConfigurationComponent + 'static, position: Position<String>) {
		self.register_shared(Arc::new(component), position);
	}

	pub fn register_shared(&mut self, component: Arc<dyn ConfigurationComponent>, position: Position<String>) {
		let id = component.id().to_string();
		tracing::debug!(component = %id, "binding configuration component");
		component.on_bind(self);
		self.components.add(id, component, position);
	}

	pub fn component(&self, id: &str) -> Option<Arc<dyn ConfigurationComponent>> {
		self.components.get(&id.to_string()).cloned()
	}

	/// Component ids in the order their actions run.
	pub fn component_ids(&self) -> Vec<String> {
		self.components.keys().into_iter().cloned().collect()
	}

	pub fn blueprint(&self) -> &Blueprint {
		&self.blueprint
	}

	pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
		self.blueprint.set(key, value);
		self
	}

	pub fn update_blueprint(&mut self, values: &Blueprint) -> &mut Self {
		self.blueprint.merge(values);
		self
	}

	pub fn register_wrapper(&mut self, wrapper: Arc<dyn ApplicationWrapper>, position: Position<String>) {
		self.wrappers.register(wrapper, position);
	}

	pub fn register_wrapper_factory<F>(&mut self, name: impl Into<String>, factory: F, position: Position<String>)
	where
		F: Fn(&Blueprint) -> Result<Option<Arc<dyn ApplicationWrapper>>> + Send + Sync + 'static,
	{
		self.wrappers.register_factory(name, factory, position);
	}

	pub fn wrappers(&self) -> &WrapperRegistry {
		&self.wrappers
	}

	/// Wraps the call of every exposed method, beneath the method's own
	/// wrappers.
	pub fn register_controller_wrapper(&mut self, wrapper: ControllerWrapper) {
		self.controller_wrappers.push(wrapper);
	}

	pub fn register_controller_hook(&mut self, name: HookName, hook: ControllerHook) {
		self.hooks.register_controller_hook(name, hook);
	}

	pub fn register_hook(&mut self, name: impl Into<String>, hook: NamedHook) {
		self.hooks.register(name, hook);
	}

	pub fn on_startup(&mut self, hook: LifecycleHook) {
		self.hooks.on_startup(hook);
	}

	pub fn on_shutdown(&mut self, hook: LifecycleHook) {
		self.hooks.on_shutdown(hook);
	}

	/// Builds an application serving `root`.
	///
	/// `conf` entries override the configurator blueprint. Component
	/// defaults fill what is still missing, then the phases run in order,
	/// each reaching its milestone: [`Phase::BeforeConfig`], coercions,
	/// [`Phase::ConfigReady`], decorations (renderers ready),
	/// [`Phase::EnvironmentLoaded`], the wrapper chain,
	/// [`Phase::AppReady`] and finally the startup hooks.
	///
	/// # Errors
	///
	/// Fails when a component action, a coercion, a wrapper factory or a
	/// startup hook fails.
	pub fn make_app(&self, root: impl Into<Arc<ControllerNode>>, conf: Option<&Blueprint>) -> Result<Application> {
		let mut blueprint = self.blueprint.clone();
		if let Some(conf) = conf {
			blueprint.merge(conf);
		}

		let components: Vec<Arc<dyn ConfigurationComponent>> =
			self.components.values().into_iter().cloned().collect();
		for component in &components {
			for (key, value) in component.defaults() {
				blueprint.set_default(key, value);
			}
		}

		let mut ctx = BuildContext::new(blueprint, root.into(), Arc::clone(&self.hooks));

		self.run_phase(Phase::BeforeConfig, &components, &mut ctx)?;
		let mut coercions = Coercions::new();
		for component in &components {
			coercions.extend(component.coercions());
		}
		ctx.blueprint.apply_coercions(&coercions)?;
		ctx.milestones.config_ready.reach();

		self.run_phase(Phase::ConfigReady, &components, &mut ctx)?;
		for wrapper in &self.controller_wrappers {
			ctx.decorations.register_controller_wrapper(Arc::clone(wrapper));
		}
		for method in ctx.root.all_methods() {
			ctx.decorations.register_method(&method);
		}
		ctx.milestones.renderers_ready.reach();

		self.run_phase(Phase::EnvironmentLoaded, &components, &mut ctx)?;
		ctx.milestones.environment_loaded.reach();

		let config = Arc::new(ctx.blueprint.clone());
		let dispatcher = Dispatcher::new(Arc::clone(&ctx.root), ctx.decorations.clone())
			.disable_request_extensions(config.bool_or("disable_request_extensions", false));
		let pipeline = Pipeline::new(
			ctx.decorations.clone(),
			Arc::clone(&ctx.validators),
			Arc::clone(&ctx.hooks),
		);
		let core = Arc::new(DispatchCore::new(dispatcher, pipeline, Arc::clone(&config)));
		let chain = self
			.wrappers
			.build_chain(Arc::clone(&core) as Arc<dyn Handler>, &config)?;

		self.run_phase(Phase::AppReady, &components, &mut ctx)?;
		ctx.milestones.app_ready.reach();

		ctx.hooks.startup()?;
		tracing::info!(
			components = ?self.component_ids(),
			wrappers = ?chain.names(),
			"application ready"
		);
		Ok(Application::new(chain, core, config, ctx))
	}

	fn run_phase(
		&self,
		phase: Phase,
		components: &[Arc<dyn ConfigurationComponent>],
		ctx: &mut BuildContext,
	) -> Result<()> {
		tracing::debug!(%phase, "running configuration phase");
		for component in components {
			component.on_phase(phase, ctx)?;
		}
		Ok(())
	}
}

impl Default for Configurator {
	fn default() -> Self {
		Self::full_stack()
	}
}

impl std::fmt::Debug for Configurator {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Configurator")
			.field("components", &self.component_ids())
			.field("wrappers", &self.wrappers)
			.field("controller_wrappers", &self.controller_wrappers.len())
			.finish()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use parking_lot::Mutex;
	use rstest::rstest;
	use serde_json::json;
	use trellis_controllers::{CallArgs, ExposedMethod, MethodFn, Reply, RequestContext, controller_wrapper};
	use trellis_http::Request;

	/// Records the phases it sees and the milestones reached at that time.
	struct Recorder {
		log: Arc<Mutex<Vec<String>>>,
	}

	impl ConfigurationComponent for Recorder {
		fn id(&self) -> &str {
			"recorder"
		}

		fn defaults(&self) -> Vec<(String, Value)> {
			vec![
				("recorder.value".into(), json!("default")),
				("recorder.flag".into(), json!("true")),
			]
		}

		fn coercions(&self) -> Coercions {
			let mut coercions = Coercions::new();
			coercions.insert("recorder.flag".into(), trellis_conf::coerce::coerce_bool);
			coercions
		}

		fn on_phase(&self, phase: Phase, ctx: &mut BuildContext) -> Result<()> {
			let reached: Vec<&str> = ctx
				.milestones
				.all()
				.iter()
				.filter(|m| m.is_reached())
				.map(|m| m.name())
				.collect();
			self.log.lock().push(format!(
				"{phase}:{}:{}",
				reached.join("+"),
				ctx.blueprint.get("recorder.flag").cloned().unwrap_or_default()
			));
			Ok(())
		}
	}

	fn root() -> ControllerNode {
		ControllerNode::new("Root").method(ExposedMethod::new("index", |_, _| Ok(Reply::from("home"))).expose(""))
	}

	#[rstest]
	fn test_phases_run_in_order() {
		let log = Arc::new(Mutex::new(Vec::new()));
		let mut configurator = Configurator::minimal();
		configurator.register(Recorder { log: log.clone() }, Position::Last);

		let app = configurator.make_app(root(), None).unwrap();
		assert_eq!(
			*log.lock(),
			vec![
				"before_config::\"true\"",
				"config_ready:config_ready:true",
				"environment_loaded:config_ready+renderers_ready:true",
				"app_ready:config_ready+renderers_ready+environment_loaded:true",
			]
		);
		assert!(app.milestones().app_ready.is_reached());
		assert_eq!(app.config().get_str("recorder.value"), Some("default"));
	}

	#[rstest]
	fn test_overrides_beat_defaults() {
		let mut configurator = Configurator::minimal();
		configurator.set("default_renderer", "json");
		let conf: Blueprint = [("debug", "true")].into_iter().collect();
		let app = configurator.make_app(root(), Some(&conf)).unwrap();
		assert_eq!(app.config().get("debug"), Some(&json!(true)));
		assert_eq!(app.config().get_list("renderers"), ["json"]);
	}

	#[rstest]
	fn test_same_id_replaces_component() {
		let mut configurator = Configurator::minimal();
		let before = configurator.component_ids().len();
		configurator.register(RenderingComponent::new(), Position::Middle);
		assert_eq!(configurator.component_ids().len(), before);
		assert!(configurator.component("rendering").is_some());
	}

	#[rstest]
	fn test_full_stack_wrapper_order() {
		let configurator = Configurator::full_stack();
		assert_eq!(
			configurator.wrappers().names(),
			[
				"request_logging",
				"errorpage",
				"trace_errors",
				"trace_slowreqs",
				"identity",
				"session",
				"i18n",
				"cache",
				"tm"
			]
		);
	}

	#[rstest]
	#[tokio::test]
	async fn test_controller_wrappers_and_startup_hooks() {
		let started = Arc::new(Mutex::new(0));
		let counter = started.clone();
		let mut configurator = Configurator::minimal();
		configurator.on_startup(Arc::new(move || {
			*counter.lock() += 1;
			Ok(())
		}));
		configurator.register_controller_wrapper(controller_wrapper(|next| {
			Arc::new(move |ctx: &mut RequestContext, func: &MethodFn, args: &CallArgs| {
				match next(ctx, func, args)? {
					Reply::Value(Value::String(text)) => Ok(Reply::from(format!("[{text}]"))),
					other => Ok(other),
				}
			})
		}));

		let app = configurator.make_app(root(), None).unwrap();
		assert_eq!(*started.lock(), 1);

		let response = app.handle(Request::builder().uri("/").build().unwrap()).await.unwrap();
		assert_eq!(response.text(), "[home]");
	}
}
