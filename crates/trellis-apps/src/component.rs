//! Configuration components and the phases they act in.

use serde_json::Value;
use std::sync::Arc;
use trellis_conf::{Blueprint, Coercions};
use trellis_controllers::{ControllerNode, DecorationRegistry, HookNamespace};
use trellis_core::{Milestones, Result};
use trellis_render::RenderingRegistry;
use trellis_validation::ValidatorRegistry;

use crate::configurator::Configurator;

/// The moments of application construction at which component actions run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Phase {
	/// Defaults are in, coercions not applied yet. Last chance to change
	/// the raw configuration.
	BeforeConfig,
	/// The configuration is final. Rendering engines are set up here.
	ConfigReady,
	/// Renderers are ready and the environment (logging, databases) loads.
	EnvironmentLoaded,
	/// Everything is in place; the application is about to be returned.
	AppReady,
}

impl Phase {
	pub const ALL: [Phase; 4] = [
		Phase::BeforeConfig,
		Phase::ConfigReady,
		Phase::EnvironmentLoaded,
		Phase::AppReady,
	];

	pub fn as_str(&self) -> &'static str {
		match self {
			Phase::BeforeConfig => "before_config",
			Phase::ConfigReady => "config_ready",
			Phase::EnvironmentLoaded => "environment_loaded",
			Phase::AppReady => "app_ready",
		}
	}
}

impl std::fmt::Display for Phase {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Everything being assembled by [`Configurator::make_app`], handed to
/// component actions.
pub struct BuildContext {
	pub blueprint: Blueprint,
	pub milestones: Milestones,
	pub renderers: Arc<RenderingRegistry>,
	pub validators: Arc<ValidatorRegistry>,
	pub hooks: Arc<HookNamespace>,
	pub decorations: DecorationRegistry,
	pub root: Arc<ControllerNode>,
}

impl BuildContext {
	pub(crate) fn new(blueprint: Blueprint, root: Arc<ControllerNode>, hooks: Arc<HookNamespace>) -> Self {
		let milestones = Milestones::new();
		let renderers = Arc::new(RenderingRegistry::with_defaults());
		let decorations = DecorationRegistry::new(
			Arc::clone(&renderers),
			Arc::clone(&milestones.renderers_ready),
		);
		Self {
			blueprint,
			milestones,
			renderers,
			validators: Arc::new(ValidatorRegistry::with_defaults()),
			hooks,
			decorations,
			root,
		}
	}
}

impl std::fmt::Debug for BuildContext {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("BuildContext")
			.field("blueprint", &self.blueprint.len())
			.field("milestones", &self.milestones)
			.field("renderers", &self.renderers)
			.finish_non_exhaustive()
	}
}

/// A unit of configuration.
///
/// Components contribute defaults and coercions to the blueprint, may
/// register application wrappers when bound to a [`Configurator`] and run
/// actions at each [`Phase`] of application construction.
///
/// # Examples
///
/// ```
/// use serde_json::{Value, json};
/// use trellis_apps::{BuildContext, ConfigurationComponent, Phase};
///
/// struct Greeting;
///
/// impl ConfigurationComponent for Greeting {
///     fn id(&self) -> &str {
///         "greeting"
///     }
///
///     fn defaults(&self) -> Vec<(String, Value)> {
///         vec![("greeting.text".into(), json!("hello"))]
///     }
///
///     fn on_phase(&self, phase: Phase, ctx: &mut BuildContext) -> trellis_core::Result<()> {
///         if phase == Phase::AppReady {
///             tracing::info!(text = ?ctx.blueprint.get_str("greeting.text"), "greeting ready");
///         }
///         Ok(())
///     }
/// }
/// ```
pub trait ConfigurationComponent: Send + Sync {
	/// Unique id. Registering another component with the same id replaces it.
	fn id(&self) -> &str;

	/// Values set when the blueprint does not have them yet.
	fn defaults(&self) -> Vec<(String, Value)> {
		Vec::new()
	}

	/// Coercions applied to the blueprint after [`Phase::BeforeConfig`].
	fn coercions(&self) -> Coercions {
		Coercions::new()
	}

	/// Called once, when the component is registered.
	fn on_bind(&self, _configurator: &mut Configurator) {}

	/// Called at every phase, in component order.
	///
	/// # Errors
	///
	/// Errors abort application construction.
	fn on_phase(&self, _phase: Phase, _ctx: &mut BuildContext) -> Result<()> {
		Ok(())
	}
}
