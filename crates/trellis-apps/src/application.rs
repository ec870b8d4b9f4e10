//! The application object returned by [`Configurator::make_app`](crate::Configurator::make_app).

use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use trellis_conf::Blueprint;
use trellis_controllers::{DecorationRegistry, DispatchCore, HookNamespace};
use trellis_core::{Milestones, Result};
use trellis_http::{Handler, Request, Response};
use trellis_middleware::WrapperChain;
use trellis_render::RenderingRegistry;

use crate::component::BuildContext;

/// A configured application: the wrapper chain around the dispatch core.
///
/// Errors escaping the chain are logged and turned into a 500 response,
/// detailed when `debug` is set.
pub struct Application {
	chain: WrapperChain,
	core: Arc<DispatchCore>,
	config: Arc<Blueprint>,
	hooks: Arc<HookNamespace>,
	milestones: Milestones,
	decorations: DecorationRegistry,
	renderers: Arc<RenderingRegistry>,
	debug: bool,
	shut_down: AtomicBool,
}

impl Application {
	pub(crate) fn new(chain: WrapperChain, core: Arc<DispatchCore>, config: Arc<Blueprint>, ctx: BuildContext) -> Self {
		let debug = config.bool_or("debug", false);
		Self {
			chain,
			core,
			config,
			hooks: ctx.hooks,
			milestones: ctx.milestones,
			decorations: ctx.decorations,
			renderers: ctx.renderers,
			debug,
			shut_down: AtomicBool::new(false),
		}
	}

	/// The configuration snapshot requests see.
	pub fn config(&self) -> &Arc<Blueprint> {
		&self.config
	}

	pub fn hooks(&self) -> &Arc<HookNamespace> {
		&self.hooks
	}

	pub fn milestones(&self) -> &Milestones {
		&self.milestones
	}

	pub fn decorations(&self) -> &DecorationRegistry {
		&self.decorations
	}

	pub fn renderers(&self) -> &Arc<RenderingRegistry> {
		&self.renderers
	}

	/// The dispatch core, without any application wrapper.
	pub fn dispatch_core(&self) -> &Arc<DispatchCore> {
		&self.core
	}

	/// Names of the active wrappers, outermost first.
	pub fn wrapper_names(&self) -> Vec<String> {
		self.chain.names().to_vec()
	}

	/// Runs the shutdown hooks. Later calls do nothing.
	///
	/// # Errors
	///
	/// Returns the first failing hook; every hook still runs.
	pub fn shutdown(&self) -> Result<()> {
		if self.shut_down.swap(true, Ordering::SeqCst) {
			return Ok(());
		}
		tracing::info!("application shutting down");
		self.hooks.shutdown()
	}
}

#[async_trait]
impl Handler for Application {
	async fn handle(&self, request: Request) -> Result<Response> {
		let method = request.method.clone();
		let path = request.path().to_string();
		match self.chain.handle(request).await {
			Ok(response) => Ok(response),
			Err(err) => {
				tracing::error!(%method, %path, error = %err, "unhandled application error");
				Ok(Response::from_error(&err, self.debug))
			}
		}
	}
}

impl std::fmt::Debug for Application {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Application")
			.field("wrappers", &self.chain.names())
			.field("milestones", &self.milestones)
			.field("debug", &self.debug)
			.finish_non_exhaustive()
	}
}
