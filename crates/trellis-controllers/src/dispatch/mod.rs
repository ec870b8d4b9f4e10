//! Resolution of URL paths to exposed methods.
//!
//! The dispatcher walks the controller tree from the root, one segment at a
//! time. Object controllers match children, then exposed methods, then
//! `index`. REST controllers first consult the HTTP verb. When a subtree is
//! exhausted, controllers are popped off the chain and each one gets a
//! chance to catch the remainder with `_default` or its lookup.

mod object;
mod rest;
mod state;

pub use state::{DispatchTarget, RoutingState};

use percent_encoding::percent_decode_str;
use std::sync::Arc;
use trellis_core::negotiation::media_type_for_extension;
use trellis_core::{Error, Result};

use crate::context::RequestContext;
use crate::controller::ControllerNode;
use crate::decoration::{DecorationRegistry, enforce};
use crate::method::ExposedMethod;
use state::DispatchState;

/// A request path split into segments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathInfo {
	pub segments: Vec<String>,
	pub trailing_slash: bool,
	/// Media type hinted by a stripped extension.
	pub response_type: Option<String>,
	pub extension: Option<String>,
}

/// Splits and percent-decodes `path`.
///
/// The empty segment left by a trailing slash is dropped. With
/// `strip_extension`, a known extension on the last segment is removed and
/// recorded as the response type.
///
/// # Examples
///
/// ```
/// use trellis_controllers::dispatch::split_path;
///
/// let info = split_path("/feeds/latest%20news.xml", true);
/// assert_eq!(info.segments, vec!["feeds", "latest news"]);
/// assert_eq!(info.response_type.as_deref(), Some("text/xml"));
///
/// let info = split_path("/movies/", true);
/// assert_eq!(info.segments, vec!["movies"]);
/// assert!(info.trailing_slash);
/// ```
pub fn split_path(path: &str, strip_extension: bool) -> PathInfo {
	let trimmed = path.strip_prefix('/').unwrap_or(path);
	let mut info = PathInfo::default();
	if trimmed.is_empty() {
		return info;
	}
	let mut segments: Vec<String> = trimmed
		.split('/')
		.map(|s| percent_decode_str(s).decode_utf8_lossy().into_owned())
		.collect();
	if segments.last().is_some_and(String::is_empty) {
		segments.pop();
		info.trailing_slash = true;
	}
	if strip_extension
		&& !info.trailing_slash
		&& let Some(last) = segments.last_mut()
		&& let Some((base, ext)) = last.rsplit_once('.')
		&& !base.is_empty()
		&& let Some(media_type) = media_type_for_extension(ext)
	{
		info.response_type = Some(media_type.to_string());
		info.extension = Some(ext.to_string());
		*last = base.to_string();
	}
	info.segments = segments;
	info
}

/// Resolves requests against a controller tree.
#[derive(Debug, Clone)]
pub struct Dispatcher {
	root: Arc<ControllerNode>,
	decorations: DecorationRegistry,
	strip_extensions: bool,
}

impl Dispatcher {
	pub fn new(root: Arc<ControllerNode>, decorations: DecorationRegistry) -> Self {
		Self {
			root,
			decorations,
			strip_extensions: true,
		}
	}

	/// Keeps extensions as part of the last segment.
	pub fn disable_request_extensions(mut self, disabled: bool) -> Self {
		self.strip_extensions = !disabled;
		self
	}

	pub fn root(&self) -> &Arc<ControllerNode> {
		&self.root
	}

	/// Resolves the request of `ctx`.
	///
	/// Sets the response type hinted by the extension on the context and
	/// publishes a [`RoutingState`] in the request extensions.
	///
	/// # Errors
	///
	/// [`Error::NotFound`] when nothing matches, [`Error::MethodNotAllowed`]
	/// for REST verb conflicts, and authorization failures of secured
	/// controllers.
	pub fn dispatch(&self, ctx: &mut RequestContext) -> Result<DispatchTarget> {
		let info = split_path(ctx.request.path(), self.strip_extensions);
		ctx.response_type = info.response_type.clone();

		if let Some(predicate) = self.root.security() {
			enforce(ctx, predicate.as_ref())?;
		}
		let mut state = DispatchState::new(Arc::clone(&self.root));
		let target = self.dispatch_node(&mut state, ctx, info.segments)?;

		tracing::debug!(
			path = %ctx.request.path(),
			method = %target.method.id,
			remainder = ?target.remainder,
			verb = %target.http_method,
			"dispatched"
		);
		ctx.request.extensions.insert(RoutingState {
			controller_path: target.controller_path.clone(),
			method: target.method.id.to_string(),
			remainder: target.remainder.clone(),
			routing_args: state.routing_args.clone(),
			response_type: info.response_type,
		});
		Ok(target)
	}

	fn dispatch_node(&self, state: &mut DispatchState, ctx: &mut RequestContext, remainder: Vec<String>) -> Result<DispatchTarget> {
		if state.current()?.is_rest() {
			self.dispatch_rest(state, ctx, remainder)
		} else {
			self.dispatch_object(state, ctx, remainder)
		}
	}

	/// Descends into the child reached by `remainder[skip]`.
	fn descend(
		&self,
		state: &mut DispatchState,
		ctx: &mut RequestContext,
		child: Arc<ControllerNode>,
		remainder: &[String],
		skip: usize,
	) -> Result<DispatchTarget> {
		let segment = remainder[skip].clone();
		state.enter(ctx, &segment, child, remainder.to_vec())?;
		self.dispatch_node(state, ctx, remainder[skip + 1..].to_vec())
	}

	fn is_exposed(&self, ctx: &RequestContext, method: &Arc<ExposedMethod>) -> Result<bool> {
		Ok(self.decorations.decoration_in(ctx, method)?.exposed())
	}

	/// An exposed method of the current controller accepting `remainder`.
	fn candidate(
		&self,
		method: Option<&Arc<ExposedMethod>>,
		remainder: &[String],
		ctx: &RequestContext,
	) -> Result<Option<Arc<ExposedMethod>>> {
		let Some(method) = method else {
			return Ok(None);
		};
		if self.is_exposed(ctx, method)? && method.signature.matches(remainder, &ctx.params) {
			Ok(Some(Arc::clone(method)))
		} else {
			Ok(None)
		}
	}

	/// Pops controllers until one catches the remainder with `_default` or
	/// a lookup.
	fn unwind(&self, state: &mut DispatchState, ctx: &mut RequestContext, mut remainder: Vec<String>) -> Result<DispatchTarget> {
		while let Some(entry) = state.controllers.last().cloned() {
			let node = entry.node;
			if let Some(default) = node.method_named("_default")
				&& self.is_exposed(ctx, default)?
			{
				tracing::trace!(controller = %node.name, ?remainder, "caught by _default");
				return Ok(state.target(default, &remainder, ctx));
			}

			if let Some(lookup) = node.get_lookup()
				&& state.try_lookup(&node, &remainder)
				&& let Some((sub, new_remainder)) = lookup(ctx, &remainder)?
			{
				tracing::trace!(controller = %node.name, sub = %sub.name, ?new_remainder, "lookup");
				let segment = sub.name.clone();
				state.enter(ctx, &segment, sub, remainder)?;
				return self.dispatch_node(state, ctx, new_remainder);
			}

			state.controllers.pop();
			match entry.restore {
				Some(restore) => remainder = restore,
				None => break,
			}
		}
		Err(Error::NotFound(ctx.request.path().to_string()))
	}
}
