//! Transient dispatch state.

use std::collections::HashSet;
use std::sync::Arc;
use trellis_core::{Error, Params, Result};

use crate::context::RequestContext;
use crate::controller::ControllerNode;
use crate::decoration::enforce;
use crate::method::ExposedMethod;
use crate::signature::Signature;

#[derive(Clone)]
pub(crate) struct Entry {
	pub segment: String,
	pub node: Arc<ControllerNode>,
	/// Remainder to resume with when this controller is popped. `None` for
	/// the root.
	pub restore: Option<Vec<String>>,
}

/// What dispatch resolved.
#[derive(Debug, Clone)]
pub struct DispatchTarget {
	pub method: Arc<ExposedMethod>,
	/// Segments bound positionally to the method.
	pub remainder: Vec<String>,
	/// Segments that led to each controller of the chain, the root first.
	pub controller_path: Vec<String>,
	/// Effective verb after `_method` overrides, lowercase.
	pub http_method: String,
}

/// Routing outcome published in the request extensions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoutingState {
	pub controller_path: Vec<String>,
	pub method: String,
	pub remainder: Vec<String>,
	pub routing_args: Params,
	pub response_type: Option<String>,
}

pub(crate) struct DispatchState {
	pub controllers: Vec<Entry>,
	pub http_method: Option<String>,
	pub routing_args: Params,
	tried_lookups: HashSet<(usize, Vec<String>)>,
}

impl DispatchState {
	pub fn new(root: Arc<ControllerNode>) -> Self {
		Self {
			controllers: vec![Entry {
				segment: String::new(),
				node: root,
				restore: None,
			}],
			http_method: None,
			routing_args: Params::new(),
			tried_lookups: HashSet::new(),
		}
	}

	pub fn current(&self) -> Result<Arc<ControllerNode>> {
		self.controllers
			.last()
			.map(|entry| Arc::clone(&entry.node))
			.ok_or_else(|| Error::Internal("dispatch state has no controller".into()))
	}

	/// Descends into `node`, checking its security first.
	pub fn enter(
		&mut self,
		ctx: &mut RequestContext,
		segment: &str,
		node: Arc<ControllerNode>,
		restore: Vec<String>,
	) -> Result<()> {
		if let Some(predicate) = node.security() {
			enforce(ctx, predicate.as_ref())?;
		}
		tracing::trace!(controller = %node.name, %segment, "entering controller");
		self.controllers.push(Entry {
			segment: segment.to_string(),
			node,
			restore: Some(restore),
		});
		Ok(())
	}

	/// Records a lookup attempt, returning `false` when the same lookup was
	/// already tried during this dispatch.
	pub fn try_lookup(&mut self, node: &Arc<ControllerNode>, remainder: &[String]) -> bool {
		let key = (Arc::as_ptr(node) as usize, remainder.to_vec());
		self.tried_lookups.insert(key)
	}

	/// Binds the leading segments to the arguments of `signature` for the
	/// sub-controllers below.
	pub fn add_routing_args(&mut self, ctx: &mut RequestContext, signature: &Signature, values: &[String]) {
		for (arg, value) in signature.args.iter().zip(values) {
			let value = serde_json::Value::String(value.clone());
			self.routing_args.insert(arg.name.clone(), value.clone());
			ctx.params.insert(arg.name.clone(), value);
		}
	}

	pub fn controller_path(&self) -> Vec<String> {
		self.controllers.iter().map(|e| e.segment.clone()).collect()
	}

	pub fn target(&self, method: &Arc<ExposedMethod>, remainder: &[String], ctx: &RequestContext) -> DispatchTarget {
		DispatchTarget {
			method: Arc::clone(method),
			remainder: remainder.to_vec(),
			controller_path: self.controller_path(),
			http_method: self
				.http_method
				.clone()
				.unwrap_or_else(|| ctx.request.method.as_str().to_ascii_lowercase()),
		}
	}
}
