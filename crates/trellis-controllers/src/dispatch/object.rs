//! Object dispatch: segments name attributes of the controller.

use std::sync::Arc;
use trellis_core::Result;

use super::Dispatcher;
use super::state::{DispatchState, DispatchTarget};
use crate::context::RequestContext;

impl Dispatcher {
	pub(super) fn dispatch_object(
		&self,
		state: &mut DispatchState,
		ctx: &mut RequestContext,
		remainder: Vec<String>,
	) -> Result<DispatchTarget> {
		let node = state.current()?;

		let Some(first) = remainder.first() else {
			if let Some(index) = self.candidate(node.get_method("index"), &[], ctx)? {
				return Ok(state.target(&index, &[], ctx));
			}
			return self.unwind(state, ctx, remainder);
		};

		if let Some(child) = node.get_child(first) {
			let child = Arc::clone(child);
			return self.descend(state, ctx, child, &remainder, 0);
		}

		if let Some(method) = self.candidate(node.get_method(first), &remainder[1..], ctx)? {
			return Ok(state.target(&method, &remainder[1..], ctx));
		}

		self.unwind(state, ctx, remainder)
	}
}
