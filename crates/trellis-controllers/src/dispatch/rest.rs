//! REST dispatch: the HTTP verb selects the method.
//!
//! | verb   | remainder        | methods tried                       |
//! |--------|------------------|-------------------------------------|
//! | GET    | empty            | `get_all`, `get`                    |
//! | GET    | `.../new`        | `new`                               |
//! | GET    | `.../edit`       | `edit`                              |
//! | GET    | `.../delete`     | `get_delete`                        |
//! | GET    | `name/...`       | `name`, `get_name`, child, `get_one`, `get` |
//! | POST   | any              | `name`, child, `post`               |
//! | PUT    | any              | `name`, child, `put`, `post`        |
//! | DELETE | any              | `post_delete`, `delete`, child      |
//!
//! A `_method` parameter overrides the verb of the request. A GET cannot
//! impersonate PUT or DELETE.

use serde_json::Value;
use std::sync::Arc;
use trellis_core::{Error, Result};

use super::Dispatcher;
use super::state::{DispatchState, DispatchTarget};
use crate::context::RequestContext;
use crate::controller::ControllerNode;

impl Dispatcher {
	pub(super) fn dispatch_rest(
		&self,
		state: &mut DispatchState,
		ctx: &mut RequestContext,
		remainder: Vec<String>,
	) -> Result<DispatchTarget> {
		let node = state.current()?;
		let verb = effective_verb(state, ctx)?;

		if let Some(target) = self.sub_controller(state, ctx, &node, &remainder)? {
			return Ok(target);
		}
		if let Some(target) = self.custom_action(state, ctx, &node, &verb, &remainder)? {
			return Ok(target);
		}

		match verb.as_str() {
			"get" => self.rest_get(state, ctx, &node, remainder),
			"put" | "post" => self.rest_post(state, ctx, &node, &verb, remainder),
			"delete" => self.rest_delete(state, ctx, &node, remainder),
			_ => self.rest_other(state, ctx, &node, &verb, remainder),
		}
	}

	/// Descends into a child named after the identifying segments, binding
	/// those segments to the arguments of `get_one` (or `get`).
	fn sub_controller(
		&self,
		state: &mut DispatchState,
		ctx: &mut RequestContext,
		node: &ControllerNode,
		remainder: &[String],
	) -> Result<Option<DispatchTarget>> {
		let signature = node
			.method_named("get_one")
			.or_else(|| node.method_named("get"))
			.map(|m| m.signature.clone())
			.unwrap_or_default();

		let position = if signature.varargs {
			remainder.iter().position(|seg| node.get_child(seg).is_some())
		} else {
			let fixed = signature.fixed_len();
			(fixed > 0 && fixed < remainder.len() && node.get_child(&remainder[fixed]).is_some()).then_some(fixed)
		};
		let Some(position) = position else {
			return Ok(None);
		};
		let Some(child) = node.get_child(&remainder[position]).cloned() else {
			return Ok(None);
		};

		state.add_routing_args(ctx, &signature, &remainder[..position]);
		self.descend(state, ctx, child, remainder, position).map(Some)
	}

	fn custom_action(
		&self,
		state: &mut DispatchState,
		ctx: &mut RequestContext,
		node: &ControllerNode,
		verb: &str,
		remainder: &[String],
	) -> Result<Option<DispatchTarget>> {
		let Some((action, args)) = remainder.split_last() else {
			return Ok(None);
		};
		if !node.custom_actions().iter().any(|a| a == action) {
			return Ok(None);
		}
		for name in [format!("{verb}_{action}"), action.clone()] {
			if let Some(method) = self.candidate(node.method_named(&name), args, ctx)? {
				return Ok(Some(state.target(&method, args, ctx)));
			}
		}
		Ok(None)
	}

	/// The first of `names` exposed and accepting `remainder`.
	fn first_candidate(
		&self,
		state: &DispatchState,
		ctx: &RequestContext,
		node: &ControllerNode,
		names: &[&str],
		remainder: &[String],
	) -> Result<Option<DispatchTarget>> {
		for name in names {
			if let Some(method) = self.candidate(node.method_named(name), remainder, ctx)? {
				return Ok(Some(state.target(&method, remainder, ctx)));
			}
		}
		Ok(None)
	}

	fn rest_get(
		&self,
		state: &mut DispatchState,
		ctx: &mut RequestContext,
		node: &Arc<ControllerNode>,
		remainder: Vec<String>,
	) -> Result<DispatchTarget> {
		let Some((first, rest)) = remainder.split_first() else {
			if let Some(target) = self.first_candidate(state, ctx, node, &["get_all", "get"], &[])? {
				return Ok(target);
			}
			return self.unwind(state, ctx, remainder);
		};

		if let Some((last, args)) = remainder.split_last() {
			let form = match last.as_str() {
				"new" => Some("new"),
				"edit" => Some("edit"),
				"delete" => Some("get_delete"),
				_ => None,
			};
			if let Some(form) = form
				&& let Some(target) = self.first_candidate(state, ctx, node, &[form], args)?
			{
				return Ok(target);
			}
		}

		if let Some(method) = self.candidate(node.get_method(first), rest, ctx)? {
			return Ok(state.target(&method, rest, ctx));
		}
		let prefixed = format!("get_{first}");
		if let Some(target) = self.first_candidate(state, ctx, node, &[prefixed.as_str()], rest)? {
			return Ok(target);
		}
		if let Some(child) = node.get_child(first).cloned() {
			return self.descend(state, ctx, child, &remainder, 0);
		}
		if let Some(target) = self.first_candidate(state, ctx, node, &["get_one", "get"], &remainder)? {
			return Ok(target);
		}
		self.unwind(state, ctx, remainder)
	}

	fn rest_post(
		&self,
		state: &mut DispatchState,
		ctx: &mut RequestContext,
		node: &Arc<ControllerNode>,
		verb: &str,
		remainder: Vec<String>,
	) -> Result<DispatchTarget> {
		if let Some((first, rest)) = remainder.split_first() {
			if let Some(method) = self.candidate(node.get_method(first), rest, ctx)? {
				return Ok(state.target(&method, rest, ctx));
			}
			if let Some(child) = node.get_child(first).cloned() {
				return self.descend(state, ctx, child, &remainder, 0);
			}
		}
		let names: &[&str] = if verb == "put" { &["put", "post"] } else { &["post"] };
		if let Some(target) = self.first_candidate(state, ctx, node, names, &remainder)? {
			return Ok(target);
		}
		self.unwind(state, ctx, remainder)
	}

	fn rest_delete(
		&self,
		state: &mut DispatchState,
		ctx: &mut RequestContext,
		node: &Arc<ControllerNode>,
		remainder: Vec<String>,
	) -> Result<DispatchTarget> {
		if let Some(target) = self.first_candidate(state, ctx, node, &["post_delete", "delete"], &remainder)? {
			return Ok(target);
		}
		if let Some(first) = remainder.first() {
			if let Some(method) = node.get_method(first)
				&& self.is_exposed(ctx, method)?
			{
				return Err(Error::MethodNotAllowed(format!(
					"{} cannot be reached with DELETE",
					ctx.request.path()
				)));
			}
			if let Some(child) = node.get_child(first).cloned() {
				return self.descend(state, ctx, child, &remainder, 0);
			}
		}
		self.unwind(state, ctx, remainder)
	}

	fn rest_other(
		&self,
		state: &mut DispatchState,
		ctx: &mut RequestContext,
		node: &Arc<ControllerNode>,
		verb: &str,
		remainder: Vec<String>,
	) -> Result<DispatchTarget> {
		let prefixed = format!("post_{verb}");
		if let Some(target) = self.first_candidate(state, ctx, node, &[prefixed.as_str(), verb], &remainder)? {
			return Ok(target);
		}
		if let Some(first) = remainder.first()
			&& let Some(child) = node.get_child(first).cloned()
		{
			return self.descend(state, ctx, child, &remainder, 0);
		}
		self.unwind(state, ctx, remainder)
	}
}

/// The verb of the request after `_method` overrides, computed once per
/// dispatch.
fn effective_verb(state: &mut DispatchState, ctx: &mut RequestContext) -> Result<String> {
	if let Some(verb) = &state.http_method {
		return Ok(verb.clone());
	}
	let actual = ctx.request.method.as_str().to_ascii_lowercase();
	let verb = match ctx.params.remove("_method") {
		None => actual,
		Some(value) => {
			let requested = match value {
				Value::Array(mut items) => items.pop().unwrap_or(Value::Null),
				other => other,
			};
			let requested = match requested {
				Value::String(s) => s.to_ascii_lowercase(),
				Value::Null => actual.clone(),
				other => other.to_string().to_ascii_lowercase(),
			};
			if actual == "get" && matches!(requested.as_str(), "put" | "delete") {
				return Err(Error::MethodNotAllowed(format!(
					"GET cannot be used as {}",
					requested.to_ascii_uppercase()
				)));
			}
			requested
		}
	};
	state.http_method = Some(verb.clone());
	Ok(verb)
}
