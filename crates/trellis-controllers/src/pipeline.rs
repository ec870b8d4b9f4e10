//! The controller pipeline.
//!
//! Around each resolved method: `before_validate` hooks, validation with
//! error handler selection, `before_call` hooks (requirements included), the
//! wrapped call, `before_render` hooks, negotiated rendering and
//! `after_render` hooks. Application-wide hooks run before the hooks of the
//! method at every step.

use std::collections::HashSet;
use std::sync::Arc;
use trellis_core::{Error, Result};
use trellis_http::Response;
use trellis_validation::{Outcome, ValidatorRegistry};

use crate::context::{RequestContext, ValidationStatus};
use crate::decoration::{Decoration, DecorationRegistry};
use crate::hooks::{ControllerEvent, HookName, HookNamespace};
use crate::method::{ErrorHandler, ExposedMethod, MethodFn, ValidateInContext, ValidationIntent};
use crate::render::{negotiate, render, validation_errors_response};
use crate::signature::CallArgs;

/// What runs once validation is settled.
struct Call {
	method: Arc<ExposedMethod>,
	decoration: Arc<Decoration>,
	func: MethodFn,
	args: CallArgs,
}

enum Settled {
	Call(Call),
	Respond(Response),
}

/// Runs resolved methods.
#[derive(Clone)]
pub struct Pipeline {
	decorations: DecorationRegistry,
	validators: Arc<ValidatorRegistry>,
	hooks: Arc<HookNamespace>,
}

impl Pipeline {
	pub fn new(decorations: DecorationRegistry, validators: Arc<ValidatorRegistry>, hooks: Arc<HookNamespace>) -> Self {
		Self {
			decorations,
			validators,
			hooks,
		}
	}

	pub fn decorations(&self) -> &DecorationRegistry {
		&self.decorations
	}

	pub fn hooks(&self) -> &Arc<HookNamespace> {
		&self.hooks
	}

	/// Calls `method` with the segments left by dispatch and renders its
	/// output.
	///
	/// # Errors
	///
	/// [`Error::NotFound`] for a method without expositions. Hook,
	/// requirement, controller and rendering failures are returned as is.
	/// Validation failures never are: they end in an error handler.
	pub fn call(&self, ctx: &mut RequestContext, method: &Arc<ExposedMethod>, remainder: &[String]) -> Result<Response> {
		ctx.validation = ValidationStatus::default();
		ctx.set_current_method(method.id.clone());

		let decoration = self.decorations.decoration_in(ctx, method)?;
		if !decoration.exposed() {
			return Err(Error::NotFound(ctx.request.path().to_string()));
		}

		let mut args = CallArgs::bind(&method.signature, remainder, ctx.params.clone());
		self.notify(ctx, &decoration, &mut ControllerEvent::BeforeValidate {
			method,
			args: &mut args,
		})?;

		let settled = self.perform_validate(ctx, method, Arc::clone(&decoration), args)?;
		ctx.request.extensions.insert(ctx.validation.record());
		let call = match settled {
			Settled::Call(call) => call,
			Settled::Respond(response) => return Ok(response),
		};
		let Call {
			method: target,
			decoration: target_decoration,
			func,
			mut args,
		} = call;

		{
			let mut event = ControllerEvent::BeforeCall {
				method,
				args: &mut args,
			};
			self.notify(ctx, &decoration, &mut event)?;
			if target.id != method.id {
				for hook in target_decoration.hooks_for(HookName::BeforeCall) {
					hook(ctx, &mut event)?;
				}
			}
		}

		ctx.set_current_method(target.id.clone());
		tracing::debug!(method = %target.id, args = ?args.named, "calling controller");
		let mut output = (target_decoration.caller)(ctx, &func, &args)?;

		self.notify(ctx, &target_decoration, &mut ControllerEvent::BeforeRender {
			method: &target,
			args: &args,
			output: &mut output,
		})?;

		let exposition = negotiate(&target_decoration, ctx, &target.id);
		let mut response = render(ctx, self.decorations.renderers(), &target.id, exposition.as_ref(), output)?;

		self.notify(ctx, &target_decoration, &mut ControllerEvent::AfterRender {
			method: &target,
			response: &mut response,
		})?;
		Ok(response)
	}

	/// Application-wide hooks, then the hooks of `decoration`.
	fn notify(&self, ctx: &mut RequestContext, decoration: &Decoration, event: &mut ControllerEvent<'_>) -> Result<()> {
		let name = event.name();
		for hook in self.hooks.controller_hooks(name) {
			hook(ctx, event)?;
		}
		for hook in decoration.hooks_for(name) {
			hook(ctx, event)?;
		}
		Ok(())
	}

	/// Runs the validations, switching to error handlers on failure.
	fn perform_validate(
		&self,
		ctx: &mut RequestContext,
		method: &Arc<ExposedMethod>,
		decoration: Arc<Decoration>,
		args: CallArgs,
	) -> Result<Settled> {
		let original = args.clone();
		let mut visited = HashSet::from([method.id.clone()]);
		let mut current = Call {
			method: Arc::clone(method),
			func: Arc::clone(&method.func),
			decoration,
			args,
		};

		loop {
			let Some(intent) = self.run_validations(ctx, &current.decoration, &mut current.args)? else {
				return Ok(Settled::Call(current));
			};
			tracing::debug!(
				method = %current.method.id,
				errors = ?ctx.validation.errors,
				handler = ?intent.error_handler,
				"validation failed"
			);
			ctx.validation.error_handler = intent.error_handler.clone();

			match intent.error_handler {
				Some(ErrorHandler::Abort(err)) => return Ok(Settled::Respond(Response::from_http_error(&err))),
				Some(ErrorHandler::ValidationErrorsResponse) => {
					return Ok(Settled::Respond(validation_errors_response(ctx)?));
				}
				Some(ErrorHandler::Callable(func)) => {
					return Ok(Settled::Call(Call {
						func,
						args: original,
						..current
					}));
				}
				Some(ErrorHandler::Method(handler)) => {
					let decoration = self.decorations.decoration_in(ctx, &handler)?;
					let args = original.rebind(&handler.signature, &original.named);
					let chain = intent.chain_validation && visited.insert(handler.id.clone());
					let next = Call {
						func: Arc::clone(&handler.func),
						method: handler,
						decoration,
						args,
					};
					if chain && !next.decoration.validations.is_empty() {
						current = next;
						continue;
					}
					return Ok(Settled::Call(next));
				}
				None => {
					let json = negotiate(&current.decoration, ctx, &current.method.id)
						.is_some_and(|e| e.content_type.starts_with("application/json"));
					if json {
						return Ok(Settled::Respond(validation_errors_response(ctx)?));
					}
					return Ok(Settled::Call(Call {
						args: original,
						..current
					}));
				}
			}
		}
	}

	/// Feeds the arguments through every intent in order. Returns the
	/// failing intent, or `None` after storing the clean values in `args`.
	fn run_validations(
		&self,
		ctx: &mut RequestContext,
		decoration: &Decoration,
		args: &mut CallArgs,
	) -> Result<Option<ValidationIntent>> {
		if decoration.validations.is_empty() {
			return Ok(None);
		}
		let mut params = args.named.clone();
		for intent in &decoration.validations {
			ctx.validation.intent = Some(intent.clone());
			let outcome = match intent.schema.downcast_ref::<ValidateInContext>() {
				Some(in_context) => {
					let result = (in_context.0)(ctx, &params);
					self.validators.settle(intent.schema.type_name(), result)?
				}
				None => self.validators.validate(&intent.schema, &params)?,
			};
			match outcome {
				Outcome::Validated(clean) => params = clean,
				Outcome::Invalid(explosion) => {
					ctx.validation.errors = explosion.errors;
					ctx.validation.values = explosion.values;
					ctx.validation.exception = Some(explosion.message);
					return Ok(Some(intent.clone()));
				}
			}
			if ctx.validation.intent.is_none() {
				tracing::debug!("validation chain stopped");
				break;
			}
		}
		ctx.validation.intent = None;
		ctx.validation.values = serde_json::Value::Object(params.clone());
		args.named = params;
		Ok(None)
	}
}

impl std::fmt::Debug for Pipeline {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Pipeline")
			.field("decorations", &self.decorations)
			.field("hooks", &self.hooks)
			.finish_non_exhaustive()
	}
}
