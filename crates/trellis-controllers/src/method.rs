//! Exposed controller methods and their decoration requests.
//!
//! An [`ExposedMethod`] pairs a callable with a [`Signature`] and the list of
//! [`DecorationOp`]s declared on it. The ops are not interpreted here: the
//! decoration registry turns them into a decoration once the rendering
//! engines are known.

use serde_json::{Map, Value};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use trellis_core::{HttpError, Params, Result};
use trellis_validation::{BoxError, SchemaRef};

use crate::context::RequestContext;
use crate::hooks::{ControllerHook, HookName};
use crate::paginate::PaginateSpec;
use crate::predicates::Predicate;
use crate::reply::Reply;
use crate::signature::{CallArgs, Signature};

static NEXT_METHOD_ID: AtomicU64 = AtomicU64::new(1);

/// Identifies one exposed method in the decoration side table.
///
/// Every call to [`MethodId::new`] yields a distinct identifier, even for
/// equal names.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodId {
	seq: u64,
	name: Arc<str>,
}

impl MethodId {
	pub fn new(name: impl AsRef<str>) -> Self {
		Self {
			seq: NEXT_METHOD_ID.fetch_add(1, Ordering::Relaxed),
			name: Arc::from(name.as_ref()),
		}
	}

	pub fn name(&self) -> &str {
		&self.name
	}
}

impl std::fmt::Display for MethodId {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(&self.name)
	}
}

/// The callable behind an exposed method.
pub type MethodFn = Arc<dyn Fn(&mut RequestContext, &CallArgs) -> Result<Reply> + Send + Sync>;

/// Invokes a method. The base caller applies the bound arguments.
pub type ControllerCaller =
	Arc<dyn Fn(&mut RequestContext, &MethodFn, &CallArgs) -> Result<Reply> + Send + Sync>;

/// Wraps a caller into another caller.
pub type ControllerWrapper = Arc<dyn Fn(ControllerCaller) -> ControllerCaller + Send + Sync>;

/// One `expose` registration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExposeSpec {
	/// Engine name, `engine:template`, or a template of the default engine.
	pub template: String,
	pub content_type: Option<String>,
	/// Keys removed from the output before rendering.
	pub exclude_names: Vec<String>,
	/// Options handed to the engine.
	pub render_params: Map<String, Value>,
	/// Registers the exposition under a custom format tag instead of a
	/// content type.
	pub custom_format: Option<String>,
}

impl ExposeSpec {
	pub fn new(template: impl Into<String>) -> Self {
		Self {
			template: template.into(),
			..Self::default()
		}
	}

	pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
		self.content_type = Some(content_type.into());
		self
	}

	pub fn exclude(mut self, name: impl Into<String>) -> Self {
		self.exclude_names.push(name.into());
		self
	}

	pub fn render_param(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
		self.render_params.insert(name.into(), value.into());
		self
	}

	pub fn custom_format(mut self, format: impl Into<String>) -> Self {
		self.custom_format = Some(format.into());
		self
	}
}

/// What to do when validation fails.
#[derive(Clone)]
pub enum ErrorHandler {
	/// Re-dispatch to another exposed method with the original arguments.
	Method(Arc<ExposedMethod>),
	/// Respond with an HTTP error.
	Abort(HttpError),
	/// Respond 412 with the errors and values as JSON.
	ValidationErrorsResponse,
	/// Call a function with the original arguments, rendered with the
	/// exposition of the failing method.
	Callable(MethodFn),
}

impl std::fmt::Debug for ErrorHandler {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			ErrorHandler::Method(method) => write!(f, "Method({})", method.id),
			ErrorHandler::Abort(err) => write!(f, "Abort({err})"),
			ErrorHandler::ValidationErrorsResponse => f.write_str("ValidationErrorsResponse"),
			ErrorHandler::Callable(_) => f.write_str("Callable"),
		}
	}
}

type ContextValidatorFn = dyn Fn(&mut RequestContext, &Params) -> std::result::Result<Params, BoxError> + Send + Sync;

/// A validation schema run by the pipeline with the request context at
/// hand. Clearing `ctx.validation.intent` stops the validations left.
#[derive(Clone)]
pub struct ValidateInContext(pub Arc<ContextValidatorFn>);

impl ValidateInContext {
	pub fn new<F>(validate: F) -> Self
	where
		F: Fn(&mut RequestContext, &Params) -> std::result::Result<Params, BoxError> + Send + Sync + 'static,
	{
		Self(Arc::new(validate))
	}
}

impl From<ValidateInContext> for SchemaRef {
	fn from(schema: ValidateInContext) -> Self {
		SchemaRef::new(schema)
	}
}

/// A validation registration.
#[derive(Debug, Clone)]
pub struct ValidationIntent {
	pub schema: SchemaRef,
	pub error_handler: Option<ErrorHandler>,
	/// Lets the validations of a method error handler run too.
	pub chain_validation: bool,
}

impl ValidationIntent {
	pub fn new(schema: impl Into<SchemaRef>) -> Self {
		Self {
			schema: schema.into(),
			error_handler: None,
			chain_validation: false,
		}
	}

	pub fn error_handler(mut self, handler: ErrorHandler) -> Self {
		self.error_handler = Some(handler);
		self
	}

	pub fn chain_validation(mut self, chain: bool) -> Self {
		self.chain_validation = chain;
		self
	}
}

/// A decoration request recorded on a method.
#[derive(Clone)]
pub enum DecorationOp {
	Expose(ExposeSpec),
	Validate(ValidationIntent),
	Require(Arc<dyn Predicate>),
	Hook(HookName, ControllerHook),
	Wrap(ControllerWrapper),
	Paginate(PaginateSpec),
	/// `true` for `with_trailing_slash`.
	TrailingSlash(bool),
}

impl std::fmt::Debug for DecorationOp {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			DecorationOp::Expose(spec) => f.debug_tuple("Expose").field(spec).finish(),
			DecorationOp::Validate(intent) => f.debug_tuple("Validate").field(intent).finish(),
			DecorationOp::Require(_) => f.write_str("Require"),
			DecorationOp::Hook(name, _) => write!(f, "Hook({})", name.as_str()),
			DecorationOp::Wrap(_) => f.write_str("Wrap"),
			DecorationOp::Paginate(spec) => f.debug_tuple("Paginate").field(spec).finish(),
			DecorationOp::TrailingSlash(with) => f.debug_tuple("TrailingSlash").field(with).finish(),
		}
	}
}

/// A controller method reachable through dispatch.
///
/// # Examples
///
/// ```
/// use trellis_controllers::{ExposedMethod, Reply};
///
/// let hello = ExposedMethod::new("hello", |_ctx, args| {
///     Ok(Reply::from(format!("Hello {}", args.str("name").unwrap_or("stranger"))))
/// })
/// .expose("")
/// .arg("name");
///
/// assert_eq!(hello.name, "hello");
/// assert_eq!(hello.signature.fixed_len(), 1);
/// ```
#[derive(Clone)]
pub struct ExposedMethod {
	pub id: MethodId,
	pub name: String,
	pub signature: Signature,
	pub func: MethodFn,
	pub ops: Vec<DecorationOp>,
	/// Method this one overrides, whose decoration is merged first when
	/// `inherit` is set.
	pub parent: Option<Arc<ExposedMethod>>,
	pub inherit: bool,
}

impl ExposedMethod {
	pub fn new<F>(name: impl Into<String>, func: F) -> Self
	where
		F: Fn(&mut RequestContext, &CallArgs) -> Result<Reply> + Send + Sync + 'static,
	{
		let name = name.into();
		Self {
			id: MethodId::new(&name),
			name,
			signature: Signature::new(),
			func: Arc::new(func),
			ops: Vec::new(),
			parent: None,
			inherit: false,
		}
	}

	/// Renames the identifier, usually to `Controller.method`.
	pub fn qualified(mut self, qualified_name: impl AsRef<str>) -> Self {
		self.id = MethodId::new(qualified_name);
		self
	}

	/// Exposes the method with a template, an engine name, or
	/// `engine:template`. An empty string exposes raw output.
	pub fn expose(self, template: impl Into<String>) -> Self {
		self.expose_with(ExposeSpec::new(template))
	}

	pub fn expose_with(mut self, spec: ExposeSpec) -> Self {
		self.ops.push(DecorationOp::Expose(spec));
		self
	}

	pub fn validate(self, schema: impl Into<SchemaRef>) -> Self {
		self.validate_with(ValidationIntent::new(schema))
	}

	pub fn validate_with(mut self, intent: ValidationIntent) -> Self {
		self.ops.push(DecorationOp::Validate(intent));
		self
	}

	pub fn require(mut self, predicate: impl Predicate + 'static) -> Self {
		self.ops.push(DecorationOp::Require(Arc::new(predicate)));
		self
	}

	pub fn hook(mut self, name: HookName, hook: ControllerHook) -> Self {
		self.ops.push(DecorationOp::Hook(name, hook));
		self
	}

	/// Wraps the method call. Wrappers registered later run outside earlier
	/// ones.
	pub fn wrap(mut self, wrapper: ControllerWrapper) -> Self {
		self.ops.push(DecorationOp::Wrap(wrapper));
		self
	}

	/// Paginates the list stored under `name` in the output.
	pub fn paginate(mut self, name: impl Into<String>, items_per_page: usize) -> Self {
		self.ops
			.push(DecorationOp::Paginate(PaginateSpec::new(name, items_per_page)));
		self
	}

	pub fn paginate_with(mut self, spec: PaginateSpec) -> Self {
		self.ops.push(DecorationOp::Paginate(spec));
		self
	}

	pub fn with_trailing_slash(mut self) -> Self {
		self.ops.push(DecorationOp::TrailingSlash(true));
		self
	}

	pub fn without_trailing_slash(mut self) -> Self {
		self.ops.push(DecorationOp::TrailingSlash(false));
		self
	}

	/// Declares that this method overrides `parent`, merging its decoration.
	pub fn inherit(mut self, parent: Arc<ExposedMethod>) -> Self {
		self.parent = Some(parent);
		self.inherit = true;
		self
	}

	pub fn signature(mut self, signature: Signature) -> Self {
		self.signature = signature;
		self
	}

	pub fn arg(mut self, name: impl Into<String>) -> Self {
		self.signature = self.signature.arg(name);
		self
	}

	pub fn optional(mut self, name: impl Into<String>) -> Self {
		self.signature = self.signature.optional(name);
		self
	}

	pub fn varargs(mut self) -> Self {
		self.signature = self.signature.varargs();
		self
	}

	pub fn varkw(mut self) -> Self {
		self.signature = self.signature.varkw();
		self
	}

	/// Whether any `expose` was declared, here or on an inherited parent.
	pub fn declares_exposition(&self) -> bool {
		self.ops.iter().any(|op| matches!(op, DecorationOp::Expose(_)))
			|| (self.inherit
				&& self
					.parent
					.as_ref()
					.is_some_and(|parent| parent.declares_exposition()))
	}

	pub fn into_shared(self) -> Arc<Self> {
		Arc::new(self)
	}
}

impl std::fmt::Debug for ExposedMethod {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ExposedMethod")
			.field("id", &self.id)
			.field("signature", &self.signature)
			.field("ops", &self.ops)
			.field("inherit", &self.inherit)
			.finish_non_exhaustive()
	}
}

/// Wraps a closure as a [`ControllerWrapper`].
///
/// # Examples
///
/// ```
/// use trellis_controllers::{CallArgs, ExposedMethod, MethodFn, RequestContext, controller_wrapper};
/// use std::sync::Arc;
///
/// let timed = controller_wrapper(|next| {
///     Arc::new(move |ctx: &mut RequestContext, func: &MethodFn, args: &CallArgs| {
///         let started = std::time::Instant::now();
///         let reply = next(ctx, func, args);
///         tracing::debug!(elapsed = ?started.elapsed(), "controller call");
///         reply
///     })
/// });
///
/// let method = ExposedMethod::new("index", |_, _| Ok("ok".into())).expose("").wrap(timed);
/// assert_eq!(method.ops.len(), 2);
/// ```
pub fn controller_wrapper<F>(f: F) -> ControllerWrapper
where
	F: Fn(ControllerCaller) -> ControllerCaller + Send + Sync + 'static,
{
	Arc::new(f)
}

/// The caller applying the bound arguments to the method.
pub fn base_caller() -> ControllerCaller {
	Arc::new(|ctx: &mut RequestContext, func: &MethodFn, args: &CallArgs| func(ctx, args))
}
