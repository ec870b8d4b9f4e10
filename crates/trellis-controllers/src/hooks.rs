//! Hooks: named event subscriptions.
//!
//! Controller events form a closed set ([`ControllerEvent`]) delivered to
//! typed subscribers, application-wide ones first and then those of the
//! method. Arbitrary named hooks carry JSON values, and startup / shutdown
//! hooks run around the application lifetime.

use indexmap::IndexMap;
use parking_lot::RwLock;
use serde_json::Value;
use std::sync::Arc;
use trellis_core::Result;
use trellis_http::Response;

use crate::context::RequestContext;
use crate::method::ExposedMethod;
use crate::reply::Reply;
use crate::signature::CallArgs;

/// Controller events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookName {
	BeforeValidate,
	BeforeCall,
	BeforeRender,
	AfterRender,
}

impl HookName {
	pub fn as_str(&self) -> &'static str {
		match self {
			HookName::BeforeValidate => "before_validate",
			HookName::BeforeCall => "before_call",
			HookName::BeforeRender => "before_render",
			HookName::AfterRender => "after_render",
		}
	}
}

/// An event delivered to controller hooks.
pub enum ControllerEvent<'a> {
	BeforeValidate {
		method: &'a ExposedMethod,
		args: &'a mut CallArgs,
	},
	BeforeCall {
		method: &'a ExposedMethod,
		args: &'a mut CallArgs,
	},
	BeforeRender {
		method: &'a ExposedMethod,
		args: &'a CallArgs,
		output: &'a mut Reply,
	},
	AfterRender {
		method: &'a ExposedMethod,
		response: &'a mut Response,
	},
}

impl ControllerEvent<'_> {
	pub fn name(&self) -> HookName {
		match self {
			ControllerEvent::BeforeValidate { .. } => HookName::BeforeValidate,
			ControllerEvent::BeforeCall { .. } => HookName::BeforeCall,
			ControllerEvent::BeforeRender { .. } => HookName::BeforeRender,
			ControllerEvent::AfterRender { .. } => HookName::AfterRender,
		}
	}

	pub fn method(&self) -> &ExposedMethod {
		match self {
			ControllerEvent::BeforeValidate { method, .. }
			| ControllerEvent::BeforeCall { method, .. }
			| ControllerEvent::BeforeRender { method, .. }
			| ControllerEvent::AfterRender { method, .. } => method,
		}
	}
}

/// A subscriber to controller events.
pub type ControllerHook =
	Arc<dyn Fn(&mut RequestContext, &mut ControllerEvent<'_>) -> Result<()> + Send + Sync>;

/// Wraps a closure as a [`ControllerHook`].
pub fn controller_hook<F>(f: F) -> ControllerHook
where
	F: Fn(&mut RequestContext, &mut ControllerEvent<'_>) -> Result<()> + Send + Sync + 'static,
{
	Arc::new(f)
}

/// A subscriber to a named hook. Its output feeds the next subscriber in
/// [`HookNamespace::notify_with_value`].
pub type NamedHook = Arc<dyn Fn(&Value) -> Result<Value> + Send + Sync>;

/// A startup or shutdown subscriber.
pub type LifecycleHook = Arc<dyn Fn() -> Result<()> + Send + Sync>;

/// Application-wide hooks.
#[derive(Default)]
pub struct HookNamespace {
	controller: RwLock<IndexMap<HookName, Vec<ControllerHook>>>,
	named: RwLock<IndexMap<String, Vec<NamedHook>>>,
	startup: RwLock<Vec<LifecycleHook>>,
	shutdown: RwLock<Vec<LifecycleHook>>,
}

impl HookNamespace {
	pub fn new() -> Self {
		Self::default()
	}

	/// Subscribes to a controller event for every method.
	pub fn register_controller_hook(&self, name: HookName, hook: ControllerHook) {
		self.controller.write().entry(name).or_default().push(hook);
	}

	pub fn controller_hooks(&self, name: HookName) -> Vec<ControllerHook> {
		self.controller
			.read()
			.get(&name)
			.cloned()
			.unwrap_or_default()
	}

	pub fn register(&self, name: impl Into<String>, hook: NamedHook) {
		self.named.write().entry(name.into()).or_default().push(hook);
	}

	pub fn on_startup(&self, hook: LifecycleHook) {
		self.startup.write().push(hook);
	}

	pub fn on_shutdown(&self, hook: LifecycleHook) {
		self.shutdown.write().push(hook);
	}

	/// Calls every subscriber of `name` with `value`.
	///
	/// # Errors
	///
	/// Returns the first subscriber error, unless `trap_exceptions` is set,
	/// in which case failures are logged and the remaining subscribers run.
	pub fn notify(&self, name: &str, value: &Value, trap_exceptions: bool) -> Result<()> {
		let hooks = self.named.read().get(name).cloned().unwrap_or_default();
		for hook in hooks {
			if let Err(err) = hook(value) {
				if !trap_exceptions {
					return Err(err);
				}
				tracing::warn!(hook = %name, error = %err, "trapped hook failure");
			}
		}
		Ok(())
	}

	/// Pipes `value` through every subscriber of `name`, returning the last
	/// output.
	///
	/// # Examples
	///
	/// ```
	/// use trellis_controllers::HookNamespace;
	/// use serde_json::{Value, json};
	/// use std::sync::Arc;
	///
	/// let hooks = HookNamespace::new();
	/// hooks.register("price", Arc::new(|v: &Value| Ok(json!(v.as_i64().unwrap_or(0) * 2))));
	/// hooks.register("price", Arc::new(|v: &Value| Ok(json!(v.as_i64().unwrap_or(0) + 1))));
	///
	/// assert_eq!(hooks.notify_with_value("price", json!(10)).unwrap(), json!(21));
	/// ```
	pub fn notify_with_value(&self, name: &str, value: Value) -> Result<Value> {
		let hooks = self.named.read().get(name).cloned().unwrap_or_default();
		hooks.iter().try_fold(value, |value, hook| hook(&value))
	}

	/// Runs the startup hooks in registration order.
	pub fn startup(&self) -> Result<()> {
		let hooks = self.startup.read().clone();
		hooks.iter().try_for_each(|hook| hook())
	}

	/// Runs every shutdown hook, logging failures. Returns the first one.
	pub fn shutdown(&self) -> Result<()> {
		let hooks = self.shutdown.read().clone();
		let mut first_error = None;
		for hook in hooks {
			if let Err(err) = hook() {
				tracing::error!(error = %err, "shutdown hook failed");
				first_error.get_or_insert(err);
			}
		}
		first_error.map_or(Ok(()), Err)
	}
}

impl std::fmt::Debug for HookNamespace {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("HookNamespace")
			.field("controller", &self.controller.read().keys().collect::<Vec<_>>())
			.field("named", &self.named.read().keys().collect::<Vec<_>>())
			.finish_non_exhaustive()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use parking_lot::Mutex;
	use rstest::rstest;
	use serde_json::json;
	use trellis_core::Error;

	#[rstest]
	fn test_notify_trap_exceptions() {
		let hooks = HookNamespace::new();
		let seen = Arc::new(Mutex::new(Vec::new()));
		hooks.register("saved", Arc::new(|_: &Value| Err(Error::Internal("boom".into()))));
		let recorder = Arc::clone(&seen);
		hooks.register(
			"saved",
			Arc::new(move |v: &Value| {
				recorder.lock().push(v.clone());
				Ok(Value::Null)
			}),
		);

		assert!(hooks.notify("saved", &json!(1), false).is_err());
		assert!(seen.lock().is_empty());

		hooks.notify("saved", &json!(2), true).unwrap();
		assert_eq!(*seen.lock(), vec![json!(2)]);
	}

	#[rstest]
	fn test_unknown_hook_is_noop() {
		let hooks = HookNamespace::new();
		hooks.notify("nothing", &Value::Null, false).unwrap();
		assert_eq!(hooks.notify_with_value("nothing", json!("x")).unwrap(), json!("x"));
	}

	#[rstest]
	fn test_lifecycle_hooks() {
		let hooks = HookNamespace::new();
		let order = Arc::new(Mutex::new(Vec::new()));
		for label in ["a", "b"] {
			let order = Arc::clone(&order);
			hooks.on_startup(Arc::new(move || {
				order.lock().push(label);
				Ok(())
			}));
		}
		hooks.on_shutdown(Arc::new(|| Err(Error::Internal("closing".into()))));

		hooks.startup().unwrap();
		assert_eq!(*order.lock(), vec!["a", "b"]);
		assert!(hooks.shutdown().is_err());
	}
}
