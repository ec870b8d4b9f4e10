//! The controller tree.
//!
//! Controllers are built once at startup into a tree of [`ControllerNode`]s
//! mapping path segments to sub-controllers and exposed methods. Dynamic
//! subtrees come from a `lookup` function invoked during dispatch.

use indexmap::IndexMap;
use std::sync::Arc;
use trellis_core::Result;

use crate::context::RequestContext;
use crate::method::ExposedMethod;
use crate::predicates::Predicate;

/// Result of a lookup: the controller to continue from and the segments it
/// still has to consume.
pub type LookupResult = Option<(Arc<ControllerNode>, Vec<String>)>;

/// Builds a subtree for the remaining segments. Returning `None` lets
/// dispatch carry on unwinding.
pub type LookupFn =
	Arc<dyn Fn(&mut RequestContext, &[String]) -> Result<LookupResult> + Send + Sync>;

/// How a controller consumes segments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ControllerKind {
	#[default]
	Object,
	/// Dispatches on the HTTP verb. `custom_actions` are extra verbs
	/// accepted as the last segment.
	Rest { custom_actions: Vec<String> },
}

/// A node of the controller tree.
///
/// # Examples
///
/// ```
/// use trellis_controllers::{ControllerNode, ExposedMethod, Reply};
///
/// let root = ControllerNode::new("Root")
///     .method(ExposedMethod::new("index", |_, _| Ok(Reply::from("home"))).expose(""))
///     .child(
///         "sub",
///         ControllerNode::new("Sub").method(
///             ExposedMethod::new("hello", |_, args| {
///                 Ok(Reply::from(format!("Hello {}", args.require_str("name")?)))
///             })
///             .expose("")
///             .arg("name"),
///         ),
///     );
///
/// assert!(root.get_method("index").is_some());
/// assert_eq!(root.get_child("sub").unwrap().name, "Sub");
/// assert_eq!(root.all_methods().len(), 2);
/// ```
#[derive(Clone, Default)]
pub struct ControllerNode {
	pub name: String,
	pub kind: ControllerKind,
	children: IndexMap<String, Arc<ControllerNode>>,
	methods: IndexMap<String, Arc<ExposedMethod>>,
	lookup: Option<LookupFn>,
	security: Option<Arc<dyn Predicate>>,
}

impl ControllerNode {
	/// An object-dispatch controller.
	pub fn new(name: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			..Self::default()
		}
	}

	/// A REST controller.
	pub fn rest(name: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			kind: ControllerKind::Rest {
				custom_actions: Vec::new(),
			},
			..Self::default()
		}
	}

	/// Declares an extra verb on a REST controller.
	pub fn custom_action(mut self, action: impl Into<String>) -> Self {
		if let ControllerKind::Rest { custom_actions } = &mut self.kind {
			custom_actions.push(action.into());
		}
		self
	}

	pub fn child(mut self, segment: impl Into<String>, controller: ControllerNode) -> Self {
		self.children.insert(segment.into(), Arc::new(controller));
		self
	}

	pub fn shared_child(mut self, segment: impl Into<String>, controller: Arc<ControllerNode>) -> Self {
		self.children.insert(segment.into(), controller);
		self
	}

	/// Adds a method under its own name, qualifying its identifier with the
	/// controller name.
	pub fn method(self, method: ExposedMethod) -> Self {
		let qualified = format!("{}.{}", self.name, method.name);
		self.shared_method(Arc::new(method.qualified(qualified)))
	}

	/// Adds a method that is also referenced elsewhere, for instance as an
	/// error handler.
	pub fn shared_method(mut self, method: Arc<ExposedMethod>) -> Self {
		self.methods.insert(method.name.clone(), method);
		self
	}

	pub fn lookup<F>(mut self, lookup: F) -> Self
	where
		F: Fn(&mut RequestContext, &[String]) -> Result<LookupResult> + Send + Sync + 'static,
	{
		self.lookup = Some(Arc::new(lookup));
		self
	}

	/// Requires `predicate` for everything below this controller.
	pub fn allow_only(mut self, predicate: impl Predicate + 'static) -> Self {
		self.security = Some(Arc::new(predicate));
		self
	}

	pub fn is_rest(&self) -> bool {
		matches!(self.kind, ControllerKind::Rest { .. })
	}

	pub fn custom_actions(&self) -> &[String] {
		match &self.kind {
			ControllerKind::Rest { custom_actions } => custom_actions,
			ControllerKind::Object => &[],
		}
	}

	/// A sub-controller reachable from a URL segment.
	pub fn get_child(&self, segment: &str) -> Option<&Arc<ControllerNode>> {
		if segment.starts_with('_') {
			return None;
		}
		self.children.get(segment)
	}

	/// A method reachable from a URL segment. Names starting with an
	/// underscore are reserved.
	pub fn get_method(&self, segment: &str) -> Option<&Arc<ExposedMethod>> {
		if segment.starts_with('_') {
			return None;
		}
		self.methods.get(segment)
	}

	/// Any method by name, reserved ones included.
	pub fn method_named(&self, name: &str) -> Option<&Arc<ExposedMethod>> {
		self.methods.get(name)
	}

	pub fn get_lookup(&self) -> Option<&LookupFn> {
		self.lookup.as_ref()
	}

	pub fn security(&self) -> Option<&Arc<dyn Predicate>> {
		self.security.as_ref()
	}

	/// Every method of the static tree, depth first.
	pub fn all_methods(&self) -> Vec<Arc<ExposedMethod>> {
		let mut methods = Vec::new();
		self.collect_methods(&mut methods);
		methods
	}

	fn collect_methods(&self, out: &mut Vec<Arc<ExposedMethod>>) {
		out.extend(self.methods.values().cloned());
		for child in self.children.values() {
			child.collect_methods(out);
		}
	}
}

impl std::fmt::Debug for ControllerNode {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ControllerNode")
			.field("name", &self.name)
			.field("kind", &self.kind)
			.field("children", &self.children.keys().collect::<Vec<_>>())
			.field("methods", &self.methods.keys().collect::<Vec<_>>())
			.field("lookup", &self.lookup.is_some())
			.field("secured", &self.security.is_some())
			.finish()
	}
}
