//! The application-wrapper abstraction and the chain built from it.
//!
//! An application wrapper sits between the server and the dispatch core. It
//! receives each request together with the next handler of the chain and
//! decides what to do before and after calling it.
//!
//! Wrappers are registered in a [`WrapperRegistry`] with a [`Position`]:
//! `First` wrappers are outermost, `Last` wrappers innermost (closest to
//! dispatch) and `After(name)` places a wrapper right inside the named one.
//! The chain is instantiated once, when the application is built.

use async_trait::async_trait;
use std::sync::Arc;
use trellis_conf::Blueprint;
use trellis_core::{DependenciesList, Position, Result};
use trellis_http::{Handler, Request, Response};

/// A layer of the request chain.
///
/// # Examples
///
/// ```
/// use async_trait::async_trait;
/// use std::sync::Arc;
/// use trellis_http::{Handler, Request, Response};
/// use trellis_middleware::ApplicationWrapper;
///
/// struct PoweredBy;
///
/// #[async_trait]
/// impl ApplicationWrapper for PoweredBy {
///     fn name(&self) -> &str {
///         "powered_by"
///     }
///
///     async fn process(&self, request: Request, next: Arc<dyn Handler>) -> trellis_core::Result<Response> {
///         let response = next.handle(request).await?;
///         Ok(response.with_header("x-powered-by", "trellis"))
///     }
/// }
/// ```
#[async_trait]
pub trait ApplicationWrapper: Send + Sync {
	/// Unique name, used for ordering constraints.
	fn name(&self) -> &str;

	/// Processes a request, usually by calling `next`.
	///
	/// # Errors
	///
	/// Errors returned here travel up to the outer wrappers.
	async fn process(&self, request: Request, next: Arc<dyn Handler>) -> Result<Response>;

	/// Whether this wrapper runs for `request`. Skipped wrappers hand the
	/// request straight to the next layer.
	fn should_continue(&self, _request: &Request) -> bool {
		true
	}
}

/// Builds a wrapper from the application configuration. Returning `None`
/// leaves the wrapper out of the chain, which is how disabled wrappers opt out.
pub type WrapperFactory =
	Arc<dyn Fn(&Blueprint) -> Result<Option<Arc<dyn ApplicationWrapper>>> + Send + Sync>;

/// Ordered registrations of application wrappers.
#[derive(Clone, Default)]
pub struct WrapperRegistry {
	wrappers: DependenciesList<String, WrapperFactory>,
}

impl WrapperRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	/// Registers an already built wrapper.
	pub fn register(&mut self, wrapper: Arc<dyn ApplicationWrapper>, position: Position<String>) {
		let name = wrapper.name().to_string();
		let factory: WrapperFactory = Arc::new(
			move |_config: &Blueprint| -> Result<Option<Arc<dyn ApplicationWrapper>>> {
				Ok(Some(Arc::clone(&wrapper)))
			},
		);
		self.wrappers.add(name, factory, position);
	}

	/// Registers a wrapper built from configuration when the chain is.
	pub fn register_factory<F>(&mut self, name: impl Into<String>, factory: F, position: Position<String>)
	where
		F: Fn(&Blueprint) -> Result<Option<Arc<dyn ApplicationWrapper>>> + Send + Sync + 'static,
	{
		self.wrappers.add(name.into(), Arc::new(factory), position);
	}

	pub fn remove(&mut self, name: &str) -> bool {
		self.wrappers.remove(&name.to_string()).is_some()
	}

	pub fn contains(&self, name: &str) -> bool {
		self.wrappers.contains_key(&name.to_string())
	}

	/// Registered names, outermost first.
	pub fn names(&self) -> Vec<String> {
		self.wrappers.keys().into_iter().cloned().collect()
	}

	pub fn len(&self) -> usize {
		self.wrappers.len()
	}

	pub fn is_empty(&self) -> bool {
		self.wrappers.is_empty()
	}

	/// Instantiates every wrapper against `config` and nests them around
	/// `handler`.
	///
	/// # Errors
	///
	/// Fails when a factory fails.
	pub fn build_chain(&self, handler: Arc<dyn Handler>, config: &Blueprint) -> Result<WrapperChain> {
		let mut layers: Vec<Arc<dyn ApplicationWrapper>> = Vec::new();
		for (name, factory) in self.wrappers.resolve() {
			match factory(config)? {
				Some(wrapper) => layers.push(wrapper),
				None => tracing::debug!(wrapper = %name, "application wrapper disabled"),
			}
		}

		let names: Vec<String> = layers.iter().map(|w| w.name().to_string()).collect();
		tracing::info!(wrappers = ?names, "application wrapper chain built");

		let mut current = handler;
		for wrapper in layers.into_iter().rev() {
			current = Arc::new(Layer {
				wrapper,
				next: current,
			});
		}
		Ok(WrapperChain {
			handler: current,
			names,
		})
	}
}

impl std::fmt::Debug for WrapperRegistry {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("WrapperRegistry")
			.field("wrappers", &self.names())
			.finish()
	}
}

/// The assembled chain: the outermost layer and the names of the active
/// wrappers, outermost first.
#[derive(Clone)]
pub struct WrapperChain {
	handler: Arc<dyn Handler>,
	names: Vec<String>,
}

impl WrapperChain {
	/// A chain without wrappers.
	pub fn bare(handler: Arc<dyn Handler>) -> Self {
		Self {
			handler,
			names: Vec::new(),
		}
	}

	pub fn names(&self) -> &[String] {
		&self.names
	}
}

impl std::fmt::Debug for WrapperChain {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("WrapperChain")
			.field("names", &self.names)
			.finish()
	}
}

#[async_trait]
impl Handler for WrapperChain {
	async fn handle(&self, request: Request) -> Result<Response> {
		self.handler.handle(request).await
	}
}

struct Layer {
	wrapper: Arc<dyn ApplicationWrapper>,
	next: Arc<dyn Handler>,
}

#[async_trait]
impl Handler for Layer {
	async fn handle(&self, request: Request) -> Result<Response> {
		if !self.wrapper.should_continue(&request) {
			return self.next.handle(request).await;
		}
		self.wrapper.process(request, Arc::clone(&self.next)).await
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;

	struct Endpoint;

	#[async_trait]
	impl Handler for Endpoint {
		async fn handle(&self, _request: Request) -> Result<Response> {
			Ok(Response::ok().with_body("core"))
		}
	}

	struct Tag {
		name: &'static str,
		skip_path: Option<&'static str>,
	}

	impl Tag {
		fn new(name: &'static str) -> Arc<dyn ApplicationWrapper> {
			Arc::new(Self { name, skip_path: None })
		}
	}

	#[async_trait]
	impl ApplicationWrapper for Tag {
		fn name(&self) -> &str {
			self.name
		}

		async fn process(&self, request: Request, next: Arc<dyn Handler>) -> Result<Response> {
			let response = next.handle(request).await?;
			let body = format!("{}({})", self.name, response.text());
			Ok(response.with_body(body))
		}

		fn should_continue(&self, request: &Request) -> bool {
			self.skip_path != Some(request.path())
		}
	}

	fn get(uri: &str) -> Request {
		Request::builder().uri(uri).build().unwrap()
	}

	#[rstest]
	#[tokio::test]
	async fn test_outermost_first_on_entry() {
		let mut registry = WrapperRegistry::new();
		registry.register(Tag::new("tm"), Position::Last);
		registry.register(Tag::new("identity"), Position::First);
		registry.register(Tag::new("session"), Position::Middle);
		registry.register(Tag::new("i18n"), Position::After("session".into()));

		let chain = registry.build_chain(Arc::new(Endpoint), &Blueprint::new()).unwrap();
		assert_eq!(chain.names(), ["identity", "session", "i18n", "tm"]);

		let response = chain.handle(get("/")).await.unwrap();
		assert_eq!(response.text(), "identity(session(i18n(tm(core))))");
	}

	#[rstest]
	#[tokio::test]
	async fn test_disabled_factories_are_left_out() {
		let mut registry = WrapperRegistry::new();
		registry.register_factory(
			"cache",
			|config: &Blueprint| Ok(config.bool_or("cache.enabled", false).then(|| Tag::new("cache"))),
			Position::Middle,
		);
		registry.register(Tag::new("outer"), Position::First);

		let chain = registry.build_chain(Arc::new(Endpoint), &Blueprint::new()).unwrap();
		assert_eq!(chain.names(), ["outer"]);
		assert_eq!(registry.names(), ["outer", "cache"]);

		let config: Blueprint = [("cache.enabled", serde_json::json!(true))].into_iter().collect();
		let chain = registry.build_chain(Arc::new(Endpoint), &config).unwrap();
		assert_eq!(chain.handle(get("/")).await.unwrap().text(), "outer(cache(core))");
	}

	#[rstest]
	#[tokio::test]
	async fn test_should_continue_skips_layer() {
		let mut registry = WrapperRegistry::new();
		registry.register(
			Arc::new(Tag {
				name: "auth",
				skip_path: Some("/public"),
			}),
			Position::Middle,
		);
		let chain = registry.build_chain(Arc::new(Endpoint), &Blueprint::new()).unwrap();

		assert_eq!(chain.handle(get("/public")).await.unwrap().text(), "core");
		assert_eq!(chain.handle(get("/private")).await.unwrap().text(), "auth(core)");
	}

	#[rstest]
	fn test_remove_wrapper() {
		let mut registry = WrapperRegistry::new();
		registry.register(Tag::new("a"), Position::Middle);
		assert!(registry.contains("a"));
		assert!(registry.remove("a"));
		assert!(registry.is_empty());
	}
}
