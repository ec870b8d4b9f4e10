//! In-process client

use http::Method;
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use trellis_apps::Application;
use trellis_core::{Error, Result};
use trellis_http::{Handler, Request, Response};

use crate::response::TestResponse;

/// Sends requests straight to a handler, without a network.
///
/// Cookies set by responses are kept and sent back with later requests, so
/// sessions survive between calls.
///
/// # Examples
///
/// ```
/// use trellis_apps::Configurator;
/// use trellis_controllers::{ControllerNode, ExposedMethod, Reply};
/// use trellis_test::TestApp;
///
/// # tokio_test::block_on(async {
/// let root = ControllerNode::new("Root")
///     .method(ExposedMethod::new("index", |_, _| Ok(Reply::from("Hello World"))).expose(""));
/// let app = TestApp::new(Configurator::minimal().make_app(root, None).unwrap());
///
/// let response = app.get("/").await.unwrap();
/// response.assert_status(200).assert_contains("Hello World");
/// # });
/// ```
pub struct TestApp {
	handler: Arc<dyn Handler>,
	app: Option<Arc<Application>>,
	cookies: Mutex<IndexMap<String, String>>,
	default_headers: Vec<(String, String)>,
}

impl TestApp {
	pub fn new(app: Application) -> Self {
		Self::shared(Arc::new(app))
	}

	pub fn shared(app: Arc<Application>) -> Self {
		let mut client = Self::from_handler(Arc::clone(&app) as Arc<dyn Handler>);
		client.app = Some(app);
		client
	}

	/// A client for any handler, such as a bare dispatch core.
	pub fn from_handler(handler: Arc<dyn Handler>) -> Self {
		Self {
			handler,
			app: None,
			cookies: Mutex::new(IndexMap::new()),
			default_headers: Vec::new(),
		}
	}

	/// Sends `value` for `name` with every request.
	pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.default_headers.push((name.into(), value.into()));
		self
	}

	pub fn app(&self) -> Option<&Arc<Application>> {
		self.app.as_ref()
	}

	pub fn cookie(&self, name: &str) -> Option<String> {
		self.cookies.lock().get(name).cloned()
	}

	pub fn clear_cookies(&self) {
		self.cookies.lock().clear();
	}

	pub async fn get(&self, path: &str) -> Result<TestResponse> {
		self.send(Method::GET, path, &[], None).await
	}

	pub async fn get_with_headers(&self, path: &str, headers: &[(&str, &str)]) -> Result<TestResponse> {
		self.send(Method::GET, path, headers, None).await
	}

	/// POSTs `form` urlencoded.
	pub async fn post_form<T: Serialize + ?Sized>(&self, path: &str, form: &T) -> Result<TestResponse> {
		let body = serde_urlencoded::to_string(form).map_err(|e| Error::Internal(e.to_string()))?;
		let headers = [("content-type", "application/x-www-form-urlencoded")];
		self.send(Method::POST, path, &headers, Some(body.into_bytes())).await
	}

	pub async fn post_json<T: Serialize + ?Sized>(&self, path: &str, data: &T) -> Result<TestResponse> {
		let body = serde_json::to_vec(data)?;
		let headers = [("content-type", "application/json")];
		self.send(Method::POST, path, &headers, Some(body)).await
	}

	pub async fn put_json<T: Serialize + ?Sized>(&self, path: &str, data: &T) -> Result<TestResponse> {
		let body = serde_json::to_vec(data)?;
		let headers = [("content-type", "application/json")];
		self.send(Method::PUT, path, &headers, Some(body)).await
	}

	pub async fn delete(&self, path: &str) -> Result<TestResponse> {
		self.send(Method::DELETE, path, &[], None).await
	}

	/// Sends a prepared request. Stored cookies are added unless the request
	/// carries its own `Cookie` header.
	pub async fn request(&self, mut request: Request) -> Result<TestResponse> {
		for (name, value) in &self.default_headers {
			if !request.headers.contains_key(name.as_str()) {
				insert_header(&mut request, name, value)?;
			}
		}
		if !request.headers.contains_key("cookie")
			&& let Some(cookie) = self.cookie_header()
		{
			insert_header(&mut request, "cookie", &cookie)?;
		}

		let response = self.handler.handle(request).await?;
		self.store_cookies(&response);
		Ok(TestResponse::from(response))
	}

	async fn send(
		&self,
		method: Method,
		path: &str,
		headers: &[(&str, &str)],
		body: Option<Vec<u8>>,
	) -> Result<TestResponse> {
		let mut builder = Request::builder().method(method).uri(path);
		for (name, value) in headers {
			builder = builder.header(name, value);
		}
		if let Some(body) = body {
			builder = builder.body(body);
		}
		self.request(builder.build()?).await
	}

	fn cookie_header(&self) -> Option<String> {
		let cookies = self.cookies.lock();
		if cookies.is_empty() {
			return None;
		}
		Some(
			cookies
				.iter()
				.map(|(name, value)| format!("{name}={value}"))
				.collect::<Vec<_>>()
				.join("; "),
		)
	}

	fn store_cookies(&self, response: &Response) {
		let mut cookies = self.cookies.lock();
		for header in response.headers.get_all("set-cookie") {
			let Ok(header) = header.to_str() else {
				continue;
			};
			let pair = header.split(';').next().unwrap_or_default();
			if let Some((name, value)) = pair.split_once('=') {
				cookies.insert(name.trim().to_string(), value.trim().to_string());
			}
		}
	}
}

fn insert_header(request: &mut Request, name: &str, value: &str) -> Result<()> {
	let name = http::HeaderName::from_bytes(name.as_bytes()).map_err(|e| Error::Internal(e.to_string()))?;
	let value = http::HeaderValue::from_str(value).map_err(|e| Error::Internal(e.to_string()))?;
	request.headers.insert(name, value);
	Ok(())
}

impl std::fmt::Debug for TestApp {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("TestApp")
			.field("cookies", &self.cookies.lock().len())
			.field("default_headers", &self.default_headers)
			.finish()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::{fixture, rstest};
	use serde_json::json;
	use trellis_apps::Configurator;
	use trellis_controllers::{ControllerNode, ExposedMethod, Reply};

	#[fixture]
	fn client() -> TestApp {
		let root = ControllerNode::new("Root")
			.method(
				ExposedMethod::new("echo", |ctx, _| Ok(Reply::from(serde_json::Value::Object(ctx.params.clone()))))
					.expose("json"),
			)
			.method(
				ExposedMethod::new("visit", |ctx, _| {
					let session = ctx.session.clone().ok_or_else(|| Error::Internal("no session".into()))?;
					let visits = session.0.get("visits").and_then(|v| v.as_i64()).unwrap_or(0) + 1;
					session.0.set("visits", json!(visits));
					Ok(Reply::from(visits.to_string()))
				})
				.expose(""),
			);
		let conf: trellis_conf::Blueprint = [("session.enabled", "true"), ("session.auto", "true")]
			.into_iter()
			.collect();
		TestApp::new(Configurator::full_stack().make_app(root, Some(&conf)).unwrap())
	}

	#[rstest]
	#[tokio::test]
	async fn test_form_and_json_bodies(client: TestApp) {
		let response = client.post_form("/echo", &[("name", "Bob")]).await.unwrap();
		assert_eq!(response.json::<serde_json::Value>().unwrap(), json!({"name": "Bob"}));

		let response = client.post_json("/echo", &json!({"age": 42})).await.unwrap();
		assert_eq!(response.json::<serde_json::Value>().unwrap(), json!({"age": 42}));
	}

	#[rstest]
	#[tokio::test]
	async fn test_cookies_carry_the_session(client: TestApp) {
		assert_eq!(client.get("/visit").await.unwrap().text(), "1");
		assert!(client.cookie("trellis.session").is_some());
		assert_eq!(client.get("/visit").await.unwrap().text(), "2");

		client.clear_cookies();
		assert_eq!(client.get("/visit").await.unwrap().text(), "1");
	}
}
