use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::Service;
use hyper_util::rt::TokioIo;
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use trellis_apps::Application;
use trellis_http::{Handler, Request, Response};

/// Failure of the server itself, never of a request.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),
	#[error("HTTP connection error: {0}")]
	Hyper(#[from] hyper::Error),
}

/// Serves a [`Handler`], usually an [`Application`], over HTTP/1.
pub struct HttpServer {
	handler: Arc<dyn Handler>,
	app: Option<Arc<Application>>,
	script_name: String,
}

impl HttpServer {
	pub fn new(handler: Arc<dyn Handler>) -> Self {
		Self {
			handler,
			app: None,
			script_name: String::new(),
		}
	}

	/// Serves `app` and runs its shutdown hooks when the server stops.
	///
	/// # Examples
	///
	/// ```no_run
	/// use std::sync::Arc;
	/// use trellis_apps::Configurator;
	/// use trellis_controllers::{ControllerNode, ExposedMethod, Reply};
	/// use trellis_server::{HttpServer, shutdown_signal};
	///
	/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
	/// let root = ControllerNode::new("Root")
	///     .method(ExposedMethod::new("index", |_, _| Ok(Reply::from("Hello World"))).expose(""));
	/// let app = Arc::new(Configurator::full_stack().make_app(root, None)?);
	///
	/// HttpServer::for_app(app)
	///     .listen_with_shutdown("127.0.0.1:8080".parse()?, shutdown_signal())
	///     .await?;
	/// # Ok(())
	/// # }
	/// ```
	pub fn for_app(app: Arc<Application>) -> Self {
		let mut server = Self::new(Arc::clone(&app) as Arc<dyn Handler>);
		server.app = Some(app);
		server
	}

	/// Mount point of the application, seen by requests as their script name.
	pub fn script_name(mut self, script_name: impl Into<String>) -> Self {
		self.script_name = script_name.into().trim_end_matches('/').to_string();
		self
	}

	/// Serves until an accept fails.
	pub async fn listen(self, addr: SocketAddr) -> Result<(), ServerError> {
		let listener = TcpListener::bind(addr).await?;
		self.serve(listener, std::future::pending()).await
	}

	/// Serves until `signal` completes.
	pub async fn listen_with_shutdown(
		self,
		addr: SocketAddr,
		signal: impl Future<Output = ()>,
	) -> Result<(), ServerError> {
		let listener = TcpListener::bind(addr).await?;
		self.serve(listener, signal).await
	}

	/// Accepts connections from `listener` until `signal` completes.
	/// Connections already accepted finish on their own tasks.
	pub async fn serve(self, listener: TcpListener, signal: impl Future<Output = ()>) -> Result<(), ServerError> {
		tracing::info!(addr = %listener.local_addr()?, "server listening");
		tokio::pin!(signal);

		let result = loop {
			tokio::select! {
				accepted = listener.accept() => {
					let (stream, remote_addr) = match accepted {
						Ok(accepted) => accepted,
						Err(err) => break Err(ServerError::from(err)),
					};
					let handler = Arc::clone(&self.handler);
					let script_name = self.script_name.clone();
					tokio::spawn(async move {
						if let Err(err) = Self::handle_connection(stream, remote_addr, handler, script_name).await {
							tracing::debug!(%remote_addr, error = %err, "connection closed with an error");
						}
					});
				}
				() = &mut signal => {
					tracing::info!("shutdown signal received, stopping server");
					break Ok(());
				}
			}
		};

		if let Some(app) = &self.app
			&& let Err(err) = app.shutdown()
		{
			tracing::error!(error = %err, "application shutdown failed");
		}
		result
	}

	/// Serves the HTTP/1 requests of one connection.
	pub async fn handle_connection(
		stream: TcpStream,
		remote_addr: SocketAddr,
		handler: Arc<dyn Handler>,
		script_name: String,
	) -> Result<(), ServerError> {
		let service = RequestService {
			handler,
			remote_addr,
			script_name,
		};
		http1::Builder::new()
			.serve_connection(TokioIo::new(stream), service)
			.await?;
		Ok(())
	}
}

impl std::fmt::Debug for HttpServer {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("HttpServer")
			.field("script_name", &self.script_name)
			.field("app", &self.app.is_some())
			.finish()
	}
}

struct RequestService {
	handler: Arc<dyn Handler>,
	remote_addr: SocketAddr,
	script_name: String,
}

impl Service<hyper::Request<Incoming>> for RequestService {
	type Response = hyper::Response<Full<Bytes>>;
	type Error = Box<dyn std::error::Error + Send + Sync>;
	type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send + 'static>>;

	fn call(&self, req: hyper::Request<Incoming>) -> Self::Future {
		let handler = Arc::clone(&self.handler);
		let remote_addr = self.remote_addr;
		let script_name = self.script_name.clone();

		Box::pin(async move {
			let (parts, body) = req.into_parts();
			let body = body.collect().await?.to_bytes();

			let mut request = Request::new(parts.method, parts.uri, parts.version, parts.headers, body);
			request.remote_addr = Some(remote_addr);
			request.script_name = script_name;

			let response = handler.handle(request).await.unwrap_or_else(|err| {
				tracing::error!(error = %err, "handler failed");
				Response::from_error(&err, false)
			});

			let mut builder = hyper::Response::builder().status(response.status);
			for (name, value) in &response.headers {
				builder = builder.header(name, value);
			}
			Ok(builder.body(Full::new(response.body))?)
		})
	}
}

/// Serves `handler` on `addr` until an accept fails.
pub async fn serve(addr: SocketAddr, handler: Arc<dyn Handler>) -> Result<(), ServerError> {
	HttpServer::new(handler).listen(addr).await
}

/// Completes on Ctrl-C.
pub async fn shutdown_signal() {
	if let Err(err) = tokio::signal::ctrl_c().await {
		tracing::error!(error = %err, "cannot listen for the shutdown signal");
		std::future::pending::<()>().await;
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;
	use tokio::io::{AsyncReadExt, AsyncWriteExt};
	use tokio::sync::oneshot;
	use trellis_core::Result;

	struct Echo;

	#[async_trait::async_trait]
	impl Handler for Echo {
		async fn handle(&self, request: Request) -> Result<Response> {
			Ok(Response::ok()
				.with_header("x-script-name", &request.script_name)
				.with_body(format!("{} {}", request.method, request.path())))
		}
	}

	async fn roundtrip(addr: SocketAddr, raw: &str) -> String {
		let mut stream = TcpStream::connect(addr).await.unwrap();
		stream.write_all(raw.as_bytes()).await.unwrap();
		let mut out = String::new();
		stream.read_to_string(&mut out).await.unwrap();
		out
	}

	#[rstest]
	#[tokio::test]
	async fn test_serves_requests_until_signal() {
		let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
		let addr = listener.local_addr().unwrap();
		let (stop, stopped) = oneshot::channel::<()>();
		let server = tokio::spawn(
			HttpServer::new(Arc::new(Echo))
				.script_name("/app/")
				.serve(listener, async {
					let _ = stopped.await;
				}),
		);

		let response = roundtrip(addr, "GET /hello HTTP/1.1\r\nHost: test\r\nConnection: close\r\n\r\n").await;
		assert!(response.starts_with("HTTP/1.1 200 OK"));
		assert!(response.contains("x-script-name: /app"));
		assert!(response.ends_with("GET /hello"));

		stop.send(()).unwrap();
		server.await.unwrap().unwrap();
	}
}
