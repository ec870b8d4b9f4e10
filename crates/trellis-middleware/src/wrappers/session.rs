//! Cookie-keyed sessions.
//!
//! The session wrapper loads the session named by the `session.key` cookie
//! (or starts a new one), exposes it through a [`SessionHandle`] in the
//! request extensions and, once the request is done, sends the cookie for
//! sessions that were saved. Controllers call [`Session::save`] to persist
//! changes, or the wrapper does it for them with `session.auto`.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use trellis_conf::Blueprint;
use trellis_core::{Params, Result};
use trellis_http::{Handler, Request, Response, Session, SessionHandle};
use uuid::Uuid;

use crate::wrapper::ApplicationWrapper;

/// Persistence of session data.
///
/// Stores serialize writes per session id.
pub trait SessionStore: Send + Sync {
	fn load(&self, id: &str) -> Option<Params>;

	fn save(&self, id: &str, data: &Params) -> Result<()>;

	fn delete(&self, id: &str);
}

#[derive(Debug, Clone)]
struct StoredData {
	data: Params,
	expires_at: DateTime<Utc>,
}

/// In-process session store with a fixed time to live.
#[derive(Debug)]
pub struct MemorySessionStore {
	sessions: Mutex<HashMap<String, StoredData>>,
	ttl: Duration,
}

impl MemorySessionStore {
	pub fn new(ttl: Duration) -> Self {
		Self {
			sessions: Mutex::new(HashMap::new()),
			ttl,
		}
	}

	/// Drops expired sessions.
	pub fn cleanup(&self) {
		let now = Utc::now();
		self.sessions.lock().retain(|_, stored| stored.expires_at > now);
	}

	pub fn len(&self) -> usize {
		self.sessions.lock().len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

impl Default for MemorySessionStore {
	fn default() -> Self {
		Self::new(Duration::hours(24))
	}
}

impl SessionStore for MemorySessionStore {
	fn load(&self, id: &str) -> Option<Params> {
		let mut sessions = self.sessions.lock();
		let stored = sessions.get(id)?;
		if stored.expires_at <= Utc::now() {
			sessions.remove(id);
			return None;
		}
		Some(stored.data.clone())
	}

	fn save(&self, id: &str, data: &Params) -> Result<()> {
		self.sessions.lock().insert(
			id.to_string(),
			StoredData {
				data: data.clone(),
				expires_at: Utc::now() + self.ttl,
			},
		);
		Ok(())
	}

	fn delete(&self, id: &str) {
		self.sessions.lock().remove(id);
	}
}

/// The session of one request.
struct RequestSession {
	id: String,
	is_new: bool,
	data: Mutex<Params>,
	accessed: AtomicBool,
	dirty: AtomicBool,
	saved: AtomicBool,
	store: Arc<dyn SessionStore>,
}

impl RequestSession {
	fn touch(&self) {
		self.accessed.store(true, Ordering::Relaxed);
	}

	fn modify(&self) {
		self.touch();
		self.dirty.store(true, Ordering::Relaxed);
	}
}

impl Session for RequestSession {
	fn id(&self) -> String {
		self.id.clone()
	}

	fn get(&self, key: &str) -> Option<Value> {
		self.touch();
		self.data.lock().get(key).cloned()
	}

	fn set(&self, key: &str, value: Value) {
		self.modify();
		self.data.lock().insert(key.to_string(), value);
	}

	fn remove(&self, key: &str) -> Option<Value> {
		self.modify();
		self.data.lock().remove(key)
	}

	fn save(&self) -> Result<()> {
		let data = self.data.lock().clone();
		self.store.save(&self.id, &data)?;
		self.dirty.store(false, Ordering::Relaxed);
		self.saved.store(true, Ordering::Relaxed);
		Ok(())
	}

	fn accessed(&self) -> bool {
		self.accessed.load(Ordering::Relaxed)
	}
}

/// Provides the request session.
pub struct SessionWrapper {
	store: Arc<dyn SessionStore>,
	cookie_name: String,
	cookie_path: String,
	auto_save: bool,
}

impl SessionWrapper {
	pub fn new(store: Arc<dyn SessionStore>) -> Self {
		Self {
			store,
			cookie_name: "trellis.session".to_string(),
			cookie_path: "/".to_string(),
			auto_save: false,
		}
	}

	pub fn cookie_name(mut self, name: impl Into<String>) -> Self {
		self.cookie_name = name.into();
		self
	}

	pub fn auto_save(mut self, enabled: bool) -> Self {
		self.auto_save = enabled;
		self
	}

	/// Reads `session.key`, `session.cookie_path`, `session.auto` and
	/// `session.timeout` (seconds). `None` unless `session.enabled`.
	pub fn from_config(config: &Blueprint) -> Option<Self> {
		if !config.bool_or("session.enabled", false) {
			return None;
		}
		let ttl = Duration::seconds(config.int_or("session.timeout", 86_400));
		let mut wrapper = Self::new(Arc::new(MemorySessionStore::new(ttl)))
			.cookie_name(config.str_or("session.key", "trellis.session"))
			.auto_save(config.bool_or("session.auto", false));
		wrapper.cookie_path = config.str_or("session.cookie_path", "/").to_string();
		Some(wrapper)
	}

	fn open(&self, request: &Request) -> Arc<RequestSession> {
		let existing = request
			.cookie(&self.cookie_name)
			.and_then(|id| self.store.load(&id).map(|data| (id, data)));
		let (id, data, is_new) = match existing {
			Some((id, data)) => (id, data, false),
			None => (Uuid::new_v4().to_string(), Params::new(), true),
		};
		Arc::new(RequestSession {
			id,
			is_new,
			data: Mutex::new(data),
			accessed: AtomicBool::new(false),
			dirty: AtomicBool::new(false),
			saved: AtomicBool::new(false),
			store: Arc::clone(&self.store),
		})
	}
}

#[async_trait]
impl ApplicationWrapper for SessionWrapper {
	fn name(&self) -> &str {
		"session"
	}

	async fn process(&self, request: Request, next: Arc<dyn Handler>) -> Result<Response> {
		let session = self.open(&request);
		request
			.extensions
			.insert(SessionHandle(Arc::clone(&session) as Arc<dyn Session>));

		let mut response = next.handle(request).await?;

		if self.auto_save && session.dirty.load(Ordering::Relaxed) {
			session.save()?;
		}
		if session.is_new && session.saved.load(Ordering::Relaxed) {
			tracing::debug!(session = %session.id, "new session saved");
			response.set_cookie(&self.cookie_name, &session.id, &self.cookie_path);
		}
		Ok(response)
	}
}
