//! In-process cache region and the wrapper exposing it to requests.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use trellis_conf::Blueprint;
use trellis_core::Result;
use trellis_http::{CacheHandle, CacheRegion, Handler, Request, Response};

use crate::wrapper::ApplicationWrapper;

#[derive(Debug, Clone)]
struct CacheEntry {
	value: Value,
	expires_at: Option<DateTime<Utc>>,
}

impl CacheEntry {
	fn is_expired(&self) -> bool {
		self.expires_at.is_some_and(|at| at <= Utc::now())
	}
}

/// A cache region held in memory.
///
/// Concurrent misses on the same key in [`CacheRegion::get_or_create`] run
/// the creation function once; the other callers wait and read its result.
///
/// # Examples
///
/// ```
/// use serde_json::json;
/// use trellis_http::CacheRegion;
/// use trellis_middleware::MemoryCache;
///
/// let cache = MemoryCache::new(None);
/// let value = cache.get_or_create("answer", &|| Ok(json!(42))).unwrap();
/// assert_eq!(value, json!(42));
/// assert_eq!(cache.get("answer"), Some(json!(42)));
/// ```
#[derive(Debug, Default)]
pub struct MemoryCache {
	entries: Mutex<HashMap<String, CacheEntry>>,
	creation_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
	expire: Option<Duration>,
}

impl MemoryCache {
	/// `expire` of `None` keeps entries until invalidated.
	pub fn new(expire: Option<Duration>) -> Self {
		Self {
			expire,
			..Self::default()
		}
	}

	fn creation_lock(&self, key: &str) -> Arc<Mutex<()>> {
		Arc::clone(self.creation_locks.lock().entry(key.to_string()).or_default())
	}

	fn release_creation_lock(&self, key: &str) {
		let mut locks = self.creation_locks.lock();
		// Only the map still holds it: nobody else is waiting.
		if locks.get(key).is_some_and(|lock| Arc::strong_count(lock) == 1) {
			locks.remove(key);
		}
	}
}

impl CacheRegion for MemoryCache {
	fn get(&self, key: &str) -> Option<Value> {
		let mut entries = self.entries.lock();
		let entry = entries.get(key)?;
		if entry.is_expired() {
			entries.remove(key);
			return None;
		}
		Some(entry.value.clone())
	}

	fn set(&self, key: &str, value: Value) {
		let expires_at = self.expire.map(|expire| Utc::now() + expire);
		self.entries
			.lock()
			.insert(key.to_string(), CacheEntry { value, expires_at });
	}

	fn invalidate(&self, key: &str) {
		self.entries.lock().remove(key);
	}

	fn get_or_create(&self, key: &str, create: &dyn Fn() -> Result<Value>) -> Result<Value> {
		if let Some(value) = self.get(key) {
			return Ok(value);
		}

		let lock = self.creation_lock(key);
		let result = {
			let _guard = lock.lock();
			match self.get(key) {
				Some(value) => Ok(value),
				None => {
					tracing::debug!(key, "cache miss");
					create().map(|value| {
						self.set(key, value.clone());
						value
					})
				}
			}
		};
		drop(lock);
		self.release_creation_lock(key);
		result
	}
}

/// Places a [`CacheHandle`] in the request extensions.
pub struct CacheWrapper {
	cache: Arc<dyn CacheRegion>,
}

impl CacheWrapper {
	pub fn new(cache: Arc<dyn CacheRegion>) -> Self {
		Self { cache }
	}

	/// A [`MemoryCache`] expiring after `cache.expire` seconds. `None` unless
	/// `cache.enabled`.
	pub fn from_config(config: &Blueprint) -> Option<Self> {
		if !config.bool_or("cache.enabled", false) {
			return None;
		}
		let expire = config.get_int("cache.expire").map(Duration::seconds);
		Some(Self::new(Arc::new(MemoryCache::new(expire))))
	}
}

#[async_trait]
impl ApplicationWrapper for CacheWrapper {
	fn name(&self) -> &str {
		"cache"
	}

	async fn process(&self, request: Request, next: Arc<dyn Handler>) -> Result<Response> {
		request.extensions.insert(CacheHandle(Arc::clone(&self.cache)));
		next.handle(request).await
	}
}
