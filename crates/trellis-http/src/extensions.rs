//! Type-keyed storage attached to requests.
//!
//! Extensions play the role of the request environment: upstream wrappers put
//! the identity, session, translator, locale or current transaction here and
//! the dispatch core picks them up. Clones share the same storage; use
//! [`Extensions::fork`] for storage of its own.

use parking_lot::Mutex;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

/// Type-safe extension storage.
#[derive(Clone, Default)]
pub struct Extensions {
	map: Arc<Mutex<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>>,
}

impl Extensions {
	/// Creates empty storage.
	///
	/// # Examples
	///
	/// ```
	/// use trellis_http::Extensions;
	///
	/// let extensions = Extensions::new();
	/// assert!(!extensions.contains::<String>());
	/// ```
	pub fn new() -> Self {
		Self::default()
	}

	/// Inserts a value, replacing any previous value of the same type.
	///
	/// # Examples
	///
	/// ```
	/// use trellis_http::Extensions;
	///
	/// let extensions = Extensions::new();
	/// extensions.insert(42u32);
	/// assert_eq!(extensions.get::<u32>(), Some(42));
	/// ```
	pub fn insert<T: Send + Sync + 'static>(&self, value: T) {
		self.map.lock().insert(TypeId::of::<T>(), Arc::new(value));
	}

	/// Returns a clone of the stored value.
	pub fn get<T>(&self) -> Option<T>
	where
		T: Clone + Send + Sync + 'static,
	{
		self.map
			.lock()
			.get(&TypeId::of::<T>())
			.and_then(|stored| stored.downcast_ref::<T>())
			.cloned()
	}

	pub fn contains<T: Send + Sync + 'static>(&self) -> bool {
		self.map.lock().contains_key(&TypeId::of::<T>())
	}

	/// Removes and returns the stored value.
	pub fn remove<T>(&self) -> Option<T>
	where
		T: Clone + Send + Sync + 'static,
	{
		let mut map = self.map.lock();
		let stored = map.remove(&TypeId::of::<T>())?;
		match stored.downcast::<T>() {
			Ok(value) => Some(Arc::try_unwrap(value).unwrap_or_else(|shared| T::clone(&shared))),
			Err(stored) => {
				map.insert(TypeId::of::<T>(), stored);
				None
			}
		}
	}

	/// Storage of its own holding the current entries. Changes to either
	/// side are not seen by the other.
	///
	/// # Examples
	///
	/// ```
	/// use trellis_http::Extensions;
	///
	/// let extensions = Extensions::new();
	/// extensions.insert(1u8);
	/// let fork = extensions.fork();
	/// fork.insert("scratch");
	/// assert_eq!(fork.get::<u8>(), Some(1));
	/// assert!(!extensions.contains::<&'static str>());
	/// ```
	pub fn fork(&self) -> Self {
		let entries = self.map.lock().clone();
		Self {
			map: Arc::new(Mutex::new(entries)),
		}
	}

	/// Makes this storage hold exactly the entries of `other`.
	pub fn adopt(&self, other: &Extensions) {
		if Arc::ptr_eq(&self.map, &other.map) {
			return;
		}
		let entries = other.map.lock().clone();
		*self.map.lock() = entries;
	}

	pub fn clear(&self) {
		self.map.lock().clear();
	}
}

/// Set on a request whose error response must reach the client unchanged,
/// bypassing error-page substitution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SkipErrorPage;

impl std::fmt::Debug for Extensions {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Extensions")
			.field("len", &self.map.lock().len())
			.finish()
	}
}
