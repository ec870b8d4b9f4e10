//! Interfaces of the per-request collaborators the core consumes.
//!
//! Sessions, translators and cache regions are provided by application
//! wrappers, which place handles to them in the request extensions. The core
//! only talks to these traits.

use serde_json::Value;
use std::sync::Arc;
use trellis_core::Result;

/// A user session.
pub trait Session: Send + Sync {
	fn id(&self) -> String;

	fn get(&self, key: &str) -> Option<Value>;

	fn set(&self, key: &str, value: Value);

	fn remove(&self, key: &str) -> Option<Value>;

	/// Persists the session to its store.
	fn save(&self) -> Result<()>;

	/// Whether the session was read or written during this request.
	fn accessed(&self) -> bool;
}

/// Handle to the current session, stored in request extensions.
#[derive(Clone)]
pub struct SessionHandle(pub Arc<dyn Session>);

/// Message catalog lookup for the request languages.
pub trait Translator: Send + Sync {
	fn gettext(&self, message: &str) -> String;

	fn ngettext(&self, singular: &str, plural: &str, n: u64) -> String {
		if n == 1 {
			self.gettext(singular)
		} else {
			self.gettext(plural)
		}
	}

	/// Languages this translator resolves messages for, most preferred first.
	fn languages(&self) -> Vec<String>;
}

/// Translator returning messages unchanged.
#[derive(Debug, Clone, Default)]
pub struct NullTranslator;

impl Translator for NullTranslator {
	fn gettext(&self, message: &str) -> String {
		message.to_string()
	}

	fn languages(&self) -> Vec<String> {
		Vec::new()
	}
}

/// Handle to the request translator, stored in request extensions.
#[derive(Clone)]
pub struct TranslatorHandle(pub Arc<dyn Translator>);

/// Languages selected for the current request, most preferred first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Locale {
	pub languages: Vec<String>,
}

impl Locale {
	pub fn primary(&self) -> Option<&str> {
		self.languages.first().map(String::as_str)
	}
}

/// A cache region.
pub trait CacheRegion: Send + Sync {
	fn get(&self, key: &str) -> Option<Value>;

	fn set(&self, key: &str, value: Value);

	fn invalidate(&self, key: &str);

	/// Returns the cached value or computes it. At most one computation per
	/// key runs at a time; concurrent callers wait for it.
	fn get_or_create(&self, key: &str, create: &dyn Fn() -> Result<Value>) -> Result<Value>;
}

/// Handle to the cache, stored in request extensions.
#[derive(Clone)]
pub struct CacheHandle(pub Arc<dyn CacheRegion>);

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;

	#[rstest]
	fn test_null_translator() {
		let translator = NullTranslator;
		assert_eq!(translator.gettext("Hello"), "Hello");
		assert_eq!(translator.ngettext("apple", "apples", 2), "apples");
		assert_eq!(translator.ngettext("apple", "apples", 1), "apple");
	}

	#[rstest]
	fn test_locale_primary() {
		let locale = Locale {
			languages: vec!["it".into(), "en".into()],
		};
		assert_eq!(locale.primary(), Some("it"));
		assert_eq!(Locale::default().primary(), None);
	}
}
