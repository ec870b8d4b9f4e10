//! Request language selection.
//!
//! Languages come from the session (`i18n.lang_session_key`), then from
//! `Accept-Language` restricted to `i18n.languages` when that list is set,
//! with `i18n.lang` appended as fallback. The result is stored as a
//! [`Locale`] together with a [`TranslatorHandle`] over the message catalogs.

use async_trait::async_trait;
use indexmap::IndexMap;
use std::collections::HashMap;
use std::sync::Arc;
use trellis_conf::Blueprint;
use trellis_core::Result;
use trellis_core::negotiation::parse_accept_language;
use trellis_http::{Handler, Locale, Request, Response, SessionHandle, Translator, TranslatorHandle};

use crate::wrapper::ApplicationWrapper;

/// Message catalogs keyed by language tag, then by message id.
#[derive(Debug, Clone, Default)]
pub struct Catalogs {
	catalogs: HashMap<String, HashMap<String, String>>,
}

impl Catalogs {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn add<I, K, V>(mut self, language: impl Into<String>, messages: I) -> Self
	where
		I: IntoIterator<Item = (K, V)>,
		K: Into<String>,
		V: Into<String>,
	{
		self.catalogs
			.entry(language.into())
			.or_default()
			.extend(messages.into_iter().map(|(k, v)| (k.into(), v.into())));
		self
	}

	fn lookup(&self, language: &str, message: &str) -> Option<&str> {
		self.catalogs
			.get(language)
			.and_then(|catalog| catalog.get(message))
			.map(String::as_str)
	}
}

/// Translates through the catalogs of the request languages, in order.
#[derive(Debug, Clone)]
pub struct CatalogTranslator {
	catalogs: Arc<Catalogs>,
	languages: Vec<String>,
}

impl CatalogTranslator {
	pub fn new(catalogs: Arc<Catalogs>, languages: Vec<String>) -> Self {
		Self { catalogs, languages }
	}
}

impl Translator for CatalogTranslator {
	fn gettext(&self, message: &str) -> String {
		self.languages
			.iter()
			.find_map(|language| self.catalogs.lookup(language, message))
			.unwrap_or(message)
			.to_string()
	}

	fn languages(&self) -> Vec<String> {
		self.languages.clone()
	}
}

pub struct I18nWrapper {
	catalogs: Arc<Catalogs>,
	default_lang: Option<String>,
	available: Vec<String>,
	session_key: String,
}

impl I18nWrapper {
	pub fn new(catalogs: Catalogs) -> Self {
		Self {
			catalogs: Arc::new(catalogs),
			default_lang: None,
			available: Vec::new(),
			session_key: "tg_lang".to_string(),
		}
	}

	pub fn default_lang(mut self, lang: impl Into<String>) -> Self {
		self.default_lang = Some(lang.into());
		self
	}

	pub fn available(mut self, languages: Vec<String>) -> Self {
		self.available = languages;
		self
	}

	/// `None` unless `i18n.enabled`.
	pub fn from_config(config: &Blueprint, catalogs: Catalogs) -> Option<Self> {
		if !config.bool_or("i18n.enabled", false) {
			return None;
		}
		let mut wrapper = Self::new(catalogs).available(config.get_list("i18n.languages"));
		wrapper.default_lang = config.get_str("i18n.lang").map(str::to_string);
		wrapper.session_key = config.str_or("i18n.lang_session_key", "tg_lang").to_string();
		Some(wrapper)
	}

	fn is_available(&self, tag: &str) -> bool {
		self.available.is_empty() || self.available.iter().any(|lang| lang == tag)
	}

	/// Languages for `request`, most preferred first, without duplicates.
	pub fn select_languages(&self, request: &Request) -> Vec<String> {
		let mut candidates: Vec<String> = Vec::new();

		if let Some(SessionHandle(session)) = request.extensions.get::<SessionHandle>()
			&& let Some(value) = session.get(&self.session_key)
		{
			match value {
				serde_json::Value::String(lang) => candidates.push(lang),
				serde_json::Value::Array(langs) => {
					candidates.extend(langs.iter().filter_map(|l| l.as_str().map(str::to_string)));
				}
				_ => {}
			}
		}

		if candidates.is_empty()
			&& let Some(header) = request.accept_language()
		{
			for language in parse_accept_language(header) {
				let tag = language.tag();
				if self.is_available(&tag) {
					candidates.push(tag);
				} else if language.region.is_some() && self.is_available(&language.code) {
					candidates.push(language.code);
				}
			}
		}

		candidates.extend(self.default_lang.clone());

		let mut seen: IndexMap<String, ()> = IndexMap::new();
		for candidate in candidates {
			seen.entry(candidate).or_insert(());
		}
		seen.into_keys().collect()
	}
}

#[async_trait]
impl ApplicationWrapper for I18nWrapper {
	fn name(&self) -> &str {
		"i18n"
	}

	async fn process(&self, request: Request, next: Arc<dyn Handler>) -> Result<Response> {
		let languages = self.select_languages(&request);
		tracing::debug!(?languages, "request languages selected");
		request.extensions.insert(TranslatorHandle(Arc::new(CatalogTranslator::new(
			Arc::clone(&self.catalogs),
			languages.clone(),
		))));
		request.extensions.insert(Locale { languages });
		next.handle(request).await
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::{fixture, rstest};

	struct Greeter;

	#[async_trait]
	impl Handler for Greeter {
		async fn handle(&self, request: Request) -> Result<Response> {
			let locale = request.extensions.get::<Locale>().unwrap_or_default();
			let greeting = request
				.extensions
				.get::<TranslatorHandle>()
				.map(|TranslatorHandle(t)| t.gettext("Hello"))
				.unwrap_or_default();
			Ok(Response::ok().with_body(format!("{}|{}", locale.languages.join(","), greeting)))
		}
	}

	#[fixture]
	fn wrapper() -> I18nWrapper {
		let catalogs = Catalogs::new()
			.add("it", [("Hello", "Ciao")])
			.add("fr", [("Hello", "Bonjour")]);
		I18nWrapper::new(catalogs)
			.default_lang("en")
			.available(vec!["it".into(), "fr".into(), "en".into()])
	}

	#[rstest]
	#[case(None, "en|Hello")]
	#[case(Some("it-IT,fr;q=0.8"), "it,fr,en|Ciao")]
	#[case(Some("de, fr;q=0.5"), "fr,en|Bonjour")]
	#[case(Some("en"), "en|Hello")]
	#[tokio::test]
	async fn test_accept_language(wrapper: I18nWrapper, #[case] header: Option<&str>, #[case] expected: &str) {
		let mut builder = Request::builder().uri("/");
		if let Some(header) = header {
			builder = builder.header("accept-language", header);
		}
		let response = wrapper.process(builder.build().unwrap(), Arc::new(Greeter)).await.unwrap();
		assert_eq!(response.text(), expected);
	}

	#[rstest]
	fn test_translator_falls_back_to_message() {
		let translator = CatalogTranslator::new(
			Arc::new(Catalogs::new().add("it", [("Yes", "Sì")])),
			vec!["it".into()],
		);
		assert_eq!(translator.gettext("Yes"), "Sì");
		assert_eq!(translator.gettext("No"), "No");
		assert_eq!(translator.ngettext("file", "files", 2), "files");
	}

	#[rstest]
	fn test_enabled_by_config() {
		assert!(I18nWrapper::from_config(&Blueprint::new(), Catalogs::new()).is_none());
		let config: Blueprint = [("i18n.enabled", "true"), ("i18n.lang", "it")].into_iter().collect();
		let wrapper = I18nWrapper::from_config(&config, Catalogs::new()).unwrap();
		let request = Request::builder().uri("/").header("accept-language", "pt").build().unwrap();
		// No restriction when i18n.languages is unset.
		assert_eq!(wrapper.select_languages(&request), ["pt", "it"]);
	}
}
