//! The configuration blueprint.

use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::path::Path;
use trellis_core::{Error, Result};

use crate::coerce::{Coercions, asbool, asfloat, asint, aslist};

/// Flat mapping of dotted keys to values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Blueprint {
	values: IndexMap<String, Value>,
}

impl Blueprint {
	pub fn new() -> Self {
		Self::default()
	}

	/// Parses TOML, flattening nested tables into dotted keys.
	///
	/// # Examples
	///
	/// ```
	/// use trellis_conf::Blueprint;
	///
	/// let blueprint = Blueprint::from_toml_str("[errorpage]\nstatus_codes = [403, 404]").unwrap();
	/// assert_eq!(blueprint.get_list("errorpage.status_codes"), vec!["403", "404"]);
	/// ```
	pub fn from_toml_str(source: &str) -> Result<Self> {
		let table: toml::Table = source
			.parse()
			.map_err(|e| Error::Configuration(format!("invalid TOML configuration: {e}")))?;
		let value = serde_json::to_value(table)?;
		let mut blueprint = Self::new();
		if let Value::Object(map) = value {
			for (key, value) in map {
				blueprint.flatten_into(key, value);
			}
		}
		Ok(blueprint)
	}

	/// Reads and parses a TOML file.
	pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
		let path = path.as_ref();
		let source = std::fs::read_to_string(path).map_err(|e| {
			Error::Configuration(format!("cannot read configuration {}: {e}", path.display()))
		})?;
		Self::from_toml_str(&source)
	}

	/// Builds a blueprint from `PREFIX` environment style pairs:
	/// `TRELLIS_TM__ATTEMPTS=3` becomes `tm.attempts = "3"` for prefix `TRELLIS_`.
	pub fn from_env_pairs<I, K, V>(pairs: I, prefix: &str) -> Self
	where
		I: IntoIterator<Item = (K, V)>,
		K: AsRef<str>,
		V: Into<String>,
	{
		let mut blueprint = Self::new();
		for (name, value) in pairs {
			if let Some(rest) = name.as_ref().strip_prefix(prefix) {
				let key = rest.to_ascii_lowercase().replace("__", ".");
				blueprint.set(key, Value::String(value.into()));
			}
		}
		blueprint
	}

	fn flatten_into(&mut self, key: String, value: Value) {
		match value {
			Value::Object(map) => {
				for (child, value) in map {
					self.flatten_into(format!("{key}.{child}"), value);
				}
			}
			other => {
				self.values.insert(key, other);
			}
		}
	}

	pub fn get(&self, key: &str) -> Option<&Value> {
		self.values.get(key)
	}

	pub fn contains(&self, key: &str) -> bool {
		self.values.contains_key(key)
	}

	pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
		self.values.insert(key.into(), value.into());
	}

	/// Sets the value only when the key is absent.
	pub fn set_default(&mut self, key: impl Into<String>, value: impl Into<Value>) {
		self.values.entry(key.into()).or_insert_with(|| value.into());
	}

	pub fn remove(&mut self, key: &str) -> Option<Value> {
		self.values.shift_remove(key)
	}

	pub fn keys(&self) -> impl Iterator<Item = &str> {
		self.values.keys().map(String::as_str)
	}

	pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
		self.values.iter().map(|(k, v)| (k.as_str(), v))
	}

	pub fn len(&self) -> usize {
		self.values.len()
	}

	pub fn is_empty(&self) -> bool {
		self.values.is_empty()
	}

	/// Copies every entry of `other` over this blueprint.
	pub fn merge(&mut self, other: &Blueprint) {
		for (key, value) in &other.values {
			self.values.insert(key.clone(), value.clone());
		}
	}

	pub fn get_str(&self, key: &str) -> Option<&str> {
		self.get(key).and_then(Value::as_str)
	}

	/// Boolean value, coercing strings. `None` when absent or unparsable.
	pub fn get_bool(&self, key: &str) -> Option<bool> {
		self.get(key).and_then(|v| asbool(v).ok())
	}

	pub fn get_int(&self, key: &str) -> Option<i64> {
		self.get(key).and_then(|v| asint(v).ok())
	}

	pub fn get_float(&self, key: &str) -> Option<f64> {
		self.get(key).and_then(|v| asfloat(v).ok())
	}

	/// List value, coercing strings. Empty when absent.
	pub fn get_list(&self, key: &str) -> Vec<String> {
		self.get(key)
			.and_then(|v| aslist(v).ok())
			.unwrap_or_default()
	}

	pub fn bool_or(&self, key: &str, default: bool) -> bool {
		self.get_bool(key).unwrap_or(default)
	}

	pub fn int_or(&self, key: &str, default: i64) -> i64 {
		self.get_int(key).unwrap_or(default)
	}

	pub fn str_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
		self.get_str(key).unwrap_or(default)
	}

	/// Deserializes a value into a typed structure.
	pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
		self.get(key)
			.map(|v| serde_json::from_value(v.clone()).map_err(Error::from))
			.transpose()
	}

	/// Applies the coercion registered for each present key.
	///
	/// # Errors
	///
	/// Fails on the first value its coercer rejects.
	pub fn apply_coercions(&mut self, coercions: &Coercions) -> Result<()> {
		for (key, coercer) in coercions {
			if let Some(value) = self.values.get_mut(key) {
				*value = coercer(value).map_err(|e| match e {
					Error::Configuration(msg) => Error::Configuration(format!("{key}: {msg}")),
					other => other,
				})?;
			}
		}
		Ok(())
	}

	/// Entries under `prefix`, with the prefix stripped.
	///
	/// # Examples
	///
	/// ```
	/// use trellis_conf::Blueprint;
	///
	/// let mut blueprint = Blueprint::new();
	/// blueprint.set("sqlalchemy.url", "sqlite://");
	/// blueprint.set("sqlalchemy.echo", "false");
	/// blueprint.set("debug", true);
	///
	/// let view = blueprint.view("sqlalchemy.");
	/// assert_eq!(view.get_str("url"), Some("sqlite://"));
	/// assert_eq!(view.len(), 2);
	/// ```
	pub fn view(&self, prefix: &str) -> BlueprintView {
		let values = self
			.values
			.iter()
			.filter_map(|(key, value)| {
				key.strip_prefix(prefix)
					.filter(|rest| !rest.is_empty())
					.map(|rest| (rest.to_string(), value.clone()))
			})
			.collect();
		BlueprintView {
			prefix: prefix.to_string(),
			inner: Blueprint { values },
		}
	}

	/// Named sub-views: `sqlalchemy.slaves.` with keys `slaves.a.url` and
	/// `slaves.b.url` yields views named `a` and `b`.
	pub fn subviews(&self, prefix: &str) -> IndexMap<String, BlueprintView> {
		let mut names: Vec<String> = Vec::new();
		for key in self.values.keys() {
			if let Some(rest) = key.strip_prefix(prefix)
				&& let Some((name, _)) = rest.split_once('.')
				&& !names.iter().any(|n| n == name)
			{
				names.push(name.to_string());
			}
		}
		names
			.into_iter()
			.map(|name| {
				let view = self.view(&format!("{prefix}{name}."));
				(name, view)
			})
			.collect()
	}

	/// The blueprint as a JSON object.
	pub fn to_value(&self) -> Value {
		Value::Object(self.values.clone().into_iter().collect())
	}
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Blueprint {
	fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
		let mut blueprint = Blueprint::new();
		for (key, value) in iter {
			blueprint.set(key, value);
		}
		blueprint
	}
}

/// A dict-like view of the entries sharing a prefix.
#[derive(Debug, Clone, PartialEq)]
pub struct BlueprintView {
	prefix: String,
	inner: Blueprint,
}

impl BlueprintView {
	pub fn prefix(&self) -> &str {
		&self.prefix
	}
}

impl std::ops::Deref for BlueprintView {
	type Target = Blueprint;

	fn deref(&self) -> &Blueprint {
		&self.inner
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::coerce::{coerce_bool, coerce_int, coerce_int_list};
	use rstest::rstest;
	use serde_json::json;
	use std::io::Write;

	#[rstest]
	fn test_nested_tables_flatten() {
		let blueprint = Blueprint::from_toml_str(
			r#"
			[sqlalchemy.master]
			url = "postgres://master"

			[sqlalchemy.slaves.a]
			url = "postgres://a"

			[sqlalchemy.slaves.b]
			url = "postgres://b"
			"#,
		)
		.unwrap();

		assert_eq!(blueprint.get_str("sqlalchemy.master.url"), Some("postgres://master"));
		let slaves = blueprint.subviews("sqlalchemy.slaves.");
		assert_eq!(slaves.keys().collect::<Vec<_>>(), vec!["a", "b"]);
		assert_eq!(slaves["b"].get_str("url"), Some("postgres://b"));
	}

	#[rstest]
	fn test_apply_coercions() {
		let mut blueprint: Blueprint = [
			("debug", json!("yes")),
			("tm.attempts", json!("3")),
			("errorpage.status_codes", json!("403 404")),
		]
		.into_iter()
		.collect();

		let mut coercions = Coercions::new();
		coercions.insert("debug".into(), coerce_bool);
		coercions.insert("tm.attempts".into(), coerce_int);
		coercions.insert("errorpage.status_codes".into(), coerce_int_list);
		coercions.insert("absent".into(), coerce_int);
		blueprint.apply_coercions(&coercions).unwrap();

		assert_eq!(blueprint.get("debug"), Some(&json!(true)));
		assert_eq!(blueprint.get("tm.attempts"), Some(&json!(3)));
		assert_eq!(blueprint.get("errorpage.status_codes"), Some(&json!([403, 404])));
		assert!(!blueprint.contains("absent"));
	}

	#[rstest]
	fn test_coercion_error_names_key() {
		let mut blueprint = Blueprint::new();
		blueprint.set("tm.attempts", "many");
		let mut coercions = Coercions::new();
		coercions.insert("tm.attempts".into(), coerce_int);

		let err = blueprint.apply_coercions(&coercions).unwrap_err();
		assert!(err.to_string().contains("tm.attempts"));
	}

	#[rstest]
	fn test_set_default_keeps_existing() {
		let mut blueprint = Blueprint::new();
		blueprint.set("renderers", json!(["json", "tera"]));
		blueprint.set_default("renderers", json!(["json"]));
		blueprint.set_default("default_renderer", "json");

		assert_eq!(blueprint.get_list("renderers"), vec!["json", "tera"]);
		assert_eq!(blueprint.get_str("default_renderer"), Some("json"));
	}

	#[rstest]
	fn test_env_pairs() {
		let blueprint = Blueprint::from_env_pairs(
			[("TRELLIS_TM__ATTEMPTS", "4"), ("OTHER", "x"), ("TRELLIS_DEBUG", "1")],
			"TRELLIS_",
		);
		assert_eq!(blueprint.get_int("tm.attempts"), Some(4));
		assert_eq!(blueprint.get_bool("debug"), Some(true));
		assert_eq!(blueprint.len(), 2);
	}

	#[rstest]
	fn test_from_toml_file() {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		writeln!(file, "debug = true\n[i18n]\nlang = \"it\"").unwrap();

		let blueprint = Blueprint::from_toml_file(file.path()).unwrap();
		assert!(blueprint.bool_or("debug", false));
		assert_eq!(blueprint.str_or("i18n.lang", "en"), "it");
	}

	#[rstest]
	fn test_merge_overrides() {
		let mut base: Blueprint = [("a", 1), ("b", 2)].into_iter().collect();
		let overrides: Blueprint = [("b", 20), ("c", 30)].into_iter().collect();
		base.merge(&overrides);
		assert_eq!(base.to_value(), json!({"a": 1, "b": 20, "c": 30}));
	}
}
