//! Coercion functions converting raw configuration values.

use indexmap::IndexMap;
use serde_json::Value;
use trellis_core::{Error, Result};

/// Converts a raw configuration value into its typed form.
pub type Coercer = fn(&Value) -> Result<Value>;

/// Coercion function per configuration key.
pub type Coercions = IndexMap<String, Coercer>;

fn invalid(kind: &str, value: &Value) -> Error {
	Error::Configuration(format!("cannot interpret {value} as {kind}"))
}

/// Interprets a value as a boolean.
///
/// Accepted strings, case insensitive: `true yes on y t 1` and
/// `false no off n f 0`.
///
/// # Examples
///
/// ```
/// use trellis_conf::asbool;
/// use serde_json::json;
///
/// assert_eq!(asbool(&json!("Yes")).unwrap(), true);
/// assert_eq!(asbool(&json!(0)).unwrap(), false);
/// assert!(asbool(&json!("maybe")).is_err());
/// ```
pub fn asbool(value: &Value) -> Result<bool> {
	match value {
		Value::Bool(b) => Ok(*b),
		Value::Null => Ok(false),
		Value::Number(n) => Ok(n.as_f64().is_some_and(|n| n != 0.0)),
		Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
			"true" | "yes" | "on" | "y" | "t" | "1" => Ok(true),
			"false" | "no" | "off" | "n" | "f" | "0" | "" => Ok(false),
			_ => Err(invalid("a boolean", value)),
		},
		_ => Err(invalid("a boolean", value)),
	}
}

/// Interprets a value as an integer.
pub fn asint(value: &Value) -> Result<i64> {
	match value {
		Value::Number(n) => n.as_i64().ok_or_else(|| invalid("an integer", value)),
		Value::String(s) => s.trim().parse().map_err(|_| invalid("an integer", value)),
		Value::Bool(b) => Ok(i64::from(*b)),
		_ => Err(invalid("an integer", value)),
	}
}

/// Interprets a value as a float.
pub fn asfloat(value: &Value) -> Result<f64> {
	match value {
		Value::Number(n) => n.as_f64().ok_or_else(|| invalid("a float", value)),
		Value::String(s) => s.trim().parse().map_err(|_| invalid("a float", value)),
		_ => Err(invalid("a float", value)),
	}
}

/// Interprets a value as a list of strings.
///
/// Strings are split on commas and whitespace.
///
/// # Examples
///
/// ```
/// use trellis_conf::aslist;
/// use serde_json::json;
///
/// assert_eq!(aslist(&json!("json, tera  jsonp")).unwrap(), vec!["json", "tera", "jsonp"]);
/// assert_eq!(aslist(&json!([403, "404"])).unwrap(), vec!["403", "404"]);
/// ```
pub fn aslist(value: &Value) -> Result<Vec<String>> {
	match value {
		Value::Null => Ok(Vec::new()),
		Value::String(s) => Ok(s
			.split(|c: char| c == ',' || c.is_whitespace())
			.filter(|part| !part.is_empty())
			.map(str::to_string)
			.collect()),
		Value::Array(items) => Ok(items
			.iter()
			.map(|item| match item {
				Value::String(s) => s.clone(),
				other => other.to_string(),
			})
			.collect()),
		other => Ok(vec![other.to_string()]),
	}
}

/// [`Coercer`] for booleans.
pub fn coerce_bool(value: &Value) -> Result<Value> {
	asbool(value).map(Value::Bool)
}

/// [`Coercer`] for integers.
pub fn coerce_int(value: &Value) -> Result<Value> {
	asint(value).map(Value::from)
}

/// [`Coercer`] for floats.
pub fn coerce_float(value: &Value) -> Result<Value> {
	asfloat(value).map(Value::from)
}

/// [`Coercer`] for lists of strings.
pub fn coerce_list(value: &Value) -> Result<Value> {
	aslist(value).map(|items| Value::Array(items.into_iter().map(Value::String).collect()))
}

/// [`Coercer`] for lists of integers, such as HTTP status codes.
pub fn coerce_int_list(value: &Value) -> Result<Value> {
	aslist(value)?
		.iter()
		.map(|item| asint(&Value::String(item.clone())).map(Value::from))
		.collect::<Result<Vec<_>>>()
		.map(Value::Array)
}
