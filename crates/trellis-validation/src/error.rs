//! Validation failures.

use indexmap::IndexMap;
use serde_json::Value;

/// Boxed failure raised by a validator.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// The default validation failure.
///
/// `error_dict` maps field names to messages, `value` holds the rejected
/// input.
///
/// # Examples
///
/// ```
/// use trellis_validation::ValidationError;
/// use serde_json::json;
///
/// let err = ValidationError::new("Invalid input")
///     .with_field_error("a", "Please enter an integer value")
///     .with_value(json!({"a": "NaN"}));
///
/// assert_eq!(err.to_string(), "Invalid input");
/// assert_eq!(err.error_dict["a"], "Please enter an integer value");
/// ```
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message}")]
pub struct ValidationError {
	pub message: String,
	pub error_dict: IndexMap<String, String>,
	pub value: Value,
}

impl ValidationError {
	pub fn new(message: impl Into<String>) -> Self {
		Self {
			message: message.into(),
			error_dict: IndexMap::new(),
			value: Value::Null,
		}
	}

	pub fn with_field_error(mut self, field: impl Into<String>, message: impl Into<String>) -> Self {
		self.error_dict.insert(field.into(), message.into());
		self
	}

	pub fn with_value(mut self, value: Value) -> Self {
		self.value = value;
		self
	}
}

/// A failed field, as reported by a field validator.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldError {
	Message(String),
	/// Errors of a nested schema, keyed by sub-field.
	Fields(IndexMap<String, String>),
}

impl FieldError {
	pub fn message(message: impl Into<String>) -> Self {
		FieldError::Message(message.into())
	}

	/// Flattens the error under `field`, joining nested names with dots.
	pub fn flatten_into(self, field: &str, out: &mut IndexMap<String, String>) {
		match self {
			FieldError::Message(message) => {
				out.insert(field.to_string(), message);
			}
			FieldError::Fields(errors) => {
				for (sub, message) in errors {
					out.insert(format!("{field}.{sub}"), message);
				}
			}
		}
	}
}

impl std::fmt::Display for FieldError {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			FieldError::Message(message) => f.write_str(message),
			FieldError::Fields(errors) => {
				let parts: Vec<String> = errors.iter().map(|(k, v)| format!("{k}: {v}")).collect();
				f.write_str(&parts.join("; "))
			}
		}
	}
}
