//! Shipped validation intents.

use indexmap::IndexMap;
use serde_json::Value;
use std::sync::Arc;
use trellis_core::Params;

use crate::error::{BoxError, ValidationError};
use crate::fields::Field;

/// Widget-style object that validates the whole parameter set itself.
pub trait Validate: Send + Sync {
	/// # Errors
	///
	/// Returns the failure raised by the validator. Failures of a type
	/// registered with an exploder are reported as validation errors, any
	/// other failure is an application error.
	fn validate(&self, params: &Params) -> Result<Params, BoxError>;
}

/// Mapping of parameter names to field validators.
///
/// Parameters without a validator pass through untouched.
///
/// # Examples
///
/// ```
/// use trellis_validation::{Fields, Field};
/// use trellis_validation::fields::{Int, Str};
/// use serde_json::json;
///
/// let schema = Fields::new()
///     .field("a", Int::new())
///     .field("b", Field::new(Str::new()).required());
///
/// let params = json!({"a": "4", "b": "s", "c": "x"});
/// let clean = schema.clean(params.as_object().unwrap()).unwrap();
/// assert_eq!(serde_json::Value::Object(clean), json!({"a": 4, "b": "s", "c": "x"}));
/// ```
#[derive(Debug, Clone, Default)]
pub struct Fields {
	fields: IndexMap<String, Field>,
}

impl Fields {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn field(mut self, name: impl Into<String>, field: impl Into<Field>) -> Self {
		self.fields.insert(name.into(), field.into());
		self
	}

	pub fn names(&self) -> impl Iterator<Item = &str> {
		self.fields.keys().map(String::as_str)
	}

	/// Cleans every declared field, collecting all failures.
	///
	/// # Errors
	///
	/// Returns the messages of the failed fields, keyed by name.
	pub fn clean(&self, params: &Params) -> Result<Params, IndexMap<String, String>> {
		let mut clean = params.clone();
		let mut errors = IndexMap::new();
		for (name, field) in &self.fields {
			match field.clean(params.get(name)) {
				Ok(Some(value)) => {
					clean.insert(name.clone(), value);
				}
				Ok(None) => {
					clean.remove(name);
				}
				Err(err) => err.flatten_into(name, &mut errors),
			}
		}
		if errors.is_empty() {
			Ok(clean)
		} else {
			Err(errors)
		}
	}
}

impl Validate for Fields {
	fn validate(&self, params: &Params) -> Result<Params, BoxError> {
		self.clean(params).map_err(|errors| {
			let mut err = ValidationError::new("Invalid input").with_value(Value::Object(params.clone()));
			err.error_dict = errors;
			Box::new(err) as BoxError
		})
	}
}

/// A shared widget-style validator.
#[derive(Clone)]
pub struct Widget(pub Arc<dyn Validate>);

impl Widget {
	pub fn new(validator: impl Validate + 'static) -> Self {
		Widget(Arc::new(validator))
	}
}

impl std::fmt::Debug for Widget {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str("Widget(..)")
	}
}

/// Validation through a closure.
#[derive(Clone)]
pub struct ValidateWith(pub Arc<dyn Fn(&Params) -> Result<Params, BoxError> + Send + Sync>);

impl ValidateWith {
	pub fn new<F>(f: F) -> Self
	where
		F: Fn(&Params) -> Result<Params, BoxError> + Send + Sync + 'static,
	{
		ValidateWith(Arc::new(f))
	}
}

impl std::fmt::Debug for ValidateWith {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str("ValidateWith(..)")
	}
}
