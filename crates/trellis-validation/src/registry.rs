//! The validator registry.
//!
//! Validation intents are opaque schema objects. The registry maps the type
//! of each schema to the function able to validate it, and the type of each
//! failure to the exploder turning it into per-field errors.

use parking_lot::RwLock;
use serde_json::Value;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;
use trellis_core::{Error, Params, Result};

use crate::error::{BoxError, ValidationError};
use crate::schema::{Fields, Validate, ValidateWith, Widget};

/// A type-erased validation schema.
#[derive(Clone)]
pub struct SchemaRef {
	schema: Arc<dyn Any + Send + Sync>,
	type_id: TypeId,
	type_name: &'static str,
}

impl SchemaRef {
	pub fn new<S: Any + Send + Sync>(schema: S) -> Self {
		Self {
			schema: Arc::new(schema),
			type_id: TypeId::of::<S>(),
			type_name: std::any::type_name::<S>(),
		}
	}

	pub fn type_id(&self) -> TypeId {
		self.type_id
	}

	pub fn type_name(&self) -> &'static str {
		self.type_name
	}

	pub fn downcast_ref<S: Any>(&self) -> Option<&S> {
		self.schema.downcast_ref::<S>()
	}

	/// Whether both refer to the same schema instance.
	pub fn ptr_eq(&self, other: &SchemaRef) -> bool {
		Arc::ptr_eq(&self.schema, &other.schema)
	}
}

impl std::fmt::Debug for SchemaRef {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "SchemaRef({})", self.type_name)
	}
}

impl From<Fields> for SchemaRef {
	fn from(schema: Fields) -> Self {
		SchemaRef::new(schema)
	}
}

impl From<Widget> for SchemaRef {
	fn from(schema: Widget) -> Self {
		SchemaRef::new(schema)
	}
}

impl From<ValidateWith> for SchemaRef {
	fn from(schema: ValidateWith) -> Self {
		SchemaRef::new(schema)
	}
}

/// Per-field errors and the values to redisplay, extracted from a failure.
#[derive(Debug, Clone, PartialEq)]
pub struct Explosion {
	pub errors: Params,
	pub values: Value,
	pub message: String,
}

/// Result of running one validation intent.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
	Validated(Params),
	Invalid(Explosion),
}

type ValidatorFn = Arc<dyn Fn(&(dyn Any + Send + Sync), &Params) -> std::result::Result<Params, BoxError> + Send + Sync>;
type ExploderFn = Arc<dyn Fn(&(dyn std::error::Error + 'static)) -> Option<Explosion> + Send + Sync>;

/// Validators keyed by schema type, exploders keyed by failure type.
#[derive(Default)]
pub struct ValidatorRegistry {
	validators: RwLock<HashMap<TypeId, (&'static str, ValidatorFn)>>,
	exploders: RwLock<Vec<(String, ExploderFn)>>,
}

impl ValidatorRegistry {
	/// An empty registry.
	pub fn new() -> Self {
		Self::default()
	}

	/// A registry handling [`Fields`], [`Widget`] and [`ValidateWith`]
	/// schemas, and [`ValidationError`] failures.
	pub fn with_defaults() -> Self {
		let registry = Self::new();
		registry.register_validator(|schema: &Fields, params| schema.validate(params));
		registry.register_validator(|schema: &Widget, params| schema.0.validate(params));
		registry.register_validator(|schema: &ValidateWith, params| (schema.0)(params));
		registry.register_exception("ValidationError", |err: &ValidationError| Explosion {
			errors: err
				.error_dict
				.iter()
				.map(|(k, v)| (k.clone(), Value::String(v.clone())))
				.collect(),
			values: err.value.clone(),
			message: err.message.clone(),
		});
		registry
	}

	/// Registers the validator function for schemas of type `S`.
	pub fn register_validator<S, F>(&self, validate: F)
	where
		S: Any + Send + Sync,
		F: Fn(&S, &Params) -> std::result::Result<Params, BoxError> + Send + Sync + 'static,
	{
		let erased: ValidatorFn = Arc::new(move |schema: &(dyn Any + Send + Sync), params: &Params| match schema.downcast_ref::<S>() {
			Some(schema) => validate(schema, params),
			None => Err(format!("schema is not a {}", std::any::type_name::<S>()).into()),
		});
		self.validators
			.write()
			.insert(TypeId::of::<S>(), (std::any::type_name::<S>(), erased));
	}

	/// Registers a failure type recognized as a validation error, with the
	/// exploder extracting its errors and values.
	pub fn register_exception<E, F>(&self, name: impl Into<String>, explode: F)
	where
		E: std::error::Error + 'static,
		F: Fn(&E) -> Explosion + Send + Sync + 'static,
	{
		let erased: ExploderFn = Arc::new(move |err: &(dyn std::error::Error + 'static)| err.downcast_ref::<E>().map(&explode));
		let name = name.into();
		let mut exploders = self.exploders.write();
		exploders.retain(|(existing, _)| existing != &name);
		exploders.push((name, erased));
	}

	/// Names of the registered failure types.
	pub fn exception_names(&self) -> Vec<String> {
		self.exploders.read().iter().map(|(n, _)| n.clone()).collect()
	}

	pub fn handles(&self, schema: &SchemaRef) -> bool {
		self.validators.read().contains_key(&schema.type_id())
	}

	/// Runs `schema` against `params`.
	///
	/// # Errors
	///
	/// [`Error::Configuration`] when no validator handles the schema type,
	/// [`Error::Internal`] when the validator fails with an unregistered
	/// failure type.
	///
	/// # Examples
	///
	/// ```
	/// use trellis_validation::{Fields, Outcome, SchemaRef, ValidatorRegistry};
	/// use trellis_validation::fields::Int;
	/// use serde_json::json;
	///
	/// let registry = ValidatorRegistry::with_defaults();
	/// let schema = SchemaRef::from(Fields::new().field("a", Int::new()));
	///
	/// let params = json!({"a": "NaN"});
	/// match registry.validate(&schema, params.as_object().unwrap()).unwrap() {
	///     Outcome::Invalid(explosion) => {
	///         assert_eq!(explosion.errors["a"], "Please enter an integer value");
	///         assert_eq!(explosion.values, json!({"a": "NaN"}));
	///     }
	///     Outcome::Validated(_) => unreachable!(),
	/// }
	/// ```
	pub fn validate(&self, schema: &SchemaRef, params: &Params) -> Result<Outcome> {
		let validator = self
			.validators
			.read()
			.get(&schema.type_id())
			.map(|(_, f)| Arc::clone(f))
			.ok_or_else(|| {
				Error::Configuration(format!(
					"no validator registered for schema type {}",
					schema.type_name()
				))
			})?;

		self.settle(schema.type_name(), validator(schema.schema.as_ref(), params))
	}

	/// Turns the result of a validator run outside the registry into an
	/// [`Outcome`], exploding registered failure types.
	///
	/// # Errors
	///
	/// [`Error::Internal`] when the failure type is not registered.
	pub fn settle(&self, validator: &str, result: std::result::Result<Params, BoxError>) -> Result<Outcome> {
		match result {
			Ok(clean) => Ok(Outcome::Validated(clean)),
			Err(err) => {
				let exploders = self.exploders.read().clone();
				for (name, explode) in &exploders {
					if let Some(explosion) = explode(err.as_ref()) {
						tracing::debug!(exception = %name, errors = ?explosion.errors, "validation failed");
						return Ok(Outcome::Invalid(explosion));
					}
				}
				Err(Error::Internal(format!("validator for {validator} failed: {err}")))
			}
		}
	}
}

impl std::fmt::Debug for ValidatorRegistry {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let validators: Vec<&'static str> = self.validators.read().values().map(|(n, _)| *n).collect();
		f.debug_struct("ValidatorRegistry")
			.field("validators", &validators)
			.field("exceptions", &self.exception_names())
			.finish()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::fields::Int;
	use rstest::{fixture, rstest};
	use serde_json::json;

	#[fixture]
	fn registry() -> ValidatorRegistry {
		ValidatorRegistry::with_defaults()
	}

	fn params(value: Value) -> Params {
		value.as_object().cloned().unwrap_or_default()
	}

	#[derive(Debug, thiserror::Error)]
	#[error("form invalid")]
	struct FormInvalid {
		field: String,
	}

	struct PositiveTotal;

	impl Validate for PositiveTotal {
		fn validate(&self, params: &Params) -> std::result::Result<Params, BoxError> {
			let total = params.get("total").and_then(Value::as_i64).unwrap_or(0);
			if total > 0 {
				Ok(params.clone())
			} else {
				Err(Box::new(FormInvalid {
					field: "total".into(),
				}))
			}
		}
	}

	#[rstest]
	fn test_fields_validated(registry: ValidatorRegistry) {
		let schema = SchemaRef::from(Fields::new().field("a", Int::new()));
		let outcome = registry.validate(&schema, &params(json!({"a": "3"}))).unwrap();
		assert_eq!(outcome, Outcome::Validated(params(json!({"a": 3}))));
	}

	#[rstest]
	fn test_unregistered_schema_type(registry: ValidatorRegistry) {
		let schema = SchemaRef::new(42u8);
		assert!(!registry.handles(&schema));
		let err = registry.validate(&schema, &Params::new()).unwrap_err();
		assert!(matches!(err, Error::Configuration(_)));
	}

	#[rstest]
	fn test_unregistered_failure_is_internal_error(registry: ValidatorRegistry) {
		let schema = SchemaRef::from(Widget::new(PositiveTotal));
		let err = registry.validate(&schema, &Params::new()).unwrap_err();
		assert!(matches!(err, Error::Internal(_)));
	}

	#[rstest]
	fn test_registered_failure_is_exploded(registry: ValidatorRegistry) {
		registry.register_exception("FormInvalid", |err: &FormInvalid| Explosion {
			errors: params(json!({ err.field.clone(): "must be positive" })),
			values: Value::Null,
			message: err.to_string(),
		});
		assert_eq!(registry.exception_names(), vec!["ValidationError", "FormInvalid"]);

		let schema = SchemaRef::from(Widget::new(PositiveTotal));
		let outcome = registry.validate(&schema, &params(json!({"total": 0}))).unwrap();
		let Outcome::Invalid(explosion) = outcome else {
			panic!("expected a validation failure");
		};
		assert_eq!(explosion.errors["total"], "must be positive");
		assert_eq!(explosion.message, "form invalid");
	}

	#[rstest]
	fn test_closure_schema(registry: ValidatorRegistry) {
		let schema = SchemaRef::from(ValidateWith::new(|params| {
			let mut clean = params.clone();
			clean.insert("seen".into(), json!(true));
			Ok(clean)
		}));
		let outcome = registry.validate(&schema, &Params::new()).unwrap();
		assert_eq!(outcome, Outcome::Validated(params(json!({"seen": true}))));
	}

	#[rstest]
	fn test_custom_schema_type(registry: ValidatorRegistry) {
		struct Uppercase(&'static str);
		registry.register_validator(|schema: &Uppercase, params: &Params| {
			let mut clean = params.clone();
			if let Some(Value::String(s)) = clean.get_mut(schema.0) {
				*s = s.to_uppercase();
			}
			Ok(clean)
		});

		let schema = SchemaRef::new(Uppercase("name"));
		let outcome = registry.validate(&schema, &params(json!({"name": "bob"}))).unwrap();
		assert_eq!(outcome, Outcome::Validated(params(json!({"name": "BOB"}))));
	}
}
