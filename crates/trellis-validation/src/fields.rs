//! Field validators.
//!
//! Each validator converts one raw parameter into its clean value. A [`Field`]
//! adds the missing-value policy around it: empty strings count as missing,
//! required fields fail when missing, optional ones take their default or
//! stay absent.

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::sync::Arc;

use crate::error::FieldError;
use crate::schema::Fields;

/// Converts a raw parameter value into its clean form.
pub trait FieldValidator: Send + Sync {
	/// # Errors
	///
	/// Returns the message to show next to the field.
	fn clean(&self, value: &Value) -> Result<Value, FieldError>;
}

impl<F> FieldValidator for F
where
	F: Fn(&Value) -> Result<Value, FieldError> + Send + Sync,
{
	fn clean(&self, value: &Value) -> Result<Value, FieldError> {
		self(value)
	}
}

/// A validator plus its missing-value policy.
#[derive(Clone)]
pub struct Field {
	validator: Arc<dyn FieldValidator>,
	required: bool,
	default: Option<Value>,
}

impl Field {
	pub fn new(validator: impl FieldValidator + 'static) -> Self {
		Self {
			validator: Arc::new(validator),
			required: false,
			default: None,
		}
	}

	pub fn required(mut self) -> Self {
		self.required = true;
		self
	}

	/// Value used when the parameter is missing.
	pub fn default(mut self, value: impl Into<Value>) -> Self {
		self.default = Some(value.into());
		self
	}

	/// Cleans an optional raw value. `Ok(None)` leaves the field absent.
	pub fn clean(&self, value: Option<&Value>) -> Result<Option<Value>, FieldError> {
		let missing = match value {
			None | Some(Value::Null) => true,
			Some(Value::String(s)) => s.trim().is_empty(),
			Some(_) => false,
		};
		if missing {
			if self.required {
				return Err(FieldError::message("Please enter a value"));
			}
			return Ok(self.default.clone());
		}
		match value {
			Some(value) => self.validator.clean(value).map(Some),
			None => Ok(None),
		}
	}
}

impl<V: FieldValidator + 'static> From<V> for Field {
	fn from(validator: V) -> Self {
		Field::new(validator)
	}
}

impl std::fmt::Debug for Field {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Field")
			.field("required", &self.required)
			.field("default", &self.default)
			.finish_non_exhaustive()
	}
}

fn as_text(value: &Value) -> Option<String> {
	match value {
		Value::String(s) => Some(s.trim().to_string()),
		Value::Number(n) => Some(n.to_string()),
		Value::Bool(b) => Some(b.to_string()),
		_ => None,
	}
}

/// Integer field.
#[derive(Debug, Clone, Default)]
pub struct Int {
	min: Option<i64>,
	max: Option<i64>,
}

impl Int {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn min(mut self, min: i64) -> Self {
		self.min = Some(min);
		self
	}

	pub fn max(mut self, max: i64) -> Self {
		self.max = Some(max);
		self
	}
}

impl FieldValidator for Int {
	fn clean(&self, value: &Value) -> Result<Value, FieldError> {
		let parsed = match value {
			Value::Number(n) => n.as_i64(),
			Value::String(s) => s.trim().parse::<i64>().ok(),
			_ => None,
		};
		let n = parsed.ok_or_else(|| FieldError::message("Please enter an integer value"))?;
		if let Some(min) = self.min
			&& n < min
		{
			return Err(FieldError::message(format!(
				"Please enter a number that is {min} or greater"
			)));
		}
		if let Some(max) = self.max
			&& n > max
		{
			return Err(FieldError::message(format!(
				"Please enter a number that is {max} or smaller"
			)));
		}
		Ok(Value::from(n))
	}
}

/// Floating point field.
#[derive(Debug, Clone, Default)]
pub struct Float {
	min: Option<f64>,
	max: Option<f64>,
}

impl Float {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn min(mut self, min: f64) -> Self {
		self.min = Some(min);
		self
	}

	pub fn max(mut self, max: f64) -> Self {
		self.max = Some(max);
		self
	}
}

impl FieldValidator for Float {
	fn clean(&self, value: &Value) -> Result<Value, FieldError> {
		let parsed = match value {
			Value::Number(n) => n.as_f64(),
			Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
			_ => None,
		};
		let n = parsed.ok_or_else(|| FieldError::message("Please enter a number"))?;
		if self.min.is_some_and(|min| n < min) || self.max.is_some_and(|max| n > max) {
			return Err(FieldError::message("The number is out of range"));
		}
		Ok(Value::from(n))
	}
}

/// Boolean field accepting the usual textual spellings.
#[derive(Debug, Clone, Default)]
pub struct Bool;

impl FieldValidator for Bool {
	fn clean(&self, value: &Value) -> Result<Value, FieldError> {
		if let Value::Bool(b) = value {
			return Ok(Value::Bool(*b));
		}
		let text = as_text(value).unwrap_or_default().to_ascii_lowercase();
		match text.as_str() {
			"true" | "yes" | "on" | "y" | "t" | "1" => Ok(Value::Bool(true)),
			"false" | "no" | "off" | "n" | "f" | "0" => Ok(Value::Bool(false)),
			_ => Err(FieldError::message("Value should be 'true' or 'false'")),
		}
	}
}

/// String field with optional length bounds.
#[derive(Debug, Clone, Default)]
pub struct Str {
	min_len: Option<usize>,
	max_len: Option<usize>,
}

impl Str {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn min_len(mut self, n: usize) -> Self {
		self.min_len = Some(n);
		self
	}

	pub fn max_len(mut self, n: usize) -> Self {
		self.max_len = Some(n);
		self
	}
}

impl FieldValidator for Str {
	fn clean(&self, value: &Value) -> Result<Value, FieldError> {
		let text = as_text(value).ok_or_else(|| FieldError::message("Please enter a string"))?;
		let len = text.chars().count();
		if let Some(min) = self.min_len
			&& len < min
		{
			return Err(FieldError::message(format!(
				"Enter a value at least {min} characters long"
			)));
		}
		if let Some(max) = self.max_len
			&& len > max
		{
			return Err(FieldError::message(format!(
				"Enter a value not more than {max} characters long"
			)));
		}
		Ok(Value::String(text))
	}
}

/// String field matching a regular expression.
#[derive(Debug, Clone)]
pub struct Pattern {
	regex: Regex,
	message: String,
}

impl Pattern {
	/// # Errors
	///
	/// Fails when `pattern` is not a valid regular expression.
	pub fn new(pattern: &str) -> Result<Self, regex::Error> {
		Ok(Self {
			regex: Regex::new(pattern)?,
			message: "The input is not valid".to_string(),
		})
	}

	pub fn message(mut self, message: impl Into<String>) -> Self {
		self.message = message.into();
		self
	}
}

impl FieldValidator for Pattern {
	fn clean(&self, value: &Value) -> Result<Value, FieldError> {
		match as_text(value) {
			Some(text) if self.regex.is_match(&text) => Ok(Value::String(text)),
			_ => Err(FieldError::message(self.message.clone())),
		}
	}
}

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
	Regex::new(r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9](?:[A-Za-z0-9\-]*[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9\-]*[A-Za-z0-9])?)+$")
		.unwrap_or_else(|_| unreachable!("static email pattern compiles"))
});

/// Email address field.
#[derive(Debug, Clone, Default)]
pub struct Email;

impl FieldValidator for Email {
	fn clean(&self, value: &Value) -> Result<Value, FieldError> {
		match as_text(value) {
			Some(text) if EMAIL_RE.is_match(&text) => Ok(Value::String(text)),
			_ => Err(FieldError::message("Please enter a valid email address")),
		}
	}
}

/// Field restricted to a set of strings.
#[derive(Debug, Clone)]
pub struct OneOf {
	choices: Vec<String>,
}

impl OneOf {
	pub fn new<I, S>(choices: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		Self {
			choices: choices.into_iter().map(Into::into).collect(),
		}
	}
}

impl FieldValidator for OneOf {
	fn clean(&self, value: &Value) -> Result<Value, FieldError> {
		match as_text(value) {
			Some(text) if self.choices.contains(&text) => Ok(Value::String(text)),
			_ => Err(FieldError::message(format!(
				"Value must be one of: {}",
				self.choices.join("; ")
			))),
		}
	}
}

/// Object field validated by a nested schema.
#[derive(Debug, Clone)]
pub struct Nested(pub Fields);

impl FieldValidator for Nested {
	fn clean(&self, value: &Value) -> Result<Value, FieldError> {
		let Value::Object(params) = value else {
			return Err(FieldError::message("Please enter a mapping"));
		};
		self.0
			.clean(params)
			.map(Value::Object)
			.map_err(FieldError::Fields)
	}
}

/// List field: a single value becomes a one-element list and every item is
/// cleaned by the inner validator.
#[derive(Clone)]
pub struct ListOf {
	inner: Arc<dyn FieldValidator>,
}

impl ListOf {
	pub fn new(inner: impl FieldValidator + 'static) -> Self {
		Self {
			inner: Arc::new(inner),
		}
	}
}

impl FieldValidator for ListOf {
	fn clean(&self, value: &Value) -> Result<Value, FieldError> {
		let items = match value {
			Value::Array(items) => items.clone(),
			other => vec![other.clone()],
		};
		let mut errors = IndexMap::new();
		let mut cleaned = Vec::with_capacity(items.len());
		for (index, item) in items.iter().enumerate() {
			match self.inner.clean(item) {
				Ok(value) => cleaned.push(value),
				Err(err) => err.flatten_into(&index.to_string(), &mut errors),
			}
		}
		if errors.is_empty() {
			Ok(Value::Array(cleaned))
		} else {
			Err(FieldError::Fields(errors))
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;
	use serde_json::json;

	#[rstest]
	#[case(json!("12"), Ok(json!(12)))]
	#[case(json!(" 7 "), Ok(json!(7)))]
	#[case(json!("NaN"), Err("Please enter an integer value"))]
	#[case(json!("0"), Err("Please enter a number that is 1 or greater"))]
	#[case(json!(11), Err("Please enter a number that is 10 or smaller"))]
	fn test_int(#[case] value: Value, #[case] expected: Result<Value, &str>) {
		let validator = Int::new().min(1).max(10);
		let result = validator.clean(&value).map_err(|e| e.to_string());
		assert_eq!(result, expected.map_err(str::to_string));
	}

	#[rstest]
	fn test_missing_values() {
		let optional = Field::new(Int::new());
		assert_eq!(optional.clean(None).unwrap(), None);
		assert_eq!(optional.clean(Some(&json!(""))).unwrap(), None);

		let defaulted = Field::new(Int::new()).default(5);
		assert_eq!(defaulted.clean(None).unwrap(), Some(json!(5)));

		let required = Field::new(Str::new()).required();
		assert_eq!(
			required.clean(Some(&json!("  "))).unwrap_err().to_string(),
			"Please enter a value"
		);
	}

	#[rstest]
	#[case(json!("on"), Some(true))]
	#[case(json!("0"), Some(false))]
	#[case(json!(true), Some(true))]
	#[case(json!("perhaps"), None)]
	fn test_bool(#[case] value: Value, #[case] expected: Option<bool>) {
		assert_eq!(Bool.clean(&value).ok().and_then(|v| v.as_bool()), expected);
	}

	#[rstest]
	fn test_str_bounds() {
		let validator = Str::new().min_len(2).max_len(4);
		assert_eq!(validator.clean(&json!(" abc ")).unwrap(), json!("abc"));
		assert!(validator.clean(&json!("a")).is_err());
		assert!(validator.clean(&json!("abcde")).is_err());
		assert!(validator.clean(&json!({})).is_err());
	}

	#[rstest]
	#[case("bob@example.com", true)]
	#[case("bob.smith+tag@mail.example.org", true)]
	#[case("bob@", false)]
	#[case("bob example.com", false)]
	fn test_email(#[case] address: &str, #[case] valid: bool) {
		assert_eq!(Email.clean(&json!(address)).is_ok(), valid);
	}

	#[rstest]
	fn test_pattern_and_one_of() {
		let slug = Pattern::new(r"^[a-z0-9-]+$").unwrap().message("Not a slug");
		assert!(slug.clean(&json!("hello-world")).is_ok());
		assert_eq!(slug.clean(&json!("Hello World")).unwrap_err().to_string(), "Not a slug");

		let color = OneOf::new(["red", "green"]);
		assert!(color.clean(&json!("red")).is_ok());
		assert_eq!(
			color.clean(&json!("blue")).unwrap_err().to_string(),
			"Value must be one of: red; green"
		);
	}

	#[rstest]
	fn test_list_of() {
		let validator = ListOf::new(Int::new());
		assert_eq!(validator.clean(&json!(["1", "2"])).unwrap(), json!([1, 2]));
		assert_eq!(validator.clean(&json!("3")).unwrap(), json!([3]));

		let err = validator.clean(&json!(["1", "x"])).unwrap_err();
		let mut flat = IndexMap::new();
		err.flatten_into("ids", &mut flat);
		assert_eq!(flat["ids.1"], "Please enter an integer value");
	}

	#[rstest]
	fn test_nested() {
		let address = Nested(Fields::new().field("zip", Field::new(Int::new()).required()));
		assert_eq!(address.clean(&json!({"zip": "123"})).unwrap(), json!({"zip": 123}));

		let err = address.clean(&json!({})).unwrap_err();
		let expected = [("zip".to_string(), "Please enter a value".to_string())];
		assert_eq!(err, FieldError::Fields(expected.into_iter().collect()));
	}

	#[rstest]
	fn test_closure_validator() {
		let upper = |value: &Value| -> Result<Value, FieldError> {
			Ok(json!(value.as_str().unwrap_or_default().to_uppercase()))
		};
		assert_eq!(Field::new(upper).clean(Some(&json!("hi"))).unwrap(), Some(json!("HI")));
	}
}
