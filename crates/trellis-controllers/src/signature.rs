//! Method signatures and argument binding.
//!
//! Controller methods declare the names of their arguments. Path segments
//! left over after dispatch fill the declared arguments positionally; request
//! parameters fill them by name.

use serde_json::Value;
use trellis_core::{Error, HttpError, Params, Result};

/// A declared argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Arg {
	pub name: String,
	pub required: bool,
}

/// The arguments a controller method accepts.
///
/// # Examples
///
/// ```
/// use trellis_controllers::Signature;
/// use trellis_core::Params;
///
/// let signature = Signature::new().arg("name").optional("greeting");
///
/// assert!(signature.matches(&["Bob".to_string()], &Params::new()));
/// assert!(!signature.matches(&[], &Params::new()));
/// assert!(!signature.matches(&["a".into(), "b".into(), "c".into()], &Params::new()));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Signature {
	pub args: Vec<Arg>,
	/// Accepts any number of extra positional segments.
	pub varargs: bool,
	/// Accepts any extra named parameter.
	pub varkw: bool,
}

impl Signature {
	pub fn new() -> Self {
		Self::default()
	}

	/// Adds a required argument.
	pub fn arg(mut self, name: impl Into<String>) -> Self {
		self.args.push(Arg {
			name: name.into(),
			required: true,
		});
		self
	}

	/// Adds an argument with a default.
	pub fn optional(mut self, name: impl Into<String>) -> Self {
		self.args.push(Arg {
			name: name.into(),
			required: false,
		});
		self
	}

	pub fn varargs(mut self) -> Self {
		self.varargs = true;
		self
	}

	pub fn varkw(mut self) -> Self {
		self.varkw = true;
		self
	}

	pub fn arg_names(&self) -> impl Iterator<Item = &str> {
		self.args.iter().map(|a| a.name.as_str())
	}

	/// Number of declared arguments.
	pub fn fixed_len(&self) -> usize {
		self.args.len()
	}

	/// Whether the remainder and parameters can be bound to this signature.
	///
	/// Every required argument must come from the remainder or from a
	/// parameter of the same name. Extra segments need `varargs`. Unknown
	/// parameters are tolerated.
	pub fn matches(&self, remainder: &[String], params: &Params) -> bool {
		for (index, arg) in self.args.iter().enumerate() {
			if arg.required && index >= remainder.len() && !params.contains_key(&arg.name) {
				return false;
			}
		}
		self.varargs || remainder.len() <= self.args.len()
	}
}

/// Arguments bound for one call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallArgs {
	/// Path segments left after dispatch, as received.
	pub remainder: Vec<String>,
	/// Named values: request parameters plus positional segments bound to
	/// their argument names.
	pub named: Params,
	/// Segments beyond the declared arguments.
	pub varargs: Vec<String>,
}

impl CallArgs {
	/// Binds the remainder and parameters to a signature.
	///
	/// # Examples
	///
	/// ```
	/// use trellis_controllers::{CallArgs, Signature};
	/// use trellis_core::Params;
	///
	/// let signature = Signature::new().arg("name").varargs();
	/// let args = CallArgs::bind(&signature, &["Bob".into(), "x".into()], Params::new());
	///
	/// assert_eq!(args.str("name"), Some("Bob"));
	/// assert_eq!(args.varargs, vec!["x"]);
	/// ```
	pub fn bind(signature: &Signature, remainder: &[String], params: Params) -> Self {
		let mut named = params;
		let mut varargs = Vec::new();
		for (index, segment) in remainder.iter().enumerate() {
			match signature.args.get(index) {
				Some(arg) => {
					named.insert(arg.name.clone(), Value::String(segment.clone()));
				}
				None => varargs.push(segment.clone()),
			}
		}
		Self {
			remainder: remainder.to_vec(),
			named,
			varargs,
		}
	}

	/// Rebinds the same inputs to another signature.
	pub fn rebind(&self, signature: &Signature, params: &Params) -> Self {
		Self::bind(signature, &self.remainder, params.clone())
	}

	pub fn get(&self, name: &str) -> Option<&Value> {
		self.named.get(name)
	}

	pub fn str(&self, name: &str) -> Option<&str> {
		self.named.get(name).and_then(Value::as_str)
	}

	/// A string argument, failing with 400 when missing.
	pub fn require_str(&self, name: &str) -> Result<&str> {
		self.str(name).ok_or_else(|| {
			Error::Http(
				HttpError::new(http::StatusCode::BAD_REQUEST)
					.with_detail(format!("missing argument \"{name}\"")),
			)
		})
	}

	/// An integer argument, parsing strings.
	pub fn int(&self, name: &str) -> Option<i64> {
		match self.named.get(name)? {
			Value::Number(n) => n.as_i64(),
			Value::String(s) => s.trim().parse().ok(),
			_ => None,
		}
	}

	pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
		self.named.insert(name.into(), value.into());
	}

	pub fn remove(&mut self, name: &str) -> Option<Value> {
		self.named.remove(name)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;
	use serde_json::json;

	fn segments(parts: &[&str]) -> Vec<String> {
		parts.iter().map(|s| s.to_string()).collect()
	}

	#[rstest]
	#[case(&[], false)]
	#[case(&["1"], true)]
	#[case(&["1", "2"], true)]
	#[case(&["1", "2", "3"], false)]
	fn test_matches_positional(#[case] remainder: &[&str], #[case] expected: bool) {
		let signature = Signature::new().arg("id").optional("format");
		assert_eq!(signature.matches(&segments(remainder), &Params::new()), expected);
	}

	#[rstest]
	fn test_required_from_params() {
		let signature = Signature::new().arg("id");
		let mut params = Params::new();
		params.insert("id".into(), json!("3"));
		assert!(signature.matches(&[], &params));
	}

	#[rstest]
	fn test_varargs_accept_extra_segments() {
		let signature = Signature::new().varargs();
		assert!(signature.matches(&segments(&["a", "b", "c"]), &Params::new()));
	}

	#[rstest]
	fn test_bind_positional_overrides_params() {
		let signature = Signature::new().arg("name");
		let mut params = Params::new();
		params.insert("name".into(), json!("query"));
		params.insert("page".into(), json!("2"));

		let args = CallArgs::bind(&signature, &segments(&["path"]), params);
		assert_eq!(args.str("name"), Some("path"));
		assert_eq!(args.int("page"), Some(2));
		assert!(args.varargs.is_empty());
	}

	#[rstest]
	fn test_require_str_is_bad_request() {
		let args = CallArgs::default();
		let err = args.require_str("name").unwrap_err();
		assert_eq!(err.status_code().as_u16(), 400);
	}
}
