//! Authorization predicates.
//!
//! Predicates read the [`Identity`] resolved by an upstream identity wrapper.
//! They are attached to methods with `require` and to controllers with
//! `allow_only`.

use std::sync::Arc;
use trellis_core::Error;
use trellis_http::Identity;

/// A condition on the current identity.
pub trait Predicate: Send + Sync {
	/// # Errors
	///
	/// Returns the message explaining why the predicate is not met.
	fn evaluate(&self, identity: &Identity) -> Result<(), String>;

	fn is_met(&self, identity: &Identity) -> bool {
		self.evaluate(identity).is_ok()
	}
}

/// Checks `predicate`, producing the authorization error when unmet.
pub fn check(predicate: &dyn Predicate, identity: &Identity) -> Result<(), Error> {
	predicate
		.evaluate(identity)
		.map_err(|message| Error::NotAuthorized {
			message,
			authenticated: identity.is_authenticated(),
		})
}

fn message_or(custom: &Option<String>, default: String) -> String {
	custom.clone().unwrap_or(default)
}

/// Met by any authenticated user.
#[derive(Debug, Clone, Default)]
pub struct NotAnonymous {
	message: Option<String>,
}

impl NotAnonymous {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_message(mut self, message: impl Into<String>) -> Self {
		self.message = Some(message.into());
		self
	}
}

impl Predicate for NotAnonymous {
	fn evaluate(&self, identity: &Identity) -> Result<(), String> {
		if identity.is_authenticated() {
			Ok(())
		} else {
			Err(message_or(
				&self.message,
				"The current user must have been authenticated".to_string(),
			))
		}
	}
}

/// Met by one specific user.
#[derive(Debug, Clone)]
pub struct IsUser {
	user_id: String,
	message: Option<String>,
}

impl IsUser {
	pub fn new(user_id: impl Into<String>) -> Self {
		Self {
			user_id: user_id.into(),
			message: None,
		}
	}

	pub fn with_message(mut self, message: impl Into<String>) -> Self {
		self.message = Some(message.into());
		self
	}
}

impl Predicate for IsUser {
	fn evaluate(&self, identity: &Identity) -> Result<(), String> {
		if identity.user_id.as_deref() == Some(self.user_id.as_str()) {
			Ok(())
		} else {
			Err(message_or(
				&self.message,
				format!("The current user must be \"{}\"", self.user_id),
			))
		}
	}
}

/// Met by members of a group.
#[derive(Debug, Clone)]
pub struct InGroup {
	group: String,
	message: Option<String>,
}

impl InGroup {
	pub fn new(group: impl Into<String>) -> Self {
		Self {
			group: group.into(),
			message: None,
		}
	}

	pub fn with_message(mut self, message: impl Into<String>) -> Self {
		self.message = Some(message.into());
		self
	}
}

impl Predicate for InGroup {
	fn evaluate(&self, identity: &Identity) -> Result<(), String> {
		if identity.in_group(&self.group) {
			Ok(())
		} else {
			Err(message_or(
				&self.message,
				format!("The current user must belong to the group \"{}\"", self.group),
			))
		}
	}
}

/// Met by holders of a permission.
#[derive(Debug, Clone)]
pub struct HasPermission {
	permission: String,
	message: Option<String>,
}

impl HasPermission {
	pub fn new(permission: impl Into<String>) -> Self {
		Self {
			permission: permission.into(),
			message: None,
		}
	}

	pub fn with_message(mut self, message: impl Into<String>) -> Self {
		self.message = Some(message.into());
		self
	}
}

impl Predicate for HasPermission {
	fn evaluate(&self, identity: &Identity) -> Result<(), String> {
		if identity.has_permission(&self.permission) {
			Ok(())
		} else {
			Err(message_or(
				&self.message,
				format!("The user must have the \"{}\" permission", self.permission),
			))
		}
	}
}

/// Met when every inner predicate is met. Reports the first failure.
#[derive(Clone, Default)]
pub struct All(pub Vec<Arc<dyn Predicate>>);

impl Predicate for All {
	fn evaluate(&self, identity: &Identity) -> Result<(), String> {
		self.0.iter().try_for_each(|p| p.evaluate(identity))
	}
}

/// Met when at least one inner predicate is met.
#[derive(Clone, Default)]
pub struct Any(pub Vec<Arc<dyn Predicate>>);

impl Predicate for Any {
	fn evaluate(&self, identity: &Identity) -> Result<(), String> {
		let mut failures = Vec::new();
		for predicate in &self.0 {
			match predicate.evaluate(identity) {
				Ok(()) => return Ok(()),
				Err(message) => failures.push(message),
			}
		}
		Err(format!(
			"At least one of the following predicates must be met: {}",
			failures.join(", ")
		))
	}
}

/// Met when the inner predicate is not.
#[derive(Clone)]
pub struct Not(pub Arc<dyn Predicate>);

impl Predicate for Not {
	fn evaluate(&self, identity: &Identity) -> Result<(), String> {
		match self.0.evaluate(identity) {
			Ok(()) => Err("The condition must not be met".to_string()),
			Err(_) => Ok(()),
		}
	}
}
