//! Identity of the requesting user, stored in request extensions by the
//! identity wrapper and read by authorization predicates.

use serde::{Deserialize, Serialize};

use crate::Extensions;

/// User id, group names and permission names of the current request.
///
/// # Examples
///
/// ```
/// use trellis_http::{Extensions, Identity};
///
/// let extensions = Extensions::new();
/// extensions.insert(Identity::user("editor").with_groups(["staff"]));
///
/// let identity = Identity::from_extensions(&extensions);
/// assert!(identity.is_authenticated());
/// assert!(identity.in_group("staff"));
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
	pub user_id: Option<String>,
	pub groups: Vec<String>,
	pub permissions: Vec<String>,
}

impl Identity {
	pub fn anonymous() -> Self {
		Self::default()
	}

	pub fn user(user_id: impl Into<String>) -> Self {
		Self {
			user_id: Some(user_id.into()),
			..Self::default()
		}
	}

	pub fn with_groups<I, S>(mut self, groups: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.groups.extend(groups.into_iter().map(Into::into));
		self
	}

	pub fn with_permissions<I, S>(mut self, permissions: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.permissions.extend(permissions.into_iter().map(Into::into));
		self
	}

	pub fn is_authenticated(&self) -> bool {
		self.user_id.is_some()
	}

	pub fn is_anonymous(&self) -> bool {
		!self.is_authenticated()
	}

	pub fn in_group(&self, group: &str) -> bool {
		self.groups.iter().any(|g| g == group)
	}

	pub fn has_permission(&self, permission: &str) -> bool {
		self.permissions.iter().any(|p| p == permission)
	}

	/// Identity stored by an upstream wrapper, anonymous when none is.
	pub fn from_extensions(extensions: &Extensions) -> Self {
		extensions.get::<Identity>().unwrap_or_default()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;

	#[rstest]
	fn test_anonymous() {
		let identity = Identity::anonymous();
		assert!(identity.is_anonymous());
		assert!(!identity.in_group("admins"));
	}

	#[rstest]
	fn test_user_with_permissions() {
		let identity = Identity::user("bob").with_permissions(["edit", "publish"]);
		assert!(identity.is_authenticated());
		assert!(identity.has_permission("publish"));
		assert!(!identity.has_permission("delete"));
	}

	#[rstest]
	fn test_missing_extension_is_anonymous() {
		assert_eq!(Identity::from_extensions(&Extensions::new()), Identity::anonymous());
	}
}
