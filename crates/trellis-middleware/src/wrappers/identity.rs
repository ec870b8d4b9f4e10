//! Identity resolution.
//!
//! The identity wrapper asks an [`IdentityProvider`] who is making the
//! request and stores the resulting [`Identity`] in the request extensions,
//! where authorization predicates find it. Authentication itself belongs to
//! the provider.

use async_trait::async_trait;
use indexmap::IndexMap;
use std::sync::Arc;
use trellis_conf::{Blueprint, BlueprintView};
use trellis_core::Result;
use trellis_http::{Handler, Identity, Request, Response};

use crate::wrapper::ApplicationWrapper;

/// Resolves the identity of a request.
pub trait IdentityProvider: Send + Sync {
	/// `None` for anonymous requests.
	fn identify(&self, request: &Request) -> Result<Option<Identity>>;
}

/// Trusts a user id set by a front-end server in a request header, and maps
/// users to groups and permissions from configuration.
///
/// With `sa_auth.user_header = "x-remote-user"`, the entries
/// `sa_auth.groups.<group> = "alice bob"` and
/// `sa_auth.permissions.<permission> = "editors"` give users their groups and
/// groups their permissions.
#[derive(Debug, Clone, Default)]
pub struct RemoteUserProvider {
	header: String,
	groups: IndexMap<String, Vec<String>>,
	permissions: IndexMap<String, Vec<String>>,
}

impl RemoteUserProvider {
	pub fn new(header: impl Into<String>) -> Self {
		Self {
			header: header.into(),
			..Self::default()
		}
	}

	pub fn group(mut self, group: impl Into<String>, users: &[&str]) -> Self {
		self.groups
			.insert(group.into(), users.iter().map(|u| u.to_string()).collect());
		self
	}

	pub fn permission(mut self, permission: impl Into<String>, groups: &[&str]) -> Self {
		self.permissions
			.insert(permission.into(), groups.iter().map(|g| g.to_string()).collect());
		self
	}

	/// Builds the provider from the `sa_auth.*` view.
	pub fn from_view(view: &BlueprintView) -> Self {
		let mut provider = Self::new(view.str_or("user_header", "x-remote-user"));
		for (group, users) in view.view("groups.").iter() {
			let users = trellis_conf::aslist(users).unwrap_or_default();
			provider.groups.insert(group.to_string(), users);
		}
		for (permission, groups) in view.view("permissions.").iter() {
			let groups = trellis_conf::aslist(groups).unwrap_or_default();
			provider.permissions.insert(permission.to_string(), groups);
		}
		provider
	}
}

impl IdentityProvider for RemoteUserProvider {
	fn identify(&self, request: &Request) -> Result<Option<Identity>> {
		let Some(user) = request.header(&self.header).map(str::trim).filter(|u| !u.is_empty()) else {
			return Ok(None);
		};
		let groups: Vec<&String> = self
			.groups
			.iter()
			.filter(|(_, users)| users.iter().any(|u| u == user))
			.map(|(group, _)| group)
			.collect();
		let permissions: Vec<String> = self
			.permissions
			.iter()
			.filter(|(_, allowed)| allowed.iter().any(|g| groups.contains(&g)))
			.map(|(permission, _)| permission.clone())
			.collect();
		let groups: Vec<String> = groups.into_iter().cloned().collect();
		Ok(Some(Identity::user(user).with_groups(groups).with_permissions(permissions)))
	}
}

/// Places the request identity in the extensions.
pub struct IdentityWrapper {
	provider: Arc<dyn IdentityProvider>,
}

impl IdentityWrapper {
	pub fn new(provider: Arc<dyn IdentityProvider>) -> Self {
		Self { provider }
	}

	/// Uses a [`RemoteUserProvider`] configured from `sa_auth.*`. `None`
	/// unless `identity.enabled`.
	pub fn from_config(config: &Blueprint) -> Option<Self> {
		config
			.bool_or("identity.enabled", false)
			.then(|| Self::new(Arc::new(RemoteUserProvider::from_view(&config.view("sa_auth.")))))
	}
}

#[async_trait]
impl ApplicationWrapper for IdentityWrapper {
	fn name(&self) -> &str {
		"identity"
	}

	async fn process(&self, request: Request, next: Arc<dyn Handler>) -> Result<Response> {
		let identity = self.provider.identify(&request)?.unwrap_or_default();
		tracing::debug!(user = ?identity.user_id, "identity resolved");
		request.extensions.insert(identity);
		next.handle(request).await
	}
}
