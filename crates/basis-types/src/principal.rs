//! Authenticated caller as supplied by the identity provider.

use std::collections::HashSet;

use crate::prelude::*;

/// Permission names understood by the basis
pub mod perm {
	/// Full access to every unit and counting circle
	pub const SCOPE_GLOBAL: &str = "scope:global";
	/// Access to everything in the cantons owned by the tenant
	pub const SCOPE_CANTON: &str = "scope:canton";
	/// Access to the units owned by the tenant and their subtrees
	pub const SCOPE_TENANT: &str = "scope:tenant";

	pub const UNIT_WRITE: &str = "unit:write";
	pub const COUNTING_CIRCLE_WRITE: &str = "counting-circle:write";
	pub const MERGER_WRITE: &str = "merger:write";
	pub const GRANT_WRITE: &str = "grant:write";
	pub const CANTON_WRITE: &str = "canton:write";
}

#[derive(Clone, Debug)]
pub struct Principal {
	pub tenant_id: Box<str>,
	pub permissions: HashSet<Box<str>>,
}

impl Principal {
	pub fn new<I, P>(tenant_id: impl Into<Box<str>>, permissions: I) -> Self
	where
		I: IntoIterator<Item = P>,
		P: Into<Box<str>>,
	{
		Self {
			tenant_id: tenant_id.into(),
			permissions: permissions.into_iter().map(Into::into).collect(),
		}
	}

	pub fn has(&self, permission: &str) -> bool {
		self.permissions.contains(permission)
	}

	/// Fail with `PermissionDenied` unless the permission is granted
	pub fn require(&self, permission: &str) -> ClResult<()> {
		if self.has(permission) {
			Ok(())
		} else {
			warn!(tenant = %self.tenant_id, permission, "Permission denied");
			Err(Error::PermissionDenied)
		}
	}
}

// vim: ts=4
