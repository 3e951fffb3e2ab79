//! Permission resolver.
//!
//! Turns a principal into the sets of units and counting circles it may read
//! or write. Scopes are ranked and cumulative: a higher scope sees everything
//! the lower ones see. Explicit grants apply at every scope.
//!
//! The resolver never fails on missing access, it only returns sets. Callers
//! intersect them with the requested ids and report `NotFound` for anything
//! outside the readable set and `PermissionDenied` for anything readable but
//! not writable.

use std::collections::{HashMap, HashSet};

use crate::canton;
use crate::hierarchy::HierarchyIndex;
use crate::prelude::*;
use basis_types::basis_adapter::{
	ListAssignmentOptions, ListCountingCircleOptions, ListGrantOptions, ListUnitOptions, Unit,
};
use basis_types::principal::perm;

/// Ownership scope of a principal, lowest rank first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Scope {
	/// Explicit grants only
	Explicit,
	/// Units owned by the tenant and their subtrees
	Tenant,
	/// Every unit of the cantons owned by the tenant
	Canton,
	Global,
}

const RANKED_SCOPES: [(&str, Scope); 3] = [
	(perm::SCOPE_GLOBAL, Scope::Global),
	(perm::SCOPE_CANTON, Scope::Canton),
	(perm::SCOPE_TENANT, Scope::Tenant),
];

impl Scope {
	/// Highest scope capability held by the principal
	pub fn of(principal: &Principal) -> Self {
		RANKED_SCOPES
			.iter()
			.find(|(name, _)| principal.has(name))
			.map_or(Scope::Explicit, |(_, scope)| *scope)
	}
}

/// Counting circles a principal can see and use
#[derive(Debug, Clone, Default)]
pub struct CircleAccess {
	pub accessible: HashSet<Box<str>>,
	pub readable: HashSet<Box<str>>,
}

impl CircleAccess {
	pub fn check_read(&self, cc_id: &str) -> ClResult<()> {
		if self.readable.contains(cc_id) {
			Ok(())
		} else {
			warn!(cc_id, "Counting circle not readable");
			Err(Error::NotFound)
		}
	}

	pub fn check_write(&self, cc_id: &str) -> ClResult<()> {
		self.check_read(cc_id)?;
		if self.accessible.contains(cc_id) {
			Ok(())
		} else {
			warn!(cc_id, "Counting circle not writable");
			Err(Error::PermissionDenied)
		}
	}
}

#[derive(Debug)]
pub struct PermissionResolver {
	tenant_id: Box<str>,
	scope: Scope,
	index: HierarchyIndex,
	owned_cantons: HashSet<Box<str>>,
	/// Units where every reachable counting circle is usable
	full_units: HashSet<Box<str>>,
	/// Leaf-level grants: unit -> counting circles usable there
	leaf_grants: HashMap<Box<str>, HashSet<Box<str>>>,
	accessible: HashSet<Box<str>>,
	readable: HashSet<Box<str>>,
}

impl PermissionResolver {
	pub async fn load(app: &App, principal: &Principal) -> ClResult<Self> {
		let index = HierarchyIndex::load(app).await?;
		let owned_cantons = canton::owned_cantons(app, &principal.tenant_id).await?;
		let grants = app
			.adapter
			.list_grants(&ListGrantOptions {
				tenant_id: Some(principal.tenant_id.clone()),
				..Default::default()
			})
			.await?;

		let scope = Scope::of(principal);
		let mut full_units: HashSet<Box<str>> = HashSet::new();
		if scope == Scope::Global {
			full_units.extend(index.unit_ids().cloned());
		} else {
			if scope >= Scope::Canton && !owned_cantons.is_empty() {
				let opts = ListUnitOptions {
					cantons: Some(owned_cantons.iter().cloned().collect()),
					..Default::default()
				};
				let units = app.adapter.list_units(&opts).await?;
				full_units.extend(units.into_iter().map(|u| u.id).filter(|id| index.contains(id)));
			}
			if scope >= Scope::Tenant {
				let opts = ListUnitOptions {
					owner_tenant_id: Some(principal.tenant_id.clone()),
					..Default::default()
				};
				for unit in app.adapter.list_units(&opts).await? {
					if index.contains(&unit.id) {
						full_units.extend(index.subtree_of(&unit.id));
					}
				}
			}
		}

		let mut leaf_grants: HashMap<Box<str>, HashSet<Box<str>>> = HashMap::new();
		for grant in grants {
			if !index.contains(&grant.unit_id) {
				continue;
			}
			if grant.is_parent_level {
				full_units.extend(index.subtree_of(&grant.unit_id));
			} else {
				leaf_grants.entry(grant.unit_id).or_default().extend(grant.counting_circle_ids);
			}
		}

		let accessible: HashSet<Box<str>> =
			full_units.iter().chain(leaf_grants.keys()).cloned().collect();
		let mut readable = accessible.clone();
		for unit_id in &accessible {
			readable.extend(index.ancestors_of(unit_id).iter().cloned());
		}

		debug!(
			tenant = %principal.tenant_id,
			?scope,
			accessible = accessible.len(),
			readable = readable.len(),
			"Resolved permissions"
		);
		Ok(Self {
			tenant_id: principal.tenant_id.clone(),
			scope,
			index,
			owned_cantons,
			full_units,
			leaf_grants,
			accessible,
			readable,
		})
	}

	pub fn scope(&self) -> Scope {
		self.scope
	}

	pub fn tenant_id(&self) -> &str {
		&self.tenant_id
	}

	pub fn index(&self) -> &HierarchyIndex {
		&self.index
	}

	pub fn owned_cantons(&self) -> &HashSet<Box<str>> {
		&self.owned_cantons
	}

	/// Units the principal may fully operate on
	pub fn accessible_units(&self) -> &HashSet<Box<str>> {
		&self.accessible
	}

	/// Accessible units and their ancestor chains
	pub fn readable_units(&self) -> &HashSet<Box<str>> {
		&self.readable
	}

	/// Accessible through a scope or a parent-level grant, not only a leaf-level one
	pub fn has_full_access(&self, unit_id: &str) -> bool {
		self.full_units.contains(unit_id)
	}

	pub fn is_owner_of_canton(&self, canton: &str) -> bool {
		self.owned_cantons.contains(canton)
	}

	/// Whether the principal may create or reassign counting circles of `canton`
	pub fn can_manage_canton(&self, canton: &str) -> bool {
		match self.scope {
			Scope::Global => true,
			Scope::Canton => self.is_owner_of_canton(canton),
			Scope::Tenant | Scope::Explicit => false,
		}
	}

	/// Visibility of a unit row, including soft-deleted ones that are no
	/// longer part of the closure
	pub fn can_read_unit(&self, unit: &Unit) -> bool {
		if self.readable.contains(&unit.id) {
			return true;
		}
		unit.deleted
			&& match self.scope {
				Scope::Global => true,
				Scope::Canton => {
					self.is_owner_of_canton(&unit.canton) || unit.owner_tenant_id == self.tenant_id
				}
				Scope::Tenant | Scope::Explicit => unit.owner_tenant_id == self.tenant_id,
			}
	}

	pub fn check_unit_read(&self, unit_id: &str) -> ClResult<()> {
		if self.readable.contains(unit_id) {
			Ok(())
		} else {
			warn!(tenant = %self.tenant_id, unit_id, "Unit not readable");
			Err(Error::NotFound)
		}
	}

	pub fn check_unit_write(&self, unit_id: &str) -> ClResult<()> {
		self.check_unit_read(unit_id)?;
		if self.accessible.contains(unit_id) {
			Ok(())
		} else {
			warn!(tenant = %self.tenant_id, unit_id, "Unit not writable");
			Err(Error::PermissionDenied)
		}
	}

	/// Counting circles reachable under the accessible units (restricted to
	/// the grant's set at leaf-level grant units) and under the readable units
	pub async fn counting_circle_access(&self, app: &App) -> ClResult<CircleAccess> {
		if self.scope == Scope::Global {
			let circles =
				app.adapter.list_counting_circles(&ListCountingCircleOptions::default()).await?;
			let ids: HashSet<Box<str>> = circles.into_iter().map(|c| c.id).collect();
			return Ok(CircleAccess { accessible: ids.clone(), readable: ids });
		}

		let mut access = CircleAccess::default();
		if !self.readable.is_empty() {
			let opts = ListAssignmentOptions {
				unit_ids: Some(self.readable.iter().cloned().collect()),
				..Default::default()
			};
			for row in app.adapter.list_assignments(&opts).await? {
				let usable = self.full_units.contains(&row.unit_id)
					|| self
						.leaf_grants
						.get(&row.unit_id)
						.is_some_and(|ccs| ccs.contains(&row.counting_circle_id));
				if usable {
					access.accessible.insert(row.counting_circle_id.clone());
				}
				access.readable.insert(row.counting_circle_id);
			}
		}

		if self.scope == Scope::Canton && !self.owned_cantons.is_empty() {
			let opts = ListCountingCircleOptions {
				cantons: Some(self.owned_cantons.iter().cloned().collect()),
				..Default::default()
			};
			for circle in app.adapter.list_counting_circles(&opts).await? {
				access.accessible.insert(circle.id.clone());
				access.readable.insert(circle.id);
			}
		}
		Ok(access)
	}

	pub async fn accessible_counting_circles(&self, app: &App) -> ClResult<HashSet<Box<str>>> {
		Ok(self.counting_circle_access(app).await?.accessible)
	}
}

pub async fn accessible_units(app: &App, principal: &Principal) -> ClResult<HashSet<Box<str>>> {
	Ok(PermissionResolver::load(app, principal).await?.accessible)
}

pub async fn readable_units(app: &App, principal: &Principal) -> ClResult<HashSet<Box<str>>> {
	Ok(PermissionResolver::load(app, principal).await?.readable)
}

pub async fn accessible_counting_circles(
	app: &App,
	principal: &Principal,
) -> ClResult<HashSet<Box<str>>> {
	PermissionResolver::load(app, principal).await?.accessible_counting_circles(app).await
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_scope_precedence() {
		let p = Principal::new("t", [perm::SCOPE_TENANT, perm::SCOPE_GLOBAL]);
		assert_eq!(Scope::of(&p), Scope::Global);
		let p = Principal::new("t", [perm::SCOPE_TENANT, perm::SCOPE_CANTON]);
		assert_eq!(Scope::of(&p), Scope::Canton);
		let p = Principal::new("t", [perm::SCOPE_TENANT, perm::UNIT_WRITE]);
		assert_eq!(Scope::of(&p), Scope::Tenant);
		let p = Principal::new("t", [perm::UNIT_WRITE]);
		assert_eq!(Scope::of(&p), Scope::Explicit);
		assert!(Scope::Global > Scope::Canton && Scope::Canton > Scope::Tenant);
	}

	#[test]
	fn test_circle_access_checks() {
		let access = CircleAccess {
			accessible: HashSet::from(["a".into()]),
			readable: HashSet::from(["a".into(), "b".into()]),
		};
		assert!(access.check_write("a").is_ok());
		assert!(matches!(access.check_write("b"), Err(Error::PermissionDenied)));
		assert!(matches!(access.check_write("c"), Err(Error::NotFound)));
		assert!(access.check_read("b").is_ok());
	}
}

// vim: ts=4
