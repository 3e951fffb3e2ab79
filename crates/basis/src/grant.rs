//! Explicit (tenant, unit) permission grants.
//!
//! A parent-level grant always lists every counting circle reachable at its
//! unit. A leaf-level grant lists a subset of them and is pruned whenever a
//! circle stops being reachable there.

use std::collections::{BTreeSet, HashMap};

use serde::Deserialize;

use crate::permission::PermissionResolver;
use crate::prelude::*;
use basis_types::basis_adapter::{ListAssignmentOptions, ListGrantOptions, PermissionGrant};
use basis_types::principal::perm;
use basis_types::utils::normalize_ids;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetGrantData {
	pub tenant_id: Box<str>,
	pub unit_id: Box<str>,
	#[serde(default)]
	pub counting_circle_ids: Vec<Box<str>>,
	pub is_parent_level: bool,
}

/// Counting circles reachable (directly or inherited) at each of `unit_ids`
async fn reachable_at(
	app: &App,
	unit_ids: &[Box<str>],
) -> ClResult<HashMap<Box<str>, BTreeSet<Box<str>>>> {
	let rows = app
		.adapter
		.list_assignments(&ListAssignmentOptions {
			unit_ids: Some(unit_ids.to_vec()),
			..Default::default()
		})
		.await?;
	let mut reachable: HashMap<Box<str>, BTreeSet<Box<str>>> = HashMap::new();
	for row in rows {
		reachable.entry(row.unit_id).or_default().insert(row.counting_circle_id);
	}
	Ok(reachable)
}

/// Bring the grants on `unit_ids` in line with what is reachable there
pub(crate) async fn reconcile_grants(app: &App, unit_ids: &[Box<str>]) -> ClResult<()> {
	if unit_ids.is_empty() {
		return Ok(());
	}
	let grants = app
		.adapter
		.list_grants(&ListGrantOptions { unit_ids: Some(unit_ids.to_vec()), ..Default::default() })
		.await?;
	if grants.is_empty() {
		return Ok(());
	}
	let reachable = reachable_at(app, unit_ids).await?;
	let empty = BTreeSet::new();

	for grant in grants {
		let at_unit = reachable.get(&grant.unit_id).unwrap_or(&empty);
		let cc_ids: Vec<Box<str>> = if grant.is_parent_level {
			at_unit.iter().cloned().collect()
		} else {
			normalize_ids(&grant.counting_circle_ids)
				.into_iter()
				.filter(|id| at_unit.contains(id))
				.collect()
		};
		if cc_ids != normalize_ids(&grant.counting_circle_ids) {
			debug!(tenant = %grant.tenant_id, unit_id = %grant.unit_id, "Reconciling grant");
			app.adapter
				.upsert_grant(&PermissionGrant { counting_circle_ids: cc_ids, ..grant })
				.await?;
		}
	}
	Ok(())
}

/// Grant `tenant_id` ownership of `unit_id` itself
pub(crate) async fn grant_parent_level(app: &App, tenant_id: &str, unit_id: &str) -> ClResult<()> {
	let unit_ids: Vec<Box<str>> = vec![unit_id.into()];
	let reachable = reachable_at(app, &unit_ids).await?;
	let cc_ids: Vec<Box<str>> =
		reachable.get(unit_id).map(|ids| ids.iter().cloned().collect()).unwrap_or_default();
	app.adapter
		.upsert_grant(&PermissionGrant {
			tenant_id: tenant_id.into(),
			unit_id: unit_id.into(),
			counting_circle_ids: cc_ids,
			is_parent_level: true,
			deleted: false,
		})
		.await
}

pub async fn set_grant(
	app: &App,
	principal: &Principal,
	data: &SetGrantData,
) -> ClResult<PermissionGrant> {
	principal.require(perm::GRANT_WRITE)?;
	// Reachability must not change before the upsert
	let _guard = app.structure_lock.lock().await;
	let resolver = PermissionResolver::load(app, principal).await?;
	resolver.check_unit_write(&data.unit_id)?;

	let reachable = reachable_at(app, std::slice::from_ref(&data.unit_id)).await?;
	let empty = BTreeSet::new();
	let at_unit = reachable.get(&data.unit_id).unwrap_or(&empty);

	let counting_circle_ids = if data.is_parent_level {
		if !resolver.has_full_access(&data.unit_id) {
			warn!(
				tenant = %principal.tenant_id,
				unit_id = %data.unit_id,
				"Parent-level grant requires full unit access"
			);
			return Err(Error::PermissionDenied);
		}
		at_unit.iter().cloned().collect()
	} else {
		let cc_ids = normalize_ids(&data.counting_circle_ids);
		if cc_ids.is_empty() {
			return Err(Error::ValidationError("leaf-level grant without counting circles".into()));
		}
		if let Some(missing) = cc_ids.iter().find(|id| !at_unit.contains(*id)) {
			return Err(Error::ValidationError(format!(
				"counting circle {} is not reachable at unit {}",
				missing, data.unit_id
			)));
		}
		let access = resolver.counting_circle_access(app).await?;
		for cc_id in &cc_ids {
			access.check_write(cc_id)?;
		}
		cc_ids
	};

	let grant = PermissionGrant {
		tenant_id: data.tenant_id.clone(),
		unit_id: data.unit_id.clone(),
		counting_circle_ids,
		is_parent_level: data.is_parent_level,
		deleted: false,
	};
	app.adapter.upsert_grant(&grant).await?;
	info!(
		tenant = %principal.tenant_id,
		grantee = %grant.tenant_id,
		unit_id = %grant.unit_id,
		parent_level = grant.is_parent_level,
		"Grant set"
	);
	Ok(grant)
}

pub async fn revoke_grant(
	app: &App,
	principal: &Principal,
	tenant_id: &str,
	unit_id: &str,
) -> ClResult<()> {
	principal.require(perm::GRANT_WRITE)?;
	let _guard = app.structure_lock.lock().await;
	let resolver = PermissionResolver::load(app, principal).await?;
	resolver.check_unit_write(unit_id)?;

	app.adapter.delete_grant(tenant_id, unit_id).await?;
	info!(tenant = %principal.tenant_id, grantee = tenant_id, unit_id, "Grant revoked");
	Ok(())
}

/// Grants on units the principal may operate on
pub async fn list_grants(
	app: &App,
	principal: &Principal,
	include_deleted: bool,
) -> ClResult<Vec<PermissionGrant>> {
	let resolver = PermissionResolver::load(app, principal).await?;
	let grants = app
		.adapter
		.list_grants(&ListGrantOptions { include_deleted, ..Default::default() })
		.await?;
	Ok(grants.into_iter().filter(|g| resolver.accessible_units().contains(&g.unit_id)).collect())
}

// vim: ts=4
