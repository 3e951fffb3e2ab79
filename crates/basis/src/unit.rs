//! Organizational unit administration

use serde::Deserialize;

use crate::permission::{PermissionResolver, Scope};
use crate::prelude::*;
use crate::{assignment, grant, hierarchy};
use basis_types::basis_adapter::{
	CreateUnitData, ListAssignmentOptions, ListGrantOptions, ListUnitOptions, Unit, UpdateUnitData,
};
use basis_types::principal::perm;
use basis_types::utils::new_id;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewUnitData {
	pub parent_id: Option<Box<str>>,
	pub name: Box<str>,
	pub canton: Box<str>,
	pub owner_tenant_id: Box<str>,
}

fn require_not_blank(field: &str, value: &str) -> ClResult<()> {
	if value.trim().is_empty() {
		return Err(Error::ValidationError(format!("{} must not be empty", field)));
	}
	Ok(())
}

pub async fn create_unit(app: &App, principal: &Principal, data: &NewUnitData) -> ClResult<Unit> {
	principal.require(perm::UNIT_WRITE)?;
	require_not_blank("name", &data.name)?;
	require_not_blank("canton", &data.canton)?;
	require_not_blank("ownerTenantId", &data.owner_tenant_id)?;

	let _guard = app.structure_lock.lock().await;
	let resolver = PermissionResolver::load(app, principal).await?;
	match data.parent_id {
		Some(ref parent_id) => resolver.check_unit_write(parent_id)?,
		None if resolver.scope() == Scope::Global => (),
		None => {
			warn!(tenant = %principal.tenant_id, "Root units require global scope");
			return Err(Error::PermissionDenied);
		}
	}

	let unit_id = new_id();
	app.adapter
		.create_unit(&CreateUnitData {
			id: unit_id.clone(),
			parent_id: data.parent_id.clone(),
			name: data.name.clone(),
			canton: data.canton.clone(),
			owner_tenant_id: data.owner_tenant_id.clone(),
		})
		.await?;

	let index = hierarchy::rebuild(app).await?;
	assignment::rederive_subtree(app, &index, &unit_id).await?;
	grant::grant_parent_level(app, &data.owner_tenant_id, &unit_id).await?;

	info!(tenant = %principal.tenant_id, unit_id = %unit_id, parent_id = ?data.parent_id, "Unit created");
	app.adapter.read_unit(&unit_id).await
}

pub async fn update_unit(
	app: &App,
	principal: &Principal,
	unit_id: &str,
	patch: &UpdateUnitData,
) -> ClResult<Unit> {
	principal.require(perm::UNIT_WRITE)?;
	if patch.name.is_null() || patch.canton.is_null() || patch.owner_tenant_id.is_null() {
		return Err(Error::ValidationError("name, canton and owner cannot be cleared".into()));
	}
	if let Patch::Value(ref name) = patch.name {
		require_not_blank("name", name)?;
	}

	let _guard = app.structure_lock.lock().await;
	let resolver = PermissionResolver::load(app, principal).await?;
	resolver.check_unit_write(unit_id)?;
	let unit = app.adapter.read_unit(unit_id).await?;

	match patch.parent_id {
		Patch::Value(ref parent_id) => {
			if resolver.index().would_create_cycle(unit_id, parent_id) {
				warn!(unit_id, parent_id = %parent_id, "Rejected reparenting into own subtree");
				return Err(Error::ValidationError("a unit cannot become its own ancestor".into()));
			}
			resolver.check_unit_write(parent_id)?;
		}
		Patch::Null if resolver.scope() != Scope::Global => {
			warn!(tenant = %principal.tenant_id, unit_id, "Root units require global scope");
			return Err(Error::PermissionDenied);
		}
		Patch::Null | Patch::Undefined => (),
	}
	if let Patch::Value(ref owner) = patch.owner_tenant_id
		&& owner != &unit.owner_tenant_id
		&& !resolver.can_manage_canton(&unit.canton)
	{
		warn!(tenant = %principal.tenant_id, unit_id, "Owner change requires canton ownership");
		return Err(Error::PermissionDenied);
	}

	app.adapter.update_unit(unit_id, patch).await?;

	if !patch.parent_id.is_undefined() {
		let index = hierarchy::rebuild(app).await?;
		assignment::rederive_subtree(app, &index, unit_id).await?;
		grant::reconcile_grants(app, &index.subtree_of(unit_id)).await?;
		info!(tenant = %principal.tenant_id, unit_id, "Unit moved");
	} else if !patch.owner_tenant_id.is_undefined() {
		hierarchy::rebuild(app).await?;
	}
	if let Patch::Value(ref owner) = patch.owner_tenant_id
		&& owner != &unit.owner_tenant_id
	{
		match app.adapter.delete_grant(&unit.owner_tenant_id, unit_id).await {
			Ok(()) | Err(Error::NotFound) => (),
			Err(err) => return Err(err),
		}
		grant::grant_parent_level(app, owner, unit_id).await?;
		info!(unit_id, from = %unit.owner_tenant_id, to = %owner, "Unit owner changed");
	}

	info!(tenant = %principal.tenant_id, unit_id, "Unit updated");
	app.adapter.read_unit(unit_id).await
}

/// Soft-delete a unit with its subtree, dropping their assignments and grants
pub async fn delete_unit(app: &App, principal: &Principal, unit_id: &str) -> ClResult<()> {
	principal.require(perm::UNIT_WRITE)?;
	let _guard = app.structure_lock.lock().await;
	let resolver = PermissionResolver::load(app, principal).await?;
	resolver.check_unit_write(unit_id)?;

	let subtree = resolver.index().subtree_of(unit_id);
	let rows = app
		.adapter
		.list_assignments(&ListAssignmentOptions {
			unit_ids: Some(subtree.clone()),
			..Default::default()
		})
		.await?;
	app.adapter.remove_assignments(&rows).await?;

	let grants = app
		.adapter
		.list_grants(&ListGrantOptions { unit_ids: Some(subtree.clone()), ..Default::default() })
		.await?;
	for grant in grants {
		app.adapter.delete_grant(&grant.tenant_id, &grant.unit_id).await?;
	}

	app.adapter.delete_units(&subtree).await?;
	hierarchy::rebuild(app).await?;

	info!(tenant = %principal.tenant_id, unit_id, units = subtree.len(), "Unit subtree deleted");
	Ok(())
}

pub async fn read_unit(app: &App, principal: &Principal, unit_id: &str) -> ClResult<Unit> {
	let resolver = PermissionResolver::load(app, principal).await?;
	let unit = app.adapter.read_unit(unit_id).await?;
	if !resolver.can_read_unit(&unit) {
		warn!(tenant = %principal.tenant_id, unit_id, "Unit not readable");
		return Err(Error::NotFound);
	}
	Ok(unit)
}

/// Units readable by the principal, soft-deleted ones on request
pub async fn list_units(
	app: &App,
	principal: &Principal,
	include_deleted: bool,
) -> ClResult<Vec<Unit>> {
	let resolver = PermissionResolver::load(app, principal).await?;
	let units =
		app.adapter.list_units(&ListUnitOptions { include_deleted, ..Default::default() }).await?;
	Ok(units.into_iter().filter(|u| resolver.can_read_unit(u)).collect())
}

// vim: ts=4
