//! Canton ownership. A tenant owns a canton when it holds the canton's
//! administrative settings record.

use std::collections::HashSet;

use crate::permission::Scope;
use crate::prelude::*;
use basis_types::basis_adapter::CantonSettings;
use basis_types::principal::perm;

/// Cantons whose settings record is held by `tenant_id`
pub async fn owned_cantons(app: &App, tenant_id: &str) -> ClResult<HashSet<Box<str>>> {
	let settings = app.adapter.list_canton_settings().await?;
	Ok(settings
		.into_iter()
		.filter(|s| s.tenant_id.as_ref() == tenant_id)
		.map(|s| s.canton)
		.collect())
}

pub async fn is_owner_of_canton(app: &App, principal: &Principal, canton: &str) -> ClResult<bool> {
	Ok(owned_cantons(app, &principal.tenant_id).await?.contains(canton))
}

/// Hand the settings record of `canton` to `tenant_id`. Global scope only.
pub async fn set_canton_owner(
	app: &App,
	principal: &Principal,
	canton: &str,
	tenant_id: &str,
) -> ClResult<()> {
	principal.require(perm::CANTON_WRITE)?;
	if Scope::of(principal) != Scope::Global {
		warn!(tenant = %principal.tenant_id, canton, "Canton ownership change requires global scope");
		return Err(Error::PermissionDenied);
	}
	if canton.trim().is_empty() || tenant_id.trim().is_empty() {
		return Err(Error::ValidationError("canton and tenant must not be empty".into()));
	}

	app.adapter.upsert_canton_settings(canton, tenant_id).await?;
	info!(tenant = %principal.tenant_id, canton, owner = tenant_id, "Canton owner set");
	Ok(())
}

pub async fn list_canton_settings(app: &App, principal: &Principal) -> ClResult<Vec<CantonSettings>> {
	let settings = app.adapter.list_canton_settings().await?;
	if Scope::of(principal) == Scope::Global {
		return Ok(settings);
	}
	Ok(settings.into_iter().filter(|s| s.tenant_id == principal.tenant_id).collect())
}

// vim: ts=4
