//! Counting circle administration and merge locks

use itertools::Itertools;
use serde::Deserialize;

use crate::grant;
use crate::permission::{PermissionResolver, Scope};
use crate::prelude::*;
use basis_types::basis_adapter::{
	CountingCircle, CountingCircleData, CountingCircleState, ListAssignmentOptions,
	ListCountingCircleOptions, ListMergerOptions, MergeOrderView, UpdateCountingCircleData,
};
use basis_types::principal::perm;
use basis_types::utils::new_id;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCountingCircleData {
	pub name: Box<str>,
	pub bfs: Box<str>,
	pub code: Box<str>,
	pub canton: Box<str>,
	#[serde(default)]
	pub contact_email: Option<Box<str>>,
}

/// Unmerged order that has `cc_id` among its sources
pub(crate) async fn pending_merge_of_source(
	app: &App,
	cc_id: &str,
) -> ClResult<Option<MergeOrderView>> {
	let opts = ListMergerOptions {
		merged: Some(false),
		source_id: Some(cc_id.into()),
		..Default::default()
	};
	Ok(app.adapter.list_mergers(&opts).await?.into_iter().next())
}

/// Unmerged order that creates `cc_id` as its successor
pub(crate) async fn pending_merge_of_successor(
	app: &App,
	cc_id: &str,
) -> ClResult<Option<MergeOrderView>> {
	let opts = ListMergerOptions {
		merged: Some(false),
		successor_id: Some(cc_id.into()),
		..Default::default()
	};
	Ok(app.adapter.list_mergers(&opts).await?.into_iter().next())
}

/// Fail unless the circle may be edited outside of the merge orchestrator
pub(crate) async fn check_unlocked(app: &App, circle: &CountingCircle) -> ClResult<()> {
	match circle.state {
		CountingCircleState::Merged => {
			warn!(cc_id = %circle.id, "Counting circle is merged");
			return Err(Error::Conflict(format!("counting circle is merged: {}", circle.id)));
		}
		CountingCircleState::Deleted => return Err(Error::NotFound),
		CountingCircleState::Active | CountingCircleState::Inactive => (),
	}
	if let Some(merger) = pending_merge_of_source(app, &circle.id).await? {
		warn!(cc_id = %circle.id, merger_id = %merger.id, "Counting circle is in a scheduled merge");
		return Err(Error::Conflict("counting circle is in a scheduled merge".into()));
	}
	if let Some(merger) = pending_merge_of_successor(app, &circle.id).await? {
		warn!(cc_id = %circle.id, merger_id = %merger.id, "Successor of a scheduled merge");
		return Err(Error::Conflict("modifications not allowed".into()));
	}
	Ok(())
}

pub async fn create_counting_circle(
	app: &App,
	principal: &Principal,
	data: &NewCountingCircleData,
) -> ClResult<CountingCircle> {
	principal.require(perm::COUNTING_CIRCLE_WRITE)?;
	if data.name.trim().is_empty() || data.canton.trim().is_empty() {
		return Err(Error::ValidationError("name and canton must not be empty".into()));
	}
	let resolver = PermissionResolver::load(app, principal).await?;
	if !resolver.can_manage_canton(&data.canton) {
		warn!(tenant = %principal.tenant_id, canton = %data.canton, "Canton not managed by tenant");
		return Err(Error::PermissionDenied);
	}

	let cc_id = new_id();
	let circle = CountingCircleData {
		id: cc_id.clone(),
		name: data.name.clone(),
		bfs: data.bfs.clone(),
		code: data.code.clone(),
		canton: data.canton.clone(),
		contact_email: data.contact_email.clone(),
	};
	app.adapter.upsert_counting_circle(&circle, CountingCircleState::Active).await?;

	info!(tenant = %principal.tenant_id, cc_id = %cc_id, "Counting circle created");
	app.adapter.read_counting_circle(&cc_id).await
}

pub async fn update_counting_circle(
	app: &App,
	principal: &Principal,
	cc_id: &str,
	patch: &UpdateCountingCircleData,
) -> ClResult<CountingCircle> {
	principal.require(perm::COUNTING_CIRCLE_WRITE)?;
	if patch.name.is_null() {
		return Err(Error::ValidationError("name cannot be cleared".into()));
	}
	// A merge scheduled between the lock check and the write would miss it
	let _guard = app.structure_lock.lock().await;
	let resolver = PermissionResolver::load(app, principal).await?;
	resolver.counting_circle_access(app).await?.check_write(cc_id)?;

	let circle = app.adapter.read_counting_circle(cc_id).await?;
	check_unlocked(app, &circle).await?;
	app.adapter.update_counting_circle(cc_id, patch).await?;

	info!(tenant = %principal.tenant_id, cc_id, "Counting circle updated");
	app.adapter.read_counting_circle(cc_id).await
}

/// Soft-delete a counting circle and drop it from every unit
pub async fn delete_counting_circle(
	app: &App,
	principal: &Principal,
	cc_id: &str,
) -> ClResult<()> {
	principal.require(perm::COUNTING_CIRCLE_WRITE)?;
	let _guard = app.structure_lock.lock().await;
	let resolver = PermissionResolver::load(app, principal).await?;
	resolver.counting_circle_access(app).await?.check_write(cc_id)?;

	let circle = app.adapter.read_counting_circle(cc_id).await?;
	check_unlocked(app, &circle).await?;

	let rows = app
		.adapter
		.list_assignments(&ListAssignmentOptions {
			counting_circle_ids: Some(vec![cc_id.into()]),
			..Default::default()
		})
		.await?;
	let unit_ids: Vec<Box<str>> = rows.iter().map(|a| a.unit_id.clone()).unique().collect();
	app.adapter.remove_assignments(&rows).await?;
	app.adapter
		.set_counting_circle_state(
			cc_id,
			CountingCircleState::Deleted,
			Patch::Undefined,
			Patch::Undefined,
		)
		.await?;
	grant::reconcile_grants(app, &unit_ids).await?;

	info!(tenant = %principal.tenant_id, cc_id, units = unit_ids.len(), "Counting circle deleted");
	Ok(())
}

pub async fn read_counting_circle(
	app: &App,
	principal: &Principal,
	cc_id: &str,
) -> ClResult<CountingCircle> {
	let resolver = PermissionResolver::load(app, principal).await?;
	if resolver.scope() != Scope::Global {
		resolver.counting_circle_access(app).await?.check_read(cc_id)?;
	}
	let circle = app.adapter.read_counting_circle(cc_id).await?;
	if circle.state == CountingCircleState::Deleted && resolver.scope() != Scope::Global {
		return Err(Error::NotFound);
	}
	Ok(circle)
}

/// Counting circles readable by the principal; soft-deleted ones are only
/// listed under global scope
pub async fn list_counting_circles(
	app: &App,
	principal: &Principal,
	include_deleted: bool,
) -> ClResult<Vec<CountingCircle>> {
	let resolver = PermissionResolver::load(app, principal).await?;
	let global = resolver.scope() == Scope::Global;
	let circles = app
		.adapter
		.list_counting_circles(&ListCountingCircleOptions {
			include_deleted: include_deleted && global,
			..Default::default()
		})
		.await?;
	if global {
		return Ok(circles);
	}
	let access = resolver.counting_circle_access(app).await?;
	Ok(circles.into_iter().filter(|c| access.readable.contains(&c.id)).collect())
}

// vim: ts=4
