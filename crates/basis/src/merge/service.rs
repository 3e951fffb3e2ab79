//! Merge order commands and queries

use serde::Deserialize;

use super::aggregate::{MergeOrder, MergeOrderState, validate_source_ids};
use super::projection;
use crate::counting_circle::{pending_merge_of_source, pending_merge_of_successor};
use crate::permission::{PermissionResolver, Scope};
use crate::prelude::*;
use basis_types::basis_adapter::{
	CountingCircle, CountingCircleData, CountingCircleState, ListMergerOptions, MergeOrderView,
};
use basis_types::event::{BasisEvent, MergeSchedule, StoredEvent};
use basis_types::principal::perm;
use basis_types::utils::{new_id, normalize_ids};

/// Master data of the successor circle. The canton is taken from the
/// copy-from circle, as is the contact email when none is given.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuccessorData {
	#[serde(default)]
	pub id: Option<Box<str>>,
	pub name: Box<str>,
	pub bfs: Box<str>,
	pub code: Box<str>,
	#[serde(default)]
	pub contact_email: Option<Box<str>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeData {
	pub source_ids: Vec<Box<str>>,
	pub copy_from_id: Box<str>,
	pub successor: SuccessorData,
	pub active_from: Timestamp,
}

/// Rebuild a merge order from its stream
pub async fn load_order(app: &App, successor_id: &str) -> ClResult<MergeOrder> {
	let events = app.adapter.list_events(Some(successor_id)).await?;
	Ok(MergeOrder::from_events(successor_id, &events))
}

/// Load an order with the read model brought up to its stream. Returns
/// whether the stream had to be projected again. Callers hold
/// `structure_lock`.
async fn load_projected(app: &App, successor_id: &str) -> ClResult<(MergeOrder, bool)> {
	let order = load_order(app, successor_id).await?;
	if order.state == MergeOrderState::Absent || projection::is_projected(app, &order).await? {
		return Ok((order, false));
	}
	warn!(successor_id, version = order.version, "Read model behind merge order stream");
	let count = projection::project_stream(app, successor_id).await?;
	info!(successor_id, events = count, "Merge order stream projected again");
	Ok((order, true))
}

/// Append events at the order's version, project and publish them.
///
/// Callers hold `structure_lock`. A concurrent writer that appended to the
/// same stream first makes this fail with `Conflict`. If a projection fails
/// the events stay appended, the next command on the stream or the next
/// activation run projects them again.
pub async fn commit(
	app: &App,
	order: &MergeOrder,
	events: &[BasisEvent],
) -> ClResult<Vec<StoredEvent>> {
	if events.is_empty() {
		return Ok(Vec::new());
	}
	let stored = app.adapter.append_events(&order.successor_id, order.version, events).await?;
	for event in &stored {
		projection::apply(app, event).await.inspect_err(|err| {
			error!(
				stream_id = %event.stream_id,
				version = event.version,
				"Projection failed: {}",
				err
			);
		})?;
		info!(
			stream_id = %event.stream_id,
			version = event.version,
			kind = event.event.kind(),
			"Merge order event applied"
		);
	}
	if let Err(err) = app.event_sink.publish(&stored).await {
		error!(stream_id = %order.successor_id, "Publishing merge order events failed: {}", err);
	}
	Ok(stored)
}

/// Checks a source circle against the principal's access and its own state.
/// `merger_id` is the order being edited, its own locks do not count.
async fn check_source(
	app: &App,
	circle: &CountingCircle,
	merger_id: Option<&str>,
) -> ClResult<()> {
	match circle.state {
		CountingCircleState::Active => (),
		CountingCircleState::Merged => {
			return Err(Error::Conflict(format!("counting circle is merged: {}", circle.id)));
		}
		CountingCircleState::Inactive => {
			return Err(Error::ValidationError(format!(
				"counting circle {} is not active",
				circle.id
			)));
		}
		CountingCircleState::Deleted => return Err(Error::NotFound),
	}
	if let Some(other) = pending_merge_of_source(app, &circle.id).await?
		&& Some(other.id.as_ref()) != merger_id
	{
		warn!(cc_id = %circle.id, merger_id = %other.id, "Source already in a scheduled merge");
		return Err(Error::Conflict("counting circle is in a scheduled merge".into()));
	}
	if pending_merge_of_successor(app, &circle.id).await?.is_some() {
		return Err(Error::Conflict("modifications not allowed".into()));
	}
	Ok(())
}

/// Validate the request against storage and build the schedule it describes
async fn build_schedule(
	app: &App,
	principal: &Principal,
	data: &MergeData,
	merger_id: Box<str>,
	successor_id: Box<str>,
) -> ClResult<MergeSchedule> {
	validate_source_ids(&data.source_ids, &data.copy_from_id)?;

	let resolver = PermissionResolver::load(app, principal).await?;
	let access = resolver.counting_circle_access(app).await?;
	let mut copy_from = None;
	for source_id in &data.source_ids {
		access.check_write(source_id)?;
		let circle = app.adapter.read_counting_circle(source_id).await?;
		check_source(app, &circle, Some(merger_id.as_ref())).await?;
		if circle.id == data.copy_from_id {
			copy_from = Some(circle);
		}
	}
	let copy_from = copy_from.ok_or(Error::NotFound)?;
	if !resolver.can_manage_canton(&copy_from.canton) {
		warn!(
			tenant = %principal.tenant_id,
			canton = %copy_from.canton,
			"Merge outside managed cantons"
		);
		return Err(Error::PermissionDenied);
	}

	Ok(MergeSchedule {
		merger_id,
		successor: CountingCircleData {
			id: successor_id,
			name: data.successor.name.clone(),
			bfs: data.successor.bfs.clone(),
			code: data.successor.code.clone(),
			canton: copy_from.canton.clone(),
			contact_email: data.successor.contact_email.clone().or(copy_from.contact_email),
		},
		source_ids: normalize_ids(&data.source_ids),
		copy_from_id: data.copy_from_id.clone(),
		active_from: data.active_from,
	})
}

/// Schedule a merge; it is activated right away if `active_from` has passed
pub async fn schedule_merge(
	app: &App,
	principal: &Principal,
	data: &MergeData,
	now: Timestamp,
) -> ClResult<MergeOrderView> {
	principal.require(perm::MERGER_WRITE)?;
	let _guard = app.structure_lock.lock().await;

	let successor_id = data.successor.id.clone().unwrap_or_else(new_id);
	match app.adapter.read_counting_circle(&successor_id).await {
		Ok(_) => {
			return Err(Error::Conflict(format!("counting circle {} already exists", successor_id)));
		}
		Err(Error::NotFound) => (),
		Err(err) => return Err(err),
	}

	let schedule = build_schedule(app, principal, data, new_id(), successor_id.clone()).await?;
	let (order, _) = load_projected(app, &successor_id).await?;
	let events = order.schedule(schedule, now)?;
	commit(app, &order, &events).await?;

	info!(tenant = %principal.tenant_id, successor_id = %successor_id, "Merge scheduled");
	app.adapter.read_merger_by_successor(&successor_id).await
}

/// Replace the schedule of a pending merge
pub async fn update_scheduled_merge(
	app: &App,
	principal: &Principal,
	successor_id: &str,
	data: &MergeData,
	now: Timestamp,
) -> ClResult<MergeOrderView> {
	principal.require(perm::MERGER_WRITE)?;
	let _guard = app.structure_lock.lock().await;

	let (order, _) = load_projected(app, successor_id).await?;
	let merger_id = order.check_pending()?.merger_id.clone();
	let schedule = build_schedule(app, principal, data, merger_id, successor_id.into()).await?;
	let events = order.update(schedule, now)?;
	commit(app, &order, &events).await?;

	info!(tenant = %principal.tenant_id, successor_id, "Merge schedule updated");
	app.adapter.read_merger_by_successor(successor_id).await
}

/// Drop a pending merge, releasing its sources and deleting the successor
pub async fn delete_scheduled_merge(
	app: &App,
	principal: &Principal,
	successor_id: &str,
) -> ClResult<()> {
	principal.require(perm::MERGER_WRITE)?;
	let _guard = app.structure_lock.lock().await;

	let (order, _) = load_projected(app, successor_id).await?;
	let schedule = order.check_pending()?;
	let resolver = PermissionResolver::load(app, principal).await?;
	let access = resolver.counting_circle_access(app).await?;
	for source_id in &schedule.source_ids {
		access.check_write(source_id)?;
	}

	let events = order.delete()?;
	commit(app, &order, &events).await?;
	info!(tenant = %principal.tenant_id, successor_id, "Merge schedule deleted");
	Ok(())
}

/// Activate a due merge. Returns false if it was already activated and
/// projected; an activation whose projection was interrupted is completed.
pub async fn activate_merger(app: &App, successor_id: &str, now: Timestamp) -> ClResult<bool> {
	let _guard = app.structure_lock.lock().await;
	let (order, projected) = load_projected(app, successor_id).await?;
	let events = order.activate(now)?;
	if events.is_empty() {
		debug!(successor_id, projected, "Merger already active");
		return Ok(projected);
	}
	commit(app, &order, &events).await?;
	info!(successor_id, merger_id = ?order.merger_id(), "Merger activated");
	Ok(true)
}

/// Merge orders touching a readable counting circle
pub async fn list_mergers(
	app: &App,
	principal: &Principal,
	merged: Option<bool>,
) -> ClResult<Vec<MergeOrderView>> {
	let resolver = PermissionResolver::load(app, principal).await?;
	let mergers =
		app.adapter.list_mergers(&ListMergerOptions { merged, ..Default::default() }).await?;
	if resolver.scope() == Scope::Global {
		return Ok(mergers);
	}
	let access = resolver.counting_circle_access(app).await?;
	Ok(mergers
		.into_iter()
		.filter(|m| {
			access.readable.contains(&m.successor_id)
				|| m.source_ids.iter().any(|id| access.readable.contains(id))
		})
		.collect())
}

/// Current state of a merge order as rebuilt from its stream
pub async fn read_order(app: &App, successor_id: &str) -> ClResult<MergeOrder> {
	let order = load_order(app, successor_id).await?;
	if order.state == MergeOrderState::Absent {
		return Err(Error::NotFound);
	}
	Ok(order)
}

// vim: ts=4
