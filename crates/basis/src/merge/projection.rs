//! Projections of merge order events onto the read model.
//!
//! Every handler converges to the same state when applied more than once, so
//! the log can be replayed at any time.

use std::collections::{BTreeMap, HashSet};

use super::aggregate::{MergeOrder, MergeOrderState};
use crate::hierarchy::HierarchyIndex;
use crate::prelude::*;
use basis_types::basis_adapter::{
	Assignment, CountingCircleState, ListAssignmentOptions, MergeOrderView,
};
use basis_types::event::{BasisEvent, MergeSchedule, StoredEvent};
use basis_types::utils::normalize_ids;

/// Whether the read model already holds the order as merged
async fn is_merged(app: &App, successor_id: &str) -> ClResult<bool> {
	match app.adapter.read_merger_by_successor(successor_id).await {
		Ok(view) => Ok(view.merged),
		Err(Error::NotFound) => Ok(false),
		Err(err) => Err(err),
	}
}

async fn project_schedule(app: &App, schedule: &MergeSchedule) -> ClResult<()> {
	// Replayed schedule of an activated order, the successor may have changed since
	if is_merged(app, &schedule.successor.id).await? {
		debug!(merger_id = %schedule.merger_id, "Skipping schedule of merged order");
		return Ok(());
	}
	app.adapter.upsert_counting_circle(&schedule.successor, CountingCircleState::Inactive).await?;
	app.adapter
		.upsert_merger(&MergeOrderView {
			id: schedule.merger_id.clone(),
			successor_id: schedule.successor.id.clone(),
			source_ids: schedule.source_ids.clone(),
			copy_from_id: schedule.copy_from_id.clone(),
			active_from: schedule.active_from,
			merged: false,
			merged_at: None,
		})
		.await
}

/// Replace every assignment of a source circle with one of the successor.
///
/// Where several sources meet at a unit the row whose source unit is highest
/// in the tree wins, so the successor stays inherited wherever one of the
/// sources was.
pub(crate) async fn rewrite_assignments(
	app: &App,
	source_ids: &[Box<str>],
	successor_id: &str,
) -> ClResult<usize> {
	let rows = app
		.adapter
		.list_assignments(&ListAssignmentOptions {
			counting_circle_ids: Some(source_ids.to_vec()),
			..Default::default()
		})
		.await?;
	if rows.is_empty() {
		return Ok(0);
	}
	let index = HierarchyIndex::load(app).await?;

	let existing: HashSet<Box<str>> = app
		.adapter
		.list_assignments(&ListAssignmentOptions {
			counting_circle_ids: Some(vec![successor_id.into()]),
			..Default::default()
		})
		.await?
		.into_iter()
		.map(|a| a.unit_id)
		.collect();

	let rank = |a: &Assignment| (index.depth_of(&a.source_unit_id), a.source_unit_id.clone());
	let mut by_unit: BTreeMap<&str, &Assignment> = BTreeMap::new();
	for row in &rows {
		let entry = by_unit.entry(row.unit_id.as_ref()).or_insert(row);
		if rank(row) < rank(*entry) {
			*entry = row;
		}
	}
	let successors: Vec<Assignment> = by_unit
		.into_iter()
		.filter(|(unit_id, _)| !existing.contains(*unit_id))
		.map(|(unit_id, row)| Assignment {
			unit_id: unit_id.into(),
			counting_circle_id: successor_id.into(),
			source_unit_id: row.source_unit_id.clone(),
		})
		.collect();

	app.adapter.remove_assignments(&rows).await?;
	app.adapter.add_assignments(&successors).await?;
	debug!(successor_id, removed = rows.len(), added = successors.len(), "Rewrote assignments");
	Ok(successors.len())
}

/// Apply one stored event to the read model
pub async fn apply(app: &App, stored: &StoredEvent) -> ClResult<()> {
	debug!(seq = stored.seq, stream_id = %stored.stream_id, kind = stored.event.kind(), "Projecting");
	match &stored.event {
		BasisEvent::MergeScheduled { schedule } | BasisEvent::MergeScheduleUpdated { schedule } => {
			project_schedule(app, schedule).await
		}
		// The view goes last: while it exists the deletion is not fully projected
		BasisEvent::MergeScheduleDeleted { merger_id, successor_id } => {
			app.adapter
				.set_counting_circle_state(
					successor_id,
					CountingCircleState::Deleted,
					Patch::Undefined,
					Patch::Undefined,
				)
				.await?;
			app.adapter.delete_merger(merger_id).await
		}
		// Marking the view merged comes last for the same reason
		BasisEvent::MergeActivated { merger_id, successor_id, source_ids, activated_at } => {
			rewrite_assignments(app, source_ids, successor_id).await?;
			for source_id in source_ids {
				app.adapter.replace_grant_counting_circle(source_id, successor_id).await?;
			}
			if !is_merged(app, successor_id).await? {
				app.adapter
					.set_counting_circle_state(
						successor_id,
						CountingCircleState::Active,
						Patch::Null,
						Patch::Value(merger_id.as_ref()),
					)
					.await?;
				app.adapter.mark_merger_merged(merger_id, *activated_at).await?;
			}
			Ok(())
		}
		BasisEvent::CountingCircleMerged { counting_circle_id, merge_target_id, .. } => {
			app.adapter
				.set_counting_circle_state(
					counting_circle_id,
					CountingCircleState::Merged,
					Patch::Value(merge_target_id.as_ref()),
					Patch::Undefined,
				)
				.await
		}
	}
}

/// Whether the read model holds everything the order's stream says.
///
/// Projections run after the append, a failing one leaves the read model
/// behind the stream until it is projected again.
pub(crate) async fn is_projected(app: &App, order: &MergeOrder) -> ClResult<bool> {
	let view = match app.adapter.read_merger_by_successor(&order.successor_id).await {
		Ok(view) => Some(view),
		Err(Error::NotFound) => None,
		Err(err) => return Err(err),
	};
	let Some(schedule) = order.schedule.as_ref() else {
		return Ok(view.is_none());
	};
	match (order.state, view) {
		(MergeOrderState::Scheduled, Some(view)) => Ok(!view.merged
			&& view.id == schedule.merger_id
			&& normalize_ids(&view.source_ids) == normalize_ids(&schedule.source_ids)
			&& view.copy_from_id == schedule.copy_from_id
			&& view.active_from == schedule.active_from),
		(MergeOrderState::Activated, Some(view)) if view.merged => {
			for source_id in &schedule.source_ids {
				let circle = app.adapter.read_counting_circle(source_id).await?;
				if circle.state != CountingCircleState::Merged {
					return Ok(false);
				}
			}
			Ok(true)
		}
		(MergeOrderState::Deleted, None) => Ok(true),
		_ => Ok(false),
	}
}

/// Re-apply the events of one stream. Callers hold `structure_lock`.
pub(crate) async fn project_stream(app: &App, successor_id: &str) -> ClResult<usize> {
	let events = app.adapter.list_events(Some(successor_id)).await?;
	for stored in &events {
		apply(app, stored).await?;
	}
	Ok(events.len())
}

/// Re-apply the events of one merge order stream
pub async fn replay_stream(app: &App, successor_id: &str) -> ClResult<usize> {
	let _guard = app.structure_lock.lock().await;
	let count = project_stream(app, successor_id).await?;
	info!(stream_id = successor_id, events = count, "Replayed merge order stream");
	Ok(count)
}

/// Re-apply the whole event log in sequence order
pub async fn replay_all(app: &App) -> ClResult<usize> {
	let _guard = app.structure_lock.lock().await;
	let events = app.adapter.list_events(None).await?;
	for stored in &events {
		apply(app, stored).await?;
	}
	info!(events = events.len(), "Replayed event log");
	Ok(events.len())
}

// vim: ts=4
