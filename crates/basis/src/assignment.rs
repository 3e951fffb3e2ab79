//! Unit - counting circle assignments.
//!
//! Assignments are stored materialized: a circle assigned directly at a unit
//! has an inherited row (same source unit) at every descendant. The rows of a
//! subtree are always re-derived as a whole from its direct assignments and
//! the rows of the subtree's parent, so the invariant that a descendant never
//! holds a circle directly that an ancestor already assigns is restored by
//! construction.

use std::collections::{HashMap, HashSet};

use crate::{counting_circle, grant};
use crate::hierarchy::HierarchyIndex;
use crate::permission::{PermissionResolver, Scope};
use crate::prelude::*;
use basis_types::basis_adapter::{
	Assignment, CountingCircle, CountingCircleState, ListAssignmentOptions,
	ListCountingCircleOptions, ListMergerOptions,
};
use basis_types::principal::perm;

/// Re-derive the assignment rows of the subtree rooted at `root_id`.
///
/// Rows inherited from outside the subtree are taken from the parent of
/// `root_id`. Inside, the direct assignment closest to the root wins, any
/// deeper direct assignment of the same circle becomes inherited.
pub(crate) async fn rederive_subtree(
	app: &App,
	index: &HierarchyIndex,
	root_id: &str,
) -> ClResult<()> {
	let subtree = index.subtree_of(root_id);
	let current = app
		.adapter
		.list_assignments(&ListAssignmentOptions {
			unit_ids: Some(subtree.clone()),
			..Default::default()
		})
		.await?;
	let parent_rows = match index.parent_of(root_id) {
		Some(parent_id) => {
			app.adapter
				.list_assignments(&ListAssignmentOptions {
					unit_ids: Some(vec![parent_id.into()]),
					..Default::default()
				})
				.await?
		}
		None => Vec::new(),
	};

	let desired = derive_rows(index, &subtree, &current, &parent_rows);
	let current: HashSet<Assignment> = current.into_iter().collect();

	let to_remove: Vec<Assignment> = current.difference(&desired).cloned().collect();
	let to_add: Vec<Assignment> = desired.difference(&current).cloned().collect();
	if !to_remove.is_empty() {
		app.adapter.remove_assignments(&to_remove).await?;
	}
	if !to_add.is_empty() {
		app.adapter.add_assignments(&to_add).await?;
	}
	debug!(root_id, removed = to_remove.len(), added = to_add.len(), "Re-derived assignments");
	Ok(())
}

fn derive_rows(
	index: &HierarchyIndex,
	subtree: &[Box<str>],
	current: &[Assignment],
	parent_rows: &[Assignment],
) -> HashSet<Assignment> {
	let in_subtree: HashSet<&str> = subtree.iter().map(AsRef::as_ref).collect();

	// (unit, circle) -> source unit
	let mut desired: HashMap<(Box<str>, Box<str>), Box<str>> = HashMap::new();

	let mut direct: Vec<&Assignment> = current
		.iter()
		.filter(|a| !a.inherited() && in_subtree.contains(a.unit_id.as_ref()))
		.collect();
	direct.sort_by_key(|a| (index.depth_of(&a.unit_id), a.unit_id.clone()));
	for assignment in direct {
		for unit_id in index.subtree_of(&assignment.unit_id) {
			desired
				.entry((unit_id, assignment.counting_circle_id.clone()))
				.or_insert_with(|| assignment.unit_id.clone());
		}
	}

	for row in parent_rows {
		for unit_id in subtree {
			desired.insert(
				(unit_id.clone(), row.counting_circle_id.clone()),
				row.source_unit_id.clone(),
			);
		}
	}

	desired
		.into_iter()
		.map(|((unit_id, counting_circle_id), source_unit_id)| Assignment {
			unit_id,
			counting_circle_id,
			source_unit_id,
		})
		.collect()
}

fn check_assignable_state(circle: &CountingCircle) -> ClResult<()> {
	match circle.state {
		CountingCircleState::Active | CountingCircleState::Inactive => Ok(()),
		CountingCircleState::Merged => {
			Err(Error::Conflict(format!("counting circle is merged: {}", circle.id)))
		}
		CountingCircleState::Deleted => Err(Error::NotFound),
	}
}

/// Counting circles the principal may hand out to units
async fn assignable_pool(
	app: &App,
	resolver: &PermissionResolver,
) -> ClResult<HashSet<Box<str>>> {
	match resolver.scope() {
		Scope::Global => {
			let circles =
				app.adapter.list_counting_circles(&ListCountingCircleOptions::default()).await?;
			Ok(circles.into_iter().map(|c| c.id).collect())
		}
		Scope::Canton => {
			if resolver.owned_cantons().is_empty() {
				return Ok(HashSet::new());
			}
			let opts = ListCountingCircleOptions {
				cantons: Some(resolver.owned_cantons().iter().cloned().collect()),
				..Default::default()
			};
			let circles = app.adapter.list_counting_circles(&opts).await?;
			Ok(circles.into_iter().map(|c| c.id).collect())
		}
		Scope::Tenant | Scope::Explicit => resolver.accessible_counting_circles(app).await,
	}
}

/// Assign a counting circle directly at a unit
pub async fn assign(
	app: &App,
	principal: &Principal,
	unit_id: &str,
	cc_id: &str,
) -> ClResult<Assignment> {
	principal.require(perm::UNIT_WRITE)?;
	let _guard = app.structure_lock.lock().await;
	let resolver = PermissionResolver::load(app, principal).await?;
	resolver.check_unit_write(unit_id)?;

	let circle = app.adapter.read_counting_circle(cc_id).await?;
	if !assignable_pool(app, &resolver).await?.contains(cc_id) {
		warn!(tenant = %principal.tenant_id, cc_id, "Counting circle not assignable by tenant");
		return Err(Error::NotFound);
	}
	check_assignable_state(&circle)?;
	if counting_circle::pending_merge_of_successor(app, cc_id).await?.is_some() {
		return Err(Error::Conflict("modifications not allowed".into()));
	}

	let existing = app
		.adapter
		.list_assignments(&ListAssignmentOptions {
			unit_ids: Some(vec![unit_id.into()]),
			counting_circle_ids: Some(vec![cc_id.into()]),
			..Default::default()
		})
		.await?;
	if let Some(row) = existing.first() {
		let msg = if row.inherited() {
			format!("counting circle {} is already inherited from {}", cc_id, row.source_unit_id)
		} else {
			format!("counting circle {} is already assigned", cc_id)
		};
		warn!(unit_id, cc_id, "Assignment rejected: {}", msg);
		return Err(Error::ValidationError(msg));
	}

	let assignment = Assignment::direct(unit_id, cc_id);
	app.adapter.add_assignments(std::slice::from_ref(&assignment)).await?;
	let index = resolver.index();
	rederive_subtree(app, index, unit_id).await?;
	grant::reconcile_grants(app, &index.subtree_of(unit_id)).await?;

	info!(tenant = %principal.tenant_id, unit_id, cc_id, "Counting circle assigned");
	Ok(assignment)
}

/// Remove a direct assignment together with the rows inherited from it
pub async fn unassign(app: &App, principal: &Principal, unit_id: &str, cc_id: &str) -> ClResult<()> {
	principal.require(perm::UNIT_WRITE)?;
	let _guard = app.structure_lock.lock().await;
	let resolver = PermissionResolver::load(app, principal).await?;
	resolver.check_unit_write(unit_id)?;

	let existing = app
		.adapter
		.list_assignments(&ListAssignmentOptions {
			unit_ids: Some(vec![unit_id.into()]),
			counting_circle_ids: Some(vec![cc_id.into()]),
			..Default::default()
		})
		.await?;
	let Some(row) = existing.into_iter().next() else {
		return Err(Error::NotFound);
	};
	if row.inherited() {
		warn!(unit_id, cc_id, source = %row.source_unit_id, "Cannot unassign inherited assignment");
		return Err(Error::ValidationError(format!(
			"counting circle {} is inherited from {}",
			cc_id, row.source_unit_id
		)));
	}

	app.adapter.remove_assignments(&[row]).await?;
	let index = resolver.index();
	rederive_subtree(app, index, unit_id).await?;
	grant::reconcile_grants(app, &index.subtree_of(unit_id)).await?;

	info!(tenant = %principal.tenant_id, unit_id, cc_id, "Counting circle unassigned");
	Ok(())
}

/// Assignments visible at a unit, inherited ones included
pub async fn list_assignments(
	app: &App,
	principal: &Principal,
	unit_id: &str,
) -> ClResult<Vec<Assignment>> {
	let resolver = PermissionResolver::load(app, principal).await?;
	resolver.check_unit_read(unit_id)?;
	app.adapter
		.list_assignments(&ListAssignmentOptions {
			unit_ids: Some(vec![unit_id.into()]),
			..Default::default()
		})
		.await
}

/// Counting circles that may still be assigned directly at `unit_id`
pub async fn assignable_candidates(
	app: &App,
	principal: &Principal,
	unit_id: &str,
) -> ClResult<Vec<CountingCircle>> {
	let resolver = PermissionResolver::load(app, principal).await?;
	resolver.check_unit_write(unit_id)?;
	let index = resolver.index();

	let mut unit_ids: Vec<Box<str>> = index.ancestors_of(unit_id).to_vec();
	unit_ids.push(unit_id.into());
	let rows = app
		.adapter
		.list_assignments(&ListAssignmentOptions { unit_ids: Some(unit_ids), ..Default::default() })
		.await?;
	let taken: HashSet<&str> = rows
		.iter()
		.filter(|a| a.unit_id.as_ref() == unit_id || !a.inherited())
		.map(|a| a.counting_circle_id.as_ref())
		.collect();

	let pending_successors: HashSet<Box<str>> = app
		.adapter
		.list_mergers(&ListMergerOptions { merged: Some(false), ..Default::default() })
		.await?
		.into_iter()
		.map(|m| m.successor_id)
		.collect();

	let pool = assignable_pool(app, &resolver).await?;
	let circles = app
		.adapter
		.list_counting_circles(&ListCountingCircleOptions {
			states: Some(vec![CountingCircleState::Active, CountingCircleState::Inactive]),
			..Default::default()
		})
		.await?;

	Ok(circles
		.into_iter()
		.filter(|c| pool.contains(&c.id))
		.filter(|c| !taken.contains(c.id.as_ref()))
		.filter(|c| !pending_successors.contains(&c.id))
		.filter(|c| resolver.scope() != Scope::Canton || resolver.is_owner_of_canton(&c.canton))
		.collect())
}


// vim: ts=4
