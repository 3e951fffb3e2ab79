//! Adapter that stores the election master data: organizational units, their
//! hierarchy closure, counting circles, assignments, permission grants, merge
//! orders, the domain event log and scheduler tasks.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use std::fmt::Debug;

use crate::{
	event::{BasisEvent, StoredEvent},
	prelude::*,
};

// Organizational units
//**********************

/// A node of the administrative tree ("domain of influence")
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Unit {
	pub id: Box<str>,
	pub parent_id: Option<Box<str>>,
	pub name: Box<str>,
	pub canton: Box<str>,
	pub owner_tenant_id: Box<str>,
	pub deleted: bool,
	pub created_at: Timestamp,
	pub modified_at: Option<Timestamp>,
}

#[derive(Debug, Clone)]
pub struct CreateUnitData {
	pub id: Box<str>,
	pub parent_id: Option<Box<str>>,
	pub name: Box<str>,
	pub canton: Box<str>,
	pub owner_tenant_id: Box<str>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUnitData {
	#[serde(default)]
	pub name: Patch<Box<str>>,
	#[serde(default)]
	pub parent_id: Patch<Box<str>>,
	#[serde(default)]
	pub canton: Patch<Box<str>>,
	#[serde(default)]
	pub owner_tenant_id: Patch<Box<str>>,
}

#[derive(Debug, Clone, Default)]
pub struct ListUnitOptions {
	pub ids: Option<Vec<Box<str>>>,
	pub cantons: Option<Vec<Box<str>>>,
	pub owner_tenant_id: Option<Box<str>>,
	/// Bypass the soft-delete filter
	pub include_deleted: bool,
}

/// Cached closure of one unit: ancestors nearest first, root last
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HierarchyClosure {
	pub unit_id: Box<str>,
	/// Owner tenant of the unit, kept alongside for tenant-filtered lookups
	pub tenant_id: Box<str>,
	pub parent_ids: Vec<Box<str>>,
	pub child_ids: Vec<Box<str>>,
}

impl HierarchyClosure {
	pub fn root_id(&self) -> &str {
		self.parent_ids.last().map_or(&*self.unit_id, |p| &**p)
	}
}

/// Administrative settings record of a canton; its holder owns the canton
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CantonSettings {
	pub canton: Box<str>,
	pub tenant_id: Box<str>,
	pub created_at: Timestamp,
}

// Counting circles
//******************

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CountingCircleState {
	Active,
	Inactive,
	Merged,
	Deleted,
}

impl CountingCircleState {
	pub fn as_char(self) -> char {
		match self {
			CountingCircleState::Active => 'A',
			CountingCircleState::Inactive => 'I',
			CountingCircleState::Merged => 'M',
			CountingCircleState::Deleted => 'D',
		}
	}

	pub fn from_char(c: char) -> ClResult<Self> {
		match c {
			'A' => Ok(CountingCircleState::Active),
			'I' => Ok(CountingCircleState::Inactive),
			'M' => Ok(CountingCircleState::Merged),
			'D' => Ok(CountingCircleState::Deleted),
			_ => Err(Error::Parse),
		}
	}
}

#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CountingCircle {
	pub id: Box<str>,
	pub name: Box<str>,
	pub bfs: Box<str>,
	pub code: Box<str>,
	pub canton: Box<str>,
	pub contact_email: Option<Box<str>>,
	pub state: CountingCircleState,
	pub merge_target_id: Option<Box<str>>,
	pub merge_origin_id: Option<Box<str>>,
	pub created_at: Timestamp,
	pub modified_at: Option<Timestamp>,
}

/// Master data of a counting circle, also used as the successor descriptor of a merge
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CountingCircleData {
	pub id: Box<str>,
	pub name: Box<str>,
	pub bfs: Box<str>,
	pub code: Box<str>,
	pub canton: Box<str>,
	pub contact_email: Option<Box<str>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCountingCircleData {
	#[serde(default)]
	pub name: Patch<Box<str>>,
	#[serde(default)]
	pub bfs: Patch<Box<str>>,
	#[serde(default)]
	pub code: Patch<Box<str>>,
	#[serde(default)]
	pub contact_email: Patch<Box<str>>,
}

#[derive(Debug, Clone, Default)]
pub struct ListCountingCircleOptions {
	pub ids: Option<Vec<Box<str>>>,
	pub cantons: Option<Vec<Box<str>>>,
	pub states: Option<Vec<CountingCircleState>>,
	/// Include circles in state `Deleted`
	pub include_deleted: bool,
}

// Assignments
//*************

/// Binding of a counting circle to a unit
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assignment {
	pub unit_id: Box<str>,
	pub counting_circle_id: Box<str>,
	/// Unit where the assignment was made
	pub source_unit_id: Box<str>,
}

impl Assignment {
	pub fn direct(unit_id: &str, counting_circle_id: &str) -> Self {
		Self {
			unit_id: unit_id.into(),
			counting_circle_id: counting_circle_id.into(),
			source_unit_id: unit_id.into(),
		}
	}

	pub fn inherited(&self) -> bool {
		self.unit_id != self.source_unit_id
	}
}

#[derive(Debug, Clone, Default)]
pub struct ListAssignmentOptions {
	pub unit_ids: Option<Vec<Box<str>>>,
	pub counting_circle_ids: Option<Vec<Box<str>>>,
	pub source_unit_ids: Option<Vec<Box<str>>>,
}

// Permission grants
//*******************

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionGrant {
	pub tenant_id: Box<str>,
	pub unit_id: Box<str>,
	pub counting_circle_ids: Vec<Box<str>>,
	/// Tenant owns the unit itself, not only some of its counting circles
	pub is_parent_level: bool,
	pub deleted: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ListGrantOptions {
	pub tenant_id: Option<Box<str>>,
	pub unit_ids: Option<Vec<Box<str>>>,
	pub include_deleted: bool,
}

// Merge orders
//**************

/// Read model of a merge order
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeOrderView {
	pub id: Box<str>,
	pub successor_id: Box<str>,
	pub source_ids: Vec<Box<str>>,
	pub copy_from_id: Box<str>,
	pub active_from: Timestamp,
	pub merged: bool,
	pub merged_at: Option<Timestamp>,
}

#[derive(Debug, Clone, Default)]
pub struct ListMergerOptions {
	pub merged: Option<bool>,
	/// Only orders with `active_from <= due_at`
	pub due_at: Option<Timestamp>,
	pub source_id: Option<Box<str>>,
	pub successor_id: Option<Box<str>>,
}

// Tasks
//*******

#[derive(Debug, Clone)]
pub struct Task {
	pub task_id: u64,
	pub kind: Box<str>,
	pub key: Option<Box<str>>,
	pub status: char,
	pub created_at: Timestamp,
	pub next_at: Option<Timestamp>,
	pub retry: Option<Box<str>>,
	pub cron: Option<Box<str>>,
	pub input: Box<str>,
	pub output: Option<Box<str>>,
}

#[derive(Debug, Clone, Default)]
pub struct TaskPatch {
	pub input: Patch<String>,
	pub next_at: Patch<Timestamp>,
	pub retry: Patch<String>,
	pub cron: Patch<String>,
}

#[async_trait]
pub trait BasisAdapter: Debug + Send + Sync {
	// Units
	//*******
	async fn list_units(&self, opts: &ListUnitOptions) -> ClResult<Vec<Unit>>;
	/// Reads a unit regardless of its deleted flag
	async fn read_unit(&self, unit_id: &str) -> ClResult<Unit>;
	async fn create_unit(&self, unit: &CreateUnitData) -> ClResult<()>;
	async fn update_unit(&self, unit_id: &str, patch: &UpdateUnitData) -> ClResult<()>;
	/// Soft-deletes units
	async fn delete_units(&self, unit_ids: &[Box<str>]) -> ClResult<()>;

	// Hierarchy closure
	//*******************
	async fn list_hierarchies(&self) -> ClResult<Vec<HierarchyClosure>>;
	/// Replaces the whole closure table atomically
	async fn replace_hierarchies(&self, closures: &[HierarchyClosure]) -> ClResult<()>;

	// Cantons
	//*********
	async fn list_canton_settings(&self) -> ClResult<Vec<CantonSettings>>;
	async fn upsert_canton_settings(&self, canton: &str, tenant_id: &str) -> ClResult<()>;

	// Counting circles
	//******************
	async fn list_counting_circles(
		&self,
		opts: &ListCountingCircleOptions,
	) -> ClResult<Vec<CountingCircle>>;
	async fn read_counting_circle(&self, cc_id: &str) -> ClResult<CountingCircle>;
	/// Inserts the circle or overwrites its master data and state
	async fn upsert_counting_circle(
		&self,
		data: &CountingCircleData,
		state: CountingCircleState,
	) -> ClResult<()>;
	async fn update_counting_circle(
		&self,
		cc_id: &str,
		patch: &UpdateCountingCircleData,
	) -> ClResult<()>;
	async fn set_counting_circle_state(
		&self,
		cc_id: &str,
		state: CountingCircleState,
		merge_target_id: Patch<&str>,
		merge_origin_id: Patch<&str>,
	) -> ClResult<()>;

	// Assignments
	//*************
	async fn list_assignments(&self, opts: &ListAssignmentOptions) -> ClResult<Vec<Assignment>>;
	/// Inserts assignments, existing rows are left untouched
	async fn add_assignments(&self, assignments: &[Assignment]) -> ClResult<()>;
	async fn remove_assignments(&self, assignments: &[Assignment]) -> ClResult<()>;

	// Permission grants
	//*******************
	async fn list_grants(&self, opts: &ListGrantOptions) -> ClResult<Vec<PermissionGrant>>;
	/// Inserts or overwrites the grant of (tenant, unit) and clears its deleted flag
	async fn upsert_grant(&self, grant: &PermissionGrant) -> ClResult<()>;
	/// Soft-deletes a grant
	async fn delete_grant(&self, tenant_id: &str, unit_id: &str) -> ClResult<()>;
	/// Rewrites the counting circle sets of every grant, deduplicating
	async fn replace_grant_counting_circle(&self, from_cc_id: &str, to_cc_id: &str)
	-> ClResult<()>;

	// Merge orders
	//**************
	async fn list_mergers(&self, opts: &ListMergerOptions) -> ClResult<Vec<MergeOrderView>>;
	async fn read_merger_by_successor(&self, successor_id: &str) -> ClResult<MergeOrderView>;
	async fn upsert_merger(&self, merger: &MergeOrderView) -> ClResult<()>;
	async fn mark_merger_merged(&self, merger_id: &str, merged_at: Timestamp) -> ClResult<()>;
	async fn delete_merger(&self, merger_id: &str) -> ClResult<()>;

	// Event store
	//*************
	/// Appends events to a stream; fails with `Conflict` if the stream is not
	/// at `expected_version`
	async fn append_events(
		&self,
		stream_id: &str,
		expected_version: u64,
		events: &[BasisEvent],
	) -> ClResult<Vec<StoredEvent>>;
	/// Lists events ordered by their global sequence number
	async fn list_events(&self, stream_id: Option<&str>) -> ClResult<Vec<StoredEvent>>;
	/// Events of all streams with a sequence number above `after_seq`
	async fn list_events_after(&self, after_seq: u64) -> ClResult<Vec<StoredEvent>>;

	// Tasks
	//*******
	async fn list_tasks(&self) -> ClResult<Vec<Task>>;
	async fn create_task(&self, kind: &'static str, key: Option<&str>, input: &str)
	-> ClResult<u64>;
	async fn find_task_by_key(&self, key: &str) -> ClResult<Option<Task>>;
	async fn update_task(&self, task_id: u64, patch: &TaskPatch) -> ClResult<()>;
	async fn update_task_finished(&self, task_id: u64, output: &str) -> ClResult<()>;
	async fn update_task_error(
		&self,
		task_id: u64,
		output: &str,
		next_at: Option<Timestamp>,
	) -> ClResult<()>;
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_root_id() {
		let closure = HierarchyClosure {
			unit_id: "gemeinde".into(),
			tenant_id: "t1".into(),
			parent_ids: vec!["bezirk".into(), "kanton".into()],
			child_ids: vec![],
		};
		assert_eq!(closure.root_id(), "kanton");

		let root = HierarchyClosure {
			unit_id: "kanton".into(),
			tenant_id: "t1".into(),
			parent_ids: vec![],
			child_ids: vec!["bezirk".into()],
		};
		assert_eq!(root.root_id(), "kanton");
	}

	#[test]
	fn test_state_chars() {
		for state in [
			CountingCircleState::Active,
			CountingCircleState::Inactive,
			CountingCircleState::Merged,
			CountingCircleState::Deleted,
		] {
			assert_eq!(CountingCircleState::from_char(state.as_char()).unwrap(), state);
		}
		assert!(CountingCircleState::from_char('X').is_err());
	}

	#[test]
	fn test_assignment_inherited() {
		let direct = Assignment::direct("u1", "cc1");
		assert!(!direct.inherited());
		let inherited = Assignment { unit_id: "u2".into(), ..direct };
		assert!(inherited.inherited());
	}
}

// vim: ts=4
