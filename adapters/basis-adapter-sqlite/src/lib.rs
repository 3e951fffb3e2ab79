//! SQLite implementation of the basis storage adapter.
//!
//! Entities live in plain tables, id lists are stored comma-joined. The event
//! store enforces one writer per stream version with a unique constraint.

#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![forbid(unsafe_code)]

mod assignment;
mod counting_circle;
mod event;
mod grant;
mod merge;
mod schema;
mod task;
mod unit;
mod utils;

use async_trait::async_trait;
use sqlx::sqlite::{self, SqlitePool};
use std::{fmt::Debug, path::Path};

use basis_types::{
	basis_adapter::*,
	event::{BasisEvent, StoredEvent},
	prelude::*,
};

pub const DB_FILE_NAME: &str = "basis.db";

#[derive(Debug)]
pub struct BasisAdapterSqlite {
	db: SqlitePool,
}

impl BasisAdapterSqlite {
	/// Open (or create) the database inside `dir`
	pub async fn new(dir: impl AsRef<Path>) -> ClResult<Self> {
		tokio::fs::create_dir_all(dir.as_ref()).await.map_err(|err| {
			error!("Cannot create database directory {}: {}", dir.as_ref().display(), err);
			Error::ConfigError(format!("cannot create {}", dir.as_ref().display()))
		})?;

		let opts = sqlite::SqliteConnectOptions::new()
			.filename(dir.as_ref().join(DB_FILE_NAME))
			.create_if_missing(true)
			.journal_mode(sqlite::SqliteJournalMode::Wal);
		let db = sqlite::SqlitePoolOptions::new()
			.max_connections(5)
			.connect_with(opts)
			.await
			.inspect_err(|err| error!("DbError: {:#?}", err))
			.or(Err(Error::DbError))?;

		schema::init_db(&db)
			.await
			.inspect_err(|err| error!("DbError: {:#?}", err))
			.or(Err(Error::DbError))?;

		Ok(Self { db })
	}
}

#[async_trait]
impl BasisAdapter for BasisAdapterSqlite {
	// Units
	//*******
	async fn list_units(&self, opts: &ListUnitOptions) -> ClResult<Vec<Unit>> {
		unit::list(&self.db, opts).await
	}

	async fn read_unit(&self, unit_id: &str) -> ClResult<Unit> {
		unit::read(&self.db, unit_id).await
	}

	async fn create_unit(&self, data: &CreateUnitData) -> ClResult<()> {
		unit::create(&self.db, data).await
	}

	async fn update_unit(&self, unit_id: &str, patch: &UpdateUnitData) -> ClResult<()> {
		unit::update(&self.db, unit_id, patch).await
	}

	async fn delete_units(&self, unit_ids: &[Box<str>]) -> ClResult<()> {
		unit::delete(&self.db, unit_ids).await
	}

	// Hierarchy closure
	//*******************
	async fn list_hierarchies(&self) -> ClResult<Vec<HierarchyClosure>> {
		unit::list_hierarchies(&self.db).await
	}

	async fn replace_hierarchies(&self, closures: &[HierarchyClosure]) -> ClResult<()> {
		unit::replace_hierarchies(&self.db, closures).await
	}

	// Cantons
	//*********
	async fn list_canton_settings(&self) -> ClResult<Vec<CantonSettings>> {
		unit::list_canton_settings(&self.db).await
	}

	async fn upsert_canton_settings(&self, canton: &str, tenant_id: &str) -> ClResult<()> {
		unit::upsert_canton_settings(&self.db, canton, tenant_id).await
	}

	// Counting circles
	//******************
	async fn list_counting_circles(
		&self,
		opts: &ListCountingCircleOptions,
	) -> ClResult<Vec<CountingCircle>> {
		counting_circle::list(&self.db, opts).await
	}

	async fn read_counting_circle(&self, cc_id: &str) -> ClResult<CountingCircle> {
		counting_circle::read(&self.db, cc_id).await
	}

	async fn upsert_counting_circle(
		&self,
		data: &CountingCircleData,
		state: CountingCircleState,
	) -> ClResult<()> {
		counting_circle::upsert(&self.db, data, state).await
	}

	async fn update_counting_circle(
		&self,
		cc_id: &str,
		patch: &UpdateCountingCircleData,
	) -> ClResult<()> {
		counting_circle::update(&self.db, cc_id, patch).await
	}

	async fn set_counting_circle_state(
		&self,
		cc_id: &str,
		state: CountingCircleState,
		merge_target_id: Patch<&str>,
		merge_origin_id: Patch<&str>,
	) -> ClResult<()> {
		counting_circle::set_state(&self.db, cc_id, state, merge_target_id, merge_origin_id).await
	}

	// Assignments
	//*************
	async fn list_assignments(&self, opts: &ListAssignmentOptions) -> ClResult<Vec<Assignment>> {
		assignment::list(&self.db, opts).await
	}

	async fn add_assignments(&self, assignments: &[Assignment]) -> ClResult<()> {
		assignment::add(&self.db, assignments).await
	}

	async fn remove_assignments(&self, assignments: &[Assignment]) -> ClResult<()> {
		assignment::remove(&self.db, assignments).await
	}

	// Permission grants
	//*******************
	async fn list_grants(&self, opts: &ListGrantOptions) -> ClResult<Vec<PermissionGrant>> {
		grant::list(&self.db, opts).await
	}

	async fn upsert_grant(&self, grant: &PermissionGrant) -> ClResult<()> {
		grant::upsert(&self.db, grant).await
	}

	async fn delete_grant(&self, tenant_id: &str, unit_id: &str) -> ClResult<()> {
		grant::delete(&self.db, tenant_id, unit_id).await
	}

	async fn replace_grant_counting_circle(
		&self,
		from_cc_id: &str,
		to_cc_id: &str,
	) -> ClResult<()> {
		grant::replace_counting_circle(&self.db, from_cc_id, to_cc_id).await
	}

	// Merge orders
	//**************
	async fn list_mergers(&self, opts: &ListMergerOptions) -> ClResult<Vec<MergeOrderView>> {
		merge::list(&self.db, opts).await
	}

	async fn read_merger_by_successor(&self, successor_id: &str) -> ClResult<MergeOrderView> {
		merge::read_by_successor(&self.db, successor_id).await
	}

	async fn upsert_merger(&self, merger: &MergeOrderView) -> ClResult<()> {
		merge::upsert(&self.db, merger).await
	}

	async fn mark_merger_merged(&self, merger_id: &str, merged_at: Timestamp) -> ClResult<()> {
		merge::mark_merged(&self.db, merger_id, merged_at).await
	}

	async fn delete_merger(&self, merger_id: &str) -> ClResult<()> {
		merge::delete(&self.db, merger_id).await
	}

	// Event store
	//*************
	async fn append_events(
		&self,
		stream_id: &str,
		expected_version: u64,
		events: &[BasisEvent],
	) -> ClResult<Vec<StoredEvent>> {
		event::append(&self.db, stream_id, expected_version, events).await
	}

	async fn list_events(&self, stream_id: Option<&str>) -> ClResult<Vec<StoredEvent>> {
		event::list(&self.db, stream_id, None).await
	}

	async fn list_events_after(&self, after_seq: u64) -> ClResult<Vec<StoredEvent>> {
		event::list(&self.db, None, Some(after_seq)).await
	}

	// Tasks
	//*******
	async fn list_tasks(&self) -> ClResult<Vec<Task>> {
		task::list(&self.db).await
	}

	async fn create_task(
		&self,
		kind: &'static str,
		key: Option<&str>,
		input: &str,
	) -> ClResult<u64> {
		task::create(&self.db, kind, key, input).await
	}

	async fn find_task_by_key(&self, key: &str) -> ClResult<Option<Task>> {
		task::find_by_key(&self.db, key).await
	}

	async fn update_task(&self, task_id: u64, patch: &TaskPatch) -> ClResult<()> {
		task::update(&self.db, task_id, patch).await
	}

	async fn update_task_finished(&self, task_id: u64, output: &str) -> ClResult<()> {
		task::mark_finished(&self.db, task_id, output).await
	}

	async fn update_task_error(
		&self,
		task_id: u64,
		output: &str,
		next_at: Option<Timestamp>,
	) -> ClResult<()> {
		task::mark_error(&self.db, task_id, output, next_at).await
	}
}

// vim: ts=4
