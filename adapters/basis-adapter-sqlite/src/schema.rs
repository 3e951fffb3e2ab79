//! Database schema initialization

use sqlx::SqlitePool;

/// Initialize the database schema with all required tables and indexes
pub(crate) async fn init_db(db: &SqlitePool) -> Result<(), sqlx::Error> {
	let mut tx = db.begin().await?;

	// Units
	//*******
	sqlx::query(
		"CREATE TABLE IF NOT EXISTS units (
		unit_id text NOT NULL,
		parent_id text,
		name text NOT NULL,
		canton text NOT NULL,
		owner_tenant_id text NOT NULL,
		deleted boolean NOT NULL DEFAULT 0,
		created_at datetime DEFAULT (unixepoch()),
		modified_at datetime,
		PRIMARY KEY(unit_id)
	)",
	)
	.execute(&mut *tx)
	.await?;
	sqlx::query("CREATE INDEX IF NOT EXISTS idx_units_parent ON units(parent_id)")
		.execute(&mut *tx)
		.await?;

	sqlx::query(
		"CREATE TABLE IF NOT EXISTS unit_hierarchy (
		unit_id text NOT NULL,
		tenant_id text NOT NULL,
		parent_ids text NOT NULL,
		child_ids text NOT NULL,
		PRIMARY KEY(unit_id)
	)",
	)
	.execute(&mut *tx)
	.await?;

	sqlx::query(
		"CREATE TABLE IF NOT EXISTS canton_settings (
		canton text NOT NULL,
		tenant_id text NOT NULL,
		created_at datetime DEFAULT (unixepoch()),
		PRIMARY KEY(canton)
	)",
	)
	.execute(&mut *tx)
	.await?;

	// Counting circles
	//******************
	sqlx::query(
		"CREATE TABLE IF NOT EXISTS counting_circles (
		cc_id text NOT NULL,
		name text NOT NULL,
		bfs text NOT NULL,
		code text NOT NULL,
		canton text NOT NULL,
		contact_email text,
		state char(1) NOT NULL,
		merge_target_id text,
		merge_origin_id text,
		created_at datetime DEFAULT (unixepoch()),
		modified_at datetime,
		PRIMARY KEY(cc_id)
	)",
	)
	.execute(&mut *tx)
	.await?;

	sqlx::query(
		"CREATE TABLE IF NOT EXISTS unit_counting_circles (
		unit_id text NOT NULL,
		cc_id text NOT NULL,
		source_unit_id text NOT NULL,
		PRIMARY KEY(unit_id, cc_id)
	)",
	)
	.execute(&mut *tx)
	.await?;
	sqlx::query("CREATE INDEX IF NOT EXISTS idx_unit_cc_cc ON unit_counting_circles(cc_id)")
		.execute(&mut *tx)
		.await?;

	// Grants
	//********
	sqlx::query(
		"CREATE TABLE IF NOT EXISTS permission_grants (
		tenant_id text NOT NULL,
		unit_id text NOT NULL,
		cc_ids text NOT NULL,
		is_parent_level boolean NOT NULL,
		deleted boolean NOT NULL DEFAULT 0,
		PRIMARY KEY(tenant_id, unit_id)
	)",
	)
	.execute(&mut *tx)
	.await?;

	// Mergers and events
	//********************
	sqlx::query(
		"CREATE TABLE IF NOT EXISTS merge_orders (
		merger_id text NOT NULL,
		successor_id text NOT NULL UNIQUE,
		source_ids text NOT NULL,
		copy_from_id text NOT NULL,
		active_from datetime NOT NULL,
		merged boolean NOT NULL DEFAULT 0,
		merged_at datetime,
		PRIMARY KEY(merger_id)
	)",
	)
	.execute(&mut *tx)
	.await?;

	sqlx::query(
		"CREATE TABLE IF NOT EXISTS events (
		seq integer PRIMARY KEY AUTOINCREMENT,
		stream_id text NOT NULL,
		version integer NOT NULL,
		kind text NOT NULL,
		data json NOT NULL,
		created_at datetime DEFAULT (unixepoch()),
		UNIQUE(stream_id, version)
	)",
	)
	.execute(&mut *tx)
	.await?;

	// Tasks
	//*******
	sqlx::query(
		"CREATE TABLE IF NOT EXISTS tasks (
		task_id integer NOT NULL,
		kind text NOT NULL,
		key text,
		status char(1) NOT NULL,
		created_at datetime DEFAULT (unixepoch()),
		next_at datetime,
		retry text,
		cron text,
		input text NOT NULL,
		output text,
		error text,
		PRIMARY KEY(task_id)
	)",
	)
	.execute(&mut *tx)
	.await?;
	sqlx::query("CREATE INDEX IF NOT EXISTS idx_tasks_key ON tasks(key) WHERE key IS NOT NULL")
		.execute(&mut *tx)
		.await?;

	tx.commit().await?;
	Ok(())
}

// vim: ts=4
