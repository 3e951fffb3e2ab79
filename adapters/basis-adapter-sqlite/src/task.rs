//! Task persistence for the scheduler

use sqlx::{Row, SqlitePool, sqlite::SqliteRow};

use basis_types::basis_adapter::*;
use basis_types::prelude::*;

use crate::utils::*;

const TASK_COLUMNS: &str =
	"task_id, kind, key, status, created_at, next_at, retry, cron, input, output";

fn task_from_row(row: &SqliteRow) -> Result<Task, sqlx::Error> {
	let status: &str = row.try_get("status")?;
	Ok(Task {
		task_id: row.try_get::<i64, _>("task_id").map(i64::cast_unsigned)?,
		kind: row.try_get("kind")?,
		key: row.try_get("key")?,
		status: decode_char(status)?,
		created_at: row.try_get("created_at").map(Timestamp)?,
		next_at: row.try_get::<Option<i64>, _>("next_at")?.map(Timestamp),
		retry: row.try_get("retry")?,
		cron: row.try_get("cron")?,
		input: row.try_get("input")?,
		output: row.try_get("output")?,
	})
}

/// List all pending tasks
pub(crate) async fn list(db: &SqlitePool) -> ClResult<Vec<Task>> {
	let res = sqlx::query(&format!("SELECT {} FROM tasks WHERE status='P'", TASK_COLUMNS))
		.fetch_all(db)
		.await
		.map_err(db_err)?;
	collect_res(res.iter().map(task_from_row))
}

pub(crate) async fn create(
	db: &SqlitePool,
	kind: &'static str,
	key: Option<&str>,
	input: &str,
) -> ClResult<u64> {
	let res = sqlx::query(
		"INSERT INTO tasks (kind, key, status, input) VALUES (?, ?, 'P', ?) RETURNING task_id",
	)
	.bind(kind)
	.bind(key)
	.bind(input)
	.fetch_one(db)
	.await;
	map_res(res, |row| row.try_get::<i64, _>("task_id").map(i64::cast_unsigned))
}

/// Find a pending task by its key
pub(crate) async fn find_by_key(db: &SqlitePool, key: &str) -> ClResult<Option<Task>> {
	let res = sqlx::query(&format!(
		"SELECT {} FROM tasks WHERE status='P' AND key=? ORDER BY task_id LIMIT 1",
		TASK_COLUMNS
	))
	.bind(key)
	.fetch_optional(db)
	.await
	.map_err(db_err)?;

	res.map(|row| task_from_row(&row)).transpose().map_err(db_err)
}

/// Update task fields with partial updates using a single query
pub(crate) async fn update(db: &SqlitePool, task_id: u64, patch: &TaskPatch) -> ClResult<()> {
	let mut query = sqlx::QueryBuilder::new("UPDATE tasks SET ");
	let mut has_updates = false;
	has_updates = push_patch!(query, has_updates, "input", &patch.input);
	has_updates = push_patch!(query, has_updates, "next_at", &patch.next_at, |v| v.0);
	has_updates = push_patch!(query, has_updates, "retry", &patch.retry);
	has_updates = push_patch!(query, has_updates, "cron", &patch.cron);
	if !has_updates {
		return Ok(());
	}
	query.push(" WHERE task_id=").push_bind(task_id.cast_signed());
	query.build().execute(db).await.map_err(db_err)?;
	Ok(())
}

/// Mark a task as finished
pub(crate) async fn mark_finished(db: &SqlitePool, task_id: u64, output: &str) -> ClResult<()> {
	sqlx::query(
		"UPDATE tasks SET status='F', output=?, next_at=NULL WHERE task_id=? AND status='P'",
	)
	.bind(output)
	.bind(task_id.cast_signed())
	.execute(db)
	.await
	.map_err(db_err)?;
	Ok(())
}

/// Mark a task as errored, a retry time keeps it pending
pub(crate) async fn mark_error(
	db: &SqlitePool,
	task_id: u64,
	output: &str,
	next_at: Option<Timestamp>,
) -> ClResult<()> {
	match next_at {
		Some(next_at) => {
			sqlx::query("UPDATE tasks SET error=?, next_at=? WHERE task_id=? AND status='P'")
				.bind(output)
				.bind(next_at.0)
				.bind(task_id.cast_signed())
				.execute(db)
				.await
				.map_err(db_err)?;
		}
		None => {
			sqlx::query(
				"UPDATE tasks SET error=?, status='E', next_at=NULL WHERE task_id=? AND status='P'",
			)
			.bind(output)
			.bind(task_id.cast_signed())
			.execute(db)
			.await
			.map_err(db_err)?;
		}
	}
	Ok(())
}

// vim: ts=4
