//! Counting circles

use sqlx::{Row, SqlitePool, sqlite::SqliteRow};

use basis_types::basis_adapter::*;
use basis_types::prelude::*;

use crate::utils::*;

const CC_COLUMNS: &str = "cc_id, name, bfs, code, canton, contact_email, state, merge_target_id,
	merge_origin_id, created_at, modified_at";

fn counting_circle_from_row(row: &SqliteRow) -> Result<CountingCircle, sqlx::Error> {
	let state: &str = row.try_get("state")?;
	let state = CountingCircleState::from_char(decode_char(state)?)
		.map_err(|_| sqlx::Error::Decode(format!("invalid counting circle state: {}", state).into()))?;
	Ok(CountingCircle {
		id: row.try_get("cc_id")?,
		name: row.try_get("name")?,
		bfs: row.try_get("bfs")?,
		code: row.try_get("code")?,
		canton: row.try_get("canton")?,
		contact_email: row.try_get("contact_email")?,
		state,
		merge_target_id: row.try_get("merge_target_id")?,
		merge_origin_id: row.try_get("merge_origin_id")?,
		created_at: row.try_get("created_at").map(Timestamp)?,
		modified_at: row.try_get::<Option<i64>, _>("modified_at")?.map(Timestamp),
	})
}

pub(crate) async fn list(
	db: &SqlitePool,
	opts: &ListCountingCircleOptions,
) -> ClResult<Vec<CountingCircle>> {
	let mut query =
		sqlx::QueryBuilder::new(format!("SELECT {} FROM counting_circles WHERE 1=1", CC_COLUMNS));
	if !opts.include_deleted {
		query.push(" AND state!='D'");
	}
	if let Some(ref ids) = opts.ids {
		query.push(" AND cc_id IN ");
		query = push_in(query, ids);
	}
	if let Some(ref cantons) = opts.cantons {
		query.push(" AND canton IN ");
		query = push_in(query, cantons);
	}
	if let Some(ref states) = opts.states {
		let states: Vec<String> = states.iter().map(|s| s.as_char().to_string()).collect();
		query.push(" AND state IN (");
		for (i, state) in states.into_iter().enumerate() {
			if i > 0 {
				query.push(", ");
			}
			query.push_bind(state);
		}
		query.push(")");
	}
	query.push(" ORDER BY cc_id");

	let res = query.build().fetch_all(db).await.map_err(db_err)?;
	collect_res(res.iter().map(counting_circle_from_row))
}

pub(crate) async fn read(db: &SqlitePool, cc_id: &str) -> ClResult<CountingCircle> {
	let res = sqlx::query(&format!("SELECT {} FROM counting_circles WHERE cc_id=?", CC_COLUMNS))
		.bind(cc_id)
		.fetch_one(db)
		.await;
	map_res(res, |row| counting_circle_from_row(&row))
}

pub(crate) async fn upsert(
	db: &SqlitePool,
	data: &CountingCircleData,
	state: CountingCircleState,
) -> ClResult<()> {
	sqlx::query(
		"INSERT INTO counting_circles (cc_id, name, bfs, code, canton, contact_email, state)
		VALUES (?, ?, ?, ?, ?, ?, ?)
		ON CONFLICT(cc_id) DO UPDATE SET name=excluded.name, bfs=excluded.bfs,
			code=excluded.code, canton=excluded.canton, contact_email=excluded.contact_email,
			state=excluded.state, merge_target_id=NULL, modified_at=unixepoch()",
	)
	.bind(data.id.as_ref())
	.bind(data.name.as_ref())
	.bind(data.bfs.as_ref())
	.bind(data.code.as_ref())
	.bind(data.canton.as_ref())
	.bind(data.contact_email.as_deref())
	.bind(state.as_char().to_string())
	.execute(db)
	.await
	.map_err(db_err)?;
	Ok(())
}

pub(crate) async fn update(
	db: &SqlitePool,
	cc_id: &str,
	patch: &UpdateCountingCircleData,
) -> ClResult<()> {
	let mut query = sqlx::QueryBuilder::new("UPDATE counting_circles SET ");
	let mut has_updates = false;
	has_updates = push_patch!(query, has_updates, "name", &patch.name, |v| v.as_ref());
	has_updates = push_patch!(query, has_updates, "bfs", &patch.bfs, |v| v.as_ref());
	has_updates = push_patch!(query, has_updates, "code", &patch.code, |v| v.as_ref());
	has_updates =
		push_patch!(query, has_updates, "contact_email", &patch.contact_email, |v| v.as_ref());
	if !has_updates {
		return Ok(());
	}
	query.push(", modified_at=unixepoch() WHERE cc_id=").push_bind(cc_id);

	let res = query.build().execute(db).await.map_err(db_err)?;
	if res.rows_affected() == 0 {
		return Err(Error::NotFound);
	}
	Ok(())
}

pub(crate) async fn set_state(
	db: &SqlitePool,
	cc_id: &str,
	state: CountingCircleState,
	merge_target_id: Patch<&str>,
	merge_origin_id: Patch<&str>,
) -> ClResult<()> {
	let mut query = sqlx::QueryBuilder::new("UPDATE counting_circles SET state=");
	query.push_bind(state.as_char().to_string());
	push_patch!(query, true, "merge_target_id", merge_target_id);
	push_patch!(query, true, "merge_origin_id", merge_origin_id);
	query.push(", modified_at=unixepoch() WHERE cc_id=").push_bind(cc_id);

	let res = query.build().execute(db).await.map_err(db_err)?;
	if res.rows_affected() == 0 {
		return Err(Error::NotFound);
	}
	Ok(())
}

// vim: ts=4
