//! Merge order read model

use sqlx::{Row, SqlitePool, sqlite::SqliteRow};

use basis_types::basis_adapter::*;
use basis_types::prelude::*;

use crate::utils::*;

const MERGER_COLUMNS: &str =
	"merger_id, successor_id, source_ids, copy_from_id, active_from, merged, merged_at";

fn merger_from_row(row: &SqliteRow) -> Result<MergeOrderView, sqlx::Error> {
	let source_ids: &str = row.try_get("source_ids")?;
	Ok(MergeOrderView {
		id: row.try_get("merger_id")?,
		successor_id: row.try_get("successor_id")?,
		source_ids: parse_str_list(source_ids),
		copy_from_id: row.try_get("copy_from_id")?,
		active_from: row.try_get("active_from").map(Timestamp)?,
		merged: row.try_get("merged")?,
		merged_at: row.try_get::<Option<i64>, _>("merged_at")?.map(Timestamp),
	})
}

pub(crate) async fn list(db: &SqlitePool, opts: &ListMergerOptions) -> ClResult<Vec<MergeOrderView>> {
	let mut query =
		sqlx::QueryBuilder::new(format!("SELECT {} FROM merge_orders WHERE 1=1", MERGER_COLUMNS));
	if let Some(merged) = opts.merged {
		query.push(" AND merged=").push_bind(merged);
	}
	if let Some(due_at) = opts.due_at {
		query.push(" AND active_from<=").push_bind(due_at.0);
	}
	if let Some(ref source_id) = opts.source_id {
		query.push(" AND ','||source_ids||',' LIKE '%,'||").push_bind(source_id.as_ref());
		query.push("||',%'");
	}
	if let Some(ref successor_id) = opts.successor_id {
		query.push(" AND successor_id=").push_bind(successor_id.as_ref());
	}
	query.push(" ORDER BY active_from, merger_id");

	let res = query.build().fetch_all(db).await.map_err(db_err)?;
	let mergers = collect_res(res.iter().map(merger_from_row))?;

	// LIKE treats '_' as a wildcard, keep exact matches only
	Ok(match opts.source_id {
		Some(ref source_id) => {
			mergers.into_iter().filter(|m| m.source_ids.contains(source_id)).collect()
		}
		None => mergers,
	})
}

pub(crate) async fn read_by_successor(
	db: &SqlitePool,
	successor_id: &str,
) -> ClResult<MergeOrderView> {
	let res =
		sqlx::query(&format!("SELECT {} FROM merge_orders WHERE successor_id=?", MERGER_COLUMNS))
			.bind(successor_id)
			.fetch_one(db)
			.await;
	map_res(res, |row| merger_from_row(&row))
}

pub(crate) async fn upsert(db: &SqlitePool, merger: &MergeOrderView) -> ClResult<()> {
	sqlx::query(
		"INSERT INTO merge_orders (merger_id, successor_id, source_ids, copy_from_id, active_from,
			merged, merged_at)
		VALUES (?, ?, ?, ?, ?, ?, ?)
		ON CONFLICT(merger_id) DO UPDATE SET successor_id=excluded.successor_id,
			source_ids=excluded.source_ids, copy_from_id=excluded.copy_from_id,
			active_from=excluded.active_from, merged=excluded.merged, merged_at=excluded.merged_at",
	)
	.bind(merger.id.as_ref())
	.bind(merger.successor_id.as_ref())
	.bind(join_str_list(&merger.source_ids))
	.bind(merger.copy_from_id.as_ref())
	.bind(merger.active_from.0)
	.bind(merger.merged)
	.bind(merger.merged_at.map(|t| t.0))
	.execute(db)
	.await
	.map_err(db_err)?;
	Ok(())
}

pub(crate) async fn mark_merged(
	db: &SqlitePool,
	merger_id: &str,
	merged_at: Timestamp,
) -> ClResult<()> {
	let res = sqlx::query("UPDATE merge_orders SET merged=1, merged_at=? WHERE merger_id=?")
		.bind(merged_at.0)
		.bind(merger_id)
		.execute(db)
		.await
		.map_err(db_err)?;
	if res.rows_affected() == 0 {
		return Err(Error::NotFound);
	}
	Ok(())
}

pub(crate) async fn delete(db: &SqlitePool, merger_id: &str) -> ClResult<()> {
	sqlx::query("DELETE FROM merge_orders WHERE merger_id=?")
		.bind(merger_id)
		.execute(db)
		.await
		.map_err(db_err)?;
	Ok(())
}

// vim: ts=4
