//! Unit - counting circle assignments

use sqlx::{Row, SqlitePool};

use basis_types::basis_adapter::*;
use basis_types::prelude::*;

use crate::utils::*;

pub(crate) async fn list(
	db: &SqlitePool,
	opts: &ListAssignmentOptions,
) -> ClResult<Vec<Assignment>> {
	let mut query = sqlx::QueryBuilder::new(
		"SELECT unit_id, cc_id, source_unit_id FROM unit_counting_circles WHERE 1=1",
	);
	if let Some(ref unit_ids) = opts.unit_ids {
		query.push(" AND unit_id IN ");
		query = push_in(query, unit_ids);
	}
	if let Some(ref cc_ids) = opts.counting_circle_ids {
		query.push(" AND cc_id IN ");
		query = push_in(query, cc_ids);
	}
	if let Some(ref source_ids) = opts.source_unit_ids {
		query.push(" AND source_unit_id IN ");
		query = push_in(query, source_ids);
	}
	query.push(" ORDER BY unit_id, cc_id");

	let res = query.build().fetch_all(db).await.map_err(db_err)?;
	collect_res(res.iter().map(|row| {
		Ok(Assignment {
			unit_id: row.try_get("unit_id")?,
			counting_circle_id: row.try_get("cc_id")?,
			source_unit_id: row.try_get("source_unit_id")?,
		})
	}))
}

pub(crate) async fn add(db: &SqlitePool, assignments: &[Assignment]) -> ClResult<()> {
	let mut tx = db.begin().await.map_err(db_err)?;
	for assignment in assignments {
		sqlx::query(
			"INSERT OR IGNORE INTO unit_counting_circles (unit_id, cc_id, source_unit_id)
			VALUES (?, ?, ?)",
		)
		.bind(assignment.unit_id.as_ref())
		.bind(assignment.counting_circle_id.as_ref())
		.bind(assignment.source_unit_id.as_ref())
		.execute(&mut *tx)
		.await
		.map_err(db_err)?;
	}
	tx.commit().await.map_err(db_err)?;
	Ok(())
}

pub(crate) async fn remove(db: &SqlitePool, assignments: &[Assignment]) -> ClResult<()> {
	let mut tx = db.begin().await.map_err(db_err)?;
	for assignment in assignments {
		sqlx::query("DELETE FROM unit_counting_circles WHERE unit_id=? AND cc_id=?")
			.bind(assignment.unit_id.as_ref())
			.bind(assignment.counting_circle_id.as_ref())
			.execute(&mut *tx)
			.await
			.map_err(db_err)?;
	}
	tx.commit().await.map_err(db_err)?;
	Ok(())
}

// vim: ts=4
