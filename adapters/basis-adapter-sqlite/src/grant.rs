//! Permission grants

use sqlx::{Row, SqlitePool, sqlite::SqliteRow};

use basis_types::basis_adapter::*;
use basis_types::prelude::*;
use basis_types::utils::normalize_ids;

use crate::utils::*;

fn grant_from_row(row: &SqliteRow) -> Result<PermissionGrant, sqlx::Error> {
	let cc_ids: &str = row.try_get("cc_ids")?;
	Ok(PermissionGrant {
		tenant_id: row.try_get("tenant_id")?,
		unit_id: row.try_get("unit_id")?,
		counting_circle_ids: parse_str_list(cc_ids),
		is_parent_level: row.try_get("is_parent_level")?,
		deleted: row.try_get("deleted")?,
	})
}

pub(crate) async fn list(db: &SqlitePool, opts: &ListGrantOptions) -> ClResult<Vec<PermissionGrant>> {
	let mut query = sqlx::QueryBuilder::new(
		"SELECT tenant_id, unit_id, cc_ids, is_parent_level, deleted FROM permission_grants
		WHERE 1=1",
	);
	if !opts.include_deleted {
		query.push(" AND deleted=0");
	}
	if let Some(ref tenant_id) = opts.tenant_id {
		query.push(" AND tenant_id=").push_bind(tenant_id.as_ref());
	}
	if let Some(ref unit_ids) = opts.unit_ids {
		query.push(" AND unit_id IN ");
		query = push_in(query, unit_ids);
	}
	query.push(" ORDER BY tenant_id, unit_id");

	let res = query.build().fetch_all(db).await.map_err(db_err)?;
	collect_res(res.iter().map(grant_from_row))
}

pub(crate) async fn upsert(db: &SqlitePool, grant: &PermissionGrant) -> ClResult<()> {
	sqlx::query(
		"INSERT INTO permission_grants (tenant_id, unit_id, cc_ids, is_parent_level, deleted)
		VALUES (?, ?, ?, ?, 0)
		ON CONFLICT(tenant_id, unit_id) DO UPDATE SET cc_ids=excluded.cc_ids,
			is_parent_level=excluded.is_parent_level, deleted=0",
	)
	.bind(grant.tenant_id.as_ref())
	.bind(grant.unit_id.as_ref())
	.bind(join_str_list(&normalize_ids(&grant.counting_circle_ids)))
	.bind(grant.is_parent_level)
	.execute(db)
	.await
	.map_err(db_err)?;
	Ok(())
}

pub(crate) async fn delete(db: &SqlitePool, tenant_id: &str, unit_id: &str) -> ClResult<()> {
	let res = sqlx::query("UPDATE permission_grants SET deleted=1 WHERE tenant_id=? AND unit_id=?")
		.bind(tenant_id)
		.bind(unit_id)
		.execute(db)
		.await
		.map_err(db_err)?;
	if res.rows_affected() == 0 {
		return Err(Error::NotFound);
	}
	Ok(())
}

/// Rewrites every grant (deleted ones included) that lists `from_cc_id`
pub(crate) async fn replace_counting_circle(
	db: &SqlitePool,
	from_cc_id: &str,
	to_cc_id: &str,
) -> ClResult<()> {
	let mut tx = db.begin().await.map_err(db_err)?;
	let res = sqlx::query(
		"SELECT tenant_id, unit_id, cc_ids, is_parent_level, deleted FROM permission_grants
		WHERE ','||cc_ids||',' LIKE '%,'||?||',%'",
	)
	.bind(from_cc_id)
	.fetch_all(&mut *tx)
	.await
	.map_err(db_err)?;
	let grants = collect_res(res.iter().map(grant_from_row))?;

	for grant in grants {
		let cc_ids: Vec<Box<str>> = grant
			.counting_circle_ids
			.iter()
			.map(|id| if id.as_ref() == from_cc_id { to_cc_id.into() } else { id.clone() })
			.collect();
		sqlx::query("UPDATE permission_grants SET cc_ids=? WHERE tenant_id=? AND unit_id=?")
			.bind(join_str_list(&normalize_ids(&cc_ids)))
			.bind(grant.tenant_id.as_ref())
			.bind(grant.unit_id.as_ref())
			.execute(&mut *tx)
			.await
			.map_err(db_err)?;
	}
	tx.commit().await.map_err(db_err)?;
	Ok(())
}

// vim: ts=4
