//! Organizational units, their hierarchy closure and canton settings

use sqlx::{Row, SqlitePool, sqlite::SqliteRow};

use basis_types::basis_adapter::*;
use basis_types::prelude::*;

use crate::utils::*;

const UNIT_COLUMNS: &str =
	"unit_id, parent_id, name, canton, owner_tenant_id, deleted, created_at, modified_at";

fn unit_from_row(row: &SqliteRow) -> Result<Unit, sqlx::Error> {
	Ok(Unit {
		id: row.try_get("unit_id")?,
		parent_id: row.try_get("parent_id")?,
		name: row.try_get("name")?,
		canton: row.try_get("canton")?,
		owner_tenant_id: row.try_get("owner_tenant_id")?,
		deleted: row.try_get("deleted")?,
		created_at: row.try_get("created_at").map(Timestamp)?,
		modified_at: row.try_get::<Option<i64>, _>("modified_at")?.map(Timestamp),
	})
}

pub(crate) async fn list(db: &SqlitePool, opts: &ListUnitOptions) -> ClResult<Vec<Unit>> {
	let mut query = sqlx::QueryBuilder::new(format!("SELECT {} FROM units WHERE 1=1", UNIT_COLUMNS));
	if !opts.include_deleted {
		query.push(" AND deleted=0");
	}
	if let Some(ref ids) = opts.ids {
		query.push(" AND unit_id IN ");
		query = push_in(query, ids);
	}
	if let Some(ref cantons) = opts.cantons {
		query.push(" AND canton IN ");
		query = push_in(query, cantons);
	}
	if let Some(ref owner) = opts.owner_tenant_id {
		query.push(" AND owner_tenant_id=").push_bind(owner.as_ref());
	}
	query.push(" ORDER BY unit_id");

	let res = query.build().fetch_all(db).await.map_err(db_err)?;
	collect_res(res.iter().map(unit_from_row))
}

pub(crate) async fn read(db: &SqlitePool, unit_id: &str) -> ClResult<Unit> {
	let res = sqlx::query(&format!("SELECT {} FROM units WHERE unit_id=?", UNIT_COLUMNS))
		.bind(unit_id)
		.fetch_one(db)
		.await;
	map_res(res, |row| unit_from_row(&row))
}

pub(crate) async fn create(db: &SqlitePool, unit: &CreateUnitData) -> ClResult<()> {
	let res = sqlx::query(
		"INSERT INTO units (unit_id, parent_id, name, canton, owner_tenant_id)
		VALUES (?, ?, ?, ?, ?)",
	)
	.bind(unit.id.as_ref())
	.bind(unit.parent_id.as_deref())
	.bind(unit.name.as_ref())
	.bind(unit.canton.as_ref())
	.bind(unit.owner_tenant_id.as_ref())
	.execute(db)
	.await;

	match res {
		Ok(_) => Ok(()),
		Err(err) if err.as_database_error().is_some_and(|e| e.is_unique_violation()) => {
			Err(Error::Conflict(format!("unit {} already exists", unit.id)))
		}
		Err(err) => Err(db_err(err)),
	}
}

pub(crate) async fn update(db: &SqlitePool, unit_id: &str, patch: &UpdateUnitData) -> ClResult<()> {
	let mut query = sqlx::QueryBuilder::new("UPDATE units SET ");
	let mut has_updates = false;
	has_updates = push_patch!(query, has_updates, "name", &patch.name, |v| v.as_ref());
	has_updates = push_patch!(query, has_updates, "parent_id", &patch.parent_id, |v| v.as_ref());
	has_updates = push_patch!(query, has_updates, "canton", &patch.canton, |v| v.as_ref());
	has_updates =
		push_patch!(query, has_updates, "owner_tenant_id", &patch.owner_tenant_id, |v| v.as_ref());
	if !has_updates {
		return Ok(());
	}
	query.push(", modified_at=unixepoch() WHERE unit_id=").push_bind(unit_id);

	let res = query.build().execute(db).await.map_err(db_err)?;
	if res.rows_affected() == 0 {
		return Err(Error::NotFound);
	}
	Ok(())
}

pub(crate) async fn delete(db: &SqlitePool, unit_ids: &[Box<str>]) -> ClResult<()> {
	if unit_ids.is_empty() {
		return Ok(());
	}
	let mut query =
		sqlx::QueryBuilder::new("UPDATE units SET deleted=1, modified_at=unixepoch() WHERE unit_id IN ");
	query = push_in(query, unit_ids);
	query.build().execute(db).await.map_err(db_err)?;
	Ok(())
}

// Hierarchy closure
//*******************
pub(crate) async fn list_hierarchies(db: &SqlitePool) -> ClResult<Vec<HierarchyClosure>> {
	let res = sqlx::query(
		"SELECT unit_id, tenant_id, parent_ids, child_ids FROM unit_hierarchy ORDER BY unit_id",
	)
	.fetch_all(db)
	.await
	.map_err(db_err)?;

	collect_res(res.iter().map(|row| {
		let parent_ids: &str = row.try_get("parent_ids")?;
		let child_ids: &str = row.try_get("child_ids")?;
		Ok(HierarchyClosure {
			unit_id: row.try_get("unit_id")?,
			tenant_id: row.try_get("tenant_id")?,
			parent_ids: parse_str_list(parent_ids),
			child_ids: parse_str_list(child_ids),
		})
	}))
}

pub(crate) async fn replace_hierarchies(
	db: &SqlitePool,
	closures: &[HierarchyClosure],
) -> ClResult<()> {
	let mut tx = db.begin().await.map_err(db_err)?;
	sqlx::query("DELETE FROM unit_hierarchy").execute(&mut *tx).await.map_err(db_err)?;
	for closure in closures {
		sqlx::query(
			"INSERT INTO unit_hierarchy (unit_id, tenant_id, parent_ids, child_ids)
			VALUES (?, ?, ?, ?)",
		)
		.bind(closure.unit_id.as_ref())
		.bind(closure.tenant_id.as_ref())
		.bind(join_str_list(&closure.parent_ids))
		.bind(join_str_list(&closure.child_ids))
		.execute(&mut *tx)
		.await
		.map_err(db_err)?;
	}
	tx.commit().await.map_err(db_err)?;
	Ok(())
}

// Canton settings
//*****************
pub(crate) async fn list_canton_settings(db: &SqlitePool) -> ClResult<Vec<CantonSettings>> {
	let res = sqlx::query("SELECT canton, tenant_id, created_at FROM canton_settings ORDER BY canton")
		.fetch_all(db)
		.await
		.map_err(db_err)?;

	collect_res(res.iter().map(|row| {
		Ok(CantonSettings {
			canton: row.try_get("canton")?,
			tenant_id: row.try_get("tenant_id")?,
			created_at: row.try_get("created_at").map(Timestamp)?,
		})
	}))
}

pub(crate) async fn upsert_canton_settings(
	db: &SqlitePool,
	canton: &str,
	tenant_id: &str,
) -> ClResult<()> {
	sqlx::query(
		"INSERT INTO canton_settings (canton, tenant_id) VALUES (?, ?)
		ON CONFLICT(canton) DO UPDATE SET tenant_id=excluded.tenant_id",
	)
	.bind(canton)
	.bind(tenant_id)
	.execute(db)
	.await
	.map_err(db_err)?;
	Ok(())
}

// vim: ts=4
