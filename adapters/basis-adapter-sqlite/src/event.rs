//! Append-only domain event store

use sqlx::{Row, SqlitePool, sqlite::SqliteRow};

use basis_types::event::{BasisEvent, StoredEvent};
use basis_types::prelude::*;

use crate::utils::*;

fn event_from_row(row: &SqliteRow) -> Result<StoredEvent, sqlx::Error> {
	let data: &str = row.try_get("data")?;
	let event: BasisEvent =
		serde_json::from_str(data).map_err(|e| sqlx::Error::Decode(Box::new(e)))?;
	Ok(StoredEvent {
		seq: row.try_get::<i64, _>("seq").map(i64::cast_unsigned)?,
		stream_id: row.try_get("stream_id")?,
		version: row.try_get::<i64, _>("version").map(i64::cast_unsigned)?,
		created_at: row.try_get("created_at").map(Timestamp)?,
		event,
	})
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
	err.as_database_error().is_some_and(|e| e.is_unique_violation())
}

/// Appends events to a stream inside one transaction. The stream must be at
/// `expected_version`, a concurrent writer makes either the version check or
/// the (stream_id, version) unique constraint fail.
pub(crate) async fn append(
	db: &SqlitePool,
	stream_id: &str,
	expected_version: u64,
	events: &[BasisEvent],
) -> ClResult<Vec<StoredEvent>> {
	let mut tx = db.begin().await.map_err(db_err)?;

	let current: i64 =
		sqlx::query("SELECT coalesce(max(version), 0) AS version FROM events WHERE stream_id=?")
			.bind(stream_id)
			.fetch_one(&mut *tx)
			.await
			.and_then(|row| row.try_get("version"))
			.map_err(db_err)?;
	if current.cast_unsigned() != expected_version {
		warn!(stream_id, current, expected_version, "Event stream version mismatch");
		return Err(Error::Conflict(format!(
			"stream {} is at version {}, expected {}",
			stream_id, current, expected_version
		)));
	}

	let mut stored = Vec::with_capacity(events.len());
	for (version, event) in (expected_version + 1..).zip(events) {
		let data = serde_json::to_string(event)?;
		let res = sqlx::query(
			"INSERT INTO events (stream_id, version, kind, data) VALUES (?, ?, ?, ?)
			RETURNING seq, created_at",
		)
		.bind(stream_id)
		.bind(version.cast_signed())
		.bind(event.kind())
		.bind(data)
		.fetch_one(&mut *tx)
		.await;

		let row = match res {
			Ok(row) => row,
			Err(err) if is_unique_violation(&err) => {
				warn!(stream_id, version, "Concurrent append to event stream");
				return Err(Error::Conflict(format!("stream {} was modified concurrently", stream_id)));
			}
			Err(err) => return Err(db_err(err)),
		};
		stored.push(StoredEvent {
			seq: row.try_get::<i64, _>("seq").map(i64::cast_unsigned).map_err(db_err)?,
			stream_id: stream_id.into(),
			version,
			created_at: row.try_get("created_at").map(Timestamp).map_err(db_err)?,
			event: event.clone(),
		});
	}

	match tx.commit().await {
		Ok(()) => Ok(stored),
		Err(err) if is_unique_violation(&err) => {
			Err(Error::Conflict(format!("stream {} was modified concurrently", stream_id)))
		}
		Err(err) => Err(db_err(err)),
	}
}

pub(crate) async fn list(
	db: &SqlitePool,
	stream_id: Option<&str>,
	after_seq: Option<u64>,
) -> ClResult<Vec<StoredEvent>> {
	let mut query = sqlx::QueryBuilder::new(
		"SELECT seq, stream_id, version, created_at, data FROM events WHERE true",
	);
	if let Some(stream_id) = stream_id {
		query.push(" AND stream_id=").push_bind(stream_id);
	}
	if let Some(after_seq) = after_seq {
		query.push(" AND seq>").push_bind(after_seq.cast_signed());
	}
	query.push(" ORDER BY seq");

	let res = query.build().fetch_all(db).await.map_err(db_err)?;
	collect_res(res.iter().map(event_from_row))
}

// vim: ts=4
