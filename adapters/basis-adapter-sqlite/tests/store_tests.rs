//! SQLite adapter storage tests
//!
//! Exercises filters, soft-delete handling, the closure table, grant rewrites,
//! the event store version check and task persistence.

use basis_adapter_sqlite::BasisAdapterSqlite;
use basis_types::basis_adapter::*;
use basis_types::error::Error;
use basis_types::event::{BasisEvent, MergeSchedule};
use basis_types::types::{Patch, Timestamp};
use tempfile::TempDir;

async fn create_test_adapter() -> (BasisAdapterSqlite, TempDir) {
	let temp_dir = TempDir::new().expect("Failed to create temp directory");
	let adapter = BasisAdapterSqlite::new(temp_dir.path()).await.expect("Failed to create adapter");
	(adapter, temp_dir)
}

fn unit(id: &str, parent_id: Option<&str>, canton: &str) -> CreateUnitData {
	CreateUnitData {
		id: id.into(),
		parent_id: parent_id.map(Into::into),
		name: format!("Unit {}", id).into(),
		canton: canton.into(),
		owner_tenant_id: "tenant-a".into(),
	}
}

fn circle(id: &str) -> CountingCircleData {
	CountingCircleData {
		id: id.into(),
		name: format!("Circle {}", id).into(),
		bfs: format!("bfs-{}", id).into(),
		code: id.into(),
		canton: "SG".into(),
		contact_email: None,
	}
}

#[tokio::test]
async fn test_unit_crud_and_soft_delete() {
	let (adapter, _temp) = create_test_adapter().await;

	adapter.create_unit(&unit("ch", None, "CH")).await.unwrap();
	adapter.create_unit(&unit("sg", Some("ch"), "SG")).await.unwrap();
	adapter.create_unit(&unit("zh", Some("ch"), "ZH")).await.unwrap();

	let res = adapter.create_unit(&unit("sg", Some("ch"), "SG")).await;
	assert!(matches!(res, Err(Error::Conflict(_))));

	let patch = UpdateUnitData { name: Patch::Value("St. Gallen".into()), ..Default::default() };
	adapter.update_unit("sg", &patch).await.unwrap();
	let sg = adapter.read_unit("sg").await.unwrap();
	assert_eq!(&*sg.name, "St. Gallen");
	assert!(sg.modified_at.is_some());

	let opts = ListUnitOptions { cantons: Some(vec!["SG".into(), "ZH".into()]), ..Default::default() };
	assert_eq!(adapter.list_units(&opts).await.unwrap().len(), 2);

	adapter.delete_units(&["zh".into()]).await.unwrap();
	let units = adapter.list_units(&ListUnitOptions::default()).await.unwrap();
	assert_eq!(units.iter().map(|u| &*u.id).collect::<Vec<_>>(), vec!["ch", "sg"]);

	let all = ListUnitOptions { include_deleted: true, ..Default::default() };
	assert_eq!(adapter.list_units(&all).await.unwrap().len(), 3);
	assert!(adapter.read_unit("zh").await.unwrap().deleted);

	assert!(matches!(adapter.read_unit("nope").await, Err(Error::NotFound)));
}

#[tokio::test]
async fn test_hierarchy_replace() {
	let (adapter, _temp) = create_test_adapter().await;

	let closures = vec![
		HierarchyClosure {
			unit_id: "ch".into(),
			tenant_id: "tenant-a".into(),
			parent_ids: vec![],
			child_ids: vec!["sg".into()],
		},
		HierarchyClosure {
			unit_id: "sg".into(),
			tenant_id: "tenant-a".into(),
			parent_ids: vec!["ch".into()],
			child_ids: vec![],
		},
	];
	adapter.replace_hierarchies(&closures).await.unwrap();
	assert_eq!(adapter.list_hierarchies().await.unwrap(), closures);

	adapter.replace_hierarchies(&closures[..1]).await.unwrap();
	assert_eq!(adapter.list_hierarchies().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_counting_circle_states() {
	let (adapter, _temp) = create_test_adapter().await;

	adapter.upsert_counting_circle(&circle("a"), CountingCircleState::Active).await.unwrap();
	adapter.upsert_counting_circle(&circle("b"), CountingCircleState::Active).await.unwrap();
	adapter.upsert_counting_circle(&circle("n"), CountingCircleState::Inactive).await.unwrap();

	adapter
		.set_counting_circle_state("a", CountingCircleState::Merged, Patch::Value("n"), Patch::Undefined)
		.await
		.unwrap();
	let a = adapter.read_counting_circle("a").await.unwrap();
	assert_eq!(a.state, CountingCircleState::Merged);
	assert_eq!(a.merge_target_id.as_deref(), Some("n"));

	let opts = ListCountingCircleOptions {
		states: Some(vec![CountingCircleState::Active, CountingCircleState::Inactive]),
		..Default::default()
	};
	let ids: Vec<_> =
		adapter.list_counting_circles(&opts).await.unwrap().into_iter().map(|c| c.id).collect();
	assert_eq!(ids, vec![Box::<str>::from("b"), "n".into()]);

	adapter
		.set_counting_circle_state("b", CountingCircleState::Deleted, Patch::Undefined, Patch::Undefined)
		.await
		.unwrap();
	let visible = adapter.list_counting_circles(&ListCountingCircleOptions::default()).await.unwrap();
	assert_eq!(visible.len(), 2);

	let patch = UpdateCountingCircleData {
		contact_email: Patch::Value("wahlen@example.ch".into()),
		..Default::default()
	};
	adapter.update_counting_circle("n", &patch).await.unwrap();
	let n = adapter.read_counting_circle("n").await.unwrap();
	assert_eq!(n.contact_email.as_deref(), Some("wahlen@example.ch"));

	let res = adapter.update_counting_circle("missing", &patch).await;
	assert!(matches!(res, Err(Error::NotFound)));
}

#[tokio::test]
async fn test_assignments_insert_or_ignore() {
	let (adapter, _temp) = create_test_adapter().await;

	let direct = Assignment::direct("sg", "a");
	let inherited = Assignment { unit_id: "gossau".into(), ..direct.clone() };
	adapter.add_assignments(&[direct.clone(), inherited.clone()]).await.unwrap();
	// Second insert with another source keeps the original row
	adapter.add_assignments(&[Assignment::direct("gossau", "a")]).await.unwrap();

	let opts = ListAssignmentOptions { unit_ids: Some(vec!["gossau".into()]), ..Default::default() };
	let rows = adapter.list_assignments(&opts).await.unwrap();
	assert_eq!(rows, vec![inherited.clone()]);
	assert!(rows[0].inherited());

	adapter.remove_assignments(&[inherited]).await.unwrap();
	let all = adapter.list_assignments(&ListAssignmentOptions::default()).await.unwrap();
	assert_eq!(all, vec![direct]);
}

#[tokio::test]
async fn test_grant_rewrite() {
	let (adapter, _temp) = create_test_adapter().await;

	let grant = PermissionGrant {
		tenant_id: "tenant-b".into(),
		unit_id: "sg".into(),
		counting_circle_ids: vec!["b".into(), "a".into()],
		is_parent_level: false,
		deleted: false,
	};
	adapter.upsert_grant(&grant).await.unwrap();
	adapter
		.upsert_grant(&PermissionGrant {
			tenant_id: "tenant-c".into(),
			counting_circle_ids: vec!["c".into()],
			..grant.clone()
		})
		.await
		.unwrap();

	adapter.replace_grant_counting_circle("a", "n").await.unwrap();
	adapter.replace_grant_counting_circle("b", "n").await.unwrap();

	let opts = ListGrantOptions { tenant_id: Some("tenant-b".into()), ..Default::default() };
	let grants = adapter.list_grants(&opts).await.unwrap();
	assert_eq!(grants[0].counting_circle_ids, vec![Box::<str>::from("n")]);

	let opts = ListGrantOptions { tenant_id: Some("tenant-c".into()), ..Default::default() };
	assert_eq!(adapter.list_grants(&opts).await.unwrap()[0].counting_circle_ids, vec![Box::<str>::from("c")]);

	adapter.delete_grant("tenant-c", "sg").await.unwrap();
	assert!(adapter.list_grants(&opts).await.unwrap().is_empty());
	let opts = ListGrantOptions { include_deleted: true, ..opts };
	assert!(adapter.list_grants(&opts).await.unwrap()[0].deleted);
	assert!(matches!(adapter.delete_grant("tenant-x", "sg").await, Err(Error::NotFound)));
}

#[tokio::test]
async fn test_merger_filters() {
	let (adapter, _temp) = create_test_adapter().await;

	let merger = MergeOrderView {
		id: "m1".into(),
		successor_id: "n".into(),
		source_ids: vec!["a".into(), "b".into()],
		copy_from_id: "a".into(),
		active_from: Timestamp(1000),
		merged: false,
		merged_at: None,
	};
	adapter.upsert_merger(&merger).await.unwrap();

	let due = ListMergerOptions { merged: Some(false), due_at: Some(Timestamp(999)), ..Default::default() };
	assert!(adapter.list_mergers(&due).await.unwrap().is_empty());
	let due = ListMergerOptions { due_at: Some(Timestamp(1000)), ..due };
	assert_eq!(adapter.list_mergers(&due).await.unwrap(), vec![merger.clone()]);

	let by_source = ListMergerOptions { source_id: Some("b".into()), ..Default::default() };
	assert_eq!(adapter.list_mergers(&by_source).await.unwrap().len(), 1);
	let by_source = ListMergerOptions { source_id: Some("c".into()), ..Default::default() };
	assert!(adapter.list_mergers(&by_source).await.unwrap().is_empty());

	adapter.mark_merger_merged("m1", Timestamp(1001)).await.unwrap();
	let read = adapter.read_merger_by_successor("n").await.unwrap();
	assert!(read.merged);
	assert_eq!(read.merged_at, Some(Timestamp(1001)));

	adapter.delete_merger("m1").await.unwrap();
	assert!(matches!(adapter.read_merger_by_successor("n").await, Err(Error::NotFound)));
}

#[tokio::test]
async fn test_event_stream_versioning() {
	let (adapter, _temp) = create_test_adapter().await;

	let schedule = MergeSchedule {
		merger_id: "m1".into(),
		successor: circle("n"),
		source_ids: vec!["a".into(), "b".into()],
		copy_from_id: "a".into(),
		active_from: Timestamp(1000),
	};
	let stored = adapter
		.append_events("n", 0, &[BasisEvent::MergeScheduled { schedule: schedule.clone() }])
		.await
		.unwrap();
	assert_eq!(stored[0].version, 1);

	// A writer that loaded the stream at version 0 loses
	let res = adapter.append_events("n", 0, &[BasisEvent::MergeScheduleUpdated { schedule }]).await;
	assert!(matches!(res, Err(Error::Conflict(_))));

	let deleted =
		BasisEvent::MergeScheduleDeleted { merger_id: "m1".into(), successor_id: "n".into() };
	adapter.append_events("n", 1, &[deleted.clone()]).await.unwrap();
	adapter.append_events("other", 0, &[deleted]).await.unwrap();

	let stream = adapter.list_events(Some("n")).await.unwrap();
	assert_eq!(stream.iter().map(|e| e.version).collect::<Vec<_>>(), vec![1, 2]);
	let all = adapter.list_events(None).await.unwrap();
	assert_eq!(all.len(), 3);
	assert!(all.windows(2).all(|w| w[0].seq < w[1].seq));

	let missed = adapter.list_events_after(all[0].seq).await.unwrap();
	assert_eq!(missed.iter().map(|e| e.seq).collect::<Vec<_>>(), vec![all[1].seq, all[2].seq]);
	assert!(adapter.list_events_after(all[2].seq).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_task_persistence() {
	let (adapter, _temp) = create_test_adapter().await;

	let id = adapter.create_task("merge.activate", Some("merge.activate"), "{}").await.unwrap();
	let patch = TaskPatch {
		next_at: Patch::Value(Timestamp(5000)),
		cron: Patch::Value("5 0 * * *".into()),
		..Default::default()
	};
	adapter.update_task(id, &patch).await.unwrap();

	let task = adapter.find_task_by_key("merge.activate").await.unwrap().unwrap();
	assert_eq!(task.task_id, id);
	assert_eq!(task.status, 'P');
	assert_eq!(task.next_at, Some(Timestamp(5000)));
	assert_eq!(task.cron.as_deref(), Some("5 0 * * *"));

	adapter.update_task_error(id, "boom", Some(Timestamp(6000))).await.unwrap();
	assert_eq!(adapter.list_tasks().await.unwrap().len(), 1);

	adapter.update_task_finished(id, "").await.unwrap();
	assert!(adapter.list_tasks().await.unwrap().is_empty());
	assert!(adapter.find_task_by_key("merge.activate").await.unwrap().is_none());
}

// vim: ts=4
