use std::sync::Arc;

use basis::counting_circle::{self, NewCountingCircleData};
use basis::merge::{MergeData, SuccessorData, service};
use basis::unit::{self, NewUnitData};
use basis::{App, AppBuilder, BasisConfig, Principal, assignment, perm};
use basis_adapter_sqlite::BasisAdapterSqlite;
use basis_types::basis_adapter::CountingCircleData;
use basis_types::event::{ChannelEventSink, MergeSchedule};
use basis_types::types::Timestamp;
use basis_types::utils::new_id;
use tempfile::TempDir;

pub const NOW: Timestamp = Timestamp(1_750_000_000);

pub struct TestApp {
	pub app: App,
	pub events: Arc<ChannelEventSink>,
	_dir: TempDir,
}

pub async fn create_test_app() -> TestApp {
	let _ = tracing_subscriber::fmt().with_test_writer().try_init();

	let dir = TempDir::new().expect("Failed to create temp directory");
	let adapter =
		BasisAdapterSqlite::new(dir.path()).await.expect("Failed to create sqlite adapter");
	let events = Arc::new(ChannelEventSink::new(256));

	let mut builder =
		AppBuilder::new(BasisConfig { db_dir: dir.path().into(), ..Default::default() });
	builder.adapter(Arc::new(adapter)).event_sink(events.clone());
	let app = builder.build().await.expect("Failed to build app");
	TestApp { app, events, _dir: dir }
}

/// Global administrator holding every permission
pub fn admin() -> Principal {
	Principal::new(
		"admin",
		[
			perm::SCOPE_GLOBAL,
			perm::UNIT_WRITE,
			perm::COUNTING_CIRCLE_WRITE,
			perm::MERGER_WRITE,
			perm::GRANT_WRITE,
			perm::CANTON_WRITE,
		],
	)
}

/// Every operation permission, scope as given
pub fn tenant(tenant_id: &str, scope: Option<&str>) -> Principal {
	let mut perms = vec![
		perm::UNIT_WRITE,
		perm::COUNTING_CIRCLE_WRITE,
		perm::MERGER_WRITE,
		perm::GRANT_WRITE,
	];
	perms.extend(scope);
	Principal::new(tenant_id, perms)
}

/// Unit ids of the seeded tree:
///
/// ```text
/// sg (SG, t-sg)
/// ├── gossau (SG, t-gossau)
/// │   └── andwil (SG, t-gossau)
/// └── wil (SG, t-wil)
/// zh (ZH, t-zh)
/// ```
pub struct Tree {
	pub sg: Box<str>,
	pub gossau: Box<str>,
	pub andwil: Box<str>,
	pub wil: Box<str>,
	pub zh: Box<str>,
}

pub async fn create_unit(
	app: &App,
	name: &str,
	parent_id: Option<&str>,
	canton: &str,
	owner: &str,
) -> Box<str> {
	let data = NewUnitData {
		parent_id: parent_id.map(Into::into),
		name: name.into(),
		canton: canton.into(),
		owner_tenant_id: owner.into(),
	};
	unit::create_unit(app, &admin(), &data).await.expect("Failed to create unit").id
}

pub async fn seed_tree(app: &App) -> Tree {
	let sg = create_unit(app, "St. Gallen", None, "SG", "t-sg").await;
	let gossau = create_unit(app, "Gossau", Some(&sg), "SG", "t-gossau").await;
	let andwil = create_unit(app, "Andwil", Some(&gossau), "SG", "t-gossau").await;
	let wil = create_unit(app, "Wil", Some(&sg), "SG", "t-wil").await;
	let zh = create_unit(app, "Zürich", None, "ZH", "t-zh").await;
	Tree { sg, gossau, andwil, wil, zh }
}

pub async fn create_circle(app: &App, name: &str, canton: &str) -> Box<str> {
	create_circle_with_email(app, name, canton, None).await
}

pub async fn create_circle_with_email(
	app: &App,
	name: &str,
	canton: &str,
	contact_email: Option<&str>,
) -> Box<str> {
	let data = NewCountingCircleData {
		name: name.into(),
		bfs: format!("bfs-{}", name).into(),
		code: name.to_uppercase().into(),
		canton: canton.into(),
		contact_email: contact_email.map(Into::into),
	};
	counting_circle::create_counting_circle(app, &admin(), &data)
		.await
		.expect("Failed to create counting circle")
		.id
}

pub async fn assign(app: &App, unit_id: &str, cc_id: &str) {
	assignment::assign(app, &admin(), unit_id, cc_id).await.expect("Failed to assign");
}

pub fn merge_data(
	source_ids: &[impl AsRef<str>],
	copy_from_id: &str,
	active_from: Timestamp,
) -> MergeData {
	MergeData {
		source_ids: source_ids.iter().map(|id| id.as_ref().into()).collect(),
		copy_from_id: copy_from_id.into(),
		successor: SuccessorData {
			id: None,
			name: "Neu".into(),
			bfs: "9999".into(),
			code: "NEU".into(),
			contact_email: None,
		},
		active_from,
	}
}

/// Schedules a merge straight through its event stream without taking
/// `structure_lock`, for tests that hold the lock themselves. Returns the
/// successor id.
pub async fn commit_merge(
	app: &App,
	source_ids: &[impl AsRef<str>],
	copy_from_id: &str,
	active_from: Timestamp,
) -> Box<str> {
	let successor_id = new_id();
	let order = service::load_order(app, &successor_id).await.expect("load order");
	let schedule = MergeSchedule {
		merger_id: new_id(),
		successor: CountingCircleData {
			id: successor_id.clone(),
			name: "Neu".into(),
			bfs: "9999".into(),
			code: "NEU".into(),
			canton: "SG".into(),
			contact_email: None,
		},
		source_ids: source_ids.iter().map(|id| id.as_ref().into()).collect(),
		copy_from_id: copy_from_id.into(),
		active_from,
	};
	let events = order.schedule(schedule, NOW).expect("schedule");
	service::commit(app, &order, &events).await.expect("commit");
	successor_id
}

/// Sorted (unit, circle, source unit) triples of the given units
pub async fn assignment_rows(
	app: &App,
	unit_ids: &[impl AsRef<str>],
) -> Vec<(String, String, String)> {
	let mut rows = Vec::new();
	for unit_id in unit_ids {
		let assignments = assignment::list_assignments(app, &admin(), unit_id.as_ref())
			.await
			.expect("list assignments");
		rows.extend(assignments.into_iter().map(|a| {
			(a.unit_id.to_string(), a.counting_circle_id.to_string(), a.source_unit_id.to_string())
		}));
	}
	rows.sort();
	rows
}

// vim: ts=4
