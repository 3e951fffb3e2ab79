//! Permission resolver scenarios across the ranked scopes

mod common;

use std::collections::HashSet;

use basis::grant::{self, SetGrantData};
use basis::permission::{self, PermissionResolver, Scope};
use basis::{assignment, canton, counting_circle, perm, unit};
use basis_types::basis_adapter::{UpdateCountingCircleData, UpdateUnitData};
use basis_types::error::Error;
use basis_types::types::Patch;
use common::*;

fn ids(items: &[&Box<str>]) -> HashSet<Box<str>> {
	items.iter().map(|&id| id.clone()).collect()
}

#[tokio::test]
async fn test_leaf_grant_limits_access() {
	let t = create_test_app().await;
	let tree = seed_tree(&t.app).await;
	let cc1 = create_circle(&t.app, "gossau-1", "SG").await;
	let cc2 = create_circle(&t.app, "gossau-2", "SG").await;
	let cc_wil = create_circle(&t.app, "wil-1", "SG").await;
	assign(&t.app, &tree.gossau, &cc1).await;
	assign(&t.app, &tree.gossau, &cc2).await;
	assign(&t.app, &tree.wil, &cc_wil).await;

	let grant = SetGrantData {
		tenant_id: "t-x".into(),
		unit_id: tree.andwil.clone(),
		counting_circle_ids: vec![cc1.clone()],
		is_parent_level: false,
	};
	grant::set_grant(&t.app, &admin(), &grant).await.unwrap();
	let p = tenant("t-x", None);

	assert_eq!(permission::accessible_units(&t.app, &p).await.unwrap(), ids(&[&tree.andwil]));
	assert_eq!(
		permission::readable_units(&t.app, &p).await.unwrap(),
		ids(&[&tree.andwil, &tree.gossau, &tree.sg])
	);
	assert_eq!(permission::accessible_counting_circles(&t.app, &p).await.unwrap(), ids(&[&cc1]));

	// Ancestors are readable, never writable
	assert!(unit::read_unit(&t.app, &p, &tree.sg).await.is_ok());
	let rename = UpdateUnitData { name: Patch::Value("Renamed".into()), ..Default::default() };
	assert!(matches!(
		unit::update_unit(&t.app, &p, &tree.gossau, &rename).await,
		Err(Error::PermissionDenied)
	));
	assert!(unit::update_unit(&t.app, &p, &tree.andwil, &rename).await.is_ok());

	// Siblings via an ancestor stay invisible
	assert!(matches!(unit::read_unit(&t.app, &p, &tree.wil).await, Err(Error::NotFound)));
	let names: HashSet<Box<str>> =
		unit::list_units(&t.app, &p, false).await.unwrap().into_iter().map(|u| u.id).collect();
	assert_eq!(names, ids(&[&tree.andwil, &tree.gossau, &tree.sg]));

	let patch = UpdateCountingCircleData { name: Patch::Value("x".into()), ..Default::default() };
	assert!(matches!(
		counting_circle::update_counting_circle(&t.app, &p, &cc2, &patch).await,
		Err(Error::PermissionDenied)
	));
	assert!(matches!(
		counting_circle::update_counting_circle(&t.app, &p, &cc_wil, &patch).await,
		Err(Error::NotFound)
	));
}

#[tokio::test]
async fn test_leaf_grant_must_be_reachable() {
	let t = create_test_app().await;
	let tree = seed_tree(&t.app).await;
	let cc_wil = create_circle(&t.app, "wil-1", "SG").await;
	assign(&t.app, &tree.wil, &cc_wil).await;

	let grant = SetGrantData {
		tenant_id: "t-x".into(),
		unit_id: tree.andwil.clone(),
		counting_circle_ids: vec![cc_wil.clone()],
		is_parent_level: false,
	};
	let res = grant::set_grant(&t.app, &admin(), &grant).await;
	assert!(matches!(res, Err(Error::ValidationError(_))));
}

#[tokio::test]
async fn test_leaf_grant_pruned_on_unassign() {
	let t = create_test_app().await;
	let tree = seed_tree(&t.app).await;
	let cc1 = create_circle(&t.app, "gossau-1", "SG").await;
	let cc2 = create_circle(&t.app, "gossau-2", "SG").await;
	assign(&t.app, &tree.gossau, &cc1).await;
	assign(&t.app, &tree.gossau, &cc2).await;

	let grant = SetGrantData {
		tenant_id: "t-x".into(),
		unit_id: tree.andwil.clone(),
		counting_circle_ids: vec![cc1.clone(), cc2.clone()],
		is_parent_level: false,
	};
	grant::set_grant(&t.app, &admin(), &grant).await.unwrap();
	assignment::unassign(&t.app, &admin(), &tree.gossau, &cc1).await.unwrap();

	let grants = grant::list_grants(&t.app, &admin(), false).await.unwrap();
	let leaf = grants.iter().find(|g| g.tenant_id.as_ref() == "t-x").unwrap();
	assert_eq!(leaf.counting_circle_ids, vec![cc2.clone()]);

	// The owner's parent-level grant follows what is reachable
	let owner = grants
		.iter()
		.find(|g| g.tenant_id.as_ref() == "t-gossau" && g.unit_id == tree.gossau)
		.unwrap();
	assert!(owner.is_parent_level);
	assert_eq!(owner.counting_circle_ids, vec![cc2.clone()]);
}

#[tokio::test]
async fn test_leaf_grant_waits_for_structure_lock() {
	let t = create_test_app().await;
	let tree = seed_tree(&t.app).await;
	let x = create_circle(&t.app, "x", "SG").await;
	let y = create_circle(&t.app, "y", "SG").await;
	assign(&t.app, &tree.andwil, &x).await;
	assign(&t.app, &tree.andwil, &y).await;

	let guard = t.app.structure_lock.lock().await;
	let set = tokio::spawn({
		let app = t.app.clone();
		let data = SetGrantData {
			tenant_id: "t-leaf".into(),
			unit_id: tree.andwil.clone(),
			counting_circle_ids: vec![x.clone()],
			is_parent_level: false,
		};
		async move { grant::set_grant(&app, &admin(), &data).await }
	});
	for _ in 0..10 {
		tokio::task::yield_now().await;
	}
	assert!(!set.is_finished());

	// x is retired before the grant gets validated
	commit_merge(&t.app, &[&x, &y], &x, NOW).await;
	drop(guard);

	let res = set.await.unwrap();
	assert!(matches!(res, Err(Error::ValidationError(_))), "{:?}", res);
	let grants = grant::list_grants(&t.app, &admin(), false).await.unwrap();
	assert!(grants.iter().flat_map(|g| &g.counting_circle_ids).all(|id| *id != x));
}

#[tokio::test]
async fn test_tenant_scope_covers_owned_subtree() {
	let t = create_test_app().await;
	let tree = seed_tree(&t.app).await;
	let p = tenant("t-gossau", Some(perm::SCOPE_TENANT));

	let resolver = PermissionResolver::load(&t.app, &p).await.unwrap();
	assert_eq!(resolver.scope(), Scope::Tenant);
	assert_eq!(resolver.accessible_units(), &ids(&[&tree.gossau, &tree.andwil]));
	assert!(resolver.check_unit_write(&tree.andwil).is_ok());
	assert!(matches!(resolver.check_unit_write(&tree.sg), Err(Error::PermissionDenied)));
	assert!(matches!(resolver.check_unit_read(&tree.zh), Err(Error::NotFound)));

	// Root units need global scope
	let data = basis::unit::NewUnitData {
		parent_id: None,
		name: "Appenzell".into(),
		canton: "AI".into(),
		owner_tenant_id: "t-gossau".into(),
	};
	assert!(matches!(unit::create_unit(&t.app, &p, &data).await, Err(Error::PermissionDenied)));
}

#[tokio::test]
async fn test_owner_change_moves_parent_level_grant() {
	let t = create_test_app().await;
	let tree = seed_tree(&t.app).await;
	let rename = UpdateUnitData { name: Patch::Value("Wil SG".into()), ..Default::default() };
	assert!(unit::update_unit(&t.app, &tenant("t-wil", None), &tree.wil, &rename).await.is_ok());

	let handover =
		UpdateUnitData { owner_tenant_id: Patch::Value("t-new".into()), ..Default::default() };
	unit::update_unit(&t.app, &admin(), &tree.wil, &handover).await.unwrap();

	let res = unit::update_unit(&t.app, &tenant("t-wil", None), &tree.wil, &rename).await;
	assert!(matches!(res, Err(Error::NotFound)), "{:?}", res);
	let units = permission::accessible_units(&t.app, &tenant("t-wil", None)).await.unwrap();
	assert!(units.is_empty());
	assert!(unit::update_unit(&t.app, &tenant("t-new", None), &tree.wil, &rename).await.is_ok());
}

#[tokio::test]
async fn test_canton_scope() {
	let t = create_test_app().await;
	let tree = seed_tree(&t.app).await;
	let cc_sg = create_circle(&t.app, "sg-free", "SG").await;
	let cc_zh = create_circle(&t.app, "zh-free", "ZH").await;

	let p = tenant("t-sg", Some(perm::SCOPE_CANTON));
	let resolver = PermissionResolver::load(&t.app, &p).await.unwrap();
	// Without the canton record only the owned subtree is reachable
	assert_eq!(resolver.accessible_units().len(), 4);
	assert!(!resolver.is_owner_of_canton("SG"));

	// Only global scope hands out cantons
	assert!(matches!(
		canton::set_canton_owner(&t.app, &tenant("t-sg", Some(perm::SCOPE_CANTON)), "SG", "t-sg")
			.await,
		Err(Error::PermissionDenied)
	));
	canton::set_canton_owner(&t.app, &admin(), "SG", "t-sg").await.unwrap();
	assert!(canton::is_owner_of_canton(&t.app, &p, "SG").await.unwrap());

	let accessible = permission::accessible_units(&t.app, &p).await.unwrap();
	assert_eq!(accessible, ids(&[&tree.sg, &tree.gossau, &tree.andwil, &tree.wil]));

	let circles = permission::accessible_counting_circles(&t.app, &p).await.unwrap();
	assert!(circles.contains(&cc_sg));
	assert!(!circles.contains(&cc_zh));

	let candidates: Vec<Box<str>> = assignment::assignable_candidates(&t.app, &p, &tree.wil)
		.await
		.unwrap()
		.into_iter()
		.map(|c| c.id)
		.collect();
	assert_eq!(candidates, vec![cc_sg.clone()]);

	let res = assignment::assign(&t.app, &p, &tree.wil, &cc_zh).await;
	assert!(matches!(res, Err(Error::NotFound)));
	assignment::assign(&t.app, &p, &tree.wil, &cc_sg).await.unwrap();
}

#[tokio::test]
async fn test_operation_permission_required() {
	let t = create_test_app().await;
	let tree = seed_tree(&t.app).await;
	let reader = basis::Principal::new("admin", [perm::SCOPE_GLOBAL]);

	let rename = UpdateUnitData { name: Patch::Value("x".into()), ..Default::default() };
	assert!(matches!(
		unit::update_unit(&t.app, &reader, &tree.sg, &rename).await,
		Err(Error::PermissionDenied)
	));
	assert_eq!(unit::list_units(&t.app, &reader, false).await.unwrap().len(), 5);
}

// vim: ts=4
