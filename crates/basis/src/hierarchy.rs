//! Hierarchy closure of the organizational unit tree.
//!
//! The closure table is the only place the tree is walked. It is rebuilt from
//! the live units whenever the structure changes; every read goes through a
//! [`HierarchyIndex`] loaded from it.

use std::collections::{HashMap, HashSet};

use crate::prelude::*;
use basis_types::basis_adapter::{HierarchyClosure, ListUnitOptions, Unit};

#[derive(Debug, Clone, Default)]
pub struct HierarchyIndex {
	closures: HashMap<Box<str>, HierarchyClosure>,
}

impl HierarchyIndex {
	pub fn from_closures(closures: impl IntoIterator<Item = HierarchyClosure>) -> Self {
		Self { closures: closures.into_iter().map(|c| (c.unit_id.clone(), c)).collect() }
	}

	pub async fn load(app: &App) -> ClResult<Self> {
		Ok(Self::from_closures(app.adapter.list_hierarchies().await?))
	}

	pub fn contains(&self, unit_id: &str) -> bool {
		self.closures.contains_key(unit_id)
	}

	pub fn unit_ids(&self) -> impl Iterator<Item = &Box<str>> {
		self.closures.keys()
	}

	/// Ancestors, nearest parent first and the root last
	pub fn ancestors_of(&self, unit_id: &str) -> &[Box<str>] {
		self.closures.get(unit_id).map(|c| c.parent_ids.as_slice()).unwrap_or_default()
	}

	pub fn descendants_of(&self, unit_id: &str) -> &[Box<str>] {
		self.closures.get(unit_id).map(|c| c.child_ids.as_slice()).unwrap_or_default()
	}

	pub fn root_of(&self, unit_id: &str) -> Option<&str> {
		self.closures.get(unit_id).map(HierarchyClosure::root_id)
	}

	pub fn parent_of(&self, unit_id: &str) -> Option<&str> {
		self.ancestors_of(unit_id).first().map(AsRef::as_ref)
	}

	pub fn depth_of(&self, unit_id: &str) -> usize {
		self.ancestors_of(unit_id).len()
	}

	/// The unit followed by all of its descendants
	pub fn subtree_of(&self, unit_id: &str) -> Vec<Box<str>> {
		std::iter::once(unit_id.into()).chain(self.descendants_of(unit_id).iter().cloned()).collect()
	}

	/// Whether `ancestor_id` is a strict ancestor of `unit_id`
	pub fn is_ancestor(&self, ancestor_id: &str, unit_id: &str) -> bool {
		self.ancestors_of(unit_id).iter().any(|a| a.as_ref() == ancestor_id)
	}

	/// Whether attaching `unit_id` below `new_parent_id` would close a cycle
	pub fn would_create_cycle(&self, unit_id: &str, new_parent_id: &str) -> bool {
		unit_id == new_parent_id || self.is_ancestor(unit_id, new_parent_id)
	}
}

/// Compute the closure of every unit in `units`.
///
/// Parents that are not part of `units` end the ancestor chain, so a unit
/// below a removed parent becomes a root of its own.
pub fn build_closures(units: &[Unit]) -> ClResult<Vec<HierarchyClosure>> {
	let by_id: HashMap<&str, &Unit> = units.iter().map(|u| (u.id.as_ref(), u)).collect();

	let mut closures = Vec::with_capacity(units.len());
	let mut children: HashMap<&str, Vec<Box<str>>> = HashMap::new();
	for unit in units {
		let mut parent_ids: Vec<Box<str>> = Vec::new();
		let mut seen: HashSet<&str> = HashSet::from([unit.id.as_ref()]);
		let mut next = unit.parent_id.as_deref();
		while let Some(parent_id) = next {
			let Some(parent) = by_id.get(parent_id) else { break };
			if !seen.insert(parent_id) {
				error!(unit_id = %unit.id, parent_id, "Cycle in unit tree");
				return Err(Error::Internal(format!("cycle in unit tree at {}", unit.id)));
			}
			children.entry(parent_id).or_default().push(unit.id.clone());
			parent_ids.push(parent_id.into());
			next = parent.parent_id.as_deref();
		}
		closures.push(HierarchyClosure {
			unit_id: unit.id.clone(),
			tenant_id: unit.owner_tenant_id.clone(),
			parent_ids,
			child_ids: Vec::new(),
		});
	}

	for closure in &mut closures {
		if let Some(mut child_ids) = children.remove(closure.unit_id.as_ref()) {
			child_ids.sort();
			closure.child_ids = child_ids;
		}
	}
	Ok(closures)
}

/// Rebuild the stored closure table from the live units
pub async fn rebuild(app: &App) -> ClResult<HierarchyIndex> {
	let units = app.adapter.list_units(&ListUnitOptions::default()).await?;
	let closures = build_closures(&units)?;
	app.adapter.replace_hierarchies(&closures).await?;
	debug!("Rebuilt hierarchy closure for {} units", closures.len());
	Ok(HierarchyIndex::from_closures(closures))
}

#[cfg(test)]
mod tests {
	use super::*;

	fn unit(id: &str, parent_id: Option<&str>) -> Unit {
		Unit {
			id: id.into(),
			parent_id: parent_id.map(Into::into),
			name: id.into(),
			canton: "SG".into(),
			owner_tenant_id: "t1".into(),
			deleted: false,
			created_at: Timestamp(0),
			modified_at: None,
		}
	}

	fn tree() -> HierarchyIndex {
		let units = vec![
			unit("ch", None),
			unit("sg", Some("ch")),
			unit("zh", Some("ch")),
			unit("gossau", Some("sg")),
			unit("andwil", Some("gossau")),
		];
		HierarchyIndex::from_closures(build_closures(&units).unwrap())
	}

	#[test]
	fn test_ancestors_nearest_first() {
		let index = tree();
		let ancestors: Vec<&str> = index.ancestors_of("andwil").iter().map(AsRef::as_ref).collect();
		assert_eq!(ancestors, vec!["gossau", "sg", "ch"]);
		assert_eq!(index.root_of("andwil"), Some("ch"));
		assert_eq!(index.root_of("ch"), Some("ch"));
		assert_eq!(index.parent_of("gossau"), Some("sg"));
		assert_eq!(index.depth_of("ch"), 0);
	}

	#[test]
	fn test_descendants() {
		let index = tree();
		let descendants: Vec<&str> = index.descendants_of("ch").iter().map(AsRef::as_ref).collect();
		assert_eq!(descendants, vec!["andwil", "gossau", "sg", "zh"]);
		assert!(index.descendants_of("zh").is_empty());
		assert!(index.descendants_of("unknown").is_empty());
		assert_eq!(index.subtree_of("gossau").len(), 2);
	}

	#[test]
	fn test_cycle_detection() {
		let index = tree();
		assert!(index.would_create_cycle("sg", "andwil"));
		assert!(index.would_create_cycle("sg", "sg"));
		assert!(!index.would_create_cycle("sg", "zh"));

		let units = vec![unit("a", Some("b")), unit("b", Some("a"))];
		assert!(build_closures(&units).is_err());
	}

	#[test]
	fn test_missing_parent_ends_chain() {
		let units = vec![unit("orphan", Some("deleted")), unit("child", Some("orphan"))];
		let index = HierarchyIndex::from_closures(build_closures(&units).unwrap());
		assert_eq!(index.root_of("child"), Some("orphan"));
		assert_eq!(index.root_of("orphan"), Some("orphan"));
	}
}

// vim: ts=4
