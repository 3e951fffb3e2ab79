//! Merge order aggregate.
//!
//! State is rebuilt by folding the events of the order's stream. Commands
//! validate against that state and return the events to append; they never
//! touch storage.

use std::collections::HashSet;

use itertools::Itertools;

use crate::prelude::*;
use basis_types::event::{BasisEvent, MergeSchedule, StoredEvent};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MergeOrderState {
	#[default]
	Absent,
	Scheduled,
	Activated,
	Deleted,
}

#[derive(Debug, Clone, Default)]
pub struct MergeOrder {
	pub successor_id: Box<str>,
	/// Version of the last applied event, 0 for an empty stream
	pub version: u64,
	pub state: MergeOrderState,
	pub schedule: Option<MergeSchedule>,
	pub activated_at: Option<Timestamp>,
}

/// Source ids: at least two, unique, containing the copy-from id
pub fn validate_source_ids(source_ids: &[Box<str>], copy_from_id: &str) -> ClResult<()> {
	if source_ids.len() < 2 {
		return Err(Error::ValidationError("a merge needs at least two source ids".into()));
	}
	let mut seen = HashSet::new();
	if let Some(dup) = source_ids.iter().find(|&id| !seen.insert(id.as_ref())) {
		return Err(Error::ValidationError(format!("duplicate source id: {}", dup)));
	}
	if !seen.contains(copy_from_id) {
		return Err(Error::ValidationError(format!(
			"copy-from id {} is not among the source ids",
			copy_from_id
		)));
	}
	Ok(())
}

pub fn validate_schedule(schedule: &MergeSchedule) -> ClResult<()> {
	validate_source_ids(&schedule.source_ids, &schedule.copy_from_id)?;
	if schedule.source_ids.contains(&schedule.successor.id) {
		return Err(Error::ValidationError("the successor cannot be one of its sources".into()));
	}
	Ok(())
}

/// `MergeActivated` followed by one `CountingCircleMerged` per source in
/// ascending id order
fn activation_events(schedule: &MergeSchedule, now: Timestamp) -> Vec<BasisEvent> {
	let source_ids: Vec<Box<str>> = schedule.source_ids.iter().cloned().sorted().collect();

	let mut events = Vec::with_capacity(source_ids.len() + 1);
	events.push(BasisEvent::MergeActivated {
		merger_id: schedule.merger_id.clone(),
		successor_id: schedule.successor.id.clone(),
		source_ids: source_ids.clone(),
		activated_at: now,
	});
	events.extend(source_ids.into_iter().map(|counting_circle_id| {
		BasisEvent::CountingCircleMerged {
			merger_id: schedule.merger_id.clone(),
			counting_circle_id,
			merge_target_id: schedule.successor.id.clone(),
		}
	}));
	events
}

impl MergeOrder {
	pub fn new(successor_id: impl Into<Box<str>>) -> Self {
		Self { successor_id: successor_id.into(), ..Default::default() }
	}

	pub fn from_events<'a>(
		successor_id: impl Into<Box<str>>,
		events: impl IntoIterator<Item = &'a StoredEvent>,
	) -> Self {
		let mut order = Self::new(successor_id);
		for stored in events {
			order.apply(&stored.event);
			order.version = stored.version;
		}
		order
	}

	pub fn apply(&mut self, event: &BasisEvent) {
		match event {
			BasisEvent::MergeScheduled { schedule } | BasisEvent::MergeScheduleUpdated { schedule } => {
				self.state = MergeOrderState::Scheduled;
				self.schedule = Some(schedule.clone());
			}
			BasisEvent::MergeScheduleDeleted { .. } => {
				self.state = MergeOrderState::Deleted;
			}
			BasisEvent::MergeActivated { activated_at, .. } => {
				self.state = MergeOrderState::Activated;
				self.activated_at = Some(*activated_at);
			}
			BasisEvent::CountingCircleMerged { .. } => (),
		}
	}

	pub fn merger_id(&self) -> Option<&str> {
		self.schedule.as_ref().map(|s| s.merger_id.as_ref())
	}

	/// Fail unless the order is scheduled and still editable
	pub fn check_pending(&self) -> ClResult<&MergeSchedule> {
		match (self.state, self.schedule.as_ref()) {
			(MergeOrderState::Scheduled, Some(schedule)) => Ok(schedule),
			(MergeOrderState::Activated, _) => {
				Err(Error::Conflict("the merger is already active".into()))
			}
			_ => Err(Error::NotFound),
		}
	}

	pub fn schedule(&self, schedule: MergeSchedule, now: Timestamp) -> ClResult<Vec<BasisEvent>> {
		if self.state != MergeOrderState::Absent {
			return Err(Error::Conflict(format!(
				"a merger already exists for successor {}",
				self.successor_id
			)));
		}
		if schedule.successor.id != self.successor_id {
			return Err(Error::Internal("schedule does not belong to this stream".into()));
		}
		validate_schedule(&schedule)?;

		let mut events = Vec::new();
		if schedule.active_from <= now {
			events.extend(activation_events(&schedule, now));
		}
		events.insert(0, BasisEvent::MergeScheduled { schedule });
		Ok(events)
	}

	pub fn update(&self, schedule: MergeSchedule, now: Timestamp) -> ClResult<Vec<BasisEvent>> {
		let current = self.check_pending()?;
		if schedule.merger_id != current.merger_id || schedule.successor.id != self.successor_id {
			return Err(Error::ValidationError("merger and successor ids cannot change".into()));
		}
		validate_schedule(&schedule)?;

		let mut events = Vec::new();
		if schedule.active_from <= now {
			events.extend(activation_events(&schedule, now));
		}
		events.insert(0, BasisEvent::MergeScheduleUpdated { schedule });
		Ok(events)
	}

	pub fn delete(&self) -> ClResult<Vec<BasisEvent>> {
		let schedule = self.check_pending()?;
		Ok(vec![BasisEvent::MergeScheduleDeleted {
			merger_id: schedule.merger_id.clone(),
			successor_id: self.successor_id.clone(),
		}])
	}

	/// Activation events, or none if the order is already activated
	pub fn activate(&self, now: Timestamp) -> ClResult<Vec<BasisEvent>> {
		if self.state == MergeOrderState::Activated {
			return Ok(Vec::new());
		}
		let schedule = self.check_pending()?;
		if schedule.active_from > now {
			return Err(Error::Conflict(format!(
				"the merger is not due before {}",
				schedule.active_from
			)));
		}
		Ok(activation_events(schedule, now))
	}
}


// vim: ts=4
