//! Counting circle merge orders.
//!
//! A merge order is an event-sourced aggregate whose stream is keyed by the
//! id of the successor circle. Commands in [`service`] load the aggregate,
//! append the resulting events at the loaded version and feed them through
//! the [`projection`]s before publishing them.

pub mod aggregate;
pub mod projection;
pub mod service;

pub use aggregate::{MergeOrder, MergeOrderState};
pub use projection::{replay_all, replay_stream};
pub use service::{
	MergeData, SuccessorData, activate_merger, delete_scheduled_merge, list_mergers,
	schedule_merge, update_scheduled_merge,
};

// vim: ts=4
