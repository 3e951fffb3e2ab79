//! Domain events emitted by the merge orchestrator and the sink they are
//! published to.
//!
//! Events are the source of truth for merge orders. Every consumer, including
//! the projections inside this workspace, must be idempotent: delivery is
//! at-least-once and the log may be replayed at any time.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::sync::Mutex;

use crate::{basis_adapter::CountingCircleData, prelude::*};

/// Schedule data carried by `MergeScheduled` and `MergeScheduleUpdated`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeSchedule {
	pub merger_id: Box<str>,
	pub successor: CountingCircleData,
	pub source_ids: Vec<Box<str>>,
	pub copy_from_id: Box<str>,
	pub active_from: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum BasisEvent {
	#[serde(rename_all = "camelCase")]
	MergeScheduled { schedule: MergeSchedule },
	#[serde(rename_all = "camelCase")]
	MergeScheduleUpdated { schedule: MergeSchedule },
	#[serde(rename_all = "camelCase")]
	MergeScheduleDeleted { merger_id: Box<str>, successor_id: Box<str> },
	#[serde(rename_all = "camelCase")]
	MergeActivated {
		merger_id: Box<str>,
		successor_id: Box<str>,
		source_ids: Vec<Box<str>>,
		activated_at: Timestamp,
	},
	#[serde(rename_all = "camelCase")]
	CountingCircleMerged {
		merger_id: Box<str>,
		counting_circle_id: Box<str>,
		merge_target_id: Box<str>,
	},
}

impl BasisEvent {
	pub fn kind(&self) -> &'static str {
		match self {
			BasisEvent::MergeScheduled { .. } => "MergeScheduled",
			BasisEvent::MergeScheduleUpdated { .. } => "MergeScheduleUpdated",
			BasisEvent::MergeScheduleDeleted { .. } => "MergeScheduleDeleted",
			BasisEvent::MergeActivated { .. } => "MergeActivated",
			BasisEvent::CountingCircleMerged { .. } => "CountingCircleMerged",
		}
	}
}

/// An event as persisted in the log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredEvent {
	/// Global, gap-free ordering over all streams
	pub seq: u64,
	pub stream_id: Box<str>,
	/// 1-based position inside the stream
	pub version: u64,
	pub created_at: Timestamp,
	pub event: BasisEvent,
}

#[async_trait]
pub trait EventSink: Debug + Send + Sync {
	async fn publish(&self, events: &[StoredEvent]) -> ClResult<()>;
}

// ChannelEventSink
//******************
/// Publishes events to in-process listeners, each over its own bounded
/// channel.
///
/// Publishing never blocks the writer. A listener whose channel is full misses
/// the event and sees a gap in `seq`; it catches up with
/// `BasisAdapter::list_events_after`. Listeners that dropped their receiver
/// are removed on the next publish.
#[derive(Debug)]
pub struct ChannelEventSink {
	capacity: usize,
	subscribers: Mutex<Vec<flume::Sender<StoredEvent>>>,
}

impl ChannelEventSink {
	pub fn new(capacity: usize) -> Self {
		Self { capacity, subscribers: Mutex::new(Vec::new()) }
	}

	/// Every subscriber receives every event published after it subscribed
	pub fn subscribe(&self) -> ClResult<flume::Receiver<StoredEvent>> {
		let (tx, rx) = flume::bounded(self.capacity);
		lock!(self.subscribers, "event subscribers")?.push(tx);
		Ok(rx)
	}
}

#[async_trait]
impl EventSink for ChannelEventSink {
	async fn publish(&self, events: &[StoredEvent]) -> ClResult<()> {
		let mut subscribers = lock!(self.subscribers, "event subscribers")?;
		subscribers.retain(|tx| {
			for event in events {
				match tx.try_send(event.clone()) {
					Ok(()) => (),
					Err(flume::TrySendError::Full(_)) => {
						warn!(seq = event.seq, kind = event.event.kind(), "Event listener lagging");
					}
					Err(flume::TrySendError::Disconnected(_)) => {
						debug!("Event listener disconnected");
						return false;
					}
				}
			}
			true
		});
		Ok(())
	}
}


// vim: ts=4
