//! Periodic activation of due merge orders

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::merge;
use crate::prelude::*;
use basis_core::scheduler::{RetryPolicy, Task, TaskId};
use basis_types::basis_adapter::ListMergerOptions;

pub const ACTIVATION_TASK_KEY: &str = "merge.activate";

/// A failed run is retried after 1, 2 and 4 minutes before waiting for the
/// next cron occurrence
fn activation_retry() -> RetryPolicy {
	RetryPolicy::new(60, 240, 3)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActivationReport {
	pub activated: usize,
	pub failed: usize,
}

/// Activate every unmerged order whose `active_from` is not after `now`.
///
/// Orders are activated independently, a failing one is logged and counted
/// and does not stop the others.
pub async fn activate_due_mergers(app: &App, now: Timestamp) -> ClResult<ActivationReport> {
	let due = app
		.adapter
		.list_mergers(&ListMergerOptions {
			merged: Some(false),
			due_at: Some(now),
			..Default::default()
		})
		.await?;

	let mut report = ActivationReport::default();
	for merger in due {
		match merge::activate_merger(app, &merger.successor_id, now).await {
			Ok(true) => report.activated += 1,
			Ok(false) => (),
			Err(err) => {
				warn!(
					merger_id = %merger.id,
					successor_id = %merger.successor_id,
					"Merger activation failed: {}",
					err
				);
				report.failed += 1;
			}
		}
	}
	if report.activated > 0 || report.failed > 0 {
		info!(activated = report.activated, failed = report.failed, "Merge activation run");
	}
	Ok(report)
}

/// Recurring scheduler task driving [`activate_due_mergers`]
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct MergeActivationTask;

#[async_trait]
impl Task<App> for MergeActivationTask {
	fn kind() -> &'static str {
		"merge.activate"
	}

	fn kind_of(&self) -> &'static str {
		Self::kind()
	}

	fn build(_id: TaskId, _context: &str) -> ClResult<Arc<dyn Task<App>>> {
		Ok(Arc::new(MergeActivationTask))
	}

	fn serialize(&self) -> String {
		serde_json::to_string(self).unwrap_or_default()
	}

	async fn run(&self, app: &App) -> ClResult<()> {
		let report = activate_due_mergers(app, Timestamp::now()).await?;
		if report.failed > 0 {
			return Err(Error::Conflict(format!(
				"{} of {} due mergers failed to activate",
				report.failed,
				report.failed + report.activated
			)));
		}
		Ok(())
	}
}

/// Register the activation task and schedule it on the configured cron
pub async fn init(app: App) -> ClResult<()> {
	app.scheduler.register::<MergeActivationTask>()?;
	app.scheduler
		.task(Arc::new(MergeActivationTask))
		.key(ACTIVATION_TASK_KEY)
		.cron(&app.config.merge_activation_cron)?
		.with_retry(activation_retry())
		.schedule()
		.await?;
	info!(cron = %app.config.merge_activation_cron, "Merge activation scheduled");
	Ok(())
}

// vim: ts=4
