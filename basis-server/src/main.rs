//! Basis service: opens the SQLite store, keeps the merge activation task
//! scheduled and logs published domain events until interrupted.

#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![forbid(unsafe_code)]

use std::process::ExitCode;
use std::sync::Arc;

use basis::prelude::*;
use basis::{AppBuilder, BasisConfig, activation};
use basis_adapter_sqlite::BasisAdapterSqlite;
use basis_types::event::{ChannelEventSink, StoredEvent};

fn log_event(stored: &StoredEvent) {
	info!(
		seq = stored.seq,
		stream_id = %stored.stream_id,
		version = stored.version,
		kind = stored.event.kind(),
		"Domain event"
	);
}

/// Logs every published event. Events a lagging listener missed are read
/// back from the log.
fn spawn_event_logger(app: App, rx: flume::Receiver<StoredEvent>) {
	tokio::spawn(async move {
		let mut last_seq = None;
		while let Ok(stored) = rx.recv_async().await {
			if let Some(last) = last_seq
				&& stored.seq > last + 1
			{
				match app.adapter.list_events_after(last).await {
					Ok(missed) => {
						missed.iter().take_while(|e| e.seq < stored.seq).for_each(log_event);
					}
					Err(err) => warn!(after_seq = last, "Reading missed events failed: {}", err),
				}
			}
			if last_seq.is_none_or(|last| stored.seq > last) {
				log_event(&stored);
				last_seq = Some(stored.seq);
			}
		}
	});
}

async fn run() -> ClResult<()> {
	let config = BasisConfig::from_env()?;
	info!(db_dir = %config.db_dir.display(), cron = %config.merge_activation_cron, "Starting");

	let adapter = Arc::new(BasisAdapterSqlite::new(&config.db_dir).await?);
	let events = Arc::new(ChannelEventSink::new(config.event_channel_capacity));
	let rx = events.subscribe()?;

	let mut builder = AppBuilder::new(config);
	builder
		.adapter(adapter)
		.event_sink(events)
		.on_init(move |app| async move {
			spawn_event_logger(app, rx);
			Ok(())
		})
		.on_init(activation::init);
	builder.run().await
}

#[tokio::main]
async fn main() -> ExitCode {
	tracing_subscriber::fmt()
		.with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
		.with_target(false)
		.init();

	match run().await {
		Ok(()) => ExitCode::SUCCESS,
		Err(err) => {
			error!("FATAL: {}", err);
			ExitCode::FAILURE
		}
	}
}

// vim: ts=4
