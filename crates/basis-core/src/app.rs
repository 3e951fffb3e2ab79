//! App state type and builder

use std::{pin::Pin, sync::Arc};

use crate::config::BasisConfig;
use crate::prelude::*;
use crate::scheduler;

use basis_types::basis_adapter::BasisAdapter;
use basis_types::event::{ChannelEventSink, EventSink};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub struct AppState {
	pub scheduler: Arc<scheduler::Scheduler<App>>,
	pub config: BasisConfig,
	pub adapter: Arc<dyn BasisAdapter>,
	pub event_sink: Arc<dyn EventSink>,
	/// Serializes writes that change the unit tree, its closure or the
	/// inherited assignments derived from it
	pub structure_lock: tokio::sync::Mutex<()>,
}

pub type App = Arc<AppState>;

/// Type alias for async initialization callbacks
type InitCallback =
	Box<dyn FnOnce(App) -> Pin<Box<dyn Future<Output = ClResult<()>> + Send>> + Send>;

pub struct AppBuilder {
	config: BasisConfig,
	adapter: Option<Arc<dyn BasisAdapter>>,
	event_sink: Option<Arc<dyn EventSink>>,
	on_init: Vec<InitCallback>,
}

impl AppBuilder {
	pub fn new(config: BasisConfig) -> Self {
		AppBuilder { config, adapter: None, event_sink: None, on_init: Vec::new() }
	}

	pub fn adapter(&mut self, adapter: Arc<dyn BasisAdapter>) -> &mut Self {
		self.adapter = Some(adapter);
		self
	}

	/// Defaults to a `ChannelEventSink` sized by the config
	pub fn event_sink(&mut self, event_sink: Arc<dyn EventSink>) -> &mut Self {
		self.event_sink = Some(event_sink);
		self
	}

	/// Register an async initialization callback that runs after App is created
	/// but before the scheduler starts. Use this to register and schedule tasks.
	pub fn on_init<F, Fut>(&mut self, f: F) -> &mut Self
	where
		F: FnOnce(App) -> Fut + Send + 'static,
		Fut: Future<Output = ClResult<()>> + Send + 'static,
	{
		self.on_init.push(Box::new(move |app| Box::pin(f(app))));
		self
	}

	/// Create the app and run the init callbacks, without starting the scheduler
	pub async fn build(self) -> ClResult<App> {
		let Some(adapter) = self.adapter else {
			error!("FATAL: No basis adapter configured");
			return Err(Error::Internal("No basis adapter configured".to_string()));
		};
		let event_sink = self.event_sink.unwrap_or_else(|| {
			Arc::new(ChannelEventSink::new(self.config.event_channel_capacity))
		});

		let task_store: Arc<dyn scheduler::TaskStore<App>> =
			scheduler::AdapterTaskStore::new(adapter.clone());

		let app: App = Arc::new(AppState {
			scheduler: scheduler::Scheduler::new(task_store),
			config: self.config,
			adapter,
			event_sink,
			structure_lock: tokio::sync::Mutex::new(()),
		});

		for init in self.on_init {
			init(app.clone()).await?;
		}
		Ok(app)
	}

	/// Build the app, start the scheduler and serve until interrupted
	pub async fn run(self) -> ClResult<()> {
		info!("basis V{}", VERSION);
		let app = self.build().await?;
		app.scheduler.start(app.clone());
		info!("Scheduler started, waiting for shutdown signal");

		tokio::signal::ctrl_c().await.map_err(|e| {
			error!("Failed to listen for shutdown signal: {}", e);
			Error::Internal("signal handler failed".into())
		})?;
		info!("Shutting down");
		Ok(())
	}
}

// vim: ts=4
