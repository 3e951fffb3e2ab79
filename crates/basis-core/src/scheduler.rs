//! Background tasks on cron schedules.
//!
//! Tasks are persisted through the basis adapter, so a keyed recurring task
//! survives restarts and is stored once. A failing run is retried with
//! exponential backoff when the task carries a `RetryPolicy`; once the retries
//! are used up a recurring task waits for its next cron occurrence.

use async_trait::async_trait;
use std::{
	collections::{BTreeMap, HashMap},
	fmt::Debug,
	str::FromStr,
	sync::{Arc, Mutex, RwLock},
};

use chrono::{DateTime, Utc};
use croner::Cron;
use itertools::Itertools;

use crate::prelude::*;
use basis_types::basis_adapter::{self, BasisAdapter, TaskPatch};

pub type TaskId = u64;

// CronSchedule //
//**************//
/// Parsed cron expression, kept together with its source text for storage
#[derive(Debug, Clone)]
pub struct CronSchedule {
	expr: Box<str>,
	cron: Cron,
}

impl CronSchedule {
	/// Five fields: minute hour day month weekday
	pub fn parse(expr: &str) -> ClResult<Self> {
		let cron = Cron::from_str(expr)
			.map_err(|e| Error::ValidationError(format!("invalid cron expression: {}", e)))?;
		Ok(Self { expr: expr.into(), cron })
	}

	pub fn next_after(&self, after: Timestamp) -> ClResult<Timestamp> {
		let from = DateTime::<Utc>::from_timestamp(after.0, 0).unwrap_or_else(Utc::now);
		match self.cron.find_next_occurrence(&from, false) {
			Ok(next) => Ok(Timestamp(next.timestamp())),
			Err(e) => {
				error!(cron = %self.expr, "No next cron occurrence: {}", e);
				Err(Error::ValidationError(format!("cron expression has no next run: {}", e)))
			}
		}
	}

	pub fn as_str(&self) -> &str {
		&self.expr
	}
}

impl PartialEq for CronSchedule {
	fn eq(&self, other: &Self) -> bool {
		self.expr == other.expr
	}
}

impl Eq for CronSchedule {}

// RetryPolicy //
//*************//
/// Retries a failed run after `min * 2^attempt` seconds, capped at `max`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
	min_wait: u64,
	max_wait: u64,
	times: u16,
}

impl RetryPolicy {
	pub fn new(min_wait: u64, max_wait: u64, times: u16) -> Self {
		Self { min_wait, max_wait, times }
	}

	/// Seconds to wait before retry number `attempt` (0-based), or `None`
	/// once the policy is exhausted
	pub fn backoff(&self, attempt: u16) -> Option<u64> {
		if attempt >= self.times {
			return None;
		}
		let factor = 1u64.checked_shl(u32::from(attempt)).unwrap_or(u64::MAX);
		Some(self.min_wait.saturating_mul(factor).min(self.max_wait))
	}

	/// Stored form: `attempt,min,max,times`
	fn encode(&self, attempt: u16) -> String {
		format!("{},{},{},{}", attempt, self.min_wait, self.max_wait, self.times)
	}

	fn decode(stored: &str) -> ClResult<(u16, Self)> {
		let invalid = || Error::Internal(format!("invalid stored retry policy: {}", stored));
		let (attempt, min, max, times) =
			stored.split(',').map(str::trim).collect_tuple().ok_or_else(invalid)?;
		Ok((
			attempt.parse().map_err(|_| invalid())?,
			RetryPolicy {
				min_wait: min.parse().map_err(|_| invalid())?,
				max_wait: max.parse().map_err(|_| invalid())?,
				times: times.parse().map_err(|_| invalid())?,
			},
		))
	}
}

// Task //
//******//
#[async_trait]
pub trait Task<S: Clone>: Send + Sync + Debug {
	fn kind() -> &'static str
	where
		Self: Sized;
	/// Rebuild a persisted task from its serialized input
	fn build(id: TaskId, input: &str) -> ClResult<Arc<dyn Task<S>>>
	where
		Self: Sized;
	fn serialize(&self) -> String;
	async fn run(&self, state: &S) -> ClResult<()>;

	fn kind_of(&self) -> &'static str;
}

/// A task with its schedule
#[derive(Debug, Clone)]
pub struct ScheduledTask<S: Clone> {
	pub task: Arc<dyn Task<S>>,
	pub next_at: Option<Timestamp>,
	pub cron: Option<CronSchedule>,
	pub retry: Option<RetryPolicy>,
	attempt: u16,
}

impl<S: Clone> ScheduledTask<S> {
	fn patch(&self) -> TaskPatch {
		TaskPatch {
			input: Patch::Value(self.task.serialize()),
			next_at: self.next_at.map_or(Patch::Null, Patch::Value),
			retry: match self.retry {
				Some(ref retry) => Patch::Value(retry.encode(self.attempt)),
				None => Patch::Null,
			},
			cron: match self.cron {
				Some(ref cron) => Patch::Value(cron.as_str().to_string()),
				None => Patch::Null,
			},
		}
	}
}

// TaskStore //
//***********//
/// Task row as loaded back from storage
#[derive(Debug, Clone)]
pub struct StoredTask {
	pub id: TaskId,
	pub kind: Box<str>,
	pub pending: bool,
	pub input: Box<str>,
	pub next_at: Option<Timestamp>,
	pub retry: Option<Box<str>>,
	pub cron: Option<Box<str>>,
}

impl From<basis_adapter::Task> for StoredTask {
	fn from(t: basis_adapter::Task) -> Self {
		StoredTask {
			id: t.task_id,
			kind: t.kind,
			pending: t.status == 'P',
			input: t.input,
			next_at: t.next_at,
			retry: t.retry,
			cron: t.cron,
		}
	}
}

#[async_trait]
pub trait TaskStore<S: Clone>: Send + Sync {
	async fn add(&self, task: &ScheduledTask<S>, key: Option<&str>) -> ClResult<TaskId>;
	async fn update(&self, id: TaskId, task: &ScheduledTask<S>) -> ClResult<()>;
	async fn finished(&self, id: TaskId) -> ClResult<()>;
	/// Record a failed run; `next_at` is set when the task runs again
	async fn failed(&self, id: TaskId, error: &str, next_at: Option<Timestamp>) -> ClResult<()>;
	async fn find_by_key(&self, key: &str) -> ClResult<Option<StoredTask>>;
	async fn load(&self) -> ClResult<Vec<StoredTask>>;
}

/// `TaskStore` on top of the basis adapter's task table
pub struct AdapterTaskStore {
	adapter: Arc<dyn BasisAdapter>,
}

impl AdapterTaskStore {
	pub fn new(adapter: Arc<dyn BasisAdapter>) -> Arc<Self> {
		Arc::new(Self { adapter })
	}
}

#[async_trait]
impl<S: Clone> TaskStore<S> for AdapterTaskStore {
	async fn add(&self, task: &ScheduledTask<S>, key: Option<&str>) -> ClResult<TaskId> {
		let id = self.adapter.create_task(task.task.kind_of(), key, &task.task.serialize()).await?;
		self.adapter.update_task(id, &task.patch()).await?;
		Ok(id)
	}

	async fn update(&self, id: TaskId, task: &ScheduledTask<S>) -> ClResult<()> {
		self.adapter.update_task(id, &task.patch()).await
	}

	async fn finished(&self, id: TaskId) -> ClResult<()> {
		self.adapter.update_task_finished(id, "").await
	}

	async fn failed(&self, id: TaskId, error: &str, next_at: Option<Timestamp>) -> ClResult<()> {
		self.adapter.update_task_error(id, error, next_at).await
	}

	async fn find_by_key(&self, key: &str) -> ClResult<Option<StoredTask>> {
		Ok(self.adapter.find_task_by_key(key).await?.map(StoredTask::from))
	}

	async fn load(&self) -> ClResult<Vec<StoredTask>> {
		Ok(self.adapter.list_tasks().await?.into_iter().map(StoredTask::from).collect())
	}
}

// TaskSchedulerBuilder //
//**********************//
pub struct TaskSchedulerBuilder<'a, S: Clone> {
	scheduler: &'a Scheduler<S>,
	task: Arc<dyn Task<S>>,
	key: Option<String>,
	next_at: Option<Timestamp>,
	cron: Option<CronSchedule>,
	retry: Option<RetryPolicy>,
}

impl<S: Clone + Send + Sync + 'static> TaskSchedulerBuilder<'_, S> {
	/// Scheduling again under the same key replaces the stored task
	pub fn key(mut self, key: impl Into<String>) -> Self {
		self.key = Some(key.into());
		self
	}

	/// Run on every occurrence of `expr`, starting with the next one
	pub fn cron(mut self, expr: &str) -> ClResult<Self> {
		let cron = CronSchedule::parse(expr)?;
		self.next_at = Some(cron.next_after(Timestamp::now())?);
		self.cron = Some(cron);
		Ok(self)
	}

	pub fn with_retry(mut self, policy: RetryPolicy) -> Self {
		self.retry = Some(policy);
		self
	}

	pub async fn schedule(self) -> ClResult<TaskId> {
		let scheduled = ScheduledTask {
			task: self.task,
			next_at: self.next_at,
			cron: self.cron,
			retry: self.retry,
			attempt: 0,
		};
		self.scheduler.schedule(scheduled, self.key.as_deref()).await
	}
}

// Scheduler //
//***********//
type TaskBuilder<S> = dyn Fn(TaskId, &str) -> ClResult<Arc<dyn Task<S>>> + Send + Sync;

#[derive(Clone)]
pub struct Scheduler<S: Clone> {
	builders: Arc<RwLock<HashMap<&'static str, Box<TaskBuilder<S>>>>>,
	store: Arc<dyn TaskStore<S>>,
	/// Waiting tasks ordered by due time
	queue: Arc<Mutex<BTreeMap<(Timestamp, TaskId), ScheduledTask<S>>>>,
	running: Arc<Mutex<HashMap<TaskId, ScheduledTask<S>>>>,
	tx_done: flume::Sender<TaskId>,
	rx_done: flume::Receiver<TaskId>,
	wakeup: Arc<tokio::sync::Notify>,
}

impl<S: Clone + Send + Sync + 'static> Scheduler<S> {
	pub fn new(store: Arc<dyn TaskStore<S>>) -> Arc<Self> {
		let (tx_done, rx_done) = flume::unbounded();
		Arc::new(Self {
			builders: Arc::new(RwLock::new(HashMap::new())),
			store,
			queue: Arc::new(Mutex::new(BTreeMap::new())),
			running: Arc::new(Mutex::new(HashMap::new())),
			tx_done,
			rx_done,
			wakeup: Arc::new(tokio::sync::Notify::new()),
		})
	}

	pub fn register<T: Task<S>>(&self) -> ClResult<&Self> {
		info!(kind = T::kind(), "Registering task type");
		let mut builders =
			self.builders.write().map_err(|_| Error::Internal("task builders poisoned".into()))?;
		builders.insert(T::kind(), Box::new(|id, input: &str| T::build(id, input)));
		Ok(self)
	}

	pub fn task(&self, task: Arc<dyn Task<S>>) -> TaskSchedulerBuilder<'_, S> {
		TaskSchedulerBuilder {
			scheduler: self,
			task,
			key: None,
			next_at: None,
			cron: None,
			retry: None,
		}
	}

	/// Load persisted tasks and start running due ones
	pub fn start(&self, state: S) {
		let scheduler = self.clone();
		let rx_done = self.rx_done.clone();
		tokio::spawn(async move {
			while let Ok(id) = rx_done.recv_async().await {
				if let Err(e) = scheduler.completed(id).await {
					error!(task_id = id, "Failed to complete task: {}", e);
				}
			}
		});

		let scheduler = self.clone();
		tokio::spawn(async move {
			loop {
				let next = scheduler.spawn_due(&state).unwrap_or_else(|e| {
					error!("Scheduler loop failed: {}", e);
					Some(Timestamp::from_now(1))
				});
				let Some(next) = next else {
					scheduler.wakeup.notified().await;
					continue;
				};
				let secs = u64::try_from(next.0 - Timestamp::now().0).unwrap_or_default();
				tokio::select! {
					() = tokio::time::sleep(tokio::time::Duration::from_secs(secs)) => (),
					() = scheduler.wakeup.notified() => (),
				}
			}
		});

		let scheduler = self.clone();
		tokio::spawn(async move {
			if let Err(e) = scheduler.load().await {
				error!("Failed to load persisted tasks: {}", e);
			}
		});
	}

	async fn schedule(&self, task: ScheduledTask<S>, key: Option<&str>) -> ClResult<TaskId> {
		if let Some(key) = key
			&& let Some(stored) = self.store.find_by_key(key).await?
		{
			debug!(key, task_id = stored.id, "Replacing keyed task");
			self.store.update(stored.id, &task).await?;
			self.enqueue(stored.id, task)?;
			return Ok(stored.id);
		}
		let id = self.store.add(&task, key).await?;
		self.enqueue(id, task)?;
		Ok(id)
	}

	fn enqueue(&self, id: TaskId, task: ScheduledTask<S>) -> ClResult<()> {
		// A running task is requeued with the new schedule once it completes
		if let Some(current) = lock!(self.running, "running tasks")?.get_mut(&id) {
			*current = task;
			return Ok(());
		}
		let mut queue = lock!(self.queue, "task queue")?;
		queue.retain(|&(_, queued), _| queued != id);
		let due = task.next_at.unwrap_or(Timestamp(0));
		debug!(task_id = id, %due, "Task queued");
		queue.insert((due, id), task);
		drop(queue);
		self.wakeup.notify_one();
		Ok(())
	}

	/// Spawn every due task, returns when the next one is due
	fn spawn_due(&self, state: &S) -> ClResult<Option<Timestamp>> {
		let mut queue = lock!(self.queue, "task queue")?;
		let now = Timestamp::now();
		while let Some(entry) = queue.first_entry() {
			let (due, id) = *entry.key();
			if due > now {
				return Ok(Some(due));
			}
			let task = entry.remove();
			lock!(self.running, "running tasks")?.insert(id, task.clone());
			self.spawn_run(state.clone(), id, task);
		}
		Ok(None)
	}

	fn spawn_run(&self, state: S, id: TaskId, task: ScheduledTask<S>) {
		let scheduler = self.clone();
		tokio::spawn(async move {
			match task.task.run(&state).await {
				Ok(()) => {
					debug!(task_id = id, kind = task.task.kind_of(), "Task done");
					scheduler.tx_done.send(id).unwrap_or(());
				}
				Err(e) => {
					if let Err(err) = scheduler.run_failed(id, task, &e).await {
						error!(task_id = id, "Failed to handle task failure: {}", err);
					}
				}
			}
		});
	}

	async fn run_failed(&self, id: TaskId, task: ScheduledTask<S>, e: &Error) -> ClResult<()> {
		let kind = task.task.kind_of();
		if let Some(wait) = task.retry.as_ref().and_then(|r| r.backoff(task.attempt)) {
			let next_at = Timestamp::from_now(i64::try_from(wait).unwrap_or(i64::MAX));
			warn!(
				task_id = id,
				kind,
				attempt = task.attempt + 1,
				wait,
				"Task failed, retrying: {}",
				e
			);
			self.store.failed(id, &e.to_string(), Some(next_at)).await?;
			lock!(self.running, "running tasks")?.remove(&id);
			let attempt = task.attempt + 1;
			self.enqueue(id, ScheduledTask { next_at: Some(next_at), attempt, ..task })
		} else if task.cron.is_some() {
			error!(task_id = id, kind, "Recurring task failed: {}", e);
			self.tx_done.send(id).map_err(|_| Error::Internal("scheduler stopped".into()))
		} else {
			error!(task_id = id, kind, "Task failed: {}", e);
			self.store.failed(id, &e.to_string(), None).await?;
			lock!(self.running, "running tasks")?.remove(&id);
			Ok(())
		}
	}

	/// A run ended for good: recurring tasks go back to the queue
	async fn completed(&self, id: TaskId) -> ClResult<()> {
		let Some(task) = lock!(self.running, "running tasks")?.remove(&id) else {
			warn!(task_id = id, "Completed task was not running");
			return Ok(());
		};
		let Some(cron) = task.cron.as_ref() else {
			return self.store.finished(id).await;
		};
		let next_at = cron.next_after(Timestamp::now())?;
		info!(task_id = id, %next_at, "Recurring task rescheduled");
		let task = ScheduledTask { next_at: Some(next_at), attempt: 0, ..task };
		self.store.update(id, &task).await?;
		self.enqueue(id, task)
	}

	async fn load(&self) -> ClResult<()> {
		let stored = self.store.load().await?;
		debug!(tasks = stored.len(), "Loaded tasks");
		for row in stored.into_iter().filter(|t| t.pending) {
			let task = {
				let builders = self
					.builders
					.read()
					.map_err(|_| Error::Internal("task builders poisoned".into()))?;
				let Some(build) = builders.get(row.kind.as_ref()) else {
					warn!(task_id = row.id, kind = %row.kind, "No builder for stored task");
					continue;
				};
				build(row.id, &row.input)?
			};
			let stored_retry = row.retry.as_deref().map(RetryPolicy::decode).transpose()?;
			let (attempt, retry) = match stored_retry {
				Some((attempt, policy)) => (attempt, Some(policy)),
				None => (0, None),
			};
			let cron = row.cron.as_deref().map(CronSchedule::parse).transpose()?;
			let next_at = row.next_at;
			self.enqueue(row.id, ScheduledTask { task, next_at, cron, retry, attempt })?;
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::time::Duration;

	type State = Arc<Mutex<Vec<u8>>>;

	/// Keeps rows in memory, enough for key lookups
	#[derive(Default)]
	struct MemoryStore {
		rows: Mutex<Vec<(Option<String>, StoredTask)>>,
	}

	#[async_trait]
	impl TaskStore<State> for MemoryStore {
		async fn add(&self, task: &ScheduledTask<State>, key: Option<&str>) -> ClResult<TaskId> {
			let mut rows = self.rows.lock().unwrap();
			let id = rows.len() as TaskId + 1;
			let row = StoredTask {
				id,
				kind: task.task.kind_of().into(),
				pending: true,
				input: task.task.serialize().into(),
				next_at: task.next_at,
				retry: task.retry.as_ref().map(|r| r.encode(0).into()),
				cron: task.cron.as_ref().map(|c| c.as_str().into()),
			};
			rows.push((key.map(Into::into), row));
			Ok(id)
		}

		async fn update(&self, id: TaskId, task: &ScheduledTask<State>) -> ClResult<()> {
			for (_, row) in self.rows.lock().unwrap().iter_mut().filter(|(_, r)| r.id == id) {
				row.next_at = task.next_at;
				row.cron = task.cron.as_ref().map(|c| c.as_str().into());
			}
			Ok(())
		}

		async fn finished(&self, id: TaskId) -> ClResult<()> {
			for (_, row) in self.rows.lock().unwrap().iter_mut().filter(|(_, r)| r.id == id) {
				row.pending = false;
			}
			Ok(())
		}

		async fn failed(&self, _id: TaskId, _err: &str, _at: Option<Timestamp>) -> ClResult<()> {
			Ok(())
		}

		async fn find_by_key(&self, key: &str) -> ClResult<Option<StoredTask>> {
			let rows = self.rows.lock().unwrap();
			Ok(rows.iter().find(|(k, _)| k.as_deref() == Some(key)).map(|(_, row)| row.clone()))
		}

		async fn load(&self) -> ClResult<Vec<StoredTask>> {
			Ok(self.rows.lock().unwrap().iter().map(|(_, row)| row.clone()).collect())
		}
	}

	#[derive(Debug)]
	struct PushTask {
		num: u8,
		failures: Mutex<u8>,
	}

	impl PushTask {
		fn new(num: u8, failures: u8) -> Arc<Self> {
			Arc::new(Self { num, failures: Mutex::new(failures) })
		}
	}

	#[async_trait]
	impl Task<State> for PushTask {
		fn kind() -> &'static str {
			"push"
		}

		fn build(_id: TaskId, input: &str) -> ClResult<Arc<dyn Task<State>>> {
			let num = input.parse().map_err(|_| Error::Internal("bad push input".into()))?;
			Ok(PushTask::new(num, 0))
		}

		fn serialize(&self) -> String {
			self.num.to_string()
		}

		fn kind_of(&self) -> &'static str {
			Self::kind()
		}

		async fn run(&self, state: &State) -> ClResult<()> {
			{
				let mut failures = self.failures.lock().unwrap();
				if *failures > 0 {
					*failures -= 1;
					return Err(Error::Internal(format!("push {} failed", self.num)));
				}
			}
			state.lock().unwrap().push(self.num);
			Ok(())
		}
	}

	fn new_scheduler() -> (Arc<Scheduler<State>>, Arc<MemoryStore>, State) {
		let _ = tracing_subscriber::fmt().with_test_writer().try_init();
		let store = Arc::new(MemoryStore::default());
		let state: State = Arc::new(Mutex::new(Vec::new()));
		let scheduler = Scheduler::new(store.clone());
		scheduler.start(state.clone());
		(scheduler, store, state)
	}

	/// Builder for a task due at `next_at` instead of its cron time
	fn due_at(
		scheduler: &Scheduler<State>,
		task: Arc<PushTask>,
		next_at: Timestamp,
	) -> TaskSchedulerBuilder<'_, State> {
		let mut builder = scheduler.task(task);
		builder.next_at = Some(next_at);
		builder
	}

	#[tokio::test]
	async fn test_tasks_run_in_due_order() {
		let (scheduler, _store, state) = new_scheduler();

		due_at(&scheduler, PushTask::new(2, 0), Timestamp::from_now(1)).schedule().await.unwrap();
		due_at(&scheduler, PushTask::new(1, 0), Timestamp(0)).schedule().await.unwrap();

		tokio::time::sleep(Duration::from_millis(2500)).await;
		assert_eq!(*state.lock().unwrap(), vec![1, 2]);
	}

	#[tokio::test]
	async fn test_failed_cron_run_is_retried_before_next_occurrence() {
		let (scheduler, store, state) = new_scheduler();

		let mut builder = scheduler
			.task(PushTask::new(7, 1))
			.cron("0 0 1 1 *")
			.unwrap()
			.with_retry(RetryPolicy::new(1, 60, 3));
		builder.next_at = Some(Timestamp(0));
		let id = builder.schedule().await.unwrap();

		tokio::time::sleep(Duration::from_millis(2500)).await;
		assert_eq!(*state.lock().unwrap(), vec![7]);

		// Back on its cron schedule with a fresh retry budget
		let queue = scheduler.queue.lock().unwrap();
		let (&(due, queued_id), task) = queue.first_key_value().unwrap();
		assert_eq!(queued_id, id);
		assert!(due > Timestamp::now());
		assert_eq!(task.attempt, 0);
		drop(queue);
		assert!(store.rows.lock().unwrap()[0].1.pending);
	}

	#[test]
	fn test_backoff() {
		let policy = RetryPolicy::new(10, 100, 5);
		assert_eq!(policy.backoff(0), Some(10));
		assert_eq!(policy.backoff(2), Some(40));
		assert_eq!(policy.backoff(4), Some(100));
		assert_eq!(policy.backoff(5), None);
		assert_eq!(RetryPolicy::new(10, 100, 300).backoff(200), Some(100));
	}

	#[test]
	fn test_retry_policy_storage() {
		let policy = RetryPolicy::new(60, 3600, 10);
		assert_eq!(RetryPolicy::decode(&policy.encode(2)).unwrap(), (2, policy));
		assert!(RetryPolicy::decode("2,60").is_err());
		assert!(RetryPolicy::decode("a,60,3600,10").is_err());
	}

	#[test]
	fn test_cron_next_after() {
		let cron = CronSchedule::parse("5 0 * * *").unwrap();
		// 2024-01-01T12:00:00Z -> 2024-01-02T00:05:00Z
		assert_eq!(cron.next_after(Timestamp(1_704_110_400)).unwrap(), Timestamp(1_704_153_900));
		assert_eq!(cron.as_str(), "5 0 * * *");
		assert!(CronSchedule::parse("not a cron").is_err());
	}

	#[tokio::test]
	async fn test_keyed_task_is_stored_once() {
		let (scheduler, store, _state) = new_scheduler();

		let first = scheduler.task(PushTask::new(1, 0)).key("nightly").cron("0 3 * * *").unwrap();
		let first = first.schedule().await.unwrap();
		let second = scheduler.task(PushTask::new(1, 0)).key("nightly").cron("0 4 * * *").unwrap();
		let second = second.schedule().await.unwrap();

		assert_eq!(first, second);
		let rows = store.rows.lock().unwrap();
		assert_eq!(rows.len(), 1);
		assert_eq!(rows[0].1.cron.as_deref(), Some("0 4 * * *"));
		assert_eq!(scheduler.queue.lock().unwrap().len(), 1);
	}

	#[tokio::test]
	async fn test_stored_tasks_are_loaded() {
		let store = Arc::new(MemoryStore::default());
		let pending = ScheduledTask::<State> {
			task: PushTask::new(9, 0),
			next_at: Some(Timestamp(0)),
			cron: None,
			retry: Some(RetryPolicy::new(1, 10, 2)),
			attempt: 0,
		};
		store.add(&pending, None).await.unwrap();

		let state: State = Arc::new(Mutex::new(Vec::new()));
		let scheduler = Scheduler::new(store.clone());
		scheduler.register::<PushTask>().unwrap();
		scheduler.start(state.clone());

		tokio::time::sleep(Duration::from_millis(500)).await;
		assert_eq!(*state.lock().unwrap(), vec![9]);
		assert!(!store.rows.lock().unwrap()[0].1.pending);
	}
}

// vim: ts=4
