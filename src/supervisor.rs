/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! This module contains the [`Supervisor`] that owns every task,
//! runs a [`Worker`] for each enabled one and restarts them when they die

use std::{
	collections::HashMap,
	sync::{Arc, Mutex as StdMutex, PoisonError},
	time::Duration,
};

use futures::future::join_all;
use tap::TapFallible;
use tokio::{
	select,
	sync::{Mutex, mpsc},
	task::JoinHandle,
	time::{Instant, sleep},
};

use crate::{
	cancellation_token::{CancellationToken, StopHandle},
	delivery::DeliveryExecutor,
	error::{AdminError, ErrorChainDisplay},
	persistence::{Persist, PersistError},
	platform::Platform,
	settings::EngineSettings,
	status::StatusReport,
	store::{StoreError, TaskEntry, TaskStore},
	task::{ConfigPatch, Task, TaskConfig, TaskId},
	worker::{Worker, WorkerExit, WorkerState},
};

/// Owns the [`TaskStore`] and keeps the running workers in line with it.
///
/// Every administrative operation is serialized by a single lock that workers never take.
/// Restarting dead workers requires [`Supervisor::run`] to be running.
/// The supervisor is cheap to clone, all clones share the same state
pub struct Supervisor<P, R = ()> {
	shared: Arc<Shared<P, R>>,
}

struct Shared<P, R> {
	store: TaskStore,
	platform: Arc<P>,
	persist: R,
	settings: EngineSettings,
	delivery: DeliveryExecutor,

	/// The admin lock
	workers: Mutex<Workers>,
	events_tx: mpsc::UnboundedSender<Event>,

	/// Taken by [`Supervisor::run`] for as long as it runs
	events_rx: StdMutex<Option<mpsc::UnboundedReceiver<Event>>>,
}

#[derive(Default)]
struct Workers {
	slots: HashMap<TaskId, Slot>,

	/// Consecutive abnormal exits of each task
	restarts: HashMap<TaskId, u32>,
	pending: HashMap<TaskId, PendingRestart>,
	next_generation: u64,
}

/// A spawned worker
struct Slot {
	generation: u64,
	stop: StopHandle,
	handle: JoinHandle<()>,
}

struct PendingRestart {
	generation: u64,
	timer: JoinHandle<()>,
}

enum Event {
	Exited {
		id: TaskId,
		generation: u64,
		exit: WorkerExit,
		ran_for: Duration,
	},
	RestartDue {
		id: TaskId,
		generation: u64,
	},
}

impl<P, R> Clone for Supervisor<P, R> {
	fn clone(&self) -> Self {
		Self {
			shared: Arc::clone(&self.shared),
		}
	}
}

impl<P: Platform, R: Persist> Supervisor<P, R> {
	/// Creates a new supervisor with no tasks.
	///
	/// Every change to the task set is saved with `persist`
	pub fn new(platform: P, persist: R, settings: EngineSettings) -> Self {
		let (events_tx, events_rx) = mpsc::unbounded_channel();

		Self {
			shared: Arc::new(Shared {
				store: TaskStore::with_max_tasks(settings.max_tasks),
				platform: Arc::new(platform),
				persist,
				delivery: DeliveryExecutor::new(settings.delivery.clone()),
				settings,
				workers: Mutex::default(),
				events_tx,
				events_rx: StdMutex::new(Some(events_rx)),
			}),
		}
	}

	/// Loads the tasks saved by the persistence hook. Invalid records are logged and skipped.
	///
	/// No workers are started, call [`Supervisor::reconcile`] afterwards.
	/// Returns the number of tasks loaded
	///
	/// # Errors
	/// if the saved tasks couldn't be read
	pub async fn load(&self) -> Result<usize, AdminError> {
		let _workers = self.shared.workers.lock().await;
		let records = self.shared.persist.load().await?;

		let mut loaded = 0;
		for record in records {
			let task_id = record.task_id.clone();
			let res = record
				.into_config()
				.map_err(StoreError::from)
				.and_then(|(id, config)| self.shared.store.insert(id, config));

			match res {
				Ok(()) => loaded += 1,
				Err(e) => tracing::warn!(
					"Skipping saved task {task_id:?}: {}",
					ErrorChainDisplay(&e)
				),
			}
		}

		tracing::info!("Loaded {loaded} tasks");
		Ok(loaded)
	}

	/// Creates a new task and starts its worker if it's enabled
	///
	/// # Errors
	/// * if the config is invalid or the task limit has been reached. Nothing is created in this case
	/// * if the task set couldn't be saved. The task is still created in this case
	pub async fn create_task(&self, config: TaskConfig) -> Result<TaskId, AdminError> {
		let mut workers = self.shared.workers.lock().await;

		let id = self.shared.store.create(config)?;
		let entry = self.shared.store.entry(&id)?;
		tracing::info!(task = %id, "Created task {:?}", entry.config().name);

		self.sync_worker(&mut workers, &entry).await;
		self.save(&workers).await?;
		Ok(id)
	}

	/// Applies `patch` to the config of a task.
	///
	/// Changing the source restarts the worker, other changes are picked up starting from the next message.
	/// Setting `enabled` to `true` also clears the failed mark
	///
	/// # Errors
	/// * if there's no such task or if the patched config is invalid. Nothing is changed in this case
	/// * if the task set couldn't be saved
	pub async fn update_task(&self, id: &TaskId, patch: ConfigPatch) -> Result<Task, AdminError> {
		let mut workers = self.shared.workers.lock().await;

		let entry = self.shared.store.entry(id)?;
		let source_changed = patch.changes_source(&entry.config());
		let enabling = patch.enabled == Some(true);

		// the old worker must not relay anything from the old source under the new config
		if source_changed {
			Self::stop_worker(&mut workers, &entry).await;
		}

		if let Err(e) = self.shared.store.update(id, patch) {
			self.sync_worker(&mut workers, &entry).await;
			return Err(e.into());
		}
		tracing::info!(task = %id, "Updated task");

		if enabling {
			entry.clear_failure();
			workers.restarts.remove(id);
		}

		self.sync_worker(&mut workers, &entry).await;
		self.save(&workers).await?;
		Ok(entry.view())
	}

	/// Enables a task, clearing its failed mark, and starts its worker
	///
	/// # Errors
	/// * if there's no such task
	/// * if the task set couldn't be saved
	pub async fn enable_task(&self, id: &TaskId) -> Result<(), AdminError> {
		let mut workers = self.shared.workers.lock().await;

		let entry = self.shared.store.entry(id)?;
		entry.clear_failure();
		entry.set_enabled(true);
		workers.restarts.remove(id);
		tracing::info!(task = %id, "Enabled task");

		self.sync_worker(&mut workers, &entry).await;
		self.save(&workers).await?;
		Ok(())
	}

	/// Disables a task. Its worker is stopped before this function returns
	///
	/// # Errors
	/// * if there's no such task
	/// * if the task set couldn't be saved
	pub async fn disable_task(&self, id: &TaskId) -> Result<(), AdminError> {
		let mut workers = self.shared.workers.lock().await;

		let entry = self.shared.store.entry(id)?;
		entry.set_enabled(false);
		tracing::info!(task = %id, "Disabled task");

		Self::stop_worker(&mut workers, &entry).await;

		self.save(&workers).await?;
		Ok(())
	}

	/// Deletes a task. Its worker is stopped and its in-flight message is finished first
	///
	/// # Errors
	/// * if there's no such task
	/// * if the task set couldn't be saved
	pub async fn delete_task(&self, id: &TaskId) -> Result<(), AdminError> {
		let mut workers = self.shared.workers.lock().await;

		let entry = self.shared.store.entry(id)?;
		Self::stop_worker(&mut workers, &entry).await;

		self.shared.store.delete(id)?;
		workers.restarts.remove(id);
		tracing::info!(task = %id, "Deleted task {:?}", entry.config().name);
		self.save(&workers).await?;
		Ok(())
	}

	/// Zeroes the statistics of a task
	///
	/// # Errors
	/// if there's no such task
	pub async fn reset_stats(&self, id: &TaskId) -> Result<(), AdminError> {
		let _workers = self.shared.workers.lock().await;
		self.shared.store.reset_stats(id)?;
		tracing::info!(task = %id, "Reset statistics");

		Ok(())
	}

	/// Starts a worker for every enabled healthy task that doesn't have one
	/// and stops the workers of every task that shouldn't have one
	pub async fn reconcile(&self) {
		let mut workers = self.shared.workers.lock().await;

		let entries = self.shared.store.entries();
		for entry in &entries {
			self.sync_worker(&mut workers, entry).await;
		}

		// workers of tasks that no longer exist
		let orphans = workers
			.slots
			.keys()
			.filter(|id| !entries.iter().any(|e| e.id() == *id))
			.cloned()
			.collect::<Vec<_>>();

		for id in orphans {
			if let Some(slot) = workers.slots.remove(&id) {
				tracing::warn!(task = %id, "Stopping the worker of a deleted task");
				drain(slot).await;
			}
		}
	}

	/// Aggregate status of every task
	#[must_use]
	pub fn status(&self) -> StatusReport {
		StatusReport::from_tasks(self.shared.store.list())
	}

	/// A view of a single task
	///
	/// # Errors
	/// if there's no such task
	pub fn task(&self, id: &TaskId) -> Result<Task, AdminError> {
		Ok(self.shared.store.get(id)?)
	}

	/// Views of every task, ordered by id
	#[must_use]
	pub fn tasks(&self) -> Vec<Task> {
		self.shared.store.list()
	}

	#[expect(missing_docs, reason = "self-explanatory")]
	#[must_use]
	pub fn store(&self) -> &TaskStore {
		&self.shared.store
	}

	#[expect(missing_docs, reason = "self-explanatory")]
	#[must_use]
	pub fn settings(&self) -> &EngineSettings {
		&self.shared.settings
	}

	/// Handles worker exits and restarts until `cancel_token` is cancelled, then stops every worker.
	///
	/// Only a single `run` may be active at a time, others return immediately
	pub async fn run(&self, mut cancel_token: CancellationToken) {
		let rx = self
			.shared
			.events_rx
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.take();

		let Some(mut rx) = rx else {
			tracing::error!("The supervisor is already running");
			return;
		};

		tracing::info!("Supervisor started");

		loop {
			let event = select! {
				biased;

				() = cancel_token.wait() => break,
				event = rx.recv() => event,
			};

			// the sending half lives as long as we do
			let Some(event) = event else {
				break;
			};

			match event {
				Event::Exited {
					id,
					generation,
					exit,
					ran_for,
				} => self.handle_exit(id, generation, exit, ran_for).await,
				Event::RestartDue { id, generation } => {
					self.handle_restart_due(id, generation).await;
				}
			}
		}

		self.shutdown().await;

		*self
			.shared
			.events_rx
			.lock()
			.unwrap_or_else(PoisonError::into_inner) = Some(rx);

		tracing::info!("Supervisor stopped");
	}

	/// Stops every worker, waiting for their in-flight messages, and cancels pending restarts.
	///
	/// Tasks stay enabled and are started again on the next [`Supervisor::reconcile`]
	pub async fn shutdown(&self) {
		let mut workers = self.shared.workers.lock().await;

		for (_, pending) in workers.pending.drain() {
			pending.timer.abort();
		}

		let slots = workers.slots.drain().collect::<Vec<_>>();
		tracing::info!("Stopping {} workers", slots.len());

		for (id, slot) in &slots {
			if let Ok(entry) = self.shared.store.entry(id) {
				entry.set_worker_state(WorkerState::Stopping);
			}
			slot.stop.stop();
		}

		join_all(slots.into_iter().map(|(_, slot)| drain(slot))).await;

		for entry in self.shared.store.entries() {
			if entry.worker_state() == WorkerState::Restarting {
				entry.set_worker_state(WorkerState::Stopped);
			}
		}
	}

	/// Starts or stops the worker of `entry` depending on whether it should be running
	async fn sync_worker(&self, workers: &mut Workers, entry: &Arc<TaskEntry>) {
		if !entry.wants_worker() {
			Self::stop_worker(workers, entry).await;
			return;
		}

		// a pending restart will start it
		if workers.slots.contains_key(entry.id()) || workers.pending.contains_key(entry.id()) {
			return;
		}

		self.spawn_worker(workers, entry);
	}

	fn spawn_worker(&self, workers: &mut Workers, entry: &Arc<TaskEntry>) {
		workers.next_generation += 1;
		let generation = workers.next_generation;

		let (cancel_token, stop) = CancellationToken::new();
		let worker = Worker::new(
			Arc::clone(entry),
			Arc::clone(&self.shared.platform),
			self.shared.delivery.clone(),
			cancel_token,
		);

		let id = entry.id().clone();
		let events_tx = self.shared.events_tx.clone();

		entry.set_worker_state(WorkerState::Starting);
		let handle = tokio::spawn(async move {
			let started = Instant::now();
			let exit = worker.run().await;

			// nobody's listening if the supervisor is gone
			_ = events_tx.send(Event::Exited {
				id,
				generation,
				exit,
				ran_for: started.elapsed(),
			});
		});

		tracing::debug!(task = %entry.id(), "Spawned worker #{generation}");
		workers.slots.insert(
			entry.id().clone(),
			Slot {
				generation,
				stop,
				handle,
			},
		);
	}

	/// Stops the worker of `entry`, if any, and waits for it to finish. Cancels a pending restart
	async fn stop_worker(workers: &mut Workers, entry: &TaskEntry) {
		if let Some(pending) = workers.pending.remove(entry.id()) {
			pending.timer.abort();
			entry.set_worker_state(WorkerState::Stopped);
		}

		let Some(slot) = workers.slots.remove(entry.id()) else {
			return;
		};

		entry.set_worker_state(WorkerState::Stopping);
		slot.stop.stop();
		drain(slot).await;
	}

	async fn handle_exit(&self, id: TaskId, generation: u64, exit: WorkerExit, ran_for: Duration) {
		let mut workers = self.shared.workers.lock().await;

		// the worker has already been stopped and replaced or removed
		if workers
			.slots
			.get(&id)
			.is_none_or(|slot| slot.generation != generation)
		{
			return;
		}
		workers.slots.remove(&id);

		let Ok(entry) = self.shared.store.entry(&id) else {
			return;
		};

		if !exit.is_abnormal() {
			return;
		}

		let policy = &self.shared.settings.restart;
		let exits = workers.restarts.entry(id.clone()).or_default();
		if ran_for >= policy.stable_after {
			*exits = 0;
		}
		*exits += 1;
		let exits = *exits;

		if exits >= policy.limit {
			tracing::error!(
				task = %id,
				"Worker exited abnormally {exits} times in a row, giving up: {exit}"
			);

			workers.restarts.remove(&id);
			entry.mark_failed(exit.to_string());
			entry.set_enabled(false);
			entry.set_worker_state(WorkerState::Stopped);

			// already logged
			_ = self.save(&workers).await;
			return;
		}

		let delay = policy.delay(exits);
		tracing::warn!(
			task = %id,
			"Worker exited abnormally ({exit}), restarting in {delay:?} (attempt {exits}/{})",
			policy.limit
		);

		entry.set_worker_state(WorkerState::Restarting);

		workers.next_generation += 1;
		let generation = workers.next_generation;
		let events_tx = self.shared.events_tx.clone();
		let timer_id = id.clone();
		let timer = tokio::spawn(async move {
			sleep(delay).await;
			_ = events_tx.send(Event::RestartDue {
				id: timer_id,
				generation,
			});
		});

		workers
			.pending
			.insert(id, PendingRestart { generation, timer });
	}

	async fn handle_restart_due(&self, id: TaskId, generation: u64) {
		let mut workers = self.shared.workers.lock().await;

		if workers
			.pending
			.get(&id)
			.is_none_or(|pending| pending.generation != generation)
		{
			return;
		}
		workers.pending.remove(&id);

		let Ok(entry) = self.shared.store.entry(&id) else {
			return;
		};

		tracing::info!(task = %id, "Restarting worker");
		entry.set_worker_state(WorkerState::Stopped);
		self.sync_worker(&mut workers, &entry).await;
	}

	/// Hands the current task set to the persistence hook.
	///
	/// Must be called with the admin lock held, `_admin` is what it guards
	async fn save(&self, _admin: &Workers) -> Result<(), PersistError> {
		let records = self.shared.store.records();
		self.shared
			.persist
			.save(&records)
			.await
			.tap_err(|e| tracing::error!("Failed to save tasks: {}", ErrorChainDisplay(e)))
	}
}

/// Waits for a stopped worker to finish its in-flight message and exit
async fn drain(slot: Slot) {
	// worker panics are caught inside of the worker itself
	if let Err(e) = slot.handle.await {
		tracing::error!("Worker task failed: {e}");
	}
}
