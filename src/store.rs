/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! This module contains [`TaskStore`], the single source of truth about all tasks,
//! and [`TaskEntry`], the state of a single task inside of it

mod error;

pub use self::error::StoreError;

use std::{
	collections::{HashMap, HashSet},
	sync::{Arc, Mutex, PoisonError, RwLock},
};

use chrono::Utc;

use crate::{
	persistence::TaskRecord,
	pipeline::Pipeline,
	rate_limit::RateLimiter,
	task::{
		ConfigError, ConfigPatch, Health, Outcome, Task, TaskConfig, TaskId, TaskStats, Ticket,
	},
	worker::WorkerState,
};

/// Holds every task together with its statistics and runtime state.
///
/// The map itself is only locked for lookups, insertions and removals.
/// Everything else is done on the [`TaskEntry`] of the task,
/// thus operations on different tasks never wait on each other
#[derive(Debug)]
pub struct TaskStore {
	tasks: RwLock<HashMap<TaskId, Arc<TaskEntry>>>,
	ids: Mutex<IdAllocator>,
	max_tasks: Option<usize>,
}

/// The state of a single task
#[derive(Debug)]
pub struct TaskEntry {
	id: TaskId,

	/// Swapped as a whole on every config change
	snapshot: RwLock<Arc<ConfigSnapshot>>,
	stats: TaskStats,
	rate_limiter: RateLimiter,
	runtime: Mutex<Runtime>,
}

/// A task's config together with the [`Pipeline`] compiled from it
#[derive(Debug)]
pub struct ConfigSnapshot {
	#[expect(missing_docs, reason = "self-explanatory")]
	pub config: TaskConfig,

	#[expect(missing_docs, reason = "self-explanatory")]
	pub pipeline: Pipeline,
}

#[derive(Default, Debug)]
struct Runtime {
	worker: WorkerState,
	health: Health,
}

/// Ids are never reused, even after the task they belonged to has been deleted
#[derive(Default, Debug)]
struct IdAllocator {
	next: u64,
	issued: HashSet<TaskId>,
}

impl IdAllocator {
	fn generate(&mut self) -> TaskId {
		loop {
			self.next += 1;
			let id = TaskId::generated(self.next);
			if self.issued.insert(id.clone()) {
				return id;
			}
		}
	}
}

impl TaskStore {
	/// Creates a new empty store without a task limit
	#[must_use]
	pub fn new() -> Self {
		Self::with_max_tasks(None)
	}

	/// Creates a new empty store that holds at most `max_tasks` tasks, if provided
	#[must_use]
	pub fn with_max_tasks(max_tasks: Option<usize>) -> Self {
		Self {
			tasks: RwLock::default(),
			ids: Mutex::default(),
			max_tasks,
		}
	}

	fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<TaskId, Arc<TaskEntry>>> {
		// the map is always valid, even if a panic happened while the lock was held
		self.tasks.read().unwrap_or_else(PoisonError::into_inner)
	}

	fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<TaskId, Arc<TaskEntry>>> {
		self.tasks.write().unwrap_or_else(PoisonError::into_inner)
	}

	fn check_capacity(&self, tasks: &HashMap<TaskId, Arc<TaskEntry>>) -> Result<(), ConfigError> {
		match self.max_tasks {
			Some(max) if tasks.len() >= max => Err(ConfigError::TooManyTasks { max }),
			_ => Ok(()),
		}
	}

	/// Adds a new task with a freshly generated id and zeroed statistics
	///
	/// # Errors
	/// * if the config is invalid
	/// * if the task limit has been reached
	pub fn create(&self, config: TaskConfig) -> Result<TaskId, StoreError> {
		let snapshot = ConfigSnapshot::new(config)?;

		let mut tasks = self.write();
		self.check_capacity(&tasks)?;

		let id = self
			.ids
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.generate();

		tasks.insert(id.clone(), Arc::new(TaskEntry::new(id.clone(), snapshot)));

		Ok(id)
	}

	/// Adds a task with an existing id, e.g. one loaded from a task file
	///
	/// # Errors
	/// * if a task with this id already exists or has existed
	/// * if the config is invalid
	/// * if the task limit has been reached
	pub fn insert(&self, id: TaskId, config: TaskConfig) -> Result<(), StoreError> {
		let snapshot = ConfigSnapshot::new(config)?;

		let mut tasks = self.write();
		self.check_capacity(&tasks)?;

		let mut ids = self.ids.lock().unwrap_or_else(PoisonError::into_inner);
		if !ids.issued.insert(id.clone()) {
			return Err(StoreError::DuplicateId(id));
		}

		tasks.insert(id.clone(), Arc::new(TaskEntry::new(id, snapshot)));

		Ok(())
	}

	/// Returns the entry of the task with `id`
	///
	/// # Errors
	/// if there's no such task
	pub fn entry(&self, id: &TaskId) -> Result<Arc<TaskEntry>, StoreError> {
		self.read()
			.get(id)
			.cloned()
			.ok_or_else(|| StoreError::NotFound(id.clone()))
	}

	/// Returns a view of the task with `id`
	///
	/// # Errors
	/// if there's no such task
	pub fn get(&self, id: &TaskId) -> Result<Task, StoreError> {
		Ok(self.entry(id)?.view())
	}

	/// Returns all entries, ordered by id
	#[must_use]
	pub fn entries(&self) -> Vec<Arc<TaskEntry>> {
		let mut entries = self.read().values().cloned().collect::<Vec<_>>();
		entries.sort_by(|a, b| a.id.cmp(&b.id));
		entries
	}

	/// Returns views of all tasks, ordered by id
	#[must_use]
	pub fn list(&self) -> Vec<Task> {
		self.entries().iter().map(|entry| entry.view()).collect()
	}

	/// Applies `patch` to the config of the task with `id`. Nothing is changed if the result is invalid
	///
	/// # Errors
	/// * if there's no such task
	/// * if the patched config is invalid
	pub fn update(&self, id: &TaskId, patch: ConfigPatch) -> Result<Task, StoreError> {
		let entry = self.entry(id)?;
		entry.set_config(patch.apply(&entry.config()))?;

		Ok(entry.view())
	}

	/// Removes the task with `id`. Its id will never be reused
	///
	/// # Errors
	/// if there's no such task
	pub fn delete(&self, id: &TaskId) -> Result<Arc<TaskEntry>, StoreError> {
		self.write()
			.remove(id)
			.ok_or_else(|| StoreError::NotFound(id.clone()))
	}

	/// See [`TaskStats::record_processed`]
	///
	/// # Errors
	/// if there's no such task
	pub fn record_processed(&self, id: &TaskId) -> Result<Ticket, StoreError> {
		Ok(self.entry(id)?.stats.record_processed())
	}

	/// See [`TaskStats::record_filtered`]
	///
	/// # Errors
	/// if there's no such task
	pub fn record_filtered(&self, id: &TaskId, ticket: Ticket) -> Result<(), StoreError> {
		self.entry(id)?.stats.record_filtered(ticket);
		Ok(())
	}

	/// See [`TaskStats::record_outcome`]
	///
	/// # Errors
	/// if there's no such task
	pub fn record_outcome(
		&self,
		id: &TaskId,
		ticket: Ticket,
		outcome: &Outcome,
	) -> Result<(), StoreError> {
		self.entry(id)?.stats.record_outcome(ticket, outcome);
		Ok(())
	}

	/// Zeroes the statistics of the task with `id`
	///
	/// # Errors
	/// if there's no such task
	pub fn reset_stats(&self, id: &TaskId) -> Result<(), StoreError> {
		self.entry(id)?.stats.reset();
		Ok(())
	}

	/// The persistable form of every task, ordered by id
	#[must_use]
	pub fn records(&self) -> Vec<TaskRecord> {
		self.entries()
			.iter()
			.map(|entry| TaskRecord::from_config(&entry.id, &entry.config()))
			.collect()
	}

	#[expect(missing_docs, reason = "self-explanatory")]
	#[must_use]
	pub fn len(&self) -> usize {
		self.read().len()
	}

	#[expect(missing_docs, reason = "self-explanatory")]
	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.read().is_empty()
	}
}

impl Default for TaskStore {
	fn default() -> Self {
		Self::new()
	}
}

impl ConfigSnapshot {
	fn new(config: TaskConfig) -> Result<Self, ConfigError> {
		config.validate()?;
		let pipeline = Pipeline::from_config(&config)?;

		Ok(Self { config, pipeline })
	}
}

impl TaskEntry {
	fn new(id: TaskId, snapshot: ConfigSnapshot) -> Self {
		Self {
			id,
			snapshot: RwLock::new(Arc::new(snapshot)),
			stats: TaskStats::new(),
			rate_limiter: RateLimiter::new(),
			runtime: Mutex::default(),
		}
	}

	#[expect(missing_docs, reason = "self-explanatory")]
	#[must_use]
	pub fn id(&self) -> &TaskId {
		&self.id
	}

	/// The current config and pipeline. Stays the same even if the config is changed afterwards
	#[must_use]
	pub fn snapshot(&self) -> Arc<ConfigSnapshot> {
		Arc::clone(&*self.snapshot.read().unwrap_or_else(PoisonError::into_inner))
	}

	/// A copy of the current config
	#[must_use]
	pub fn config(&self) -> TaskConfig {
		self.snapshot().config.clone()
	}

	/// Validates `config`, compiles it and swaps it in
	pub(crate) fn set_config(&self, config: TaskConfig) -> Result<(), ConfigError> {
		let snapshot = Arc::new(ConfigSnapshot::new(config)?);
		*self.snapshot.write().unwrap_or_else(PoisonError::into_inner) = snapshot;

		Ok(())
	}

	/// Sets the enabled flag without revalidating the rest of the config
	pub(crate) fn set_enabled(&self, enabled: bool) {
		let mut snapshot = self.snapshot.write().unwrap_or_else(PoisonError::into_inner);
		if snapshot.config.enabled == enabled {
			return;
		}

		let mut config = snapshot.config.clone();
		config.enabled = enabled;
		*snapshot = Arc::new(ConfigSnapshot {
			config,
			pipeline: snapshot.pipeline.clone(),
		});
	}

	#[expect(missing_docs, reason = "self-explanatory")]
	#[must_use]
	pub fn stats(&self) -> &TaskStats {
		&self.stats
	}

	#[expect(missing_docs, reason = "self-explanatory")]
	#[must_use]
	pub fn rate_limiter(&self) -> &RateLimiter {
		&self.rate_limiter
	}

	fn runtime(&self) -> std::sync::MutexGuard<'_, Runtime> {
		self.runtime.lock().unwrap_or_else(PoisonError::into_inner)
	}

	#[expect(missing_docs, reason = "self-explanatory")]
	#[must_use]
	pub fn worker_state(&self) -> WorkerState {
		self.runtime().worker
	}

	pub(crate) fn set_worker_state(&self, state: WorkerState) {
		self.runtime().worker = state;
	}

	#[expect(missing_docs, reason = "self-explanatory")]
	#[must_use]
	pub fn health(&self) -> Health {
		self.runtime().health.clone()
	}

	pub(crate) fn mark_failed(&self, reason: String) {
		self.runtime().health = Health::Failed {
			reason,
			at: Utc::now(),
		};
	}

	pub(crate) fn clear_failure(&self) {
		self.runtime().health = Health::Ok;
	}

	/// Returns true if the task should have a running worker
	#[must_use]
	pub fn wants_worker(&self) -> bool {
		self.snapshot().config.enabled && !self.runtime().health.is_failed()
	}

	/// A point-in-time view of the task
	#[must_use]
	pub fn view(&self) -> Task {
		let runtime = self.runtime();
		Task {
			id: self.id.clone(),
			config: self.config(),
			stats: self.stats.snapshot(),
			health: runtime.health.clone(),
			worker: runtime.worker,
		}
	}
}
