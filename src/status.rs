/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! This module contains [`StatusReport`], an aggregate view of every task for a control interface

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{
	task::{Health, Task, TaskId},
	worker::WorkerState,
};

/// Status of all tasks at some point in time
#[derive(Clone, PartialEq, Debug, Serialize)]
pub struct StatusReport {
	/// Number of tasks
	pub total: usize,

	/// Number of enabled tasks
	pub active: usize,

	/// Number of tasks whose worker is currently relaying messages
	pub running: usize,

	/// Status of each task, ordered by id
	pub tasks: Vec<TaskStatus>,
}

/// Status of a single task
#[derive(Clone, PartialEq, Debug, Serialize)]
#[expect(missing_docs, reason = "self-explanatory")]
pub struct TaskStatus {
	pub id: TaskId,
	pub name: String,
	pub source: String,
	pub target: String,
	pub enabled: bool,
	pub processed: u64,
	pub forwarded: u64,
	pub failed: u64,
	pub filtered: u64,

	/// Percent of the processed messages that have been forwarded
	pub success_rate: Option<f64>,
	pub last_activity: Option<DateTime<Utc>>,

	/// Seconds since the worker has started
	pub uptime_secs: Option<i64>,
	pub last_error: Option<String>,
	pub worker: WorkerState,
	pub health: Health,
}

impl StatusReport {
	/// Builds a report from task views
	#[must_use]
	pub fn from_tasks(tasks: impl IntoIterator<Item = Task>) -> Self {
		let tasks = tasks.into_iter().map(TaskStatus::from).collect::<Vec<_>>();

		Self {
			total: tasks.len(),
			active: tasks.iter().filter(|t| t.enabled).count(),
			running: tasks
				.iter()
				.filter(|t| t.worker == WorkerState::Running)
				.count(),
			tasks,
		}
	}
}

impl From<Task> for TaskStatus {
	fn from(task: Task) -> Self {
		let stats = task.stats;

		Self {
			success_rate: stats.success_rate(),
			uptime_secs: stats.uptime().map(|d| d.num_seconds()),
			id: task.id,
			name: task.config.name,
			source: task.config.source.to_string(),
			target: task.config.target.to_string(),
			enabled: task.config.enabled,
			processed: stats.processed,
			forwarded: stats.forwarded,
			failed: stats.failed,
			filtered: stats.filtered,
			last_activity: stats.last_activity,
			last_error: stats.last_error,
			worker: task.worker,
			health: task.health,
		}
	}
}

impl fmt::Display for StatusReport {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		writeln!(
			f,
			"Tasks: {} total, {} active, {} running",
			self.total, self.active, self.running
		)?;

		for task in &self.tasks {
			write!(f, "\n{task}")?;
		}

		Ok(())
	}
}

impl fmt::Display for TaskStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let state = match (&self.health, self.enabled) {
			(Health::Failed { .. }, _) => "failed",
			(Health::Ok, false) => "disabled",
			(Health::Ok, true) => match self.worker {
				WorkerState::Starting => "starting",
				WorkerState::Running => "running",
				WorkerState::Stopping => "stopping",
				WorkerState::Stopped => "stopped",
				WorkerState::Restarting => "restarting",
			},
		};

		writeln!(f, "[{}] {} ({state})", self.id, self.name)?;
		writeln!(f, "  {} -> {}", self.source, self.target)?;
		write!(
			f,
			"  processed {}, forwarded {}, failed {}, filtered {}",
			self.processed, self.forwarded, self.failed, self.filtered
		)?;

		if let Some(rate) = self.success_rate {
			write!(f, ", success {rate:.1}%")?;
		}

		if let Some(uptime) = self.uptime_secs {
			let (h, m, s) = (uptime / 3600, uptime / 60 % 60, uptime % 60);
			write!(f, "\n  uptime {h}h {m}m {s}s")?;
		}

		if let Some(last) = self.last_activity {
			write!(f, "\n  last activity {}", last.format("%Y-%m-%d %H:%M:%S UTC"))?;
		}

		match (&self.health, &self.last_error) {
			(Health::Failed { reason, .. }, _) => write!(f, "\n  failure: {reason}")?,
			(Health::Ok, Some(err)) => write!(f, "\n  last error: {err}")?,
			(Health::Ok, None) => (),
		}

		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{
		channel::ChannelRef,
		task::{StatsSnapshot, TaskConfig},
	};

	fn task(id: &str, enabled: bool, worker: WorkerState) -> Task {
		Task {
			id: TaskId::from(id),
			config: TaskConfig::builder()
				.name(format!("name of {id}"))
				.source(ChannelRef::Handle("source_chan".to_owned()))
				.target(ChannelRef::Id(-100_500))
				.enabled(enabled)
				.build(),
			stats: StatsSnapshot {
				processed: 4,
				forwarded: 3,
				failed: 1,
				..Default::default()
			},
			health: Health::Ok,
			worker,
		}
	}

	#[test]
	fn counts() {
		let report = StatusReport::from_tasks([
			task("task_1", true, WorkerState::Running),
			task("task_2", true, WorkerState::Restarting),
			task("task_3", false, WorkerState::Stopped),
		]);

		assert_eq!(report.total, 3);
		assert_eq!(report.active, 2);
		assert_eq!(report.running, 1);
		assert_eq!(report.tasks[0].success_rate, Some(75.0));
	}

	#[test]
	fn compact_summary() {
		let report = StatusReport::from_tasks([task("task_1", true, WorkerState::Running)]);
		let text = report.to_string();

		assert!(text.starts_with("Tasks: 1 total, 1 active, 1 running"), "{text}");
		assert!(text.contains("[task_1] name of task_1 (running)"), "{text}");
		assert!(text.contains("@source_chan -> -100500"), "{text}");
		assert!(text.contains("success 75.0%"), "{text}");
	}
}
