/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! This module contains [`Task`], a single source → target relay, together with its configuration and statistics

mod config;
mod error;
mod id;
mod stats;

pub use self::{
	config::{
		Buttons, Cleaning, ConfigPatch, ContentKinds, Decoration, Replacement, Replacements,
		TaskConfig, WordList,
	},
	error::ConfigError,
	id::TaskId,
	stats::{Outcome, StatsSnapshot, TaskStats, Ticket},
};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::worker::WorkerState;

/// A point-in-time view of a task: its config, statistics and runtime state
#[derive(Clone, PartialEq, Debug)]
pub struct Task {
	/// Unique id of the task
	pub id: TaskId,

	/// The current configuration
	pub config: TaskConfig,

	/// Statistics at the moment the view was taken
	pub stats: StatsSnapshot,

	/// Whether the task is healthy or has been given up on by the supervisor
	pub health: Health,

	/// State of the task's worker
	pub worker: WorkerState,
}

/// Health of a task
#[derive(Clone, PartialEq, Eq, Default, Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Health {
	/// Nothing wrong has happened, or it has been dealt with
	#[default]
	Ok,

	/// The worker kept dying and the supervisor has stopped restarting it.
	/// The task must be explicitly re-enabled
	Failed {
		/// The error that made the last worker exit
		reason: String,

		/// When the task has been marked failed
		at: DateTime<Utc>,
	},
}

impl Health {
	/// Returns true if the task has been marked failed
	#[must_use]
	pub fn is_failed(&self) -> bool {
		matches!(self, Self::Failed { .. })
	}
}
