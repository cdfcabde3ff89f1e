/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Live statistics of a single task.
///
/// Every update is a short critical section on a lock that belongs to this task alone,
/// so updating the stats of one task never waits on another task.
#[derive(Default, Debug)]
pub struct TaskStats {
	inner: Mutex<Counters>,
}

#[derive(Default, Debug)]
struct Counters {
	/// Bumped on every reset. Outcomes of messages counted before the reset are ignored
	epoch: u64,
	snapshot: StatsSnapshot,
}

/// Ties the outcome of a message to the statistics epoch the message has been counted in
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Ticket {
	epoch: u64,
}

/// How the delivery of a message ended
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Outcome {
	/// The message has been delivered to the target
	Forwarded,

	/// The message couldn't be delivered
	Failed {
		/// The last error that happened while delivering it
		reason: String,
	},
}

/// A copy of the statistics of a task at some point in time
#[derive(Clone, PartialEq, Eq, Default, Debug, Serialize)]
pub struct StatsSnapshot {
	/// Messages received from the source, including the filtered ones
	pub processed: u64,

	/// Messages delivered to the target
	pub forwarded: u64,

	/// Messages that couldn't be delivered
	pub failed: u64,

	/// Messages dropped by the pipeline
	pub filtered: u64,

	/// When the last message has been received or its delivery has ended
	pub last_activity: Option<DateTime<Utc>>,

	/// When the currently running worker has started, if there is one
	pub started_at: Option<DateTime<Utc>>,

	/// The reason the last failed message couldn't be delivered
	pub last_error: Option<String>,
}

impl TaskStats {
	#[expect(missing_docs, reason = "self-explanatory")]
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	fn with<T>(&self, f: impl FnOnce(&mut Counters) -> T) -> T {
		// counters are always left in a valid state, even if a panic happened while the lock was held
		let mut counters = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
		f(&mut counters)
	}

	/// Counts a newly received message.
	/// The returned [`Ticket`] should be passed to [`TaskStats::record_filtered`] or [`TaskStats::record_outcome`]
	pub fn record_processed(&self) -> Ticket {
		self.with(|c| {
			c.snapshot.processed += 1;
			c.snapshot.last_activity = Some(Utc::now());
			Ticket { epoch: c.epoch }
		})
	}

	/// Counts a message that has been dropped by the pipeline
	pub fn record_filtered(&self, ticket: Ticket) {
		self.with(|c| {
			if c.epoch != ticket.epoch {
				return;
			}

			c.snapshot.filtered += 1;
		});
	}

	/// Counts the outcome of a delivery. Does nothing if the stats have been reset since `ticket` was issued
	pub fn record_outcome(&self, ticket: Ticket, outcome: &Outcome) {
		self.with(|c| {
			if c.epoch != ticket.epoch {
				return;
			}

			match outcome {
				Outcome::Forwarded => c.snapshot.forwarded += 1,
				Outcome::Failed { reason } => {
					c.snapshot.failed += 1;
					c.snapshot.last_error = Some(reason.clone());
				}
			}

			c.snapshot.last_activity = Some(Utc::now());
		});
	}

	/// Remembers the start time of a new worker
	pub fn mark_started(&self) {
		self.with(|c| c.snapshot.started_at = Some(Utc::now()));
	}

	/// Forgets the start time of the worker that just stopped
	pub fn mark_stopped(&self) {
		self.with(|c| c.snapshot.started_at = None);
	}

	/// Zeroes all counters. The start time of the current worker is kept
	pub fn reset(&self) {
		self.with(|c| {
			c.epoch += 1;
			c.snapshot = StatsSnapshot {
				started_at: c.snapshot.started_at,
				..Default::default()
			};
		});
	}

	#[expect(missing_docs, reason = "self-explanatory")]
	#[must_use]
	pub fn snapshot(&self) -> StatsSnapshot {
		self.with(|c| c.snapshot.clone())
	}
}

impl StatsSnapshot {
	/// Share of delivered messages among the ones whose delivery has ended, in percent.
	/// `None` if nothing has been delivered or failed yet
	#[must_use]
	pub fn success_rate(&self) -> Option<f64> {
		let total = self.forwarded + self.failed;
		if total == 0 {
			return None;
		}

		#[expect(clippy::cast_precision_loss, reason = "counters never get anywhere close to 2^52")]
		Some(self.forwarded as f64 / total as f64 * 100.0)
	}

	/// For how long the current worker has been running
	#[must_use]
	pub fn uptime(&self) -> Option<chrono::Duration> {
		self.started_at.map(|started_at| Utc::now() - started_at)
	}

	/// Messages that have been counted but whose delivery hasn't ended yet
	#[must_use]
	pub fn in_flight(&self) -> u64 {
		self.processed
			.saturating_sub(self.forwarded + self.failed + self.filtered)
	}
}
