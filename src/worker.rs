/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! This module contains [`Worker`] that drives the messages of a single task
//! through its pipeline, rate limiter and delivery, together with [`WorkerState`] and [`WorkerExit`]

use std::{
	any::Any,
	collections::{HashSet, VecDeque},
	fmt, panic,
	sync::Arc,
};

use futures::{FutureExt, StreamExt};
use serde::Serialize;
use tokio::select;

use crate::{
	cancellation_token::CancellationToken,
	delivery::DeliveryExecutor,
	error::ErrorChainDisplay,
	message::InboundMessage,
	pipeline::Verdict,
	platform::{Platform, PlatformError},
	store::TaskEntry,
	task::Outcome,
};

/// Lifecycle state of a task's worker
#[derive(Clone, Copy, PartialEq, Eq, Default, Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
	/// Subscribing to the source
	Starting,

	/// Relaying messages
	Running,

	/// Asked to stop, finishing the message in flight
	Stopping,

	/// Not running
	#[default]
	Stopped,

	/// Exited abnormally, waiting to be restarted
	Restarting,
}

/// Why a worker has exited
#[derive(Debug)]
pub enum WorkerExit {
	/// It has been asked to stop
	Stopped,

	/// Couldn't subscribe to the source
	SubscribeFailed(PlatformError),

	/// The subscription yielded an error
	SubscriptionLost(PlatformError),

	/// The subscription has ended
	SubscriptionClosed,

	/// The worker panicked
	Panicked {
		/// Payload of the panic
		payload: Box<dyn Any + Send + 'static>,
	},
}

/// The worker of a single task.
///
/// Subscribes to the task's source and processes the messages one by one, in the order they have arrived.
/// The config is re-read for each message, so config changes (except for the source) apply without a restart
pub struct Worker<P> {
	entry: Arc<TaskEntry>,
	platform: Arc<P>,
	delivery: DeliveryExecutor,
	cancel_token: CancellationToken,
	seen: RecentIds,
}

impl<P: Platform> Worker<P> {
	/// How many of the latest message ids are remembered to skip duplicates
	pub const DEDUP_WINDOW: usize = 1024;

	#[expect(missing_docs, reason = "self-explanatory")]
	#[must_use]
	pub fn new(
		entry: Arc<TaskEntry>,
		platform: Arc<P>,
		delivery: DeliveryExecutor,
		cancel_token: CancellationToken,
	) -> Self {
		Self {
			entry,
			platform,
			delivery,
			cancel_token,
			seen: RecentIds::new(Self::DEDUP_WINDOW),
		}
	}

	/// Runs the worker until it's cancelled or until its subscription is lost.
	///
	/// # Note
	/// This function never panics. If a panic occures, [`WorkerExit::Panicked`] is returned instead.
	/// A message that is being processed when the worker is cancelled is always finished first
	#[tracing::instrument(skip_all, fields(task = %self.entry.id()))]
	pub async fn run(mut self) -> WorkerExit {
		let exit = match panic::AssertUnwindSafe(self.run_inner())
			.catch_unwind()
			.await
		{
			Ok(exit) => exit,
			Err(payload) => WorkerExit::Panicked { payload },
		};

		self.entry.stats().mark_stopped();
		self.entry.set_worker_state(WorkerState::Stopped);

		match &exit {
			WorkerExit::Stopped => tracing::info!("Worker stopped"),
			other => tracing::warn!("Worker exited: {other}"),
		}

		exit
	}

	async fn run_inner(&mut self) -> WorkerExit {
		self.entry.set_worker_state(WorkerState::Starting);

		let source = self.entry.snapshot().config.source.clone();

		let subscription = select! {
			biased;

			() = self.cancel_token.wait() => return WorkerExit::Stopped,
			res = self.platform.subscribe(&source) => res,
		};

		let mut subscription = match subscription {
			Ok(sub) => sub,
			Err(e) => return WorkerExit::SubscribeFailed(e),
		};

		self.entry.stats().mark_started();
		self.entry.set_worker_state(WorkerState::Running);
		tracing::info!("Worker started, listening to {source}");

		loop {
			let next = select! {
				biased;

				() = self.cancel_token.wait() => return WorkerExit::Stopped,
				next = subscription.next() => next,
			};

			match next {
				Some(Ok(msg)) => {
					if !self.seen.insert(msg.origin.message_id) {
						tracing::debug!("Skipping already seen message {}", msg.origin.message_id);
						continue;
					}

					self.process(msg).await;
				}
				Some(Err(e)) => return WorkerExit::SubscriptionLost(e),
				None => return WorkerExit::SubscriptionClosed,
			}
		}
	}

	async fn process(&self, msg: InboundMessage) {
		let stats = self.entry.stats();
		let ticket = stats.record_processed();

		// a counted message is always settled, even if relaying it panicked
		let relayed = panic::AssertUnwindSafe(self.relay(&msg)).catch_unwind().await;
		match relayed {
			Ok(Some(outcome)) => stats.record_outcome(ticket, &outcome),
			Ok(None) => stats.record_filtered(ticket),
			Err(payload) => {
				stats.record_outcome(
					ticket,
					&Outcome::Failed {
						reason: "worker panicked".to_owned(),
					},
				);
				panic::resume_unwind(payload);
			}
		}
	}

	/// Returns [`None`] if the message has been dropped by the pipeline
	async fn relay(&self, msg: &InboundMessage) -> Option<Outcome> {
		// the whole message is processed using the config it has arrived with
		let snapshot = self.entry.snapshot();

		let payload = match snapshot.pipeline.evaluate(msg) {
			Verdict::Deliver(payload) => payload,
			Verdict::Drop(reason) => {
				tracing::debug!("Dropped message {}: {reason}", msg.origin.message_id);
				return None;
			}
		};

		self.entry
			.rate_limiter()
			.wait(snapshot.config.min_delay)
			.await;

		let report = self
			.delivery
			.deliver(
				&*self.platform,
				self.entry.id(),
				&snapshot.config.target,
				&payload,
				snapshot.config.max_retries,
			)
			.await;

		Some(report.outcome)
	}
}

impl WorkerExit {
	/// Returns true if the worker should be restarted
	#[must_use]
	pub fn is_abnormal(&self) -> bool {
		!matches!(self, Self::Stopped)
	}
}

impl fmt::Display for WorkerExit {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Stopped => f.write_str("stopped"),
			Self::SubscribeFailed(e) => write!(f, "can't subscribe: {}", ErrorChainDisplay(e)),
			Self::SubscriptionLost(e) => write!(f, "subscription lost: {}", ErrorChainDisplay(e)),
			Self::SubscriptionClosed => f.write_str("subscription closed"),
			Self::Panicked { payload } => {
				let msg = payload
					.downcast_ref::<&str>()
					.copied()
					.or_else(|| payload.downcast_ref::<String>().map(String::as_str))
					.unwrap_or("unknown panic payload");

				write!(f, "panicked: {msg}")
			}
		}
	}
}

/// A bounded set of the most recent message ids
#[derive(Debug)]
struct RecentIds {
	capacity: usize,
	order: VecDeque<i64>,
	ids: HashSet<i64>,
}

impl RecentIds {
	fn new(capacity: usize) -> Self {
		Self {
			capacity,
			order: VecDeque::with_capacity(capacity),
			ids: HashSet::with_capacity(capacity),
		}
	}

	/// Returns false if the id has already been seen
	fn insert(&mut self, id: i64) -> bool {
		if !self.ids.insert(id) {
			return false;
		}

		self.order.push_back(id);
		if self.order.len() > self.capacity {
			if let Some(oldest) = self.order.pop_front() {
				self.ids.remove(&oldest);
			}
		}

		true
	}
}
