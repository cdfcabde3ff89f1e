/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! This module contains [`MemoryPlatform`], an in-process [`Platform`]

use std::{
	collections::{HashMap, HashSet, VecDeque},
	sync::{
		Arc, Mutex, PoisonError,
		atomic::{AtomicI64, Ordering},
	},
	time::Duration,
};

use futures::StreamExt;
use tokio::{sync::mpsc, time::Instant};
use tokio_stream::wrappers::UnboundedReceiverStream;

use super::{Platform, PlatformError, Subscription};
use crate::{
	channel::ChannelRef,
	message::{InboundMessage, OutboundPayload, SentMessage},
};

type Subscriber = mpsc::UnboundedSender<Result<InboundMessage, PlatformError>>;

/// A messaging platform that lives entirely in memory.
///
/// Messages are published into source channels with [`MemoryPlatform::publish`],
/// every send attempt is logged and can be inspected with [`MemoryPlatform::send_log`].
/// Results of send attempts and subscriptions can be scripted to simulate platform failures.
///
/// Cloning is cheap, all clones share the same state
#[derive(Clone, Default, Debug)]
pub struct MemoryPlatform {
	inner: Arc<Inner>,
}

#[derive(Default, Debug)]
struct Inner {
	subscribers: Mutex<HashMap<ChannelRef, Vec<Subscriber>>>,
	refused: Mutex<HashSet<ChannelRef>>,
	scripted_sends: Mutex<HashMap<ChannelRef, VecDeque<Result<(), PlatformError>>>>,
	send_latency: Mutex<Duration>,
	log: Mutex<Vec<SendRecord>>,
	next_message_id: AtomicI64,
}

/// A single send attempt made through a [`MemoryPlatform`]
#[derive(Clone, Debug)]
pub struct SendRecord {
	/// Where the payload was sent to
	pub target: ChannelRef,

	/// What was sent
	pub payload: OutboundPayload,

	/// When the attempt started
	pub at: Instant,

	/// Whether the attempt succeeded
	pub delivered: bool,
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
	m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MemoryPlatform {
	#[expect(missing_docs, reason = "self-explanatory")]
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Publishes `msg` in `source`. Returns how many subscribers have received it
	pub fn publish(&self, source: &ChannelRef, msg: InboundMessage) -> usize {
		let mut subscribers = lock(&self.inner.subscribers);
		let Some(subs) = subscribers.get_mut(source) else {
			return 0;
		};

		subs.retain(|sub| sub.send(Ok(msg.clone())).is_ok());
		subs.len()
	}

	/// How many live subscriptions `source` has
	#[must_use]
	pub fn subscriber_count(&self, source: &ChannelRef) -> usize {
		let mut subscribers = lock(&self.inner.subscribers);
		subscribers.get_mut(source).map_or(0, |subs| {
			subs.retain(|sub| !sub.is_closed());
			subs.len()
		})
	}

	/// Ends all subscriptions to `source`
	pub fn close_subscriptions(&self, source: &ChannelRef) {
		lock(&self.inner.subscribers).remove(source);
	}

	/// Makes all subscriptions to `source` yield a network error and end
	pub fn break_subscriptions(&self, source: &ChannelRef) {
		let subs = lock(&self.inner.subscribers)
			.remove(source)
			.unwrap_or_default();

		for sub in subs {
			_ = sub.send(Err(PlatformError::network("connection to the source lost")));
		}
	}

	/// Makes every new subscription to `source` fail, or succeed again if `refuse` is false
	pub fn refuse_subscriptions(&self, source: &ChannelRef, refuse: bool) {
		let mut refused = lock(&self.inner.refused);
		if refuse {
			refused.insert(source.clone());
		} else {
			refused.remove(source);
		}
	}

	/// Queues up results for the next send attempts to `target`.
	/// Once the queue is empty, sends succeed
	pub fn script_sends(
		&self,
		target: &ChannelRef,
		results: impl IntoIterator<Item = Result<(), PlatformError>>,
	) {
		lock(&self.inner.scripted_sends)
			.entry(target.clone())
			.or_default()
			.extend(results);
	}

	/// Makes every send attempt take `latency` to complete
	pub fn set_send_latency(&self, latency: Duration) {
		*lock(&self.inner.send_latency) = latency;
	}

	/// Every send attempt made so far, in order
	#[must_use]
	pub fn send_log(&self) -> Vec<SendRecord> {
		lock(&self.inner.log).clone()
	}

	/// Every payload successfully delivered to `target`, in order
	#[must_use]
	pub fn delivered_to(&self, target: &ChannelRef) -> Vec<OutboundPayload> {
		lock(&self.inner.log)
			.iter()
			.filter(|rec| rec.delivered && rec.target == *target)
			.map(|rec| rec.payload.clone())
			.collect()
	}

	/// How many send attempts have been made to `target`
	#[must_use]
	pub fn attempts_to(&self, target: &ChannelRef) -> usize {
		lock(&self.inner.log)
			.iter()
			.filter(|rec| rec.target == *target)
			.count()
	}
}

impl Platform for MemoryPlatform {
	async fn subscribe(&self, source: &ChannelRef) -> Result<Subscription, PlatformError> {
		if lock(&self.inner.refused).contains(source) {
			return Err(PlatformError::network(format!(
				"subscription to {source} refused"
			)));
		}

		let (tx, rx) = mpsc::unbounded_channel();
		lock(&self.inner.subscribers)
			.entry(source.clone())
			.or_default()
			.push(tx);

		Ok(UnboundedReceiverStream::new(rx).boxed())
	}

	async fn send(
		&self,
		target: &ChannelRef,
		payload: &OutboundPayload,
	) -> Result<SentMessage, PlatformError> {
		let at = Instant::now();

		let latency = *lock(&self.inner.send_latency);
		if !latency.is_zero() {
			tokio::time::sleep(latency).await;
		}

		let result = lock(&self.inner.scripted_sends)
			.get_mut(target)
			.and_then(VecDeque::pop_front)
			.unwrap_or(Ok(()));

		lock(&self.inner.log).push(SendRecord {
			target: target.clone(),
			payload: payload.clone(),
			at,
			delivered: result.is_ok(),
		});

		result.map(|()| SentMessage {
			message_id: self.inner.next_message_id.fetch_add(1, Ordering::Relaxed) + 1,
		})
	}
}
