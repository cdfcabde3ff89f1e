/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! These tests drive whole tasks through the [`Supervisor`] on top of a [`MemoryPlatform`]:
//! filtering, decoration, rate limiting, isolation between tasks, restarts and persistence

use std::{
	sync::{
		Arc, Mutex,
		atomic::{AtomicBool, Ordering},
	},
	time::Duration,
};

use assert_matches::assert_matches;
use relay::{
	ChannelRef, InboundMessage, Supervisor, TaskConfig, TaskId,
	cancellation_token::{CancellationToken, StopHandle},
	error::AdminError,
	message::{OutboundPayload, SentMessage},
	persistence::{Persist, PersistError, TaskRecord},
	platform::{Platform, PlatformError, Subscription, memory::MemoryPlatform},
	settings::{BackoffSettings, EngineSettings, RestartPolicy},
	store::StoreError,
	task::{ConfigError, ConfigPatch, Decoration, Health, WordList},
	worker::WorkerState,
};
use tokio::{task::JoinHandle, time::sleep};

fn source(n: u32) -> ChannelRef {
	ChannelRef::Handle(format!("source_{n}"))
}

fn target(n: u32) -> ChannelRef {
	ChannelRef::Id(-100_000 - i64::from(n))
}

fn config(n: u32) -> TaskConfig {
	TaskConfig::builder()
		.name(format!("task number {n}"))
		.source(source(n))
		.target(target(n))
		.min_delay(Duration::ZERO)
		.build()
}

fn settings() -> EngineSettings {
	EngineSettings {
		delivery: BackoffSettings {
			jitter: false,
			..Default::default()
		},
		restart: RestartPolicy {
			limit: 3,
			base_delay: Duration::from_secs(1),
			..Default::default()
		},
		..Default::default()
	}
}

struct Harness<R: Persist = ()> {
	platform: MemoryPlatform,
	supervisor: Supervisor<MemoryPlatform, R>,
	stop: StopHandle,
	runner: JoinHandle<()>,
}

impl Harness {
	fn new() -> Self {
		Self::with_persist(())
	}
}

impl<R: Persist> Harness<R> {
	fn with_persist(persist: R) -> Self {
		let platform = MemoryPlatform::new();
		let supervisor = Supervisor::new(platform.clone(), persist, settings());

		let (token, stop) = CancellationToken::new();
		let runner = tokio::spawn({
			let supervisor = supervisor.clone();
			async move { supervisor.run(token).await }
		});

		Self {
			platform,
			supervisor,
			stop,
			runner,
		}
	}

	/// Creates a task and waits until its worker has subscribed to the source
	async fn create(&self, config: TaskConfig) -> TaskId {
		let source = config.source.clone();
		let id = self.supervisor.create_task(config).await.unwrap();
		eventually(|| self.platform.subscriber_count(&source) == 1).await;

		id
	}

	fn publish(&self, n: u32, message_id: i64, text: &str) {
		assert_eq!(
			self.platform
				.publish(&source(n), InboundMessage::text(source(n), message_id, text)),
			1,
			"the task must be subscribed"
		);
	}

	async fn shutdown(self) {
		self.stop.stop();
		self.runner.await.unwrap();
	}
}

/// Waits (in paused time) until `cond` becomes true
async fn eventually(cond: impl Fn() -> bool) {
	for _ in 0..10_000 {
		if cond() {
			return;
		}

		sleep(Duration::from_millis(10)).await;
	}

	panic!("condition has never become true");
}

#[tokio::test(start_paused = true)]
async fn blacklisted_message_is_dropped() {
	let h = Harness::new();

	let mut config = config(1);
	config.blacklist = WordList::new(["ad"]);
	let id = h.create(config).await;

	h.publish(1, 1, "this is an ad");
	h.publish(1, 2, "this is news");

	eventually(|| h.supervisor.task(&id).unwrap().stats.processed == 2).await;
	eventually(|| h.supervisor.task(&id).unwrap().stats.in_flight() == 0).await;

	let stats = h.supervisor.task(&id).unwrap().stats;
	assert_eq!(stats.forwarded, 1);
	assert_eq!(stats.failed, 0);
	assert_eq!(stats.filtered, 1);

	let delivered = h.platform.delivered_to(&target(1));
	assert_eq!(delivered.len(), 1);
	assert_eq!(delivered[0].text.as_deref(), Some("this is news"));

	h.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn header_and_footer_are_added() {
	let h = Harness::new();

	let mut config = config(1);
	config.header = Decoration::new("NEWS:");
	config.footer = Decoration::new("-- ch");
	let id = h.create(config).await;

	h.publish(1, 1, "hello");
	eventually(|| h.supervisor.task(&id).unwrap().stats.forwarded == 1).await;

	let delivered = h.platform.delivered_to(&target(1));
	assert_eq!(delivered[0].text.as_deref(), Some("NEWS:\nhello\n-- ch"));

	h.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn sends_are_spaced_and_ordered() {
	let h = Harness::new();

	let mut config = config(1);
	config.min_delay = Duration::from_secs(1);
	let id = h.create(config).await;

	for (message_id, text) in [(1, "first"), (2, "second"), (3, "third")] {
		h.publish(1, message_id, text);
	}

	eventually(|| h.supervisor.task(&id).unwrap().stats.forwarded == 3).await;

	let log = h.platform.send_log();
	let texts = log
		.iter()
		.map(|rec| rec.payload.text.clone().unwrap())
		.collect::<Vec<_>>();
	assert_eq!(texts, ["first", "second", "third"]);

	for pair in log.windows(2) {
		assert!(
			pair[1].at - pair[0].at >= Duration::from_secs(1),
			"sends must be at least 1s apart"
		);
	}

	h.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn duplicate_messages_are_skipped() {
	let h = Harness::new();
	let id = h.create(config(1)).await;

	h.publish(1, 1, "hello");
	h.publish(1, 1, "hello");
	h.publish(1, 2, "world");

	eventually(|| h.supervisor.task(&id).unwrap().stats.forwarded == 2).await;
	assert_eq!(h.supervisor.task(&id).unwrap().stats.processed, 2);

	h.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn failures_are_counted() {
	let h = Harness::new();
	let id = h.create(config(1)).await;

	h.platform.script_sends(
		&target(1),
		[
			Err(PlatformError::PermissionDenied(target(1))),
			Err(PlatformError::Timeout),
		],
	);

	for message_id in 1..=3 {
		h.publish(1, message_id, "hello");
	}

	eventually(|| h.supervisor.task(&id).unwrap().stats.in_flight() == 0).await;
	eventually(|| h.supervisor.task(&id).unwrap().stats.processed == 3).await;

	let stats = h.supervisor.task(&id).unwrap().stats;
	assert_eq!(stats.failed, 1, "the permanent error");
	assert_eq!(stats.forwarded, 2, "the timeout has been retried");
	assert_eq!(stats.forwarded + stats.failed + stats.filtered, stats.processed);
	assert!(stats.last_error.is_some(), "the permanent error must be remembered");

	h.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn deleting_a_task_doesnt_affect_others() {
	let h = Harness::new();
	let a = h.create(config(1)).await;
	let b = h.create(config(2)).await;

	h.publish(1, 1, "to a");
	h.publish(2, 1, "to b");
	eventually(|| h.supervisor.task(&b).unwrap().stats.forwarded == 1).await;

	h.supervisor.delete_task(&a).await.unwrap();
	assert_eq!(h.platform.subscriber_count(&source(1)), 0);
	assert_matches!(
		h.supervisor.task(&a),
		Err(AdminError::Store(StoreError::NotFound(_)))
	);

	let task_b = h.supervisor.task(&b).unwrap();
	assert_eq!(task_b.worker, WorkerState::Running);
	assert_eq!(task_b.stats.forwarded, 1);

	h.publish(2, 2, "to b again");
	eventually(|| h.supervisor.task(&b).unwrap().stats.forwarded == 2).await;

	let status = h.supervisor.status();
	assert_eq!(status.total, 1);
	assert_eq!(status.running, 1);

	h.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn disabling_stops_the_worker() {
	let h = Harness::new();
	let id = h.create(config(1)).await;

	h.supervisor.disable_task(&id).await.unwrap();
	let task = h.supervisor.task(&id).unwrap();
	assert!(!task.config.enabled, "the task must be disabled");
	assert_eq!(task.worker, WorkerState::Stopped);
	assert_eq!(h.platform.subscriber_count(&source(1)), 0);

	h.supervisor.enable_task(&id).await.unwrap();
	eventually(|| h.platform.subscriber_count(&source(1)) == 1).await;
	eventually(|| h.supervisor.task(&id).unwrap().worker == WorkerState::Running).await;

	h.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn changing_the_source_restarts_the_worker() {
	let h = Harness::new();
	let id = h.create(config(1)).await;

	let patch = ConfigPatch {
		source: Some(source(3)),
		..Default::default()
	};
	h.supervisor.update_task(&id, patch).await.unwrap();

	assert_eq!(h.platform.subscriber_count(&source(1)), 0);
	eventually(|| h.platform.subscriber_count(&source(3)) == 1).await;

	h.publish(3, 1, "from the new source");
	eventually(|| h.supervisor.task(&id).unwrap().stats.forwarded == 1).await;

	h.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn source_change_stops_the_old_worker_first() {
	let h = Harness::new();
	let id = h.create(config(1)).await;
	h.platform.set_send_latency(Duration::from_secs(5));

	h.publish(1, 1, "in flight");
	h.publish(1, 2, "queued");
	eventually(|| h.supervisor.task(&id).unwrap().stats.processed == 1).await;

	let patch = ConfigPatch {
		source: Some(source(3)),
		target: Some(target(3)),
		..Default::default()
	};
	h.supervisor.update_task(&id, patch).await.unwrap();

	// the message in flight went out under the old config and nothing else was taken from the old source
	assert_eq!(h.platform.delivered_to(&target(1)).len(), 1);
	assert!(
		h.platform.delivered_to(&target(3)).is_empty(),
		"old source must never reach the new target"
	);
	assert_eq!(h.supervisor.task(&id).unwrap().stats.processed, 1);
	eventually(|| h.platform.subscriber_count(&source(3)) == 1).await;

	// a rejected source change keeps the worker running
	let bad = ConfigPatch {
		source: Some(target(3)),
		..Default::default()
	};
	let err = h.supervisor.update_task(&id, bad).await.unwrap_err();
	assert_matches!(err.as_config_error(), Some(ConfigError::SameSourceAndTarget(_)));
	eventually(|| h.platform.subscriber_count(&source(3)) == 1).await;
	eventually(|| h.supervisor.task(&id).unwrap().worker == WorkerState::Running).await;

	h.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn other_changes_apply_without_a_restart() {
	let h = Harness::new();
	let id = h.create(config(1)).await;

	let patch = ConfigPatch {
		header: Some(Decoration::new("UPDATED")),
		..Default::default()
	};
	h.supervisor.update_task(&id, patch).await.unwrap();
	assert_eq!(h.platform.subscriber_count(&source(1)), 1);

	h.publish(1, 1, "text");
	eventually(|| h.supervisor.task(&id).unwrap().stats.forwarded == 1).await;
	assert_eq!(
		h.platform.delivered_to(&target(1))[0].text.as_deref(),
		Some("UPDATED\ntext")
	);

	h.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn invalid_configs_are_rejected() {
	let h = Harness::new();

	let mut bad = config(1);
	bad.target = bad.source.clone();
	let err = h.supervisor.create_task(bad).await.unwrap_err();
	assert_matches!(err.as_config_error(), Some(ConfigError::SameSourceAndTarget(_)));
	assert!(h.supervisor.tasks().is_empty(), "nothing must be created");

	h.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn lost_subscription_is_restarted() {
	let h = Harness::new();
	let id = h.create(config(1)).await;

	h.platform.break_subscriptions(&source(1));
	eventually(|| h.supervisor.task(&id).unwrap().worker == WorkerState::Restarting).await;
	eventually(|| h.platform.subscriber_count(&source(1)) == 1).await;
	eventually(|| h.supervisor.task(&id).unwrap().worker == WorkerState::Running).await;

	h.publish(1, 1, "after the restart");
	eventually(|| h.supervisor.task(&id).unwrap().stats.forwarded == 1).await;

	h.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn task_is_marked_failed_after_too_many_restarts() {
	let h = Harness::new();
	h.platform.refuse_subscriptions(&source(1), true);

	let id = h.supervisor.create_task(config(1)).await.unwrap();
	eventually(|| h.supervisor.task(&id).unwrap().health.is_failed()).await;

	let task = h.supervisor.task(&id).unwrap();
	assert!(!task.config.enabled, "a failed task must be disabled");
	assert_eq!(task.worker, WorkerState::Stopped);
	assert_matches!(task.health, Health::Failed { ref reason, .. } if reason.contains("refused"));

	// nothing is restarted anymore
	sleep(Duration::from_secs(60)).await;
	assert_eq!(h.platform.subscriber_count(&source(1)), 0);

	h.platform.refuse_subscriptions(&source(1), false);
	h.supervisor.enable_task(&id).await.unwrap();
	eventually(|| h.platform.subscriber_count(&source(1)) == 1).await;

	let task = h.supervisor.task(&id).unwrap();
	assert_eq!(task.health, Health::Ok);
	assert!(task.config.enabled, "enabling clears the failure");

	h.shutdown().await;
}

/// Receives messages like a [`MemoryPlatform`] but panics on every send
struct PanicOnSend(MemoryPlatform);

impl Platform for PanicOnSend {
	async fn subscribe(&self, source: &ChannelRef) -> Result<Subscription, PlatformError> {
		self.0.subscribe(source).await
	}

	async fn send(
		&self,
		_target: &ChannelRef,
		_payload: &OutboundPayload,
	) -> Result<SentMessage, PlatformError> {
		panic!("send exploded");
	}
}

#[tokio::test(start_paused = true)]
async fn panicking_send_still_settles_the_message() {
	let platform = MemoryPlatform::new();
	let supervisor = Supervisor::new(PanicOnSend(platform.clone()), (), settings());

	let (token, stop) = CancellationToken::new();
	let runner = tokio::spawn({
		let supervisor = supervisor.clone();
		async move { supervisor.run(token).await }
	});

	let id = supervisor.create_task(config(1)).await.unwrap();
	eventually(|| platform.subscriber_count(&source(1)) == 1).await;

	platform.publish(&source(1), InboundMessage::text(source(1), 1, "boom"));
	eventually(|| supervisor.task(&id).unwrap().stats.processed == 1).await;
	eventually(|| supervisor.task(&id).unwrap().stats.in_flight() == 0).await;

	let stats = supervisor.task(&id).unwrap().stats;
	assert_eq!(stats.forwarded + stats.failed + stats.filtered, stats.processed);
	assert_eq!(stats.failed, 1);
	assert_eq!(stats.last_error.as_deref(), Some("worker panicked"));

	stop.stop();
	runner.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn shutdown_finishes_the_message_in_flight() {
	let h = Harness::new();
	let id = h.create(config(1)).await;
	h.platform.set_send_latency(Duration::from_secs(5));

	h.publish(1, 1, "slow");
	eventually(|| h.supervisor.task(&id).unwrap().stats.processed == 1).await;

	let supervisor = h.supervisor.clone();
	let platform = h.platform.clone();
	h.shutdown().await;

	let task = supervisor.task(&id).unwrap();
	assert_eq!(task.stats.forwarded, 1);
	assert_eq!(task.worker, WorkerState::Stopped);
	assert_eq!(platform.subscriber_count(&source(1)), 0);
}

/// Remembers every saved task set and loads a preset one
#[derive(Clone, Default)]
struct Recorder {
	preset: Vec<TaskRecord>,
	saved: Arc<Mutex<Vec<Vec<TaskRecord>>>>,
}

impl Recorder {
	fn last_saved(&self) -> Vec<TaskRecord> {
		self.saved.lock().unwrap().last().cloned().unwrap_or_default()
	}
}

impl Persist for Recorder {
	async fn load(&self) -> Result<Vec<TaskRecord>, PersistError> {
		Ok(self.preset.clone())
	}

	async fn save(&self, records: &[TaskRecord]) -> Result<(), PersistError> {
		self.saved.lock().unwrap().push(records.to_vec());
		Ok(())
	}
}

#[tokio::test(start_paused = true)]
async fn mutations_are_persisted() {
	let recorder = Recorder::default();
	let h = Harness::with_persist(recorder.clone());

	let a = h.create(config(1)).await;
	let b = h.create(config(2)).await;
	assert_eq!(recorder.last_saved().len(), 2);

	h.supervisor.disable_task(&a).await.unwrap();
	let saved = recorder.last_saved();
	assert_eq!(saved[0].task_id, a.as_str());
	assert!(!saved[0].enabled, "disabling must be persisted");

	h.supervisor.delete_task(&b).await.unwrap();
	assert_eq!(recorder.last_saved().len(), 1);

	// statistics aren't persisted
	h.supervisor.reset_stats(&a).await.unwrap();
	assert_eq!(recorder.saved.lock().unwrap().len(), 4);

	h.shutdown().await;
}

/// A [`Recorder`] whose first save takes a while
#[derive(Clone, Default)]
struct SlowFirstSave {
	recorder: Recorder,
	delayed: Arc<AtomicBool>,
}

impl Persist for SlowFirstSave {
	async fn load(&self) -> Result<Vec<TaskRecord>, PersistError> {
		self.recorder.load().await
	}

	async fn save(&self, records: &[TaskRecord]) -> Result<(), PersistError> {
		if !self.delayed.swap(true, Ordering::SeqCst) {
			sleep(Duration::from_millis(100)).await;
		}

		self.recorder.save(records).await
	}
}

#[tokio::test(start_paused = true)]
async fn overlapping_mutations_are_saved_in_order() {
	let persist = SlowFirstSave::default();
	let h = Harness::with_persist(persist.clone());

	let first = tokio::spawn({
		let supervisor = h.supervisor.clone();
		async move { supervisor.create_task(config(1)).await }
	});
	sleep(Duration::from_millis(10)).await;

	h.supervisor.create_task(config(2)).await.unwrap();
	first.await.unwrap().unwrap();

	assert_eq!(h.supervisor.tasks().len(), 2);
	assert_eq!(
		persist.recorder.last_saved().len(),
		2,
		"the last save must hold the latest task set"
	);

	h.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn saved_tasks_are_loaded() {
	let recorder = Recorder {
		preset: vec![
			TaskRecord {
				task_id: "task_7".to_owned(),
				name: "saved".to_owned(),
				source_chat: "@source_1".to_owned(),
				target_chat: "-100001".to_owned(),
				forward_delay: 0.0,
				..Default::default()
			},
			TaskRecord {
				task_id: "broken".to_owned(),
				name: "broken".to_owned(),
				source_chat: "not a channel!".to_owned(),
				target_chat: "-100001".to_owned(),
				..Default::default()
			},
		],
		..Default::default()
	};
	let h = Harness::with_persist(recorder);

	assert_eq!(h.supervisor.load().await.unwrap(), 1, "the broken record is skipped");
	h.supervisor.reconcile().await;
	eventually(|| h.platform.subscriber_count(&source(1)) == 1).await;

	h.publish(1, 1, "hello");
	let id = TaskId::from("task_7");
	eventually(|| h.supervisor.task(&id).unwrap().stats.forwarded == 1).await;

	// new ids never collide with the loaded ones
	let new = h.supervisor.create_task(config(2)).await.unwrap();
	assert_ne!(new, id);

	h.shutdown().await;
}
