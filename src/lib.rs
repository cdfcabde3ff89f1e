/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! `relay` is a multi-task forwarding engine that relays messages from source channels
//! of a messaging platform to target channels.
//!
//! Every relay is a [`Task`](`task::Task`) with its own filters, text transformations, rate limit and retry policy.
//! Each enabled task gets its own isolated [`worker`] which drives the messages of the task's source through
//!
//! 1. the [`pipeline`] (kind/blacklist/whitelist filters, replacements, cleaning, header & footer),
//! 2. the per-task [`RateLimiter`](`rate_limit::RateLimiter`),
//! 3. the [`DeliveryExecutor`](`delivery::DeliveryExecutor`) that retries transient errors with exponential backoff,
//!
//! and records the results in the [`TaskStore`](`store::TaskStore`).
//!
//! The [`Supervisor`] owns the workers. All administrative operations go through it,
//! it starts and stops workers as tasks get enabled, disabled or deleted,
//! and restarts workers that lost their subscription.
//!
//! The messaging platform itself is abstracted away behind the [`Platform`](`platform::Platform`) trait.
//! See [`MemoryPlatform`](`platform::memory::MemoryPlatform`) for an in-process implementation
//! and `TelegramPlatform` (feature `telegram`) for a Telegram Bot API one.
//!
//! # Example
//! ```no_run
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! use relay::{
//!     Supervisor,
//!     cancellation_token::CancellationToken,
//!     platform::memory::MemoryPlatform,
//!     settings::EngineSettings,
//!     task::{Decoration, TaskConfig},
//! };
//!
//! let platform = MemoryPlatform::new();
//! let supervisor = Supervisor::new(platform, (), EngineSettings::default());
//!
//! let config = TaskConfig::builder()
//!     .name("news")
//!     .source("@news_source".parse()?)
//!     .target("@news_mirror".parse()?)
//!     .header(Decoration::new("NEWS:"))
//!     .build();
//!
//! let task_id = supervisor.create_task(config).await?;
//! println!("{}", supervisor.status());
//!
//! let (token, stop) = CancellationToken::new();
//! # drop(stop);
//! supervisor.run(token).await;
//! # let _ = task_id;
//! # Ok(())
//! # }
//! ```

pub mod cancellation_token;
pub mod channel;
pub mod delivery;
pub mod error;
pub mod message;
pub mod persistence;
pub mod pipeline;
pub mod platform;
pub mod rate_limit;
pub mod settings;
pub mod status;
pub mod store;
pub mod supervisor;
pub mod task;
pub mod worker;

#[cfg(feature = "scaffold")]
pub mod scaffold;

pub use self::{
	channel::ChannelRef,
	message::{InboundMessage, OutboundPayload},
	store::TaskStore,
	supervisor::Supervisor,
	task::{TaskConfig, TaskId},
};
