/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! This module contains [`DeliveryExecutor`] that sends payloads to their target,
//! retrying transient platform errors with an exponential backoff

pub mod backoff;

use tokio::time::sleep;

use crate::{
	channel::ChannelRef,
	error::ErrorChainDisplay,
	message::{OutboundPayload, SentMessage},
	platform::{ErrorClass, Platform},
	settings::BackoffSettings,
	task::{Outcome, TaskId},
};

/// Delivers payloads, retrying them if the platform failed transiently
#[derive(Clone, Default, Debug)]
pub struct DeliveryExecutor {
	backoff: BackoffSettings,
}

/// The result of delivering a single payload
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct DeliveryReport {
	/// Whether the payload has been delivered, and why not if it hasn't
	pub outcome: Outcome,

	/// How many times the payload has been sent. Never exceeds `max_retries + 1`
	pub attempts: u32,

	/// The message created in the target channel
	pub sent: Option<SentMessage>,
}

impl DeliveryExecutor {
	/// Creates a new [`DeliveryExecutor`] that pauses between retries according to `backoff`
	#[must_use]
	pub fn new(backoff: BackoffSettings) -> Self {
		Self { backoff }
	}

	/// Sends `payload` to `target`.
	///
	/// Transient errors are retried up to `max_retries` times, permanent errors fail right away.
	/// Only the calling task waits during the pauses
	#[tracing::instrument(level = "debug", skip_all, fields(task = %task_id, %target))]
	pub async fn deliver<P: Platform>(
		&self,
		platform: &P,
		task_id: &TaskId,
		target: &ChannelRef,
		payload: &OutboundPayload,
		max_retries: u32,
	) -> DeliveryReport {
		let mut attempts = 0;

		loop {
			attempts += 1;

			let err = match platform.send(target, payload).await {
				Ok(sent) => {
					tracing::debug!("Delivered to {target} on attempt {attempts}");

					return DeliveryReport {
						outcome: Outcome::Forwarded,
						attempts,
						sent: Some(sent),
					};
				}
				Err(e) => e,
			};

			let reason = ErrorChainDisplay(&err).to_string();

			if err.class() == ErrorClass::Permanent {
				tracing::error!("Task {task_id}: can't deliver to {target}: {reason}");

				return DeliveryReport {
					outcome: Outcome::Failed { reason },
					attempts,
					sent: None,
				};
			}

			// the first attempt isn't a retry
			let retry = attempts;
			if retry > max_retries {
				tracing::error!(
					"Task {task_id}: giving up delivering to {target} after {attempts} attempts: {reason}"
				);

				return DeliveryReport {
					outcome: Outcome::Failed { reason },
					attempts,
					sent: None,
				};
			}

			let pause = backoff::retry_delay(&self.backoff, retry, err.retry_after(), rand::rng());
			tracing::warn!(
				"Task {task_id}: delivery to {target} failed ({reason}), retry {retry}/{max_retries} in {pause:?}"
			);

			sleep(pause).await;
		}
	}
}
