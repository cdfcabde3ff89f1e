/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! This module contains [`RateLimiter`], the per-task gate that spaces out send attempts

use std::time::Duration;

use tokio::{
	sync::Mutex,
	time::{Instant, sleep_until},
};

/// Enforces a minimum delay between two consecutive send attempts of a task.
///
/// The time of an attempt is recorded when the gate opens, not when the send completes,
/// thus a slow send doesn't push the next one further away and a fast one doesn't bring it closer.
#[derive(Default, Debug)]
pub struct RateLimiter {
	last_send: Mutex<Option<Instant>>,
}

impl RateLimiter {
	#[expect(missing_docs, reason = "self-explanatory")]
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Waits until at least `min_delay` has passed since the previous attempt, and records a new attempt.
	///
	/// A zero `min_delay` never waits. Only blocks the caller, other tasks have their own limiters
	pub async fn wait(&self, min_delay: Duration) {
		if min_delay.is_zero() {
			return;
		}

		let mut last_send = self.last_send.lock().await;

		if let Some(last) = *last_send {
			let next_allowed = last + min_delay;
			if next_allowed > Instant::now() {
				tracing::trace!(
					"Rate limited, waiting for {:?}",
					next_allowed - Instant::now()
				);
				sleep_until(next_allowed).await;
			}
		}

		*last_send = Some(Instant::now());
	}

	/// Forgets the previous attempt, the next one goes through right away
	pub async fn reset(&self) {
		*self.last_send.lock().await = None;
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test(start_paused = true)]
	async fn spaces_out_attempts() {
		let limiter = RateLimiter::new();
		let delay = Duration::from_secs(1);

		let start = Instant::now();
		let mut attempts = Vec::new();
		for _ in 0..3 {
			limiter.wait(delay).await;
			attempts.push(Instant::now());
		}

		assert_eq!(attempts[0], start, "first attempt must not wait");
		for pair in attempts.windows(2) {
			assert!(pair[1] - pair[0] >= delay, "attempts closer than {delay:?}");
		}
	}

	#[tokio::test(start_paused = true)]
	async fn slow_send_does_not_add_to_the_delay() {
		let limiter = RateLimiter::new();
		let delay = Duration::from_secs(1);

		limiter.wait(delay).await;
		let first = Instant::now();

		// the send took longer than the delay
		tokio::time::sleep(Duration::from_millis(1500)).await;

		limiter.wait(delay).await;
		assert_eq!(Instant::now() - first, Duration::from_millis(1500));
	}

	#[tokio::test(start_paused = true)]
	async fn zero_delay_never_waits() {
		let limiter = RateLimiter::new();
		let start = Instant::now();
		for _ in 0..10 {
			limiter.wait(Duration::ZERO).await;
		}

		assert_eq!(Instant::now(), start);
	}
}
