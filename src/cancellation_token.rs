/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! This module contains the [`CancellationToken`] and its sending half, [`StopHandle`]

use tokio::sync::watch::{self, channel};

/// The receiving end of a channel that is notified when a worker (or the whole supervisor) should stop
#[derive(Clone, Debug)]
pub struct CancellationToken(watch::Receiver<bool>);

/// The sending end of a [`CancellationToken`].
///
/// Dropping it also cancels all of its tokens.
#[derive(Debug)]
pub struct StopHandle(watch::Sender<bool>);

impl CancellationToken {
	/// Creates a new [`CancellationToken`] together with the [`StopHandle`] that cancels it
	#[must_use]
	pub fn new() -> (Self, StopHandle) {
		let (tx, rx) = channel(false);
		(Self(rx), StopHandle(tx))
	}

	/// Blocks the current task until the [`StopHandle`] asks us to stop
	pub async fn wait(&mut self) {
		// assume closed channel = cancelled
		_ = self.0.wait_for(|stop| *stop).await;
	}

	/// Checks if the [`CancellationToken`] has been signaled to stop without blocking
	#[must_use]
	pub fn is_cancelled(&self) -> bool {
		*self.0.borrow() || self.0.has_changed().is_err()
	}
}

impl StopHandle {
	/// Signals all tokens associated with this handle to stop
	pub fn stop(&self) {
		// no receivers left means nobody is listening anymore, which is fine
		_ = self.0.send(true);
	}

	/// Creates another token that listens to this handle
	#[must_use]
	pub fn token(&self) -> CancellationToken {
		CancellationToken(self.0.subscribe())
	}
}
