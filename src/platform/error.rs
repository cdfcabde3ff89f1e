/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use std::{error::Error as StdError, time::Duration};

use crate::channel::ChannelRef;

type BoxError = Box<dyn StdError + Send + Sync>;

/// An error returned by a [`Platform`](`super::Platform`)
#[expect(missing_docs, reason = "error message is self-documenting")]
#[derive(thiserror::Error, Debug)]
pub enum PlatformError {
	#[error("Rate limited by the platform")]
	RateLimited,

	#[error("Flood wait, retry after {0:?}")]
	RetryAfter(Duration),

	#[error("Network error")]
	Network(#[source] BoxError),

	#[error("Request timed out")]
	Timeout,

	#[error("Channel {0} doesn't exist or isn't accessible")]
	InvalidTarget(ChannelRef),

	#[error("Not enough permissions in {0}")]
	PermissionDenied(ChannelRef),

	#[error("Message rejected: {0}")]
	ContentRejected(String),

	#[error(transparent)]
	Other(BoxError),
}

/// Whether retrying the failed operation makes any sense
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ErrorClass {
	/// The same request may succeed later
	Transient,

	/// The same request will fail again
	Permanent,
}

impl PlatformError {
	#[expect(missing_docs, reason = "self-explanatory")]
	pub fn network(e: impl Into<BoxError>) -> Self {
		Self::Network(e.into())
	}

	#[expect(missing_docs, reason = "self-explanatory")]
	pub fn other(e: impl Into<BoxError>) -> Self {
		Self::Other(e.into())
	}

	/// Classifies the error as either [`ErrorClass::Transient`] or [`ErrorClass::Permanent`]
	#[must_use]
	pub fn class(&self) -> ErrorClass {
		match self {
			Self::RateLimited | Self::RetryAfter(_) | Self::Network(_) | Self::Timeout => {
				ErrorClass::Transient
			}
			Self::InvalidTarget(_)
			| Self::PermissionDenied(_)
			| Self::ContentRejected(_)
			| Self::Other(_) => ErrorClass::Permanent,
		}
	}

	#[expect(missing_docs, reason = "self-explanatory")]
	#[must_use]
	pub fn is_transient(&self) -> bool {
		self.class() == ErrorClass::Transient
	}

	/// How long the platform asked us to wait before the next request, if it did
	#[must_use]
	pub fn retry_after(&self) -> Option<Duration> {
		match self {
			Self::RetryAfter(dur) => Some(*dur),
			_ => None,
		}
	}
}
