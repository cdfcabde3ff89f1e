/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use std::time::Duration;

use crate::channel::{ChannelRef, ChannelRefError};

/// The reason a [`TaskConfig`](`super::TaskConfig`) has been rejected
#[expect(missing_docs, reason = "error message is self-documenting")]
#[derive(thiserror::Error, PartialEq, Debug)]
pub enum ConfigError {
	#[error("Task name is empty")]
	EmptyName,

	#[error("Invalid {field} channel")]
	InvalidChannel {
		field: &'static str,
		#[source]
		source: ChannelRefError,
	},

	#[error("Source and target are the same channel: {0}")]
	SameSourceAndTarget(ChannelRef),

	#[error("Delay of {delay:?} is out of range, maximum is {max:?}")]
	DelayOutOfRange { delay: Duration, max: Duration },

	#[error("{0} is not a valid delay in seconds")]
	InvalidDelay(f64),

	#[error("{retries} retries is too many, maximum is {max}")]
	TooManyRetries { retries: u32, max: u32 },

	#[error("The {field} is {len} characters long, maximum is {max}")]
	TextTooLong {
		field: &'static str,
		len: usize,
		max: usize,
	},

	#[error("{count} buttons is too many, maximum is {max}")]
	TooManyButtons { count: usize, max: usize },

	#[error("Button text is empty")]
	EmptyButtonText,

	#[error("{0:?} is not a valid button url")]
	InvalidButtonUrl(String),

	#[error("Replacement pattern is empty")]
	EmptyReplacementPattern,

	#[error("{0:?} is not a valid replacement, expected \"from->to\"")]
	InvalidReplacement(String),

	#[error("Replacements couldn't be compiled")]
	BadReplacements(#[source] regex::Error),

	#[error("Maximum number of tasks ({max}) reached")]
	TooManyTasks { max: usize },
}
