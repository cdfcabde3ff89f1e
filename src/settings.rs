/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! This module contains [`EngineSettings`], engine-wide tunables with sane defaults.
//!
//! Every field can be omitted when deserializing, durations are written as (possibly fractional) seconds:
//! ```json
//! {
//!     "max_tasks": 50,
//!     "delivery": { "base_delay": 2, "jitter": false },
//!     "restart": { "limit": 3 }
//! }
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Engine-wide settings
#[derive(Clone, PartialEq, Default, Debug, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineSettings {
	/// Maximum number of tasks. No limit if `None`
	pub max_tasks: Option<usize>,

	/// Backoff between retries of a failed send
	pub delivery: BackoffSettings,

	/// How workers that died are restarted
	pub restart: RestartPolicy,
}

/// Exponential backoff between delivery retries
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BackoffSettings {
	/// Delay before the first retry. Doubles with every next one
	#[serde(with = "duration_secs")]
	pub base_delay: Duration,

	/// The delay never grows past this
	#[serde(with = "duration_secs")]
	pub max_delay: Duration,

	/// The longest flood wait requested by the platform that is honoured
	#[serde(with = "duration_secs")]
	pub flood_wait_cap: Duration,

	/// Randomize each delay within ±50%
	pub jitter: bool,
}

/// When and how fast dead workers are restarted
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RestartPolicy {
	/// After this many consecutive abnormal exits the task is marked failed and disabled
	pub limit: u32,

	/// Delay before the first restart. Doubles with every next consecutive one
	#[serde(with = "duration_secs")]
	pub base_delay: Duration,

	/// The delay never grows past this
	#[serde(with = "duration_secs")]
	pub max_delay: Duration,

	/// A worker that has been running for longer than this before exiting resets the consecutive exit count
	#[serde(with = "duration_secs")]
	pub stable_after: Duration,
}

impl Default for BackoffSettings {
	fn default() -> Self {
		Self {
			base_delay: Duration::from_secs(1),
			max_delay: Duration::from_secs(60),
			flood_wait_cap: Duration::from_secs(60),
			jitter: true,
		}
	}
}

impl Default for RestartPolicy {
	fn default() -> Self {
		Self {
			limit: 5,
			base_delay: Duration::from_secs(5),
			max_delay: Duration::from_secs(5 * 60 /* secs in a min */),
			stable_after: Duration::from_secs(60),
		}
	}
}

impl RestartPolicy {
	/// How long to wait before restarting a worker that exited `consecutive_exits` times in a row
	#[must_use]
	pub fn delay(&self, consecutive_exits: u32) -> Duration {
		self.base_delay
			.saturating_mul(2u32.saturating_pow(consecutive_exits.saturating_sub(1)))
			.min(self.max_delay)
	}
}

pub(crate) mod duration_secs {
	use std::time::Duration;

	use serde::{Deserialize, Deserializer, Serializer, de::Error};

	pub(crate) fn serialize<S: Serializer>(dur: &Duration, s: S) -> Result<S::Ok, S::Error> {
		s.serialize_f64(dur.as_secs_f64())
	}

	pub(crate) fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
		let secs = f64::deserialize(d)?;
		Duration::try_from_secs_f64(secs)
			.map_err(|_| D::Error::custom(format!("{secs} is not a valid amount of seconds")))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn partial_settings_fill_in_defaults() {
		let settings: EngineSettings = serde_json::from_str(
			r#"{ "max_tasks": 2, "delivery": { "base_delay": 0.5 }, "restart": { "limit": 3 } }"#,
		)
		.unwrap();

		assert_eq!(settings.max_tasks, Some(2));
		assert_eq!(settings.delivery.base_delay, Duration::from_millis(500));
		assert_eq!(settings.delivery.max_delay, BackoffSettings::default().max_delay);
		assert_eq!(settings.restart.limit, 3);
		assert_eq!(settings.restart.stable_after, Duration::from_secs(60));
	}

	#[test]
	fn negative_durations_are_rejected() {
		assert!(
			serde_json::from_str::<BackoffSettings>(r#"{ "base_delay": -1 }"#).is_err(),
			"negative delay must not parse"
		);
	}

	#[test]
	fn restart_delay_doubles_up_to_the_cap() {
		let policy = RestartPolicy::default();
		assert_eq!(policy.delay(1), Duration::from_secs(5));
		assert_eq!(policy.delay(2), Duration::from_secs(10));
		assert_eq!(policy.delay(4), Duration::from_secs(40));
		assert_eq!(policy.delay(20), Duration::from_secs(300));
	}
}
