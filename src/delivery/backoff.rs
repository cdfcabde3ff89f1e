/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! This module contains the calculation of the pause between two delivery attempts

use std::time::Duration;

use rand::Rng;

use crate::settings::BackoffSettings;

/// How long to pause before retry number `retry` (starting at 1).
///
/// The pause starts at [`BackoffSettings::base_delay`] and doubles with each retry:
/// - 1st retry: base
/// - 2nd retry: base * 2
/// - 3rd retry: base * 4
///   And so on, up to [`BackoffSettings::max_delay`].
///
/// If the platform asked to wait for `retry_after`, the pause is at least that long,
/// as long as it doesn't exceed [`BackoffSettings::flood_wait_cap`]
pub fn retry_delay(
	settings: &BackoffSettings,
	retry: u32,
	retry_after: Option<Duration>,
	rng: impl Rng,
) -> Duration {
	let backoff = exponential_backoff_duration(settings, retry, rng);

	match retry_after {
		Some(requested) => {
			let requested = requested.min(settings.flood_wait_cap);
			if requested > backoff {
				tracing::debug!("Platform requested a longer pause of {requested:?}");
			}

			backoff.max(requested)
		}
		None => backoff,
	}
}

fn exponential_backoff_duration(
	settings: &BackoffSettings,
	retry: u32,
	mut rng: impl Rng,
) -> Duration {
	let base_duration = settings
		.base_delay
		.saturating_mul(2u32.saturating_pow(retry.saturating_sub(1)))
		.min(settings.max_delay);

	if !settings.jitter {
		return base_duration;
	}

	// anywhere from half to one and a half of the base duration, still never past the cap
	let jittered = base_duration.mul_f64(rng.random::<f64>() + 0.5);
	tracing::trace!("Calculated backoff: base = {base_duration:?}, with jitter = {jittered:?}");

	jittered.min(settings.max_delay)
}
