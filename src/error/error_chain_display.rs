/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use std::{
	error::Error as StdError,
	fmt::{self, Display},
};

/// Wrapper around a type implementing [`std::error::Error`]
/// that displays the error together with all of its sources on a single line,
/// which is what ends up in the logs and in [`StatsSnapshot::last_error`](`crate::task::StatsSnapshot::last_error`).
///
/// It may looked like this:
///
/// `Can't subscribe to @news: network error: connection reset (caused by: os error 104)`
pub struct ErrorChainDisplay<'a>(pub &'a dyn StdError);

impl Display for ErrorChainDisplay<'_> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let mut current_err = self.0;
		write!(f, "{current_err}")?;

		let mut first = true;
		while let Some(source) = StdError::source(current_err) {
			current_err = source;
			if first {
				write!(f, " (caused by: {current_err}")?;
				first = false;
			} else {
				write!(f, ": {current_err}")?;
			}
		}

		if !first {
			write!(f, ")")?;
		}

		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::ErrorChainDisplay;

	#[derive(thiserror::Error, Debug)]
	#[error("outer")]
	struct Outer(#[source] Inner);

	#[derive(thiserror::Error, Debug)]
	#[error("inner")]
	struct Inner;

	#[test]
	fn displays_whole_chain() {
		let err = Outer(Inner);
		assert_eq!(ErrorChainDisplay(&err).to_string(), "outer (caused by: inner)");
		assert_eq!(ErrorChainDisplay(&Inner).to_string(), "inner");
	}
}
