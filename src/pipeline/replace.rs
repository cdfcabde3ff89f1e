/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! This module contains [`Replacer`] that applies [`Replacements`] to a text

use std::borrow::Cow;

use itertools::Itertools;
use regex::{Captures, Regex};

use crate::task::{ConfigError, Replacements};

/// All replacement pairs compiled into a single regex.
///
/// Alternatives are tried in order at each position, so if several patterns match at the same place,
/// the one listed first wins. Replaced text is never matched again
#[derive(Clone, Debug)]
pub struct Replacer {
	re: Regex,
	to: Vec<String>,
}

impl Replacer {
	/// Compiles `replacements`, or returns `None` if they are disabled or empty
	///
	/// # Errors
	/// * if a pattern is empty
	/// * if the patterns are too large to be compiled
	pub fn new(replacements: &Replacements) -> Result<Option<Self>, ConfigError> {
		if !replacements.enabled || replacements.pairs.is_empty() {
			return Ok(None);
		}

		if replacements.pairs.iter().any(|pair| pair.from.is_empty()) {
			return Err(ConfigError::EmptyReplacementPattern);
		}

		let re = replacements
			.pairs
			.iter()
			.map(|pair| format!("({})", regex::escape(&pair.from)))
			.join("|");

		Ok(Some(Self {
			re: Regex::new(&re).map_err(ConfigError::BadReplacements)?,
			to: replacements
				.pairs
				.iter()
				.map(|pair| pair.to.clone())
				.collect(),
		}))
	}

	#[expect(missing_docs, reason = "self-explanatory")]
	#[must_use]
	pub fn replace<'a>(&self, text: &'a str) -> Cow<'a, str> {
		self.re.replace_all(text, |caps: &Captures<'_>| {
			// group 0 is the whole match, pair i is group i + 1
			(1..caps.len())
				.find(|&group| caps.get(group).is_some())
				.and_then(|group| self.to.get(group - 1))
				.cloned()
				.unwrap_or_default()
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn replacer(pairs: &[(&str, &str)]) -> Replacer {
		Replacer::new(&Replacements::new(pairs.iter().copied()))
			.unwrap()
			.unwrap()
	}

	#[test]
	fn first_pair_wins() {
		let r = replacer(&[("cat", "dog"), ("category", "group")]);
		assert_eq!(r.replace("a category of cats"), "a dogegory of dogs");
	}

	#[test]
	fn replaced_text_is_not_replaced_again() {
		let r = replacer(&[("a", "b"), ("b", "c")]);
		assert_eq!(r.replace("ab"), "bc");
	}

	#[test]
	fn patterns_are_literal() {
		let r = replacer(&[("1+1", "2"), ("(x)", "y")]);
		assert_eq!(r.replace("1+1 = 11 (x)"), "2 = 11 y");
	}

	#[test]
	fn disabled_and_empty() {
		let mut disabled = Replacements::new([("a", "b")]);
		disabled.enabled = false;
		assert!(Replacer::new(&disabled).unwrap().is_none(), "disabled replacements compile to nothing");

		assert_eq!(
			Replacer::new(&Replacements::new([("", "b")])).unwrap_err(),
			ConfigError::EmptyReplacementPattern
		);
	}
}
