/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! This module contains [`WordFilter`], the matcher behind the blacklist, the whitelist and the line cleaner

use crate::task::WordList;

/// A set of terms matched as case-insensitive substrings
#[derive(Clone, Debug)]
pub struct WordFilter {
	/// Lowercased, trimmed and non-empty
	terms: Vec<String>,
}

impl WordFilter {
	/// Creates a new [`WordFilter`] from a [`WordList`], or `None` if the list is inactive
	#[must_use]
	pub fn new(list: &WordList) -> Option<Self> {
		if !list.is_active() {
			return None;
		}

		let terms = list
			.words
			.iter()
			.map(|w| w.trim())
			.filter(|w| !w.is_empty())
			.map(str::to_lowercase)
			.collect();

		Some(Self { terms })
	}

	/// Returns the first term that appears in `text`
	#[must_use]
	pub fn find(&self, text: &str) -> Option<&str> {
		let text = text.to_lowercase();
		self.terms
			.iter()
			.find(|term| text.contains(term.as_str()))
			.map(String::as_str)
	}

	#[expect(missing_docs, reason = "self-explanatory")]
	#[must_use]
	pub fn matches(&self, text: &str) -> bool {
		self.find(text).is_some()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn case_insensitive_substring() {
		let f = WordFilter::new(&WordList::new(["AD", " promo "])).unwrap();
		assert_eq!(f.find("this is an ad"), Some("ad"));
		assert_eq!(f.find("PROMOtion"), Some("promo"));
		assert_eq!(f.find("nothing here"), None);
	}

	#[test]
	fn inactive_lists() {
		assert!(WordFilter::new(&WordList::default()).is_none(), "disabled list");
		assert!(WordFilter::new(&WordList::new(["", "  "])).is_none(), "blank words only");
	}
}
