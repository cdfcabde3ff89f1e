/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! This module contains [`Cleaner`] that strips links, hashtags, formatting and unwanted lines from a text

use std::borrow::Cow;

use once_cell::sync::Lazy;
use regex::Regex;

use super::filter::WordFilter;
use crate::task::Cleaning;

#[expect(clippy::unwrap_used, reason = "the regex is hardcoded and known to be valid")]
static LINK_RE: Lazy<Regex> = Lazy::new(|| {
	Regex::new(r"(?i)https?://\S+|www\.\S+|(?:t|telegram)\.me/[\w+/]+").unwrap()
});

#[expect(clippy::unwrap_used, reason = "the regex is hardcoded and known to be valid")]
static HASHTAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"#\w+").unwrap());

#[expect(clippy::unwrap_used, reason = "the regex is hardcoded and known to be valid")]
static FORMATTING_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[*_`~]").unwrap());

/// Removes parts of the text line by line
#[derive(Clone, Debug)]
pub struct Cleaner {
	links: bool,
	hashtags: bool,
	formatting: bool,
	empty_lines: bool,
	lines_with_words: Option<WordFilter>,
}

impl Cleaner {
	/// Creates a new [`Cleaner`], or `None` if nothing is going to be cleaned
	#[must_use]
	pub fn new(cleaning: &Cleaning) -> Option<Self> {
		let this = Self {
			links: cleaning.links,
			hashtags: cleaning.hashtags,
			formatting: cleaning.formatting,
			empty_lines: cleaning.empty_lines,
			lines_with_words: WordFilter::new(&cleaning.lines_with_words),
		};

		let does_something = this.links
			|| this.hashtags
			|| this.formatting
			|| this.empty_lines
			|| this.lines_with_words.is_some();

		does_something.then_some(this)
	}

	/// Cleans `text`.
	///
	/// Lines no rule has touched are kept byte for byte, line endings included.
	/// Trailing whitespace is trimmed only from the lines something has been removed from
	#[must_use]
	pub fn clean(&self, text: &str) -> String {
		let mut cleaned = String::with_capacity(text.len());

		for segment in text.split_inclusive('\n') {
			let (line, ending) = split_line_ending(segment);

			if self
				.lines_with_words
				.as_ref()
				.is_some_and(|words| words.matches(line))
			{
				continue;
			}

			let mut line = Cow::Borrowed(line);
			for (enabled, re) in [
				(self.links, &LINK_RE),
				(self.hashtags, &HASHTAG_RE),
				(self.formatting, &FORMATTING_RE),
			] {
				if !enabled {
					continue;
				}

				let replaced = match re.replace_all(&line, "") {
					Cow::Owned(replaced) => Some(replaced),
					Cow::Borrowed(_) => None,
				};

				if let Some(replaced) = replaced {
					line = Cow::Owned(replaced);
				}
			}

			let line = match &line {
				Cow::Borrowed(untouched) => *untouched,
				Cow::Owned(changed) => changed.trim_end(),
			};

			if self.empty_lines && line.trim().is_empty() {
				continue;
			}

			cleaned.push_str(line);
			cleaned.push_str(ending);
		}

		// the last line of the text might have been removed, leaving the one before it dangling
		if !text.ends_with('\n') {
			let (line, _) = split_line_ending(&cleaned);
			cleaned.truncate(line.len());
		}

		cleaned
	}
}

/// Splits a line into its contents and its `\n` or `\r\n` ending
fn split_line_ending(line: &str) -> (&str, &str) {
	let contents = line
		.strip_suffix("\r\n")
		.or_else(|| line.strip_suffix('\n'))
		.unwrap_or(line);

	line.split_at(contents.len())
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::task::WordList;

	fn cleaner(f: impl FnOnce(&mut Cleaning)) -> Cleaner {
		let mut cleaning = Cleaning::default();
		f(&mut cleaning);
		Cleaner::new(&cleaning).unwrap()
	}

	#[test]
	fn nothing_enabled() {
		assert!(Cleaner::new(&Cleaning::default()).is_none(), "default cleaning does nothing");
	}

	#[test]
	fn links() {
		let c = cleaner(|c| c.links = true);
		assert_eq!(
			c.clean("read https://example.com/a?b=c and www.test.org or t.me/channel now"),
			"read  and  or  now"
		);
	}

	#[test]
	fn hashtags_and_formatting() {
		let c = cleaner(|c| {
			c.hashtags = true;
			c.formatting = true;
		});
		assert_eq!(c.clean("*bold* _it_ #news #breaking"), "bold it");
	}

	#[test]
	fn lines() {
		let c = cleaner(|c| {
			c.empty_lines = true;
			c.lines_with_words = WordList::new(["subscribe"]);
		});
		assert_eq!(c.clean("first\n\n   \nSubscribe to us!\nlast"), "first\nlast");
	}

	#[test]
	fn cleaning_twice_changes_nothing() {
		let c = cleaner(|c| {
			c.links = true;
			c.hashtags = true;
			c.formatting = true;
			c.empty_lines = true;
		});
		let once = c.clean("hi https://x.y #tag\n\n**bye**");
		assert_eq!(c.clean(&once), once);
	}

	#[test]
	fn untouched_lines_are_kept_as_is() {
		let c = cleaner(|c| c.hashtags = true);
		assert_eq!(
			c.clean("  indented  \r\nplain #tag\r\n\r\nlast  "),
			"  indented  \r\nplain\r\n\r\nlast  "
		);
	}

	#[test]
	fn removed_last_line_leaves_no_dangling_newline() {
		let c = cleaner(|c| c.lines_with_words = WordList::new(["promo"]));
		assert_eq!(c.clean("news\r\npromo code"), "news");
		assert_eq!(c.clean("news\npromo code\n"), "news\n");
	}
}
