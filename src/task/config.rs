/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! This module contains [`TaskConfig`] and all of its parts, as well as [`ConfigPatch`]

use std::time::Duration;

use super::ConfigError;
use crate::{
	channel::ChannelRef,
	message::{ContentKind, ForwardMode, UrlButton},
};

/// Configuration of a single source → target relay.
///
/// Every optional part has a default that doesn't change the message in any way,
/// so a config built with only the required fields just copies every message from `source` to `target`.
///
/// # Example
/// ```
/// use relay::task::{Decoration, TaskConfig, WordList};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = TaskConfig::builder()
///     .name("news")
///     .source("@news_source".parse()?)
///     .target("-1001234567890".parse()?)
///     .blacklist(WordList::new(["ad", "promo"]))
///     .header(Decoration::new("NEWS:"))
///     .build();
///
/// config.validate()?;
/// # Ok(())
/// # }
/// ```
#[derive(bon::Builder, Clone, PartialEq, Debug)]
#[non_exhaustive]
pub struct TaskConfig {
	/// Human readable name of the task
	#[builder(into)]
	pub name: String,

	/// The channel messages are taken from
	pub source: ChannelRef,

	/// The channel messages are delivered to
	pub target: ChannelRef,

	/// Disabled tasks don't have a running worker
	#[builder(default = true)]
	pub enabled: bool,

	/// Copy or forward the messages
	#[builder(default)]
	pub mode: ForwardMode,

	/// Minimum time between two consecutive send attempts
	#[builder(default = TaskConfig::DEFAULT_MIN_DELAY)]
	pub min_delay: Duration,

	/// How many times a message is re-sent after a transient error
	#[builder(default = TaskConfig::DEFAULT_MAX_RETRIES)]
	pub max_retries: u32,

	/// Which kinds of content are relayed
	#[builder(default)]
	pub kinds: ContentKinds,

	/// Drop messages containing any of these words
	#[builder(default)]
	pub blacklist: WordList,

	/// Drop messages not containing any of these words
	#[builder(default)]
	pub whitelist: WordList,

	/// Replace words in the text
	#[builder(default)]
	pub replacements: Replacements,

	/// Remove links, hashtags, etc from the text
	#[builder(default)]
	pub cleaning: Cleaning,

	/// Prepended to the text
	#[builder(default)]
	pub header: Decoration,

	/// Appended to the text
	#[builder(default)]
	pub footer: Decoration,

	/// Link buttons attached to copied messages
	#[builder(default)]
	pub buttons: Buttons,
}

/// Which [`ContentKind`]s are relayed. Everything is allowed by default
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[expect(missing_docs, reason = "each field allows the ContentKind of the same name")]
pub struct ContentKinds {
	pub text: bool,
	pub photo: bool,
	pub video: bool,
	pub animation: bool,
	pub audio: bool,
	pub voice: bool,
	pub video_note: bool,
	pub document: bool,
	pub sticker: bool,
	pub contact: bool,
	pub location: bool,
	pub poll: bool,
	pub game: bool,
}

/// A list of words used to filter messages or lines.
/// Matching is a case-insensitive substring search
#[derive(Clone, PartialEq, Eq, Default, Debug)]
pub struct WordList {
	/// A disabled list never matches
	pub enabled: bool,

	/// The words themselves
	pub words: Vec<String>,
}

/// Ordered list of replacements applied to the text of a message
#[derive(Clone, PartialEq, Eq, Default, Debug)]
pub struct Replacements {
	#[expect(missing_docs, reason = "self-explanatory")]
	pub enabled: bool,

	/// At each position of the text, the first pair whose [`Replacement::from`] matches wins
	pub pairs: Vec<Replacement>,
}

/// Replace each occurence of [`Replacement::from`] with [`Replacement::to`]
#[derive(Clone, PartialEq, Eq, Debug)]
#[expect(missing_docs, reason = "self-explanatory")]
pub struct Replacement {
	pub from: String,
	pub to: String,
}

/// What should be removed from the text of a message
#[derive(Clone, PartialEq, Eq, Default, Debug)]
pub struct Cleaning {
	/// Remove urls and t.me links
	pub links: bool,

	/// Remove #hashtags
	pub hashtags: bool,

	/// Remove markdown-ish formatting characters: `*`, `_`, `` ` ``, `~`
	pub formatting: bool,

	/// Remove blank lines
	pub empty_lines: bool,

	/// Remove whole lines that contain any of these words
	pub lines_with_words: WordList,
}

/// A header or a footer
#[derive(Clone, PartialEq, Eq, Default, Debug)]
pub struct Decoration {
	#[expect(missing_docs, reason = "self-explanatory")]
	pub enabled: bool,

	#[expect(missing_docs, reason = "self-explanatory")]
	pub text: String,
}

/// Link buttons attached to copied messages.
/// The first two buttons share the first row, the third one is placed on the second row
#[derive(Clone, PartialEq, Eq, Default, Debug)]
pub struct Buttons {
	#[expect(missing_docs, reason = "self-explanatory")]
	pub enabled: bool,

	#[expect(missing_docs, reason = "self-explanatory")]
	pub buttons: Vec<UrlButton>,
}

/// A partial update of a [`TaskConfig`]. Every field that is `None` is left as is
#[derive(Clone, PartialEq, Default, Debug)]
#[expect(missing_docs, reason = "each field replaces the TaskConfig field of the same name")]
pub struct ConfigPatch {
	pub name: Option<String>,
	pub source: Option<ChannelRef>,
	pub target: Option<ChannelRef>,
	pub enabled: Option<bool>,
	pub mode: Option<ForwardMode>,
	pub min_delay: Option<Duration>,
	pub max_retries: Option<u32>,
	pub kinds: Option<ContentKinds>,
	pub blacklist: Option<WordList>,
	pub whitelist: Option<WordList>,
	pub replacements: Option<Replacements>,
	pub cleaning: Option<Cleaning>,
	pub header: Option<Decoration>,
	pub footer: Option<Decoration>,
	pub buttons: Option<Buttons>,
}

impl TaskConfig {
	#[expect(missing_docs, reason = "self-explanatory")]
	pub const DEFAULT_MIN_DELAY: Duration = Duration::from_secs(1);
	#[expect(missing_docs, reason = "self-explanatory")]
	pub const DEFAULT_MAX_RETRIES: u32 = 3;

	#[expect(missing_docs, reason = "self-explanatory")]
	pub const MAX_NAME_LEN: usize = 128;
	#[expect(missing_docs, reason = "self-explanatory")]
	pub const MAX_MIN_DELAY: Duration = Duration::from_secs(60 * 60);
	#[expect(missing_docs, reason = "self-explanatory")]
	pub const MAX_RETRIES: u32 = 10;
	/// Maximum length of a header or a footer, in characters
	pub const MAX_DECORATION_LEN: usize = 1024;
	#[expect(missing_docs, reason = "self-explanatory")]
	pub const MAX_BUTTONS: usize = 3;
	/// Maximum length of a button's text, in characters
	pub const MAX_BUTTON_TEXT_LEN: usize = 64;

	/// Checks that every field is within its allowed range
	///
	/// # Errors
	/// The first problem found with the config
	pub fn validate(&self) -> Result<(), ConfigError> {
		let name_len = self.name.trim().chars().count();
		if name_len == 0 {
			return Err(ConfigError::EmptyName);
		}
		check_len("name", name_len, Self::MAX_NAME_LEN)?;

		if self.source == self.target {
			return Err(ConfigError::SameSourceAndTarget(self.source.clone()));
		}

		if self.min_delay > Self::MAX_MIN_DELAY {
			return Err(ConfigError::DelayOutOfRange {
				delay: self.min_delay,
				max: Self::MAX_MIN_DELAY,
			});
		}

		if self.max_retries > Self::MAX_RETRIES {
			return Err(ConfigError::TooManyRetries {
				retries: self.max_retries,
				max: Self::MAX_RETRIES,
			});
		}

		if self
			.replacements
			.pairs
			.iter()
			.any(|pair| pair.from.is_empty())
		{
			return Err(ConfigError::EmptyReplacementPattern);
		}

		check_len(
			"header",
			self.header.text.chars().count(),
			Self::MAX_DECORATION_LEN,
		)?;
		check_len(
			"footer",
			self.footer.text.chars().count(),
			Self::MAX_DECORATION_LEN,
		)?;

		if self.buttons.buttons.len() > Self::MAX_BUTTONS {
			return Err(ConfigError::TooManyButtons {
				count: self.buttons.buttons.len(),
				max: Self::MAX_BUTTONS,
			});
		}

		for button in &self.buttons.buttons {
			let len = button.text.trim().chars().count();
			if len == 0 {
				return Err(ConfigError::EmptyButtonText);
			}
			check_len("button text", len, Self::MAX_BUTTON_TEXT_LEN)?;
		}

		Ok(())
	}
}

fn check_len(field: &'static str, len: usize, max: usize) -> Result<(), ConfigError> {
	if len > max {
		Err(ConfigError::TextTooLong { field, len, max })
	} else {
		Ok(())
	}
}

impl ContentKinds {
	/// Allows every kind of content
	pub const ALL: Self = Self {
		text: true,
		photo: true,
		video: true,
		animation: true,
		audio: true,
		voice: true,
		video_note: true,
		document: true,
		sticker: true,
		contact: true,
		location: true,
		poll: true,
		game: true,
	};

	/// Disallows every kind of content
	pub const NONE: Self = Self {
		text: false,
		photo: false,
		video: false,
		animation: false,
		audio: false,
		voice: false,
		video_note: false,
		document: false,
		sticker: false,
		contact: false,
		location: false,
		poll: false,
		game: false,
	};

	/// Allows only the provided kinds
	#[must_use]
	pub fn only(kinds: impl IntoIterator<Item = ContentKind>) -> Self {
		let mut this = Self::NONE;
		for kind in kinds {
			*this.flag_mut(kind) = true;
		}

		this
	}

	/// Returns true if messages of `kind` should be relayed
	#[must_use]
	pub fn allows(&self, kind: ContentKind) -> bool {
		match kind {
			ContentKind::Text => self.text,
			ContentKind::Photo => self.photo,
			ContentKind::Video => self.video,
			ContentKind::Animation => self.animation,
			ContentKind::Audio => self.audio,
			ContentKind::Voice => self.voice,
			ContentKind::VideoNote => self.video_note,
			ContentKind::Document => self.document,
			ContentKind::Sticker => self.sticker,
			ContentKind::Contact => self.contact,
			ContentKind::Location => self.location,
			ContentKind::Poll => self.poll,
			ContentKind::Game => self.game,
		}
	}

	/// Allows or disallows `kind`
	pub fn set(&mut self, kind: ContentKind, allowed: bool) {
		*self.flag_mut(kind) = allowed;
	}

	fn flag_mut(&mut self, kind: ContentKind) -> &mut bool {
		match kind {
			ContentKind::Text => &mut self.text,
			ContentKind::Photo => &mut self.photo,
			ContentKind::Video => &mut self.video,
			ContentKind::Animation => &mut self.animation,
			ContentKind::Audio => &mut self.audio,
			ContentKind::Voice => &mut self.voice,
			ContentKind::VideoNote => &mut self.video_note,
			ContentKind::Document => &mut self.document,
			ContentKind::Sticker => &mut self.sticker,
			ContentKind::Contact => &mut self.contact,
			ContentKind::Location => &mut self.location,
			ContentKind::Poll => &mut self.poll,
			ContentKind::Game => &mut self.game,
		}
	}
}

impl Default for ContentKinds {
	fn default() -> Self {
		Self::ALL
	}
}

impl WordList {
	/// Creates a new enabled list
	#[must_use]
	pub fn new<I, S>(words: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		Self {
			enabled: true,
			words: words.into_iter().map(Into::into).collect(),
		}
	}

	/// Returns true if the list is enabled and contains at least one non-blank word
	#[must_use]
	pub fn is_active(&self) -> bool {
		self.enabled && self.words.iter().any(|w| !w.trim().is_empty())
	}
}

impl Replacements {
	/// Creates a new enabled list of replacements from `(from, to)` pairs
	#[must_use]
	pub fn new<I, F, T>(pairs: I) -> Self
	where
		I: IntoIterator<Item = (F, T)>,
		F: Into<String>,
		T: Into<String>,
	{
		Self {
			enabled: true,
			pairs: pairs
				.into_iter()
				.map(|(from, to)| Replacement {
					from: from.into(),
					to: to.into(),
				})
				.collect(),
		}
	}
}

impl Decoration {
	/// Creates a new enabled header or footer
	#[must_use]
	pub fn new(text: impl Into<String>) -> Self {
		Self {
			enabled: true,
			text: text.into(),
		}
	}

	/// Returns the text if the decoration is enabled and not empty
	#[must_use]
	pub fn active_text(&self) -> Option<&str> {
		(self.enabled && !self.text.is_empty()).then_some(self.text.as_str())
	}
}

impl Buttons {
	/// Creates a new enabled set of buttons
	#[must_use]
	pub fn new(buttons: Vec<UrlButton>) -> Self {
		Self {
			enabled: true,
			buttons,
		}
	}

	/// Lays the buttons out into rows, or returns no rows at all if the buttons are disabled
	#[must_use]
	pub fn rows(&self) -> Vec<Vec<UrlButton>> {
		if !self.enabled || self.buttons.is_empty() {
			return Vec::new();
		}

		let (first, rest) = self.buttons.split_at(self.buttons.len().min(2));
		let mut rows = vec![first.to_vec()];
		if !rest.is_empty() {
			rows.push(rest.to_vec());
		}

		rows
	}
}

impl ConfigPatch {
	/// Returns true if the patch changes the source channel of `config`
	#[must_use]
	pub fn changes_source(&self, config: &TaskConfig) -> bool {
		self.source.as_ref().is_some_and(|s| *s != config.source)
	}

	/// Applies the patch to `config`, returning the updated config
	#[must_use]
	pub fn apply(self, config: &TaskConfig) -> TaskConfig {
		let mut new = config.clone();

		macro_rules! patch {
			($($field:ident),+) => {
				$(
					if let Some(value) = self.$field {
						new.$field = value;
					}
				)+
			};
		}

		patch!(
			name,
			source,
			target,
			enabled,
			mode,
			min_delay,
			max_retries,
			kinds,
			blacklist,
			whitelist,
			replacements,
			cleaning,
			header,
			footer,
			buttons
		);

		new
	}
}
