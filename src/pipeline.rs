/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! This module contains [`Pipeline`], the compiled form of the filters and transforms of a [`TaskConfig`],
//! that decides what to do with each [`InboundMessage`]
//!
//! The stages are evaluated in order and short-circuit on the first drop:
//! 1. content kind filter
//! 2. blacklist
//! 3. whitelist
//! 4. replacements
//! 5. cleaning
//! 6. header & footer

pub mod clean;
pub mod filter;
pub mod replace;

use std::fmt;

use self::{clean::Cleaner, filter::WordFilter, replace::Replacer};
use crate::{
	message::{ContentKind, ForwardMode, InboundMessage, OutboundPayload, UrlButton},
	task::{ConfigError, ContentKinds, TaskConfig},
};

/// Filters and transforms of a task, compiled once per config change.
///
/// Evaluation is pure: the same message always produces the same [`Verdict`]
#[derive(Clone, Debug)]
pub struct Pipeline {
	mode: ForwardMode,
	kinds: ContentKinds,
	blacklist: Option<WordFilter>,
	whitelist: Option<WordFilter>,
	replacer: Option<Replacer>,
	cleaner: Option<Cleaner>,
	header: Option<String>,
	footer: Option<String>,
	buttons: Vec<Vec<UrlButton>>,
}

/// What to do with a message
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Verdict {
	/// Don't deliver the message
	Drop(DropReason),

	/// Deliver this payload to the target
	Deliver(OutboundPayload),
}

/// Why a message has been dropped
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum DropReason {
	/// The kind of the message is disabled in the task's config
	KindDisabled(ContentKind),

	/// The message contains a blacklisted term
	Blacklisted {
		#[expect(missing_docs, reason = "self-explanatory")]
		term: String,
	},

	/// The whitelist is enabled and the message doesn't contain any of its terms
	NotWhitelisted,

	/// Nothing is left to send after the transforms
	Empty,
}

impl Pipeline {
	/// Compiles the filters and transforms of `config`
	///
	/// # Errors
	/// if the replacements can't be compiled
	pub fn from_config(config: &TaskConfig) -> Result<Self, ConfigError> {
		Ok(Self {
			mode: config.mode,
			kinds: config.kinds,
			blacklist: WordFilter::new(&config.blacklist),
			whitelist: WordFilter::new(&config.whitelist),
			replacer: Replacer::new(&config.replacements)?,
			cleaner: Cleaner::new(&config.cleaning),
			header: config.header.active_text().map(ToOwned::to_owned),
			footer: config.footer.active_text().map(ToOwned::to_owned),
			buttons: config.buttons.rows(),
		})
	}

	/// Decides whether `msg` should be delivered and what it should look like
	#[must_use]
	pub fn evaluate(&self, msg: &InboundMessage) -> Verdict {
		if !self.kinds.allows(msg.kind) {
			return Verdict::Drop(DropReason::KindDisabled(msg.kind));
		}

		let text = msg.text_or_caption();

		// list filters only apply to messages that have some text
		if let Some(text) = text {
			if let Some(term) = self.blacklist.as_ref().and_then(|bl| bl.find(text)) {
				return Verdict::Drop(DropReason::Blacklisted {
					term: term.to_owned(),
				});
			}

			if self.whitelist.as_ref().is_some_and(|wl| !wl.matches(text)) {
				return Verdict::Drop(DropReason::NotWhitelisted);
			}
		}

		let payload = match self.mode {
			// forwarded messages can't be modified
			ForwardMode::Forward => OutboundPayload {
				origin: msg.origin.clone(),
				mode: ForwardMode::Forward,
				text: msg.text.clone(),
				media: msg.media.clone(),
				buttons: Vec::new(),
			},
			ForwardMode::Copy => OutboundPayload {
				origin: msg.origin.clone(),
				mode: ForwardMode::Copy,
				text: text.and_then(|text| self.transform_text(text)),
				media: msg.media.clone(),
				buttons: self.buttons.clone(),
			},
		};

		if payload.is_empty() {
			return Verdict::Drop(DropReason::Empty);
		}

		Verdict::Deliver(payload)
	}

	/// Applies replacements, cleaning and decorations to `text`. Returns `None` if nothing is left of it
	fn transform_text(&self, text: &str) -> Option<String> {
		let mut text = match &self.replacer {
			Some(replacer) => replacer.replace(text).into_owned(),
			None => text.to_owned(),
		};

		if let Some(cleaner) = &self.cleaner {
			text = cleaner.clean(&text);
		}

		if text.trim().is_empty() {
			return None;
		}

		let decorated = [self.header.as_deref(), Some(text.as_str()), self.footer.as_deref()]
			.into_iter()
			.flatten()
			.collect::<Vec<_>>()
			.join("\n");

		Some(decorated)
	}
}

impl Verdict {
	/// Returns the payload if the message should be delivered
	#[must_use]
	pub fn into_payload(self) -> Option<OutboundPayload> {
		match self {
			Self::Deliver(payload) => Some(payload),
			Self::Drop(_) => None,
		}
	}
}

impl fmt::Display for DropReason {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::KindDisabled(kind) => write!(f, "{kind:?} messages are disabled"),
			Self::Blacklisted { term } => write!(f, "contains blacklisted term {term:?}"),
			Self::NotWhitelisted => f.write_str("doesn't contain any whitelisted term"),
			Self::Empty => f.write_str("nothing left to send"),
		}
	}
}

#[cfg(test)]
mod tests {
	use assert_matches::assert_matches;

	use super::*;
	use crate::{
		channel::ChannelRef,
		message::MediaRef,
		task::{Buttons, Cleaning, Decoration, Replacements, WordList},
	};

	fn source() -> ChannelRef {
		ChannelRef::Handle("source_chan".to_owned())
	}

	fn config() -> TaskConfig {
		TaskConfig::builder()
			.name("test")
			.source(source())
			.target(ChannelRef::Id(-100_500))
			.build()
	}

	fn eval(config: &TaskConfig, msg: &InboundMessage) -> Verdict {
		Pipeline::from_config(config).unwrap().evaluate(msg)
	}

	fn text_msg(text: &str) -> InboundMessage {
		InboundMessage::text(source(), 1, text)
	}

	fn photo(caption: Option<&str>) -> InboundMessage {
		InboundMessage::media(
			source(),
			2,
			ContentKind::Photo,
			MediaRef("photo-file-id".to_owned()),
			caption.map(ToOwned::to_owned),
		)
	}

	#[test]
	fn default_config_passes_everything_through() {
		let payload = eval(&config(), &text_msg("hello")).into_payload().unwrap();
		assert_eq!(payload.text.as_deref(), Some("hello"));
		assert_eq!(payload.mode, ForwardMode::Copy);
		assert!(payload.buttons.is_empty(), "no buttons configured");
	}

	#[test]
	fn disabled_kind_is_dropped() {
		let mut c = config();
		c.kinds.photo = false;
		assert_eq!(
			eval(&c, &photo(Some("nice"))),
			Verdict::Drop(DropReason::KindDisabled(ContentKind::Photo))
		);
		assert_matches!(eval(&c, &text_msg("still fine")), Verdict::Deliver(_));
	}

	#[test]
	fn blacklist_drops() {
		let mut c = config();
		c.blacklist = WordList::new(["ad"]);
		assert_eq!(
			eval(&c, &text_msg("this is an ad")),
			Verdict::Drop(DropReason::Blacklisted {
				term: "ad".to_owned()
			})
		);
	}

	#[test]
	fn blacklist_wins_over_whitelist() {
		let mut c = config();
		c.blacklist = WordList::new(["spam"]);
		c.whitelist = WordList::new(["news"]);

		assert_matches!(
			eval(&c, &text_msg("news and spam")),
			Verdict::Drop(DropReason::Blacklisted { .. })
		);
		assert_eq!(
			eval(&c, &text_msg("weather")),
			Verdict::Drop(DropReason::NotWhitelisted)
		);
		assert_matches!(eval(&c, &text_msg("NEWS today")), Verdict::Deliver(_));
	}

	#[test]
	fn list_filters_skip_textless_messages() {
		let mut c = config();
		c.whitelist = WordList::new(["news"]);
		assert_matches!(eval(&c, &photo(None)), Verdict::Deliver(_));
	}

	#[test]
	fn header_and_footer() {
		let mut c = config();
		c.header = Decoration::new("NEWS:");
		c.footer = Decoration::new("-- ch");

		let payload = eval(&c, &text_msg("hello")).into_payload().unwrap();
		assert_eq!(payload.text.as_deref(), Some("NEWS:\nhello\n-- ch"));

		// captionless media isn't decorated
		let payload = eval(&c, &photo(None)).into_payload().unwrap();
		assert_eq!(payload.text, None);
		assert!(payload.media.is_some(), "media must be kept");
	}

	#[test]
	fn disabled_decorations_do_nothing() {
		let mut c = config();
		c.header = Decoration {
			enabled: false,
			text: "NEWS:".to_owned(),
		};
		c.footer = Decoration::new("");

		let payload = eval(&c, &text_msg("hello")).into_payload().unwrap();
		assert_eq!(payload.text.as_deref(), Some("hello"));
	}

	#[test]
	fn transforms_run_in_order() {
		let mut c = config();
		c.replacements = Replacements::new([("foo", "bar #tag")]);
		c.cleaning = Cleaning {
			hashtags: true,
			..Default::default()
		};
		c.header = Decoration::new("H");

		let payload = eval(&c, &text_msg("foo")).into_payload().unwrap();
		assert_eq!(payload.text.as_deref(), Some("H\nbar"));
	}

	#[test]
	fn cleaned_to_nothing_is_dropped() {
		let mut c = config();
		c.cleaning.links = true;
		c.header = Decoration::new("H");

		assert_eq!(
			eval(&c, &text_msg("https://example.com")),
			Verdict::Drop(DropReason::Empty)
		);

		// media survives even if its caption doesn't
		let payload = eval(&c, &photo(Some("https://example.com"))).into_payload().unwrap();
		assert_eq!(payload.text, None);
	}

	#[test]
	fn forward_mode_keeps_the_message_as_is() {
		let mut c = config();
		c.mode = ForwardMode::Forward;
		c.header = Decoration::new("H");
		c.replacements = Replacements::new([("a", "b")]);
		c.blacklist = WordList::new(["ad"]);

		let payload = eval(&c, &text_msg("aaa")).into_payload().unwrap();
		assert_eq!(payload.mode, ForwardMode::Forward);
		assert_eq!(payload.text.as_deref(), Some("aaa"));

		assert_matches!(eval(&c, &text_msg("an ad")), Verdict::Drop(_));
	}

	#[test]
	fn buttons_are_attached() {
		let mut c = config();
		c.buttons = Buttons::new(vec![UrlButton {
			text: "Site".to_owned(),
			url: "https://example.com".parse().unwrap(),
		}]);

		let payload = eval(&c, &text_msg("hi")).into_payload().unwrap();
		assert_eq!(payload.buttons.len(), 1);
		assert_eq!(payload.buttons[0][0].text, "Site");
	}

	#[test]
	fn evaluation_is_idempotent() {
		let mut c = config();
		c.replacements = Replacements::new([("x", "y")]);
		c.cleaning.links = true;
		c.header = Decoration::new("H");
		let pipeline = Pipeline::from_config(&c).unwrap();

		let msg = text_msg("x https://a.b x");
		assert_eq!(pipeline.evaluate(&msg), pipeline.evaluate(&msg));
	}
}
