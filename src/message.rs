/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! This module contains [`InboundMessage`] that arrives from a source channel
//! and [`OutboundPayload`], the finalized message meant to be sent to a target channel

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::channel::ChannelRef;

/// A message that has arrived in a source channel
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct InboundMessage {
	/// Where the message came from. Used to forward or copy it
	pub origin: MessageRef,

	/// What kind of content the message carries
	pub kind: ContentKind,

	/// The text of the message, or the caption if it's a media message
	pub text: Option<String>,

	/// An opaque reference to the attached media (e.g. a file id)
	pub media: Option<MediaRef>,

	/// Id of the sender, if known
	pub sender: Option<i64>,

	/// When the message was sent
	pub timestamp: DateTime<Utc>,
}

/// A reference to a message in a channel
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct MessageRef {
	/// The channel the message lives in
	pub chat: ChannelRef,

	/// The id of the message inside of that channel
	pub message_id: i64,
}

/// An opaque platform-specific reference to a piece of media
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct MediaRef(pub String);

/// Kinds of content a message may carry. Each of them can be allowed or disallowed per task,
/// see [`ContentKinds`](`crate::task::ContentKinds`)
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[expect(missing_docs, reason = "self-explanatory")]
pub enum ContentKind {
	Text,
	Photo,
	Video,
	/// GIFs
	Animation,
	Audio,
	Voice,
	/// Round video messages
	VideoNote,
	/// Any other file
	Document,
	Sticker,
	Contact,
	Location,
	Poll,
	Game,
}

/// How the payload should be delivered
#[derive(Clone, Copy, PartialEq, Eq, Default, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForwardMode {
	/// Send a new message composed from the (possibly transformed) payload
	#[default]
	Copy,

	/// Forward the original message as is, with the "forwarded from" header.
	/// Text transformations can't be applied in this mode
	Forward,
}

/// A button with a link attached below a copied message
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct UrlButton {
	/// Text of the button
	pub text: String,

	/// Where the button leads to
	pub url: Url,
}

/// The finalized message, ready to be delivered to a target channel
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct OutboundPayload {
	/// The original message. Forwarded as is in [`ForwardMode::Forward`],
	/// used to re-send the media in [`ForwardMode::Copy`]
	pub origin: MessageRef,

	/// How the payload should be delivered
	pub mode: ForwardMode,

	/// Text (or caption) of the message
	pub text: Option<String>,

	/// Attached media, if any
	pub media: Option<MediaRef>,

	/// Rows of link buttons attached to the message
	pub buttons: Vec<Vec<UrlButton>>,
}

/// A reference to a message that has been successfully delivered
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct SentMessage {
	/// Id of the new message in the target channel
	pub message_id: i64,
}

impl InboundMessage {
	/// Creates a new text message. Mostly useful for tests and in-memory platforms
	#[must_use]
	pub fn text(chat: ChannelRef, message_id: i64, text: impl Into<String>) -> Self {
		Self {
			origin: MessageRef { chat, message_id },
			kind: ContentKind::Text,
			text: Some(text.into()),
			media: None,
			sender: None,
			timestamp: Utc::now(),
		}
	}

	/// Creates a new media message with an optional caption
	#[must_use]
	pub fn media(
		chat: ChannelRef,
		message_id: i64,
		kind: ContentKind,
		media: MediaRef,
		caption: Option<String>,
	) -> Self {
		Self {
			origin: MessageRef { chat, message_id },
			kind,
			text: caption,
			media: Some(media),
			sender: None,
			timestamp: Utc::now(),
		}
	}

	/// Returns the text of the message, treating an empty one as absent
	#[must_use]
	pub fn text_or_caption(&self) -> Option<&str> {
		self.text.as_deref().filter(|t| !t.is_empty())
	}
}

impl OutboundPayload {
	/// Check if the payload has nothing to send. Even a single media attachment makes it non-empty
	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.mode == ForwardMode::Copy
			&& self.media.is_none()
			&& self.text.as_deref().is_none_or(str::is_empty)
	}
}
