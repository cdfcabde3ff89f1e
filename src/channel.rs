/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! This module contains [`ChannelRef`], a reference to a source or a target channel

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use url::Url;

/// A reference to a channel on the messaging platform.
///
/// The engine only checks that the reference is well-formed,
/// resolving it to an actual channel is the job of the [`Platform`](`crate::platform::Platform`).
///
/// Parses from (and displays as) one of:
/// - a numeric id, e.g. `-1001234567890`
/// - a handle, e.g. `@news` (the `@` is optional when parsing)
/// - a link, e.g. `https://t.me/news` (parsed as a handle) or `https://t.me/+AbCdEf` (an invite link)
#[derive(Clone, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ChannelRef {
	/// A numeric id
	Id(i64),

	/// A public handle, stored without the leading `@`
	Handle(String),

	/// A private invite link
	InviteLink(Url),
}

/// The reason a string couldn't be parsed into a [`ChannelRef`]
#[expect(missing_docs, reason = "error message is self-documenting")]
#[derive(thiserror::Error, PartialEq, Eq, Debug)]
pub enum ChannelRefError {
	#[error("Channel reference is empty")]
	Empty,

	#[error("{0:?} is not a valid handle (5-32 latin letters, digits or underscores, starting with a letter)")]
	InvalidHandle(String),

	#[error("{0:?} is not a valid channel link")]
	InvalidLink(String),
}

const LINK_HOSTS: &[&str] = &["t.me", "telegram.me", "telegram.dog"];

impl ChannelRef {
	/// Returns the numeric id if this reference is one
	#[must_use]
	pub fn as_id(&self) -> Option<i64> {
		match self {
			Self::Id(id) => Some(*id),
			_ => None,
		}
	}
}

impl FromStr for ChannelRef {
	type Err = ChannelRefError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let s = s.trim();
		if s.is_empty() {
			return Err(ChannelRefError::Empty);
		}

		if let Ok(id) = s.parse::<i64>() {
			return Ok(Self::Id(id));
		}

		if let Some(handle) = s.strip_prefix('@') {
			return parse_handle(handle);
		}

		if s.contains('/') {
			return parse_link(s);
		}

		parse_handle(s)
	}
}

fn parse_handle(handle: &str) -> Result<ChannelRef, ChannelRefError> {
	let is_valid = (5..=32).contains(&handle.len())
		&& handle.starts_with(|c: char| c.is_ascii_alphabetic())
		&& handle.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');

	if is_valid {
		Ok(ChannelRef::Handle(handle.to_owned()))
	} else {
		Err(ChannelRefError::InvalidHandle(handle.to_owned()))
	}
}

fn parse_link(link: &str) -> Result<ChannelRef, ChannelRefError> {
	let invalid = || ChannelRefError::InvalidLink(link.to_owned());

	let url = if link.starts_with("http://") || link.starts_with("https://") {
		Url::parse(link)
	} else {
		Url::parse(&format!("https://{link}"))
	}
	.map_err(|_| invalid())?;

	if !url
		.host_str()
		.is_some_and(|host| LINK_HOSTS.contains(&host))
	{
		return Err(invalid());
	}

	let path = url.path().trim_matches('/');
	let mut segments = path.split('/');
	match (segments.next(), segments.next()) {
		(Some(invite), None) if invite.starts_with('+') && invite.len() > 1 => {
			Ok(ChannelRef::InviteLink(url))
		}
		(Some("joinchat"), Some(hash)) if !hash.is_empty() => Ok(ChannelRef::InviteLink(url)),
		(Some(handle), None) if !handle.is_empty() => {
			parse_handle(handle).map_err(|_| invalid())
		}
		_ => Err(invalid()),
	}
}

impl fmt::Display for ChannelRef {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Id(id) => write!(f, "{id}"),
			Self::Handle(handle) => write!(f, "@{handle}"),
			Self::InviteLink(url) => write!(f, "{url}"),
		}
	}
}

impl TryFrom<String> for ChannelRef {
	type Error = ChannelRefError;

	fn try_from(value: String) -> Result<Self, Self::Error> {
		value.parse()
	}
}

impl From<ChannelRef> for String {
	fn from(value: ChannelRef) -> Self {
		value.to_string()
	}
}

impl From<i64> for ChannelRef {
	fn from(id: i64) -> Self {
		Self::Id(id)
	}
}
