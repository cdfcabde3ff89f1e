/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! This module contains [`TaskRecord`], the flat persisted form of a task

use std::time::Duration;

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::{
	channel::ChannelRef,
	message::{ForwardMode, UrlButton},
	task::{
		Buttons, Cleaning, ConfigError, ContentKinds, Decoration, Replacement, Replacements,
		TaskConfig, TaskId, WordList,
	},
};

/// A task as it's stored in a task file.
///
/// Word lists are stored as comma separated strings,
/// replacements as `from->to` pairs separated by commas.
/// Statistics are never stored
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
#[serde(default)]
#[expect(missing_docs, reason = "each field mirrors the TaskConfig field it is converted to")]
pub struct TaskRecord {
	pub task_id: String,
	pub name: String,
	pub source_chat: String,
	pub target_chat: String,
	pub enabled: bool,
	/// In seconds
	pub forward_delay: f64,
	pub max_retries: u32,
	pub forward_mode: ForwardMode,

	pub forward_text: bool,
	pub forward_photos: bool,
	pub forward_videos: bool,
	pub forward_music: bool,
	pub forward_audio: bool,
	pub forward_voice: bool,
	pub forward_video_messages: bool,
	pub forward_files: bool,
	pub forward_gifs: bool,
	pub forward_contacts: bool,
	pub forward_locations: bool,
	pub forward_polls: bool,
	pub forward_stickers: bool,
	pub forward_round: bool,
	pub forward_games: bool,

	pub header_enabled: bool,
	pub footer_enabled: bool,
	pub header_text: String,
	pub footer_text: String,

	pub blacklist_enabled: bool,
	pub whitelist_enabled: bool,
	pub blacklist_words: String,
	pub whitelist_words: String,

	pub clean_links: bool,
	pub clean_hashtags: bool,
	pub clean_formatting: bool,
	pub clean_empty_lines: bool,
	pub clean_lines_with_words: bool,
	pub clean_words_list: String,

	pub buttons_enabled: bool,
	pub button1_text: String,
	pub button1_url: String,
	pub button2_text: String,
	pub button2_url: String,
	pub button3_text: String,
	pub button3_url: String,

	pub replacer_enabled: bool,
	pub replacements: String,
}

impl TaskRecord {
	/// Flattens the config of the task with `id`
	#[must_use]
	pub fn from_config(id: &TaskId, config: &TaskConfig) -> Self {
		let kinds = &config.kinds;
		let button = |idx: usize| {
			config
				.buttons
				.buttons
				.get(idx)
				.map(|b| (b.text.clone(), b.url.to_string()))
				.unwrap_or_default()
		};
		let (button1_text, button1_url) = button(0);
		let (button2_text, button2_url) = button(1);
		let (button3_text, button3_url) = button(2);

		Self {
			task_id: id.to_string(),
			name: config.name.clone(),
			source_chat: config.source.to_string(),
			target_chat: config.target.to_string(),
			enabled: config.enabled,
			forward_delay: config.min_delay.as_secs_f64(),
			max_retries: config.max_retries,
			forward_mode: config.mode,

			forward_text: kinds.text,
			forward_photos: kinds.photo,
			forward_videos: kinds.video,
			forward_music: kinds.audio,
			forward_audio: kinds.audio,
			forward_voice: kinds.voice,
			forward_video_messages: kinds.video_note,
			forward_files: kinds.document,
			forward_gifs: kinds.animation,
			forward_contacts: kinds.contact,
			forward_locations: kinds.location,
			forward_polls: kinds.poll,
			forward_stickers: kinds.sticker,
			forward_round: kinds.video_note,
			forward_games: kinds.game,

			header_enabled: config.header.enabled,
			footer_enabled: config.footer.enabled,
			header_text: config.header.text.clone(),
			footer_text: config.footer.text.clone(),

			blacklist_enabled: config.blacklist.enabled,
			whitelist_enabled: config.whitelist.enabled,
			blacklist_words: join_words(&config.blacklist),
			whitelist_words: join_words(&config.whitelist),

			clean_links: config.cleaning.links,
			clean_hashtags: config.cleaning.hashtags,
			clean_formatting: config.cleaning.formatting,
			clean_empty_lines: config.cleaning.empty_lines,
			clean_lines_with_words: config.cleaning.lines_with_words.enabled,
			clean_words_list: join_words(&config.cleaning.lines_with_words),

			buttons_enabled: config.buttons.enabled,
			button1_text,
			button1_url,
			button2_text,
			button2_url,
			button3_text,
			button3_url,

			replacer_enabled: config.replacements.enabled,
			replacements: config
				.replacements
				.pairs
				.iter()
				.map(|pair| format!("{}->{}", pair.from, pair.to))
				.join(","),
		}
	}

	/// Parses the record back into a task id and its config. The config isn't validated
	///
	/// # Errors
	/// if a field can't be parsed
	pub fn into_config(self) -> Result<(TaskId, TaskConfig), ConfigError> {
		let source = parse_channel("source", &self.source_chat)?;
		let target = parse_channel("target", &self.target_chat)?;

		if !self.forward_delay.is_finite() || self.forward_delay < 0.0 {
			return Err(ConfigError::InvalidDelay(self.forward_delay));
		}
		let min_delay = Duration::try_from_secs_f64(self.forward_delay)
			.map_err(|_| ConfigError::InvalidDelay(self.forward_delay))?;

		let kinds = ContentKinds {
			text: self.forward_text,
			photo: self.forward_photos,
			video: self.forward_videos,
			animation: self.forward_gifs,
			audio: self.forward_audio && self.forward_music,
			voice: self.forward_voice,
			video_note: self.forward_video_messages && self.forward_round,
			document: self.forward_files,
			sticker: self.forward_stickers,
			contact: self.forward_contacts,
			location: self.forward_locations,
			poll: self.forward_polls,
			game: self.forward_games,
		};

		let buttons = [
			(self.button1_text, self.button1_url),
			(self.button2_text, self.button2_url),
			(self.button3_text, self.button3_url),
		]
		.into_iter()
		.filter(|(text, url)| !text.trim().is_empty() && !url.trim().is_empty())
		.map(|(text, url)| {
			let url = url
				.trim()
				.parse()
				.map_err(|_| ConfigError::InvalidButtonUrl(url.clone()))?;

			Ok(UrlButton { text, url })
		})
		.collect::<Result<Vec<_>, ConfigError>>()?;

		let config = TaskConfig::builder()
			.name(self.name)
			.source(source)
			.target(target)
			.enabled(self.enabled)
			.mode(self.forward_mode)
			.min_delay(min_delay)
			.max_retries(self.max_retries)
			.kinds(kinds)
			.blacklist(split_words(self.blacklist_enabled, &self.blacklist_words))
			.whitelist(split_words(self.whitelist_enabled, &self.whitelist_words))
			.replacements(Replacements {
				enabled: self.replacer_enabled,
				pairs: parse_replacements(&self.replacements),
			})
			.cleaning(Cleaning {
				links: self.clean_links,
				hashtags: self.clean_hashtags,
				formatting: self.clean_formatting,
				empty_lines: self.clean_empty_lines,
				lines_with_words: split_words(self.clean_lines_with_words, &self.clean_words_list),
			})
			.header(Decoration {
				enabled: self.header_enabled,
				text: self.header_text,
			})
			.footer(Decoration {
				enabled: self.footer_enabled,
				text: self.footer_text,
			})
			.buttons(Buttons {
				enabled: self.buttons_enabled,
				buttons,
			})
			.build();

		Ok((TaskId::new(self.task_id), config))
	}
}

impl Default for TaskRecord {
	fn default() -> Self {
		Self {
			task_id: String::new(),
			name: String::new(),
			source_chat: String::new(),
			target_chat: String::new(),
			enabled: true,
			forward_delay: TaskConfig::DEFAULT_MIN_DELAY.as_secs_f64(),
			max_retries: TaskConfig::DEFAULT_MAX_RETRIES,
			forward_mode: ForwardMode::default(),

			forward_text: true,
			forward_photos: true,
			forward_videos: true,
			forward_music: true,
			forward_audio: true,
			forward_voice: true,
			forward_video_messages: true,
			forward_files: true,
			forward_gifs: true,
			forward_contacts: true,
			forward_locations: true,
			forward_polls: true,
			forward_stickers: true,
			forward_round: true,
			forward_games: true,

			header_enabled: false,
			footer_enabled: false,
			header_text: String::new(),
			footer_text: String::new(),
			blacklist_enabled: false,
			whitelist_enabled: false,
			blacklist_words: String::new(),
			whitelist_words: String::new(),
			clean_links: false,
			clean_hashtags: false,
			clean_formatting: false,
			clean_empty_lines: false,
			clean_lines_with_words: false,
			clean_words_list: String::new(),
			buttons_enabled: false,
			button1_text: String::new(),
			button1_url: String::new(),
			button2_text: String::new(),
			button2_url: String::new(),
			button3_text: String::new(),
			button3_url: String::new(),
			replacer_enabled: false,
			replacements: String::new(),
		}
	}
}

fn parse_channel(field: &'static str, s: &str) -> Result<ChannelRef, ConfigError> {
	s.parse()
		.map_err(|source| ConfigError::InvalidChannel { field, source })
}

fn join_words(list: &WordList) -> String {
	list.words.iter().map(|w| w.trim()).join(",")
}

fn split_words(enabled: bool, words: &str) -> WordList {
	WordList {
		enabled,
		words: words
			.split(',')
			.map(str::trim)
			.filter(|w| !w.is_empty())
			.map(ToOwned::to_owned)
			.collect(),
	}
}

fn parse_replacements(s: &str) -> Vec<Replacement> {
	s.split(',')
		.map(str::trim)
		.filter(|r| !r.is_empty())
		.filter_map(|r| {
			let Some((from, to)) = r.split_once("->") else {
				tracing::warn!("Ignoring replacement {r:?} without a \"->\"");
				return None;
			};

			Some(Replacement {
				from: from.trim().to_owned(),
				to: to.trim().to_owned(),
			})
		})
		.collect()
}

#[cfg(test)]
mod tests {
	use assert_matches::assert_matches;

	use super::*;

	const ORIGINAL: &str = r#"{
		"task_id": "default_task_001",
		"name": "Sample task",
		"source_chat": "@sample_source",
		"target_chat": "-1001234567890",
		"enabled": false,
		"forward_delay": 2.5,
		"max_retries": 5,
		"forward_mode": "forward",
		"forward_photos": false,
		"forward_links": true,
		"clean_buttons": false,
		"header_enabled": true,
		"header_text": "NEWS:",
		"blacklist_enabled": true,
		"blacklist_words": "ad, promo ,,",
		"button1_text": "Site",
		"button1_url": "https://example.com",
		"replacer_enabled": true,
		"replacements": "cat->dog, bad, a -> b"
	}"#;

	#[test]
	fn parses_original_task_files() {
		let record: TaskRecord = serde_json::from_str(ORIGINAL).unwrap();
		let (id, config) = record.into_config().unwrap();

		assert_eq!(id.as_str(), "default_task_001");
		assert_eq!(config.source, ChannelRef::Handle("sample_source".to_owned()));
		assert_eq!(config.target, ChannelRef::Id(-1_001_234_567_890));
		assert!(!config.enabled, "enabled: false");
		assert_eq!(config.min_delay, Duration::from_millis(2500));
		assert_eq!(config.max_retries, 5);
		assert_eq!(config.mode, ForwardMode::Forward);
		assert!(!config.kinds.photo, "photos are disabled");
		assert!(config.kinds.video, "omitted fields default to true");
		assert_eq!(config.header, Decoration::new("NEWS:"));
		assert_eq!(config.blacklist, WordList::new(["ad", "promo"]));
		assert_eq!(config.buttons.buttons.len(), 1);
		assert!(!config.buttons.enabled, "buttons_enabled was omitted");
		assert_eq!(config.replacements, Replacements::new([("cat", "dog"), ("a", "b")]));
		assert_eq!(config.validate(), Ok(()));
	}

	#[test]
	fn survives_a_round_trip() {
		let record: TaskRecord = serde_json::from_str(ORIGINAL).unwrap();
		let (id, config) = record.into_config().unwrap();

		let json = serde_json::to_string(&TaskRecord::from_config(&id, &config)).unwrap();
		let (id2, config2) = serde_json::from_str::<TaskRecord>(&json)
			.unwrap()
			.into_config()
			.unwrap();

		assert_eq!(id, id2);
		assert_eq!(config, config2);
	}

	#[test]
	fn rejects_bad_fields() {
		let record = TaskRecord {
			source_chat: "https://example.com/x".to_owned(),
			target_chat: "@valid_target".to_owned(),
			..Default::default()
		};
		assert_matches!(
			record.into_config(),
			Err(ConfigError::InvalidChannel { field: "source", .. })
		);

		let record = TaskRecord {
			source_chat: "@valid_source".to_owned(),
			target_chat: "@valid_target".to_owned(),
			forward_delay: -1.0,
			..Default::default()
		};
		assert_matches!(record.into_config(), Err(ConfigError::InvalidDelay(_)));

		let record = TaskRecord {
			source_chat: "@valid_source".to_owned(),
			target_chat: "@valid_target".to_owned(),
			button1_text: "x".to_owned(),
			button1_url: "not a url".to_owned(),
			..Default::default()
		};
		assert_matches!(record.into_config(), Err(ConfigError::InvalidButtonUrl(_)));
	}
}
