/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! This module contains [`TelegramPlatform`], a [`Platform`] that uses the Telegram Bot API

use std::{
	sync::{Arc, Mutex, PoisonError},
	time::Duration,
};

use futures::StreamExt;
use teloxide::{
	ApiError, Bot, RequestError,
	payloads::{CopyMessageSetters, GetUpdatesSetters, SendMessageSetters},
	requests::{Request, Requester},
	types::{
		AllowedUpdate, ChatId, InlineKeyboardButton, InlineKeyboardMarkup, Message, MessageId,
		Recipient, UpdateKind,
	},
};
use tokio::{select, sync::mpsc, time::sleep};
use tokio_stream::wrappers::UnboundedReceiverStream;

use super::{Platform, PlatformError, Subscription};
use crate::{
	cancellation_token::CancellationToken,
	channel::ChannelRef,
	error::ErrorChainDisplay,
	message::{
		ContentKind, ForwardMode, InboundMessage, MediaRef, MessageRef, OutboundPayload,
		SentMessage, UrlButton,
	},
};

/// Long polling timeout, in seconds. Must stay below the HTTP client's own timeout
const POLL_TIMEOUT: u32 = 10;

/// How long to wait before polling again after a transient error
const POLL_ERROR_PAUSE: Duration = Duration::from_secs(5);

type Subscriber = mpsc::UnboundedSender<Result<InboundMessage, PlatformError>>;

/// Relays messages using a Telegram bot.
///
/// The bot has to be a member of every source channel and an admin with posting rights in every target channel.
/// Updates are received with [`TelegramPlatform::poll_updates`] which must be running for subscriptions to get any messages
#[derive(Clone, Debug)]
pub struct TelegramPlatform {
	bot: Bot,
	subscribers: Arc<Mutex<Vec<(ChannelRef, Subscriber)>>>,
}

impl TelegramPlatform {
	#[expect(missing_docs, reason = "self-explanatory")]
	#[must_use]
	pub fn new(bot: Bot) -> Self {
		Self {
			bot,
			subscribers: Arc::default(),
		}
	}

	/// Checks that the bot token is valid. Returns the username of the bot
	///
	/// # Errors
	/// if the token has been rejected or Telegram is unreachable
	pub async fn authenticate(&self) -> Result<String, PlatformError> {
		let me = self
			.bot
			.get_me()
			.send()
			.await
			.map_err(|e| map_request_error(e, None))?;

		Ok(me.user.username.clone().unwrap_or_default())
	}

	/// Receives updates and passes channel posts to the subscribers of their channel until `cancel_token` is cancelled
	///
	/// # Errors
	/// if Telegram has returned a non-transient error. Every subscription is closed in this case
	pub async fn poll_updates(&self, mut cancel_token: CancellationToken) -> Result<(), PlatformError> {
		let mut offset = 0;

		loop {
			let request = self
				.bot
				.get_updates()
				.offset(offset)
				.timeout(POLL_TIMEOUT)
				.allowed_updates([AllowedUpdate::ChannelPost, AllowedUpdate::Message]);

			let updates = select! {
				biased;

				() = cancel_token.wait() => return Ok(()),
				res = request.send() => res,
			};

			let updates = match updates {
				Ok(updates) => updates,
				Err(e) => {
					let e = map_request_error(e, None);
					if !e.is_transient() {
						tracing::error!("Polling updates failed: {}", ErrorChainDisplay(&e));
						self.lock().clear();
						return Err(e);
					}

					let pause = e.retry_after().unwrap_or(POLL_ERROR_PAUSE);
					tracing::warn!(
						"Polling updates failed, retrying in {pause:?}: {}",
						ErrorChainDisplay(&e)
					);
					sleep(pause).await;
					continue;
				}
			};

			for update in updates {
				offset = i32::try_from(update.id.0).map_or(offset, |id| id.saturating_add(1));

				match update.kind {
					UpdateKind::ChannelPost(msg) | UpdateKind::Message(msg) => self.dispatch(&msg),
					_ => (),
				}
			}
		}
	}

	fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(ChannelRef, Subscriber)>> {
		self.subscribers.lock().unwrap_or_else(PoisonError::into_inner)
	}

	fn dispatch(&self, msg: &Message) {
		let username = msg.chat.username();
		let is_from = |source: &ChannelRef| match source {
			ChannelRef::Id(id) => *id == msg.chat.id.0,
			ChannelRef::Handle(handle) => username.is_some_and(|u| u.eq_ignore_ascii_case(handle)),
			ChannelRef::InviteLink(_) => false,
		};

		let mut subscribers = self.lock();
		subscribers.retain(|(_, tx)| !tx.is_closed());

		let mut inbound = None;
		for (_, tx) in subscribers.iter().filter(|(source, _)| is_from(source)) {
			let inbound = inbound.get_or_insert_with(|| to_inbound(msg));

			// closed subscribers are removed on the next dispatch
			_ = tx.send(Ok(inbound.clone()));
		}
	}
}

impl Platform for TelegramPlatform {
	async fn subscribe(&self, source: &ChannelRef) -> Result<Subscription, PlatformError> {
		if let ChannelRef::InviteLink(_) = source {
			// bots can't join channels by themselves
			return Err(PlatformError::InvalidTarget(source.clone()));
		}

		let (tx, rx) = mpsc::unbounded_channel();
		self.lock().push((source.clone(), tx));
		tracing::debug!("Subscribed to {source}");

		Ok(UnboundedReceiverStream::new(rx).boxed())
	}

	#[tracing::instrument(level = "trace", skip_all, fields(%target))]
	async fn send(
		&self,
		target: &ChannelRef,
		payload: &OutboundPayload,
	) -> Result<SentMessage, PlatformError> {
		let to = to_recipient(target)?;
		let from = to_recipient(&payload.origin.chat)?;
		let message_id = MessageId(
			i32::try_from(payload.origin.message_id)
				.map_err(|_| PlatformError::InvalidTarget(payload.origin.chat.clone()))?,
		);
		let map_err = |e| map_request_error(e, Some(target));

		let sent_id = match payload.mode {
			ForwardMode::Forward => {
				self.bot
					.forward_message(to, from, message_id)
					.send()
					.await
					.map_err(map_err)?
					.id
			}
			ForwardMode::Copy if payload.media.is_some() => {
				let mut request = self
					.bot
					.copy_message(to, from, message_id)
					// an empty caption removes the original one
					.caption(payload.text.clone().unwrap_or_default());

				if let Some(markup) = keyboard(&payload.buttons) {
					request = request.reply_markup(markup);
				}

				request.send().await.map_err(map_err)?
			}
			ForwardMode::Copy => {
				let mut request = self
					.bot
					.send_message(to, payload.text.clone().unwrap_or_default());

				if let Some(markup) = keyboard(&payload.buttons) {
					request = request.reply_markup(markup);
				}

				request.send().await.map_err(map_err)?.id
			}
		};

		Ok(SentMessage {
			message_id: i64::from(sent_id.0),
		})
	}
}

fn to_recipient(channel: &ChannelRef) -> Result<Recipient, PlatformError> {
	match channel {
		ChannelRef::Id(id) => Ok(Recipient::Id(ChatId(*id))),
		ChannelRef::Handle(handle) => Ok(Recipient::ChannelUsername(format!("@{handle}"))),
		ChannelRef::InviteLink(_) => Err(PlatformError::InvalidTarget(channel.clone())),
	}
}

fn keyboard(rows: &[Vec<UrlButton>]) -> Option<InlineKeyboardMarkup> {
	if rows.is_empty() {
		return None;
	}

	Some(InlineKeyboardMarkup::new(rows.iter().map(|row| {
		row.iter()
			.map(|button| InlineKeyboardButton::url(button.text.clone(), button.url.clone()))
			.collect::<Vec<_>>()
	})))
}

fn to_inbound(msg: &Message) -> InboundMessage {
	// messages without a file are re-sent by copying the original, so their own id is enough of a reference
	let own_ref = || MediaRef(msg.id.0.to_string());

	let (kind, media) = if let Some(photo) = msg.photo() {
		(
			ContentKind::Photo,
			photo.last().map(|p| MediaRef(p.file.id.to_string())),
		)
	} else if let Some(animation) = msg.animation() {
		(ContentKind::Animation, Some(MediaRef(animation.file.id.to_string())))
	} else if let Some(video) = msg.video() {
		(ContentKind::Video, Some(MediaRef(video.file.id.to_string())))
	} else if let Some(audio) = msg.audio() {
		(ContentKind::Audio, Some(MediaRef(audio.file.id.to_string())))
	} else if let Some(voice) = msg.voice() {
		(ContentKind::Voice, Some(MediaRef(voice.file.id.to_string())))
	} else if let Some(note) = msg.video_note() {
		(ContentKind::VideoNote, Some(MediaRef(note.file.id.to_string())))
	} else if let Some(sticker) = msg.sticker() {
		(ContentKind::Sticker, Some(MediaRef(sticker.file.id.to_string())))
	} else if let Some(document) = msg.document() {
		(ContentKind::Document, Some(MediaRef(document.file.id.to_string())))
	} else if msg.contact().is_some() {
		(ContentKind::Contact, Some(own_ref()))
	} else if msg.location().is_some() {
		(ContentKind::Location, Some(own_ref()))
	} else if msg.poll().is_some() {
		(ContentKind::Poll, Some(own_ref()))
	} else if msg.game().is_some() {
		(ContentKind::Game, Some(own_ref()))
	} else {
		(ContentKind::Text, None)
	};

	let sender = msg
		.from
		.as_ref()
		.and_then(|user| i64::try_from(user.id.0).ok())
		.or_else(|| msg.sender_chat.as_ref().map(|chat| chat.id.0));

	InboundMessage {
		origin: MessageRef {
			chat: ChannelRef::Id(msg.chat.id.0),
			message_id: i64::from(msg.id.0),
		},
		kind,
		text: msg.text().or_else(|| msg.caption()).map(ToOwned::to_owned),
		media,
		sender,
		timestamp: msg.date,
	}
}

fn map_request_error(e: RequestError, target: Option<&ChannelRef>) -> PlatformError {
	let target = || target.cloned().unwrap_or(ChannelRef::Id(0));

	match e {
		RequestError::RetryAfter(secs) => PlatformError::RetryAfter(secs.duration()),
		RequestError::Network(e) if e.is_timeout() => PlatformError::Timeout,
		RequestError::Network(e) => PlatformError::network(e),
		RequestError::Io(e) => PlatformError::network(e),
		RequestError::Api(ApiError::ChatNotFound) => PlatformError::InvalidTarget(target()),
		RequestError::Api(
			ApiError::BotKicked | ApiError::BotBlocked | ApiError::NotEnoughRightsToPostMessages,
		) => PlatformError::PermissionDenied(target()),
		RequestError::Api(
			e @ (ApiError::MessageIsTooLong
			| ApiError::MessageTextIsEmpty
			| ApiError::WrongFileIdOrUrl),
		) => PlatformError::ContentRejected(e.to_string()),
		other => PlatformError::other(other),
	}
}
