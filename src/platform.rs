/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! This module contains the [`Platform`] trait that abstracts away the messaging platform,
//! as well as all of its implementations

pub mod error;
pub mod memory;

#[cfg(feature = "telegram")]
pub mod telegram;

pub use self::error::{ErrorClass, PlatformError};

use std::sync::Arc;

use futures::stream::BoxStream;

use crate::{
	channel::ChannelRef,
	message::{InboundMessage, OutboundPayload, SentMessage},
};

/// A live stream of messages arriving in a source channel.
///
/// An error item or the end of the stream means the subscription has been lost
pub type Subscription = BoxStream<'static, Result<InboundMessage, PlatformError>>;

/// A messaging platform the engine relays messages on
pub trait Platform: Send + Sync + 'static {
	/// Starts receiving new messages from `source`
	fn subscribe(
		&self,
		source: &ChannelRef,
	) -> impl Future<Output = Result<Subscription, PlatformError>> + Send;

	/// Delivers `payload` to `target`
	fn send(
		&self,
		target: &ChannelRef,
		payload: &OutboundPayload,
	) -> impl Future<Output = Result<SentMessage, PlatformError>> + Send;
}

impl<P: Platform> Platform for Arc<P> {
	fn subscribe(
		&self,
		source: &ChannelRef,
	) -> impl Future<Output = Result<Subscription, PlatformError>> + Send {
		(**self).subscribe(source)
	}

	fn send(
		&self,
		target: &ChannelRef,
		payload: &OutboundPayload,
	) -> impl Future<Output = Result<SentMessage, PlatformError>> + Send {
		(**self).send(target, payload)
	}
}
