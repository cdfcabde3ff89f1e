/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! This module contains a "scaffold", in other words, functions that pre-configure your application for common uses of [`relay`](`crate`).
//!
//! The main entry point of this module is [`init`]

use std::{future, process};

use tracing::subscriber::SetGlobalDefaultError;

use crate::cancellation_token::CancellationToken;

/// Contains the result of the [`init`] function
#[must_use = "the shutdown token should probably be passed to the supervisor. Ignore this type manually if you are sure you don't want it"]
pub struct InitResult {
	/// Cancelled when a Ctrl-C signal has arrived
	pub shutdown_token: CancellationToken,
}

/// An error that happened while setting up logging
#[expect(missing_docs, reason = "error message is self-documenting")]
#[derive(thiserror::Error, Debug)]
pub enum LoggingError {
	#[error("Can't determine the local time offset")]
	LocalOffset,

	#[error("Another global tracing subscriber has already been registered")]
	AlreadySet(#[from] SetGlobalDefaultError),
}

/// Initializes a tracing subscriber and a background task that cancels [`InitResult::shutdown_token`] on Ctrl-C.
///
/// See [`set_up_logging`] and [`set_up_ctrl_c_handler`] for more info
pub fn init() -> InitResult {
	if let Err(e) = set_up_logging() {
		tracing::debug!("Unable to set up the default tracing subscriber: {e}");
	}

	InitResult {
		shutdown_token: set_up_ctrl_c_handler(),
	}
}

/// Installs a tracing subscriber as the default.
///
/// The subscriber shows compact one-line log messages when log level is > DEBUG,
/// and pretty multi-line log messages when it's set to <= DEBUG.
///
/// It also logs to systemd-journald if available but only when compiled in release (to avoid log spam when debugging)
///
/// # Errors
/// * if a different global tracing subscriber has already been registered
/// * if the local timezone couldn't be determined
pub fn set_up_logging() -> Result<(), LoggingError> {
	use tracing::Level;
	use tracing_subscriber::{
		EnvFilter, Layer, filter::LevelFilter, fmt::time::OffsetTime, layer::SubscriberExt,
	};

	let env_filter = EnvFilter::builder()
		.with_default_directive(LevelFilter::INFO.into())
		.from_env_lossy();

	let is_debug_log_level = env_filter
		.max_level_hint()
		.is_some_and(|level| level >= Level::DEBUG);

	// may fail in a multithreaded env, that's why it should be called before the runtime is started
	let timer = OffsetTime::local_rfc_3339().map_err(|_| LoggingError::LocalOffset)?;

	let stdout = tracing_subscriber::fmt::layer()
		.with_target(is_debug_log_level)
		.with_file(is_debug_log_level)
		.with_line_number(is_debug_log_level)
		.with_thread_ids(is_debug_log_level)
		.with_timer(timer);

	let stdout = if is_debug_log_level {
		stdout.pretty().boxed()
	} else {
		stdout.boxed()
	};

	// enable journald logging only on release to avoid log spam on dev machines
	let journald = if cfg!(debug_assertions) {
		None
	} else {
		tracing_journald::layer().ok()
	};

	let subscriber = tracing_subscriber::registry()
		.with(journald.with_filter(LevelFilter::INFO))
		.with(stdout.with_filter(env_filter));

	tracing::subscriber::set_global_default(subscriber)?;
	Ok(())
}

/// Starts a detached tokio task that sets up a Ctrl-C signal handler
///
/// The first Ctrl-C cancels the returned token which should make the supervisor stop every worker gracefully.
/// The second one force closes the process
#[must_use]
pub fn set_up_ctrl_c_handler() -> CancellationToken {
	let (token, stop) = CancellationToken::new();

	tokio::spawn(async move {
		// graceful shutdown
		if let Err(e) = tokio::signal::ctrl_c().await {
			tracing::error!("Failed to set up a CtrlC signal handler: {e}");

			// dropping the handle would cancel the token
			future::pending::<()>().await;
		}

		tracing::info!("Shutting down, press Ctrl-C again to force close");
		stop.stop();

		// force close
		if let Err(e) = tokio::signal::ctrl_c().await {
			tracing::error!("Failed to set up a CtrlC signal handler: {e}");
			return;
		}

		tracing::info!("Force closing...");
		#[expect(clippy::exit, reason = "user requested force close")]
		process::exit(1);
	});

	token
}
