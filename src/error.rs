/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! This module contains [`AdminError`], the error type returned from administrative operations
//! of the [`Supervisor`](`crate::Supervisor`), and [`ErrorChainDisplay`]

mod error_chain_display;

pub use self::error_chain_display::ErrorChainDisplay;

use crate::{persistence::PersistError, store::StoreError, task::ConfigError};

/// An error returned by an administrative operation of the [`Supervisor`](`crate::Supervisor`)
#[expect(missing_docs, reason = "error message is self-documenting")]
#[derive(thiserror::Error, Debug)]
pub enum AdminError {
	#[error(transparent)]
	Store(#[from] StoreError),

	/// The mutation has been applied in memory but couldn't be saved
	#[error("Task set changed but couldn't be persisted")]
	Persist(#[from] PersistError),
}

impl From<ConfigError> for AdminError {
	fn from(e: ConfigError) -> Self {
		Self::Store(StoreError::InvalidConfig(e))
	}
}

impl AdminError {
	/// Returns the validation error if the operation was rejected because of an invalid config
	#[must_use]
	pub fn as_config_error(&self) -> Option<&ConfigError> {
		match self {
			Self::Store(StoreError::InvalidConfig(e)) => Some(e),
			_ => None,
		}
	}
}
