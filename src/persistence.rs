/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! This module contains the [`Persist`] trait that is used to load and save task configs,
//! and [`JsonFile`], an implementation of it that uses a JSON task file

mod record;

pub use self::record::TaskRecord;

use std::{
	io,
	path::{Path, PathBuf},
};

use tokio::fs;

/// Loads and saves the configs of all tasks. Statistics are never persisted
pub trait Persist: Send + Sync + 'static {
	/// Loads every stored task
	///
	/// # Errors
	/// if the storage couldn't be read or is corrupted
	fn load(&self) -> impl Future<Output = Result<Vec<TaskRecord>, PersistError>> + Send;

	/// Replaces everything stored with `records`
	///
	/// # Errors
	/// if the storage couldn't be written to
	fn save(&self, records: &[TaskRecord]) -> impl Future<Output = Result<(), PersistError>> + Send;
}

/// Don't persist anything
impl Persist for () {
	async fn load(&self) -> Result<Vec<TaskRecord>, PersistError> {
		Ok(Vec::new())
	}

	async fn save(&self, _records: &[TaskRecord]) -> Result<(), PersistError> {
		Ok(())
	}
}

/// Stores tasks as a pretty-printed JSON array in a single file.
///
/// A missing file is treated as an empty one
#[derive(Clone, Debug)]
pub struct JsonFile {
	path: PathBuf,
}

#[expect(missing_docs, reason = "error message is self-documenting")]
#[derive(thiserror::Error, Debug)]
pub enum PersistError {
	#[error("Can't read task file {}", .path.display())]
	Read {
		path: PathBuf,
		#[source]
		source: io::Error,
	},

	#[error("Can't write task file {}", .path.display())]
	Write {
		path: PathBuf,
		#[source]
		source: io::Error,
	},

	#[error("Task file {} is corrupted", .path.display())]
	Parse {
		path: PathBuf,
		#[source]
		source: serde_json::Error,
	},

	#[error("Can't serialize tasks")]
	Serialize(#[source] serde_json::Error),
}

impl JsonFile {
	#[expect(missing_docs, reason = "self-explanatory")]
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into() }
	}

	#[expect(missing_docs, reason = "self-explanatory")]
	#[must_use]
	pub fn path(&self) -> &Path {
		&self.path
	}

	fn tmp_path(&self) -> PathBuf {
		let mut tmp = self.path.clone().into_os_string();
		tmp.push(".tmp");
		tmp.into()
	}
}

impl Persist for JsonFile {
	async fn load(&self) -> Result<Vec<TaskRecord>, PersistError> {
		let contents = match fs::read_to_string(&self.path).await {
			Ok(s) => s,
			Err(e) if e.kind() == io::ErrorKind::NotFound => {
				tracing::info!("Task file {} doesn't exist yet", self.path.display());
				return Ok(Vec::new());
			}
			Err(source) => {
				return Err(PersistError::Read {
					path: self.path.clone(),
					source,
				});
			}
		};

		if contents.trim().is_empty() {
			return Ok(Vec::new());
		}

		serde_json::from_str(&contents).map_err(|source| PersistError::Parse {
			path: self.path.clone(),
			source,
		})
	}

	async fn save(&self, records: &[TaskRecord]) -> Result<(), PersistError> {
		let json = serde_json::to_string_pretty(records).map_err(PersistError::Serialize)?;
		let write_err = |source| PersistError::Write {
			path: self.path.clone(),
			source,
		};

		// write to a temporary file first to never leave a half-written task file behind
		let tmp = self.tmp_path();
		fs::write(&tmp, json).await.map_err(write_err)?;
		fs::rename(&tmp, &self.path).await.map_err(write_err)?;

		tracing::debug!("Saved {} tasks to {}", records.len(), self.path.display());
		Ok(())
	}
}
