/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use crate::task::{ConfigError, TaskId};

/// An error returned by a [`TaskStore`](`super::TaskStore`) operation
#[expect(missing_docs, reason = "error message is self-documenting")]
#[derive(thiserror::Error, PartialEq, Debug)]
pub enum StoreError {
	#[error("Task {0} not found")]
	NotFound(TaskId),

	#[error("Task {0} already exists")]
	DuplicateId(TaskId),

	#[error("Invalid task configuration")]
	InvalidConfig(#[from] ConfigError),
}
