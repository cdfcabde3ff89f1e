/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use std::{borrow::Borrow, cmp::Ordering, fmt};

use serde::{Deserialize, Serialize};

/// Unique id of a [`Task`](`super::Task`). Never changes once the task has been created.
///
/// Ids are ordered naturally, i.e. `task_2` comes before `task_10`
#[derive(Clone, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
	/// Wraps an existing id, e.g. one loaded from a task file
	#[must_use]
	pub fn new(id: impl Into<String>) -> Self {
		Self(id.into())
	}

	/// The id generated for the `n`th task created during this process' lifetime
	pub(crate) fn generated(n: u64) -> Self {
		Self(format!("task_{n}"))
	}

	#[expect(missing_docs, reason = "self-explanatory")]
	#[must_use]
	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl TaskId {
	/// Splits the id into the part before the trailing number and the number itself
	fn natural_key(&self) -> (&str, Option<u64>) {
		let prefix = self.0.trim_end_matches(|c: char| c.is_ascii_digit());
		let number = self.0[prefix.len()..].parse().ok();
		(prefix, number)
	}
}

impl Ord for TaskId {
	fn cmp(&self, other: &Self) -> Ordering {
		self.natural_key()
			.cmp(&other.natural_key())
			.then_with(|| self.0.cmp(&other.0))
	}
}

impl PartialOrd for TaskId {
	fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
		Some(self.cmp(other))
	}
}

impl fmt::Display for TaskId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl Borrow<str> for TaskId {
	fn borrow(&self) -> &str {
		&self.0
	}
}

impl From<&str> for TaskId {
	fn from(value: &str) -> Self {
		Self::new(value)
	}
}

#[cfg(test)]
mod tests {
	use super::TaskId;

	#[test]
	fn natural_order() {
		let mut ids = ["task_10", "task_2", "custom", "task_1"].map(TaskId::from);
		ids.sort();
		assert_eq!(ids.map(|id| id.to_string()), ["custom", "task_1", "task_2", "task_10"]);
	}
}
