//! Persisted build state.

use std::collections::BTreeMap;
use std::io;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::consts::STATE_SCHEMA;
use crate::graph::TaskId;
use crate::util::hash::ContentHash;

/// Fingerprints of the last successful run of each task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildState {
  /// Format tag; stores written with another tag are discarded on load.
  pub schema: String,
  pub tasks: BTreeMap<TaskId, TaskRecord>,
}

impl Default for BuildState {
  fn default() -> Self {
    Self {
      schema: STATE_SCHEMA.to_string(),
      tasks: BTreeMap::new(),
    }
  }
}

impl BuildState {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn get(&self, id: &TaskId) -> Option<&TaskRecord> {
    self.tasks.get(id)
  }

  pub fn record(&mut self, id: TaskId, record: TaskRecord) {
    self.tasks.insert(id, record);
  }
}

/// What was recorded after a task last succeeded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRecord {
  /// Hash over the task definition and its input contents.
  pub fingerprint: ContentHash,
  /// Hash over the declared outputs as they were left by the task.
  pub outputs: ContentHash,
  pub recorded_at_unix: u64,
}

/// Errors reading or writing the state file.
#[derive(Debug, Error)]
pub enum StateError {
  #[error("failed to create state directory: {0}")]
  CreateDir(#[source] io::Error),

  #[error("failed to read build state: {0}")]
  Read(#[source] io::Error),

  #[error("failed to parse build state: {0}")]
  Parse(#[source] serde_json::Error),

  #[error("failed to serialize build state: {0}")]
  Serialize(#[source] serde_json::Error),

  #[error("failed to write build state: {0}")]
  Write(#[source] io::Error),
}
