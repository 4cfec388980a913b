//! Types for task execution.
//!
//! This module defines the per-task state machine, the build report
//! returned by the executor, the action error type, and execution
//! configuration.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Serialize, Serializer};
use thiserror::Error;

use crate::graph::TaskId;
use crate::util::hash::{DirHashError, HashError};

/// Why a task did not run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum SkipReason {
  /// Fingerprint and outputs match the last successful run.
  UpToDate,
  /// A dependency failed; carries the task that failed.
  Blocked(TaskId),
  /// The owning module has unresolved dependencies.
  Unresolved(String),
  /// Fail-fast stopped dispatch before the task started.
  Cancelled,
}

impl std::fmt::Display for SkipReason {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      SkipReason::UpToDate => write!(f, "up-to-date"),
      SkipReason::Blocked(task) => write!(f, "blocked by {task}"),
      SkipReason::Unresolved(module) => write!(f, "unresolved dependencies in {module}"),
      SkipReason::Cancelled => write!(f, "cancelled"),
    }
  }
}

/// Terminal state of a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TaskOutcome {
  Succeeded,
  Failed { error: String },
  Skipped { reason: SkipReason },
}

impl TaskOutcome {
  pub fn failed(error: impl Into<String>) -> Self {
    TaskOutcome::Failed { error: error.into() }
  }

  pub fn skipped(reason: SkipReason) -> Self {
    TaskOutcome::Skipped { reason }
  }

  /// Succeeded or up-to-date; dependents may run.
  pub fn is_satisfied(&self) -> bool {
    matches!(
      self,
      TaskOutcome::Succeeded
        | TaskOutcome::Skipped {
          reason: SkipReason::UpToDate
        }
    )
  }
}

/// Scheduler-side state of a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskState {
  /// Waiting on dependencies.
  Pending,
  /// Dependencies satisfied; waiting for a worker.
  Ready,
  Running,
  Done(TaskOutcome),
}

/// Result of one build invocation.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BuildReport {
  pub outcomes: BTreeMap<TaskId, TaskOutcome>,
  /// Tasks in the order they were handed to a worker.
  pub start_order: Vec<TaskId>,
  /// Wall time of tasks that were handed to a worker.
  #[serde(serialize_with = "serialize_durations")]
  pub durations: BTreeMap<TaskId, Duration>,
  /// Resolution errors per module, as displayed messages.
  pub resolution_errors: BTreeMap<String, Vec<String>>,
  #[serde(rename = "elapsed_ms", serialize_with = "serialize_millis")]
  pub elapsed: Duration,
}

impl BuildReport {
  /// True when no task failed or was skipped for a reason other than being
  /// up-to-date, and every module resolved.
  pub fn is_success(&self) -> bool {
    self.resolution_errors.is_empty() && self.outcomes.values().all(TaskOutcome::is_satisfied)
  }

  pub fn outcome(&self, id: &TaskId) -> Option<&TaskOutcome> {
    self.outcomes.get(id)
  }

  /// Tasks whose action actually ran to success.
  pub fn executed(&self) -> usize {
    self
      .outcomes
      .values()
      .filter(|o| matches!(o, TaskOutcome::Succeeded))
      .count()
  }

  pub fn up_to_date(&self) -> usize {
    self
      .outcomes
      .values()
      .filter(|o| {
        matches!(
          o,
          TaskOutcome::Skipped {
            reason: SkipReason::UpToDate
          }
        )
      })
      .count()
  }

  pub fn failures(&self) -> Vec<(&TaskId, &str)> {
    self
      .outcomes
      .iter()
      .filter_map(|(id, o)| match o {
        TaskOutcome::Failed { error } => Some((id, error.as_str())),
        _ => None,
      })
      .collect()
  }

  /// Tasks that never ran for a reason other than being up-to-date.
  pub fn not_run(&self) -> Vec<(&TaskId, &SkipReason)> {
    self
      .outcomes
      .iter()
      .filter_map(|(id, o)| match o {
        TaskOutcome::Skipped { reason } if *reason != SkipReason::UpToDate => Some((id, reason)),
        _ => None,
      })
      .collect()
  }
}

fn serialize_millis<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
  serializer.serialize_u64(duration.as_millis() as u64)
}

fn serialize_durations<S: Serializer>(
  durations: &BTreeMap<TaskId, Duration>,
  serializer: S,
) -> Result<S::Ok, S::Error> {
  serializer.collect_map(durations.iter().map(|(id, d)| (id, d.as_millis() as u64)))
}

/// Errors raised while running a task action.
#[derive(Debug, Error)]
pub enum ExecuteError {
  /// Command exited unsuccessfully.
  #[error("command failed with exit code {code:?}: {cmd}{}", format_stderr(.stderr))]
  CmdFailed {
    cmd: String,
    code: Option<i32>,
    stderr: String,
  },

  /// Command could not be started.
  #[error("failed to spawn `{cmd}`: {source}")]
  Spawn {
    cmd: String,
    #[source]
    source: std::io::Error,
  },

  #[error("io error at {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("invalid exclude pattern `{pattern}`: {message}")]
  Pattern { pattern: String, message: String },

  #[error("failed to hash task paths: {0}")]
  Hash(#[from] DirHashError),

  #[error("failed to compute fingerprint: {0}")]
  Fingerprint(#[from] HashError),

  /// The worker running the task panicked or was aborted.
  #[error("task worker stopped unexpectedly: {0}")]
  Worker(String),
}

impl ExecuteError {
  pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
    ExecuteError::Io {
      path: path.into(),
      source,
    }
  }
}

fn format_stderr(stderr: &str) -> String {
  let stderr = stderr.trim();
  if stderr.is_empty() {
    String::new()
  } else {
    format!("\n{stderr}")
  }
}

/// Configuration for task execution.
#[derive(Debug, Clone)]
pub struct ExecuteConfig {
  /// Maximum number of actions running at once.
  pub jobs: usize,

  /// Stop dispatching after the first failure.
  pub fail_fast: bool,
}

impl Default for ExecuteConfig {
  fn default() -> Self {
    Self {
      jobs: num_cpus(),
      fail_fast: false,
    }
  }
}

/// Get the number of CPUs for default parallelism.
fn num_cpus() -> usize {
  std::thread::available_parallelism().map(|p| p.get()).unwrap_or(4)
}
