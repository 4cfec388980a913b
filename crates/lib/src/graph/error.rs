use thiserror::Error;

use crate::config::ConfigError;

use super::task::TaskId;

/// A dependency cycle, listed in depends-on order and closed on its first
/// task (`a -> b -> a`; a self-dependency is `x -> x`).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("dependency cycle detected: {}", join_path(.path))]
pub struct CycleError {
  pub path: Vec<TaskId>,
}

fn join_path(path: &[TaskId]) -> String {
  path.iter().map(TaskId::as_str).collect::<Vec<_>>().join(" -> ")
}

/// Errors while building the task graph.
#[derive(Debug, Error)]
pub enum GraphError {
  #[error(transparent)]
  Config(#[from] ConfigError),

  #[error(transparent)]
  Cycle(#[from] CycleError),
}
