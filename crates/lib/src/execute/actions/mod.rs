//! Action execution module.
//!
//! This module provides the [`TaskRunner`] seam used by the executor and the
//! default runner that performs task actions on the local machine.

pub mod cmd;
pub mod fs;

use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;
use tracing::debug;

use crate::execute::types::ExecuteError;
use crate::graph::{Task, TaskAction};

pub use cmd::execute_cmd;
pub use fs::{copy_tree, delete_paths};

/// Runs the action of a single task.
///
/// The executor decides when a task runs; a runner only decides how.
#[async_trait]
pub trait TaskRunner: Send + Sync {
  async fn run(&self, task: &Task) -> Result<(), ExecuteError>;
}

/// Runs actions on the local machine.
#[derive(Debug, Clone, Default)]
pub struct ActionRunner {
  /// SDK directory exported to commands as `BRICK_SDK`.
  sdk: Option<PathBuf>,
}

impl ActionRunner {
  pub fn new(sdk: Option<PathBuf>) -> Self {
    Self { sdk }
  }

  /// Environment for a command task: the task's own variables plus the
  /// `BRICK_*` location variables.
  pub fn command_env(&self, task: &Task, env: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    let mut vars = env.clone();
    vars.insert("BRICK_MODULE_DIR".to_string(), task.dir.display().to_string());
    vars.insert("BRICK_BUILD_DIR".to_string(), task.build_dir.display().to_string());
    vars.insert("BRICK_TASK".to_string(), task.id.to_string());
    if let Some(sdk) = &self.sdk {
      vars.insert("BRICK_SDK".to_string(), sdk.display().to_string());
    }
    vars
  }
}

#[async_trait]
impl TaskRunner for ActionRunner {
  async fn run(&self, task: &Task) -> Result<(), ExecuteError> {
    match &task.action {
      TaskAction::Lifecycle => Ok(()),

      TaskAction::Command { command, env } => {
        prepare_outputs(task).await?;
        let vars = self.command_env(task, env);
        execute_cmd(command, &vars, &task.dir).await?;
        Ok(())
      }

      TaskAction::Copy { from, into, exclude } => {
        let (from, into, exclude) = (from.clone(), into.clone(), exclude.clone());
        tokio::task::spawn_blocking(move || copy_tree(&from, &into, &exclude))
          .await
          .map_err(|e| ExecuteError::Worker(e.to_string()))??;
        Ok(())
      }

      TaskAction::Delete { paths } => {
        let paths = paths.clone();
        tokio::task::spawn_blocking(move || delete_paths(&paths))
          .await
          .map_err(|e| ExecuteError::Worker(e.to_string()))?
      }
    }
  }
}

/// Create the build directory and the parents of declared outputs.
async fn prepare_outputs(task: &Task) -> Result<(), ExecuteError> {
  tokio::fs::create_dir_all(&task.build_dir)
    .await
    .map_err(|e| ExecuteError::io(&task.build_dir, e))?;
  for output in &task.outputs {
    if let Some(parent) = output.parent() {
      tokio::fs::create_dir_all(parent)
        .await
        .map_err(|e| ExecuteError::io(parent, e))?;
    }
  }
  debug!(task = %task.id, "prepared output directories");
  Ok(())
}
