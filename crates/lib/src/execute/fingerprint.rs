//! Task fingerprints for up-to-date checks.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::execute::types::ExecuteError;
use crate::graph::{Task, TaskId};
use crate::util::hash::{ContentHash, Hashable, hash_path};

/// Everything that decides whether a previous run of a task is reusable.
#[derive(Serialize)]
struct FingerprintInput<'a> {
  task: &'a TaskId,
  action: String,
  config: &'a BTreeMap<String, String>,
  /// Declared inputs with their content hashes.
  inputs: Vec<(String, ContentHash)>,
  outputs: Vec<String>,
  classpath: Vec<String>,
}

impl Hashable for FingerprintInput<'_> {}

#[derive(Serialize)]
struct OutputsInput {
  outputs: Vec<(String, ContentHash)>,
}

impl Hashable for OutputsInput {}

/// Hash over the task definition and the current content of its inputs.
///
/// Missing inputs hash to a fixed marker, so creating one later changes
/// the fingerprint.
pub fn fingerprint(task: &Task) -> Result<ContentHash, ExecuteError> {
  let mut inputs = Vec::with_capacity(task.inputs.len());
  for path in &task.inputs {
    inputs.push((path.display().to_string(), hash_path(path)?));
  }

  let input = FingerprintInput {
    task: &task.id,
    action: action_key(task)?,
    config: &task.config,
    inputs,
    outputs: task.outputs.iter().map(|p| p.display().to_string()).collect(),
    classpath: task.classpath.iter().map(|p| p.display().to_string()).collect(),
  };
  Ok(input.compute_hash()?)
}

/// Hash over the declared outputs as they are on disk.
pub fn outputs_hash(task: &Task) -> Result<ContentHash, ExecuteError> {
  let mut outputs = Vec::with_capacity(task.outputs.len());
  for path in &task.outputs {
    outputs.push((path.display().to_string(), hash_path(path)?));
  }
  Ok(OutputsInput { outputs }.compute_hash()?)
}

/// Full serialized action, so env changes and exclude lists count too.
fn action_key(task: &Task) -> Result<String, ExecuteError> {
  Ok(serde_json::to_string(&task.action)?)
}
