//! Task nodes of the build graph.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::ResolvedConfig;
use crate::descriptor::Module;

/// Task identifier, written `module:name`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
  pub fn new(module: &str, name: &str) -> Self {
    Self(format!("{module}:{name}"))
  }

  /// Parse `module:name`.
  pub fn from_qualified(raw: &str) -> Self {
    match raw.split_once(':') {
      Some((module, name)) => Self::new(module.trim(), name.trim()),
      None => Self(raw.trim().to_string()),
    }
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }

  pub fn module(&self) -> &str {
    self.0.split_once(':').map(|(m, _)| m).unwrap_or_default()
  }

  pub fn name(&self) -> &str {
    self.0.split_once(':').map(|(_, n)| n).unwrap_or(&self.0)
  }
}

impl fmt::Display for TaskId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}

/// What running a task does.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskAction {
  /// Aggregates other tasks; nothing to run.
  Lifecycle,
  /// Run a shell command in the module directory.
  Command {
    command: String,
    env: BTreeMap<String, String>,
  },
  /// Copy a file tree, skipping paths that match any exclude glob.
  Copy {
    from: PathBuf,
    into: PathBuf,
    exclude: Vec<String>,
  },
  /// Remove files or directories.
  Delete { paths: Vec<PathBuf> },
}

impl TaskAction {
  /// One-line description for plans and logs.
  pub fn describe(&self) -> String {
    match self {
      TaskAction::Lifecycle => "lifecycle".to_string(),
      TaskAction::Command { command, .. } => format!("exec `{command}`"),
      TaskAction::Copy { from, into, .. } => format!("copy {} -> {}", from.display(), into.display()),
      TaskAction::Delete { paths } => {
        let paths: Vec<String> = paths.iter().map(|p| p.display().to_string()).collect();
        format!("delete {}", paths.join(", "))
      }
    }
  }
}

/// A node of the task graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Task {
  pub id: TaskId,
  pub module: String,
  /// Working directory for the action.
  pub dir: PathBuf,
  pub build_dir: PathBuf,
  /// Declared input paths (absolute).
  pub inputs: Vec<PathBuf>,
  /// Declared output paths (absolute).
  pub outputs: Vec<PathBuf>,
  /// Tasks that must finish first, as written (`name` or `module:name`).
  pub depends_on: Vec<String>,
  /// Tasks that should depend on this one when they exist, such as `assemble`.
  pub required_by: Vec<String>,
  pub action: TaskAction,
  /// Effective module configuration at expansion time.
  pub config: BTreeMap<String, String>,
  pub cacheable: bool,
  /// Only runs when requested by name, never as part of a whole-graph build.
  pub explicit_only: bool,
  /// Resolved artifacts of the owning module.
  pub classpath: Vec<PathBuf>,
}

impl Task {
  /// A new cacheable task owned by `module`, with no inputs or outputs.
  pub fn new(module: &Module, name: &str, action: TaskAction) -> Self {
    Self {
      id: TaskId::new(&module.name, name),
      module: module.name.clone(),
      dir: module.dir.clone(),
      build_dir: module.build_dir.clone(),
      inputs: Vec::new(),
      outputs: Vec::new(),
      depends_on: Vec::new(),
      required_by: Vec::new(),
      action,
      config: BTreeMap::new(),
      cacheable: true,
      explicit_only: false,
      classpath: Vec::new(),
    }
  }

  /// Add inputs; relative paths are taken from the module directory.
  pub fn inputs<I, P>(mut self, paths: I) -> Self
  where
    I: IntoIterator<Item = P>,
    P: AsRef<Path>,
  {
    let resolved: Vec<PathBuf> = paths.into_iter().map(|p| normalize(&self.dir.join(p))).collect();
    self.inputs.extend(resolved);
    self
  }

  /// Add outputs; relative paths are taken from the module directory.
  pub fn outputs<I, P>(mut self, paths: I) -> Self
  where
    I: IntoIterator<Item = P>,
    P: AsRef<Path>,
  {
    let resolved: Vec<PathBuf> = paths.into_iter().map(|p| normalize(&self.dir.join(p))).collect();
    self.outputs.extend(resolved);
    self
  }

  pub fn depends_on<I, S>(mut self, tasks: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.depends_on.extend(tasks.into_iter().map(Into::into));
    self
  }

  pub fn required_by<I, S>(mut self, tasks: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.required_by.extend(tasks.into_iter().map(Into::into));
    self
  }

  pub fn config(mut self, config: &ResolvedConfig) -> Self {
    self.config = config.values().clone();
    self
  }

  pub fn cacheable(mut self, cacheable: bool) -> Self {
    self.cacheable = cacheable;
    self
  }

  pub fn explicit_only(mut self) -> Self {
    self.explicit_only = true;
    self
  }

  /// Resolve a dependency reference written in this task's module.
  pub fn qualify(&self, reference: &str) -> TaskId {
    match reference.split_once(':') {
      Some((module, name)) => TaskId::new(module, name),
      None => TaskId::new(&self.module, reference),
    }
  }
}

/// Lexically resolve `.` and `..` so overlapping paths compare equal.
fn normalize(path: &Path) -> PathBuf {
  let mut out = PathBuf::new();
  for component in path.components() {
    match component {
      Component::CurDir => {}
      Component::ParentDir => {
        if !out.pop() {
          out.push(component);
        }
      }
      other => out.push(other),
    }
  }
  out
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::util::testutil;

  fn module() -> Module {
    testutil::module("app", Path::new("/p"))
  }

  #[test]
  fn task_id_parts() {
    let id = TaskId::new("app", "compile");
    assert_eq!(id.as_str(), "app:compile");
    assert_eq!(id.module(), "app");
    assert_eq!(id.name(), "compile");
  }

  #[test]
  fn builder_resolves_paths_against_module_dir() {
    let task = Task::new(&module(), "compile", TaskAction::Lifecycle)
      .inputs(["src"])
      .outputs(["/abs/out"]);
    assert_eq!(task.inputs, vec![PathBuf::from("/p/app/src")]);
    assert_eq!(task.outputs, vec![PathBuf::from("/abs/out")]);

    let task = Task::new(&module(), "package", TaskAction::Lifecycle).inputs(["../core/./out"]);
    assert_eq!(task.inputs, vec![PathBuf::from("/p/core/out")]);
  }

  #[test]
  fn qualify_references() {
    let task = Task::new(&module(), "build", TaskAction::Lifecycle);
    assert_eq!(task.qualify("assemble"), TaskId::new("app", "assemble"));
    assert_eq!(task.qualify("core:compile"), TaskId::new("core", "compile"));
  }
}
