use std::path::PathBuf;

use thiserror::Error;

/// A project that cannot be built as described.
///
/// Every variant is fatal and reported before any task executes.
#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("failed to read descriptor {origin}: {source}")]
  Read {
    origin: String,
    #[source]
    source: std::io::Error,
  },

  #[error("malformed descriptor {origin}: {message}")]
  Parse { origin: String, message: String },

  #[error("no {file} found in {dir}")]
  NoDescriptors { dir: PathBuf, file: &'static str },

  #[error("project name is not set by any descriptor")]
  MissingProjectName,

  #[error("unknown plugin `{}`{}", .plugin, applied_by(.module))]
  UnknownPlugin { plugin: String, module: Option<String> },

  #[error("module `{name}` is declared twice ({first} and {second})")]
  DuplicateModule { name: String, first: String, second: String },

  #[error("module `{module}` depends on unknown module `{target}`")]
  UnknownProjectDependency { module: String, target: String },

  #[error("invalid dependency coordinate `{value}` in {origin}: {message}")]
  InvalidCoordinate { origin: String, value: String, message: String },

  #[error("invalid value for `{key}` in {origin}: {message}")]
  InvalidValue { origin: String, key: String, message: String },

  #[error("invalid repository `{name}` ({url}): {message}")]
  InvalidRepository { name: String, url: String, message: String },

  #[error("invalid override `{0}`, expected key=value")]
  InvalidOverride(String),

  #[error("SDK location not found; set {property} in {properties} or one of {env_vars}")]
  SdkNotFound {
    property: &'static str,
    properties: PathBuf,
    env_vars: String,
  },

  #[error("plugin `{plugin}` failed to configure module `{module}`: {message}")]
  Plugin { plugin: String, module: String, message: String },

  #[error("task `{0}` is defined twice")]
  DuplicateTask(String),

  #[error("task `{task}` depends on unknown task `{target}`")]
  UnknownTaskDependency { task: String, target: String },

  #[error("task `{0}` not found in any module")]
  UnknownTask(String),

  #[error("unknown variant `{variant}` (declared: {declared})")]
  UnknownVariant { variant: String, declared: String },
}

fn applied_by(module: &Option<String>) -> String {
  match module {
    Some(module) => format!(" applied by module `{module}`"),
    None => String::new(),
  }
}
