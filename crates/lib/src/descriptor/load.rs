//! Descriptor parsing and merging.
//!
//! Sources are applied in order (project root first, then module
//! descriptors). Scalar TOML values in configuration tables are kept as
//! strings, nested tables are flattened into dotted keys, and arrays become
//! comma-separated lists, so `copy.exclude = ["a", "b"]` and
//! `"copy.exclude" = "a,b"` configure the same thing.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, info};

use crate::config::{ConfigError, ConfigLayer, ConfigLayers};
use crate::consts::DESCRIPTOR_FILENAME;
use crate::plugin::PluginRegistry;
use crate::resolve::{DependencyCoordinate, RepositorySpec};

use super::types::{DependencyDecl, DependencyTarget, Module, PluginDecl, Project, TaskDecl};

const DEFAULT_BUILD_DIR: &str = "build";

/// One descriptor document with the label used in error messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescriptorSource {
  pub origin: String,
  /// Directory relative paths in this source are resolved against.
  pub base_dir: PathBuf,
  pub content: String,
}

impl DescriptorSource {
  pub fn inline(origin: impl Into<String>, base_dir: impl Into<PathBuf>, content: impl Into<String>) -> Self {
    Self {
      origin: origin.into(),
      base_dir: base_dir.into(),
      content: content.into(),
    }
  }

  /// Read a descriptor file; its directory becomes the base directory.
  pub fn read(path: &Path) -> Result<Self, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
      origin: path.display().to_string(),
      source: e,
    })?;
    let base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
    Ok(Self::inline(path.display().to_string(), base_dir, content))
  }
}

/// Find the descriptors of the project rooted at `project_dir`.
///
/// Returns the root descriptor followed by `*/brick.toml`, sorted by path.
pub fn discover(project_dir: &Path) -> Result<Vec<DescriptorSource>, ConfigError> {
  let root = project_dir.join(DESCRIPTOR_FILENAME);
  if !root.is_file() {
    return Err(ConfigError::NoDescriptors {
      dir: project_dir.to_path_buf(),
      file: DESCRIPTOR_FILENAME,
    });
  }

  let mut sources = vec![DescriptorSource::read(&root)?];

  let pattern = format!(
    "{}/*/{}",
    glob::Pattern::escape(&project_dir.to_string_lossy()),
    DESCRIPTOR_FILENAME
  );
  let mut nested: Vec<PathBuf> = glob::glob(&pattern)
    .map_err(|e| ConfigError::Parse {
      origin: project_dir.display().to_string(),
      message: e.to_string(),
    })?
    .filter_map(Result::ok)
    .collect();
  nested.sort();

  for path in nested {
    sources.push(DescriptorSource::read(&path)?);
  }

  debug!(count = sources.len(), "discovered descriptors");
  Ok(sources)
}

/// Discover and load the project in `project_dir`.
pub fn load_from_dir(project_dir: &Path, registry: &PluginRegistry) -> Result<Project, ConfigError> {
  let sources = discover(project_dir)?;
  load_project(project_dir, &sources, registry)
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawDescriptor {
  #[serde(default)]
  project: Option<RawProject>,
  #[serde(default)]
  repositories: Vec<RepositorySpec>,
  #[serde(default)]
  plugins: Vec<RawPlugin>,
  #[serde(default)]
  defaults: toml::Table,
  #[serde(default)]
  variants: BTreeMap<String, toml::Table>,
  #[serde(default)]
  modules: Vec<RawModule>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawProject {
  name: Option<String>,
  build_dir: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawPlugin {
  id: String,
  version: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawModule {
  name: String,
  dir: Option<String>,
  #[serde(default)]
  plugins: Vec<String>,
  #[serde(default)]
  config: toml::Table,
  #[serde(default)]
  dependencies: Vec<RawDependency>,
  #[serde(default)]
  variants: BTreeMap<String, toml::Table>,
  #[serde(default)]
  tasks: Vec<RawTask>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawDependency {
  coordinate: Option<String>,
  project: Option<String>,
  scope: Option<String>,
  #[serde(default)]
  strict: bool,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawTask {
  name: String,
  command: String,
  #[serde(default)]
  inputs: Vec<String>,
  #[serde(default)]
  outputs: Vec<String>,
  #[serde(default)]
  depends_on: Vec<String>,
  #[serde(default = "default_true")]
  lifecycle: bool,
  #[serde(default = "default_true")]
  cacheable: bool,
  #[serde(default)]
  env: BTreeMap<String, String>,
}

fn default_true() -> bool {
  true
}

/// Merge `sources` into a [`Project`] rooted at `project_dir`.
///
/// # Errors
///
/// Fails on malformed TOML or coordinates, plugins missing from `registry`,
/// duplicate module names, and project dependencies on undeclared modules.
pub fn load_project(
  project_dir: &Path,
  sources: &[DescriptorSource],
  registry: &PluginRegistry,
) -> Result<Project, ConfigError> {
  let mut name: Option<String> = None;
  let mut build_dir: Option<String> = None;
  let mut repositories: Vec<RepositorySpec> = Vec::new();
  let mut plugins: Vec<PluginDecl> = Vec::new();
  let mut defaults = BTreeMap::new();
  let mut variants: BTreeMap<String, BTreeMap<String, String>> = BTreeMap::new();
  let mut raw_modules: Vec<(RawModule, &DescriptorSource)> = Vec::new();

  for source in sources {
    let raw: RawDescriptor = toml::from_str(&source.content).map_err(|e| ConfigError::Parse {
      origin: source.origin.clone(),
      message: e.to_string(),
    })?;

    if let Some(project) = raw.project {
      if project.name.is_some() {
        name = project.name;
      }
      if project.build_dir.is_some() {
        build_dir = project.build_dir;
      }
    }

    for repository in raw.repositories {
      if repositories.iter().any(|r| r.name == repository.name) {
        debug!(name = %repository.name, origin = %source.origin, "repository already declared, keeping first");
        continue;
      }
      repositories.push(repository);
    }

    for plugin in raw.plugins {
      if !registry.contains(&plugin.id) {
        return Err(ConfigError::UnknownPlugin {
          plugin: plugin.id,
          module: None,
        });
      }
      if !plugins.iter().any(|p| p.id == plugin.id) {
        plugins.push(PluginDecl {
          id: plugin.id,
          version: plugin.version,
        });
      }
    }

    defaults.extend(flatten_table(&raw.defaults, &source.origin)?);
    for (variant, table) in &raw.variants {
      variants
        .entry(variant.clone())
        .or_default()
        .extend(flatten_table(table, &source.origin)?);
    }

    raw_modules.extend(raw.modules.into_iter().map(|m| (m, source)));
  }

  let name = name.ok_or(ConfigError::MissingProjectName)?;
  let build_dir = project_dir.join(build_dir.as_deref().unwrap_or(DEFAULT_BUILD_DIR));

  let mut modules: Vec<Module> = Vec::new();
  for (raw, source) in raw_modules {
    if let Some(existing) = modules.iter().find(|m| m.name == raw.name) {
      return Err(ConfigError::DuplicateModule {
        name: raw.name,
        first: existing.origin.clone(),
        second: source.origin.clone(),
      });
    }
    modules.push(build_module(raw, source, project_dir, &build_dir, registry)?);
  }

  for module in &modules {
    for target in module.project_dependencies() {
      if !modules.iter().any(|m| m.name == target) {
        return Err(ConfigError::UnknownProjectDependency {
          module: module.name.clone(),
          target: target.to_string(),
        });
      }
    }
  }

  info!(project = %name, modules = modules.len(), repositories = repositories.len(), "project loaded");

  Ok(Project {
    name,
    root_dir: project_dir.to_path_buf(),
    build_dir,
    repositories,
    plugins,
    defaults,
    variants,
    modules,
  })
}

fn build_module(
  raw: RawModule,
  source: &DescriptorSource,
  project_dir: &Path,
  project_build_dir: &Path,
  registry: &PluginRegistry,
) -> Result<Module, ConfigError> {
  for plugin in &raw.plugins {
    if !registry.contains(plugin) {
      return Err(ConfigError::UnknownPlugin {
        plugin: plugin.clone(),
        module: Some(raw.name.clone()),
      });
    }
  }

  // A module declared in a nested descriptor lives next to it by default.
  let dir = match &raw.dir {
    Some(dir) => source.base_dir.join(dir),
    None if source.base_dir != project_dir => source.base_dir.clone(),
    None => project_dir.join(&raw.name),
  };

  let mut dependencies = Vec::with_capacity(raw.dependencies.len());
  for dep in raw.dependencies {
    dependencies.push(build_dependency(dep, &raw.name, &source.origin)?);
  }

  let mut variants = BTreeMap::new();
  for (variant, table) in &raw.variants {
    variants.insert(variant.clone(), flatten_table(table, &source.origin)?);
  }

  let tasks = raw
    .tasks
    .into_iter()
    .map(|t| TaskDecl {
      name: t.name,
      command: t.command,
      inputs: t.inputs,
      outputs: t.outputs,
      depends_on: t.depends_on,
      lifecycle: t.lifecycle,
      cacheable: t.cacheable,
      env: t.env,
    })
    .collect();

  Ok(Module {
    build_dir: project_build_dir.join(&raw.name),
    name: raw.name,
    dir,
    plugins: raw.plugins,
    dependencies,
    config: flatten_table(&raw.config, &source.origin)?,
    variants,
    tasks,
    origin: source.origin.clone(),
  })
}

fn build_dependency(raw: RawDependency, module: &str, origin: &str) -> Result<DependencyDecl, ConfigError> {
  let scope = raw.scope.unwrap_or_else(|| "implementation".to_string());

  let target = match (raw.coordinate, raw.project) {
    (Some(value), None) => {
      let invalid = |message: String| ConfigError::InvalidCoordinate {
        origin: origin.to_string(),
        value: value.clone(),
        message,
      };
      let mut coordinate: DependencyCoordinate = value.parse().map_err(invalid)?;
      if raw.strict {
        coordinate.constraint = coordinate.constraint.into_strict().map_err(invalid)?;
      }
      DependencyTarget::External(coordinate)
    }
    (None, Some(project)) => DependencyTarget::Project(project),
    _ => {
      return Err(ConfigError::InvalidValue {
        origin: origin.to_string(),
        key: format!("modules.{module}.dependencies"),
        message: "each dependency needs exactly one of `coordinate` or `project`".to_string(),
      });
    }
  };

  Ok(DependencyDecl { target, scope })
}

/// Flatten a TOML table into string key/value pairs.
fn flatten_table(table: &toml::Table, origin: &str) -> Result<BTreeMap<String, String>, ConfigError> {
  let mut out = BTreeMap::new();
  flatten_into(&mut out, "", table, origin)?;
  Ok(out)
}

fn flatten_into(
  out: &mut BTreeMap<String, String>,
  prefix: &str,
  table: &toml::Table,
  origin: &str,
) -> Result<(), ConfigError> {
  for (key, value) in table {
    let full_key = if prefix.is_empty() {
      key.clone()
    } else {
      format!("{prefix}.{key}")
    };

    match value {
      toml::Value::Table(nested) => flatten_into(out, &full_key, nested, origin)?,
      toml::Value::Array(items) => {
        let mut parts = Vec::with_capacity(items.len());
        for item in items {
          parts.push(scalar(item).ok_or_else(|| ConfigError::InvalidValue {
            origin: origin.to_string(),
            key: full_key.clone(),
            message: "arrays may only contain scalar values".to_string(),
          })?);
        }
        out.insert(full_key, parts.join(","));
      }
      other => {
        if let Some(s) = scalar(other) {
          out.insert(full_key, s);
        }
      }
    }
  }
  Ok(())
}

fn scalar(value: &toml::Value) -> Option<String> {
  match value {
    toml::Value::String(s) => Some(s.clone()),
    toml::Value::Integer(i) => Some(i.to_string()),
    toml::Value::Float(f) => Some(f.to_string()),
    toml::Value::Boolean(b) => Some(b.to_string()),
    toml::Value::Datetime(d) => Some(d.to_string()),
    toml::Value::Array(_) | toml::Value::Table(_) => None,
  }
}

/// Configuration layers of `module` for the selected variant.
///
/// Order: project defaults, module config, project variant, module variant,
/// then command-line overrides.
pub fn module_layers(
  project: &Project,
  module: &Module,
  variant: &str,
  overrides: &BTreeMap<String, String>,
) -> ConfigLayers {
  let mut layers = ConfigLayers::new();
  layers.push(ConfigLayer::new("defaults", project.defaults.clone()));
  layers.push(ConfigLayer::new(format!("module:{}", module.name), module.config.clone()));
  if let Some(values) = project.variants.get(variant) {
    layers.push(ConfigLayer::new(format!("variant:{variant}"), values.clone()));
  }
  if let Some(values) = module.variants.get(variant) {
    layers.push(ConfigLayer::new(
      format!("module:{}:variant:{variant}", module.name),
      values.clone(),
    ));
  }
  if !overrides.is_empty() {
    layers.push(ConfigLayer::new("command-line", overrides.clone()));
  }
  layers
}
