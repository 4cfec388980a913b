//! In-memory project model built from descriptors.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Serialize;

use crate::resolve::{DependencyCoordinate, RepositorySpec};

/// A plugin declared in `[[plugins]]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PluginDecl {
  pub id: String,
  pub version: Option<String>,
}

/// What a module dependency points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DependencyTarget {
  /// An artifact fetched from a repository.
  External(DependencyCoordinate),
  /// Another module of the same project.
  Project(String),
}

/// One entry of a module's `dependencies` list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyDecl {
  pub target: DependencyTarget,
  /// Free-form configuration name (`implementation`, `coreLibraryDesugaring`, ...).
  pub scope: String,
}

/// A task declared in `[[modules.tasks]]`, consumed by the `exec` plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskDecl {
  pub name: String,
  pub command: String,
  pub inputs: Vec<String>,
  pub outputs: Vec<String>,
  pub depends_on: Vec<String>,
  /// Hook the task into `assemble`.
  pub lifecycle: bool,
  pub cacheable: bool,
  pub env: BTreeMap<String, String>,
}

/// A buildable unit of the project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Module {
  pub name: String,
  /// Absolute module directory.
  pub dir: PathBuf,
  /// Absolute output directory (`<project build dir>/<module>`).
  pub build_dir: PathBuf,
  pub plugins: Vec<String>,
  pub dependencies: Vec<DependencyDecl>,
  pub config: BTreeMap<String, String>,
  pub variants: BTreeMap<String, BTreeMap<String, String>>,
  pub tasks: Vec<TaskDecl>,
  /// Descriptor that declared the module.
  pub origin: String,
}

impl Module {
  /// Names of the modules this module references through project dependencies.
  pub fn project_dependencies(&self) -> impl Iterator<Item = &str> {
    self.dependencies.iter().filter_map(|dep| match &dep.target {
      DependencyTarget::Project(name) => Some(name.as_str()),
      DependencyTarget::External(_) => None,
    })
  }

  /// External coordinates with their scopes.
  pub fn external_dependencies(&self) -> impl Iterator<Item = (&DependencyCoordinate, &str)> {
    self.dependencies.iter().filter_map(|dep| match &dep.target {
      DependencyTarget::External(coordinate) => Some((coordinate, dep.scope.as_str())),
      DependencyTarget::Project(_) => None,
    })
  }
}

/// The whole project, owning its modules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Project {
  pub name: String,
  pub root_dir: PathBuf,
  /// Absolute build directory; engine state lives under it.
  pub build_dir: PathBuf,
  pub repositories: Vec<RepositorySpec>,
  pub plugins: Vec<PluginDecl>,
  pub defaults: BTreeMap<String, String>,
  pub variants: BTreeMap<String, BTreeMap<String, String>>,
  pub modules: Vec<Module>,
}

impl Project {
  pub fn module(&self, name: &str) -> Option<&Module> {
    self.modules.iter().find(|m| m.name == name)
  }

  /// Every variant name declared by the project or any module.
  pub fn variant_names(&self) -> Vec<String> {
    let mut names: Vec<String> = self
      .variants
      .keys()
      .chain(self.modules.iter().flat_map(|m| m.variants.keys()))
      .cloned()
      .collect();
    names.sort();
    names.dedup();
    names
  }
}
