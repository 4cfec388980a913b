//! Types for dependency resolution.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

use super::coordinate::{ArtifactKey, ArtifactVersion, VersionConstraint};

/// One module's request for an artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirement {
  /// Module that declared the dependency.
  pub module: String,
  pub constraint: VersionConstraint,
}

impl fmt::Display for Requirement {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} requires {}", self.module, self.constraint)
  }
}

/// Errors that can occur while resolving dependencies.
///
/// Cloneable so a single failed fetch can be reported to every module that
/// requested the same coordinate in a session.
#[derive(Debug, Clone, Error)]
pub enum ResolveError {
  /// No repository could provide the artifact.
  #[error("could not resolve {coordinate}; attempted: {}", .attempted.join(", "))]
  NotFound { coordinate: String, attempted: Vec<String> },

  /// Requests for the same artifact cannot be satisfied together.
  #[error("version conflict for {key}: {}", join_requirements(.requirements))]
  VersionConflict {
    key: ArtifactKey,
    requirements: Vec<Requirement>,
  },

  /// Versions exist, but none matches the requested range.
  #[error("no version of {key} matches {constraints} (available: {})", .available.join(", "))]
  NoMatchingVersion {
    key: ArtifactKey,
    constraints: String,
    available: Vec<String>,
  },

  /// Downloaded content did not match the published checksum.
  #[error("checksum mismatch for {coordinate}: expected {expected}, got {actual}")]
  ChecksumMismatch {
    coordinate: String,
    expected: String,
    actual: String,
  },

  /// The local artifact cache could not be read or written.
  #[error("artifact cache error at {path}: {message}")]
  Cache { path: PathBuf, message: String },
}

fn join_requirements(requirements: &[Requirement]) -> String {
  requirements
    .iter()
    .map(ToString::to_string)
    .collect::<Vec<_>>()
    .join("; ")
}

/// A coordinate resolved to a concrete file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedArtifact {
  pub key: ArtifactKey,
  pub version: ArtifactVersion,
  /// Repository that served the artifact (`cache` when already local).
  pub repository: String,
  /// Location in the local artifact cache.
  pub path: PathBuf,
  /// SHA-256 of the artifact contents.
  pub sha256: String,
}

impl ResolvedArtifact {
  pub fn coordinate(&self) -> String {
    format!("{}:{}", self.key, self.version)
  }
}

/// Resolution outcome for one module.
#[derive(Debug, Clone, Default)]
pub struct ModuleResolution {
  pub artifacts: Vec<ResolvedArtifact>,
  pub errors: Vec<ResolveError>,
}

impl ModuleResolution {
  pub fn is_success(&self) -> bool {
    self.errors.is_empty()
  }
}

/// Resolution outcome for the whole project, keyed by module name.
#[derive(Debug, Clone, Default)]
pub struct ResolutionReport {
  pub modules: BTreeMap<String, ModuleResolution>,
}

impl ResolutionReport {
  pub fn is_success(&self) -> bool {
    self.modules.values().all(ModuleResolution::is_success)
  }

  /// Modules with at least one resolution error, with the rendered errors.
  pub fn failures(&self) -> BTreeMap<String, Vec<String>> {
    self
      .modules
      .iter()
      .filter(|(_, resolution)| !resolution.is_success())
      .map(|(name, resolution)| (name.clone(), resolution.errors.iter().map(ToString::to_string).collect()))
      .collect()
  }

  pub fn artifacts(&self, module: &str) -> &[ResolvedArtifact] {
    self
      .modules
      .get(module)
      .map(|resolution| resolution.artifacts.as_slice())
      .unwrap_or_default()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn not_found_lists_attempts() {
    let err = ResolveError::NotFound {
      coordinate: "g:a:1.0.0".to_string(),
      attempted: vec!["google (https://g)".to_string(), "central (https://c)".to_string()],
    };
    assert_eq!(
      err.to_string(),
      "could not resolve g:a:1.0.0; attempted: google (https://g), central (https://c)"
    );
  }

  #[test]
  fn conflict_names_each_requirement() {
    let err = ResolveError::VersionConflict {
      key: ArtifactKey::new("g", "a"),
      requirements: vec![
        Requirement {
          module: "app".to_string(),
          constraint: VersionConstraint::parse("2.0.4!!").unwrap(),
        },
        Requirement {
          module: "core".to_string(),
          constraint: VersionConstraint::parse("2.1.4").unwrap(),
        },
      ],
    };
    assert_eq!(
      err.to_string(),
      "version conflict for g:a: app requires 2.0.4!!; core requires 2.1.4"
    );
  }

  #[test]
  fn report_failures_only_include_failed_modules() {
    let mut report = ResolutionReport::default();
    report.modules.insert("ok".to_string(), ModuleResolution::default());
    report.modules.insert(
      "bad".to_string(),
      ModuleResolution {
        artifacts: vec![],
        errors: vec![ResolveError::NotFound {
          coordinate: "g:a:1.0.0".to_string(),
          attempted: vec![],
        }],
      },
    );

    assert!(!report.is_success());
    let failures = report.failures();
    assert_eq!(failures.len(), 1);
    assert!(failures.contains_key("bad"));
    assert!(report.artifacts("missing").is_empty());
  }
}
