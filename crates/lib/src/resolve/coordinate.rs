//! Dependency coordinates and version constraints.
//!
//! A coordinate is written `group:artifact:version`. The version part is one
//! of:
//!
//! - a bare version (`2.1.4`): the version to use unless a higher request
//!   for the same artifact wins;
//! - a range, either semver operators (`>=1.2, <2`, `^1.4`, `1.*`) or Maven
//!   brackets (`[1.0,2.0)`);
//! - a strict pin (`2.0.4!!`): exactly this version, and every other request
//!   for the artifact must accept it.
//!
//! Versions are compared as semver after padding (`1.2` orders as `1.2.0`),
//! but the text as declared or published is what names files in a
//! repository.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use semver::{Version, VersionReq};
use serde::{Deserialize, Serialize, Serializer};

/// `group:artifact`, the identity that must resolve to a single version.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ArtifactKey {
  pub group: String,
  pub artifact: String,
}

impl ArtifactKey {
  pub fn new(group: impl Into<String>, artifact: impl Into<String>) -> Self {
    Self {
      group: group.into(),
      artifact: artifact.into(),
    }
  }

  /// Relative directory of this artifact in a Maven-layout repository.
  pub fn repository_path(&self) -> String {
    format!("{}/{}", self.group.replace('.', "/"), self.artifact)
  }

  /// Relative path of the artifact file for a given version.
  pub fn artifact_path(&self, version: &ArtifactVersion) -> String {
    format!("{}/{}/{}", self.repository_path(), version, self.file_name(version))
  }

  /// File name of the artifact for a given version.
  pub fn file_name(&self, version: &ArtifactVersion) -> String {
    format!("{}-{}.jar", self.artifact, version)
  }
}

impl fmt::Display for ArtifactKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}:{}", self.group, self.artifact)
  }
}

/// A version as declared or published, with its semver reading.
///
/// Ordering follows the semver reading; two spellings of the same version
/// (`1.2` and `1.2.0`) stay distinct because they name different files.
#[derive(Debug, Clone)]
pub struct ArtifactVersion {
  raw: String,
  semver: Version,
}

impl ArtifactVersion {
  pub fn parse(raw: &str) -> Result<Self, String> {
    let raw = raw.trim();
    Ok(Self {
      semver: parse_version(raw)?,
      raw: raw.to_string(),
    })
  }

  /// The text used in repository paths and coordinates.
  pub fn as_str(&self) -> &str {
    &self.raw
  }

  pub fn semver(&self) -> &Version {
    &self.semver
  }
}

impl PartialEq for ArtifactVersion {
  fn eq(&self, other: &Self) -> bool {
    self.cmp(other) == Ordering::Equal
  }
}

impl Eq for ArtifactVersion {}

impl PartialOrd for ArtifactVersion {
  fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
    Some(self.cmp(other))
  }
}

impl Ord for ArtifactVersion {
  fn cmp(&self, other: &Self) -> Ordering {
    self.semver.cmp(&other.semver).then_with(|| self.raw.cmp(&other.raw))
  }
}

impl Hash for ArtifactVersion {
  fn hash<H: Hasher>(&self, state: &mut H) {
    self.raw.hash(state);
  }
}

impl fmt::Display for ArtifactVersion {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.raw)
  }
}

impl Serialize for ArtifactVersion {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&self.raw)
  }
}

/// What a declaration accepts for the version of an artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionConstraint {
  Prefer(ArtifactVersion),
  Range(VersionReq),
  Strict(ArtifactVersion),
}

impl VersionConstraint {
  pub fn parse(raw: &str) -> Result<Self, String> {
    let raw = raw.trim();
    if raw.is_empty() {
      return Err("empty version".to_string());
    }

    if let Some(pinned) = raw.strip_suffix("!!") {
      return ArtifactVersion::parse(pinned).map(VersionConstraint::Strict);
    }

    if raw.starts_with('[') || raw.starts_with('(') {
      return parse_maven_range(raw).map(VersionConstraint::Range);
    }

    let is_range = raw.starts_with(['^', '~', '>', '<', '=']) || raw.contains('*') || raw.contains(',');
    if is_range {
      return VersionReq::parse(raw)
        .map(VersionConstraint::Range)
        .map_err(|e| e.to_string());
    }

    ArtifactVersion::parse(raw).map(VersionConstraint::Prefer)
  }

  /// Whether `version` satisfies this constraint.
  ///
  /// A bare version is a lower bound: anything at or above it is accepted
  /// when another request selects a higher version.
  pub fn accepts(&self, version: &Version) -> bool {
    match self {
      VersionConstraint::Prefer(min) => version >= min.semver(),
      VersionConstraint::Range(req) => req.matches(version),
      VersionConstraint::Strict(pinned) => version == pinned.semver(),
    }
  }

  pub fn is_strict(&self) -> bool {
    matches!(self, VersionConstraint::Strict(_))
  }

  /// Turn a bare version into a strict pin.
  pub fn into_strict(self) -> Result<Self, String> {
    match self {
      VersionConstraint::Prefer(v) | VersionConstraint::Strict(v) => Ok(VersionConstraint::Strict(v)),
      VersionConstraint::Range(req) => Err(format!("range `{req}` cannot be a strict pin")),
    }
  }
}

impl fmt::Display for VersionConstraint {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      VersionConstraint::Prefer(v) => write!(f, "{v}"),
      VersionConstraint::Range(req) => write!(f, "{req}"),
      VersionConstraint::Strict(v) => write!(f, "{v}!!"),
    }
  }
}

/// An external dependency: `group:artifact` plus a version constraint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyCoordinate {
  pub key: ArtifactKey,
  pub constraint: VersionConstraint,
}

impl DependencyCoordinate {
  pub fn group(&self) -> &str {
    &self.key.group
  }

  pub fn artifact(&self) -> &str {
    &self.key.artifact
  }
}

impl FromStr for DependencyCoordinate {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let mut parts = s.trim().splitn(3, ':');
    let group = parts.next().unwrap_or_default().trim();
    let artifact = parts.next().unwrap_or_default().trim();
    let version = parts.next().unwrap_or_default();

    if group.is_empty() || artifact.is_empty() || version.trim().is_empty() {
      return Err("expected group:artifact:version".to_string());
    }

    Ok(Self {
      key: ArtifactKey::new(group, artifact),
      constraint: VersionConstraint::parse(version)?,
    })
  }
}

impl fmt::Display for DependencyCoordinate {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}:{}", self.key, self.constraint)
  }
}

/// Parse a version leniently: missing minor/patch components default to 0
/// (`2.1` is `2.1.0`), and a leading `v` is ignored.
pub fn parse_version(raw: &str) -> Result<Version, String> {
  let raw = raw.trim().trim_start_matches(['v', 'V']);
  if let Ok(v) = Version::parse(raw) {
    return Ok(v);
  }

  let (core, rest) = match raw.find(['-', '+']) {
    Some(idx) => raw.split_at(idx),
    None => (raw, ""),
  };
  let parts: Vec<&str> = core.split('.').collect();
  if parts.is_empty() || parts.len() > 3 || parts.iter().any(|p| p.is_empty()) {
    return Err(format!("invalid version `{raw}`"));
  }

  let mut padded = parts.join(".");
  for _ in parts.len()..3 {
    padded.push_str(".0");
  }
  padded.push_str(rest);

  Version::parse(&padded).map_err(|e| format!("invalid version `{raw}`: {e}"))
}

/// Translate a Maven range (`[1.0,2.0)`, `(,1.5]`, `[1.2,)`) into a semver requirement.
fn parse_maven_range(raw: &str) -> Result<VersionReq, String> {
  let invalid = || format!("invalid range `{raw}`");

  let lower_inclusive = raw.starts_with('[');
  let upper_inclusive = raw.ends_with(']');
  if !raw.ends_with(']') && !raw.ends_with(')') {
    return Err(invalid());
  }

  let inner = &raw[1..raw.len() - 1];
  let (lower, upper) = inner.split_once(',').ok_or_else(invalid)?;

  let mut comparators = Vec::new();
  if !lower.trim().is_empty() {
    let op = if lower_inclusive { ">=" } else { ">" };
    comparators.push(format!("{op}{}", parse_version(lower)?));
  }
  if !upper.trim().is_empty() {
    let op = if upper_inclusive { "<=" } else { "<" };
    comparators.push(format!("{op}{}", parse_version(upper)?));
  }
  if comparators.is_empty() {
    return Ok(VersionReq::STAR);
  }

  VersionReq::parse(&comparators.join(", ")).map_err(|e| e.to_string())
}
