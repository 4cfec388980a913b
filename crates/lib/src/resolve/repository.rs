//! Artifact repositories.
//!
//! Repositories use the Maven layout:
//!
//! ```text
//! {base}/{group as path}/{artifact}/maven-metadata.xml
//! {base}/{group as path}/{artifact}/{version}/{artifact}-{version}.jar
//! {base}/{group as path}/{artifact}/{version}/{artifact}-{version}.jar.sha256   (optional)
//! ```
//!
//! `file://` URLs and plain paths are read from disk (versions are listed
//! from the version directories); `http://` and `https://` URLs are fetched
//! with reqwest. Version directories and file names use the version exactly
//! as published, so `1.2` stays `1.2`.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::config::ConfigError;

use super::coordinate::{ArtifactKey, ArtifactVersion};

static METADATA_VERSIONS: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"(?s)<versions>(.*?)</versions>").expect("metadata regex is valid"));

static METADATA_VERSION: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"<version>\s*([^<\s]+)\s*</version>").expect("metadata regex is valid"));

/// A repository as declared in a descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositorySpec {
  pub name: String,
  pub url: String,
}

/// Why a repository could not serve a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepoError {
  NotFound,
  Failed(String),
  ChecksumMismatch { expected: String, actual: String },
}

impl std::fmt::Display for RepoError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      RepoError::NotFound => write!(f, "not found"),
      RepoError::Failed(message) => write!(f, "{message}"),
      RepoError::ChecksumMismatch { expected, actual } => {
        write!(f, "checksum mismatch (expected {expected}, got {actual})")
      }
    }
  }
}

/// Artifact bytes plus their SHA-256.
#[derive(Debug, Clone)]
pub struct FetchedArtifact {
  pub bytes: Vec<u8>,
  pub sha256: String,
}

/// A configured repository endpoint.
#[derive(Debug, Clone)]
pub enum Repository {
  Directory {
    name: String,
    root: PathBuf,
  },
  Http {
    name: String,
    base: String,
    client: reqwest::Client,
  },
}

impl Repository {
  /// Build a repository from its declaration.
  ///
  /// Relative directory paths are resolved against `project_dir`.
  pub fn from_spec(spec: &RepositorySpec, project_dir: &Path) -> Result<Self, ConfigError> {
    let url = spec.url.trim();
    let invalid = |message: &str| ConfigError::InvalidRepository {
      name: spec.name.clone(),
      url: spec.url.clone(),
      message: message.to_string(),
    };

    if url.starts_with("http://") || url.starts_with("https://") {
      let client = reqwest::Client::builder()
        .user_agent(concat!("brick/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| invalid(&e.to_string()))?;
      return Ok(Repository::Http {
        name: spec.name.clone(),
        base: url.trim_end_matches('/').to_string(),
        client,
      });
    }

    let path = url.strip_prefix("file://").unwrap_or(url);
    if path.is_empty() || (url.contains("://") && !url.starts_with("file://")) {
      return Err(invalid("unsupported repository URL scheme"));
    }

    let path = Path::new(path);
    let root = if path.is_absolute() {
      path.to_path_buf()
    } else {
      project_dir.join(path)
    };

    Ok(Repository::Directory {
      name: spec.name.clone(),
      root,
    })
  }

  pub fn name(&self) -> &str {
    match self {
      Repository::Directory { name, .. } | Repository::Http { name, .. } => name,
    }
  }

  /// Human-readable endpoint, as listed in resolution errors.
  pub fn location(&self) -> String {
    match self {
      Repository::Directory { root, .. } => root.display().to_string(),
      Repository::Http { base, .. } => base.clone(),
    }
  }

  pub fn is_remote(&self) -> bool {
    matches!(self, Repository::Http { .. })
  }

  /// List the published versions of an artifact.
  pub async fn list_versions(&self, key: &ArtifactKey) -> Result<Vec<ArtifactVersion>, RepoError> {
    let raw: Vec<String> = match self {
      Repository::Directory { root, .. } => {
        let dir = root.join(key.repository_path());
        let mut entries = match tokio::fs::read_dir(&dir).await {
          Ok(entries) => entries,
          Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(RepoError::NotFound),
          Err(e) => return Err(RepoError::Failed(e.to_string())),
        };
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|e| RepoError::Failed(e.to_string()))? {
          if entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false) {
            names.push(entry.file_name().to_string_lossy().to_string());
          }
        }
        names
      }
      Repository::Http { base, client, .. } => {
        let url = format!("{}/{}/maven-metadata.xml", base, key.repository_path());
        let body = http_get(client, &url).await?;
        parse_metadata_versions(&String::from_utf8_lossy(&body))
      }
    };

    let mut versions: Vec<ArtifactVersion> = raw
      .iter()
      .filter_map(|name| match ArtifactVersion::parse(name) {
        Ok(v) => Some(v),
        Err(e) => {
          debug!(repository = %self.name(), artifact = %key, version = %name, error = %e, "ignoring unparseable version");
          None
        }
      })
      .collect();
    versions.sort();
    versions.dedup();

    if versions.is_empty() {
      return Err(RepoError::NotFound);
    }
    Ok(versions)
  }

  /// Download an artifact, verifying a published `.sha256` when present.
  pub async fn fetch(&self, key: &ArtifactKey, version: &ArtifactVersion) -> Result<FetchedArtifact, RepoError> {
    let relative = key.artifact_path(version);

    let (bytes, published) = match self {
      Repository::Directory { root, .. } => {
        let path = root.join(&relative);
        let bytes = match tokio::fs::read(&path).await {
          Ok(bytes) => bytes,
          Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(RepoError::NotFound),
          Err(e) => return Err(RepoError::Failed(e.to_string())),
        };
        let published = tokio::fs::read_to_string(root.join(format!("{relative}.sha256")))
          .await
          .ok();
        (bytes, published)
      }
      Repository::Http { base, client, .. } => {
        let url = format!("{base}/{relative}");
        info!(url = %url, "downloading artifact");
        let bytes = http_get(client, &url).await?;
        let published = match http_get(client, &format!("{url}.sha256")).await {
          Ok(body) => Some(String::from_utf8_lossy(&body).to_string()),
          Err(RepoError::NotFound) => None,
          Err(e) => {
            warn!(url = %url, error = %e, "checksum unavailable, skipping verification");
            None
          }
        };
        (bytes, published)
      }
    };

    let sha256 = {
      let mut hasher = Sha256::new();
      hasher.update(&bytes);
      hex::encode(hasher.finalize())
    };

    if let Some(published) = published {
      // Checksum files may carry the file name after the digest.
      let expected = published.split_whitespace().next().unwrap_or_default().to_lowercase();
      if !expected.is_empty() && expected != sha256 {
        return Err(RepoError::ChecksumMismatch {
          expected,
          actual: sha256,
        });
      }
    }

    Ok(FetchedArtifact { bytes, sha256 })
  }
}

async fn http_get(client: &reqwest::Client, url: &str) -> Result<Vec<u8>, RepoError> {
  let response = client
    .get(url)
    .send()
    .await
    .map_err(|e| RepoError::Failed(e.to_string()))?;

  check_status(response.status())?;
  let bytes = response.bytes().await.map_err(|e| RepoError::Failed(e.to_string()))?;
  Ok(bytes.to_vec())
}

fn check_status(status: reqwest::StatusCode) -> Result<(), RepoError> {
  if status == reqwest::StatusCode::NOT_FOUND || status == reqwest::StatusCode::GONE {
    return Err(RepoError::NotFound);
  }
  if !status.is_success() {
    return Err(RepoError::Failed(format!("HTTP {status}")));
  }
  Ok(())
}

/// Versions listed in a `maven-metadata.xml`, in document order.
///
/// Only the `<versions>` block is read when present; `<latest>` and
/// `<release>` repeat entries from it.
fn parse_metadata_versions(xml: &str) -> Vec<String> {
  let listing = METADATA_VERSIONS
    .captures(xml)
    .and_then(|caps| caps.get(1))
    .map_or(xml, |m| m.as_str());

  let mut versions: Vec<String> = Vec::new();
  for caps in METADATA_VERSION.captures_iter(listing) {
    if let Some(m) = caps.get(1)
      && !versions.iter().any(|v| v == m.as_str())
    {
      versions.push(m.as_str().to_string());
    }
  }
  versions
}
