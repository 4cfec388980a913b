//! Local artifact cache.
//!
//! Artifacts are stored by coordinate and checksum, with an index mapping
//! each resolved coordinate to the checksum of its cached file.
//!
//! # Layout
//!
//! ```text
//! {cache_dir}/
//! ├── index.json
//! └── {group}/{artifact}/{version}/{sha256}/{artifact}-{version}.jar
//! ```
//!
//! Versions are spelled as published, so `1.2` and `1.2.0` are separate
//! entries.
//!
//! # Index Format
//!
//! ```json
//! {
//!   "version": 1,
//!   "entries": {
//!     "com.android.tools:desugar_jdk_libs:2.1.4": {
//!       "sha256": "9f2c…",
//!       "repository": "google",
//!       "fetchedAt": 1733667300
//!     }
//!   }
//! }
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::util::hash::hash_file;

use super::coordinate::{ArtifactKey, ArtifactVersion};
use super::types::{ResolveError, ResolvedArtifact};

/// Current index format version.
pub const CACHE_INDEX_VERSION: u32 = 1;

const INDEX_FILENAME: &str = "index.json";

/// Repository name reported for artifacts served from the cache.
pub const CACHE_REPOSITORY: &str = "cache";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct CacheIndex {
  version: u32,
  entries: BTreeMap<String, CacheEntry>,
}

impl Default for CacheIndex {
  fn default() -> Self {
    Self {
      version: CACHE_INDEX_VERSION,
      entries: BTreeMap::new(),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CacheEntry {
  sha256: String,
  repository: String,
  fetched_at: u64,
}

/// Checksum-keyed store of downloaded artifacts.
#[derive(Debug)]
pub struct ArtifactCache {
  root: PathBuf,
  index: Mutex<CacheIndex>,
}

impl ArtifactCache {
  /// Open the cache rooted at `root`, creating nothing until the first store.
  ///
  /// An index with an unknown format version is discarded; its files are
  /// re-fetched on demand.
  pub fn open(root: impl Into<PathBuf>) -> Result<Self, ResolveError> {
    let root = root.into();
    let index_path = root.join(INDEX_FILENAME);

    let index = match fs::read_to_string(&index_path) {
      Ok(content) => match serde_json::from_str::<CacheIndex>(&content) {
        Ok(index) if index.version == CACHE_INDEX_VERSION => index,
        Ok(index) => {
          warn!(path = %index_path.display(), version = index.version, "discarding artifact index with unknown version");
          CacheIndex::default()
        }
        Err(e) => {
          warn!(path = %index_path.display(), error = %e, "discarding unreadable artifact index");
          CacheIndex::default()
        }
      },
      Err(e) if e.kind() == io::ErrorKind::NotFound => CacheIndex::default(),
      Err(e) => return Err(cache_error(&index_path, e)),
    };

    Ok(Self {
      root,
      index: Mutex::new(index),
    })
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  fn artifact_path(&self, key: &ArtifactKey, version: &ArtifactVersion, sha256: &str) -> PathBuf {
    self
      .root
      .join(&key.group)
      .join(&key.artifact)
      .join(version.as_str())
      .join(sha256)
      .join(key.file_name(version))
  }

  /// Look up a cached artifact, verifying the file still matches its checksum.
  pub fn lookup(&self, key: &ArtifactKey, version: &ArtifactVersion) -> Option<ResolvedArtifact> {
    let coordinate = format!("{key}:{version}");
    let entry = self.lock_index().entries.get(&coordinate).cloned()?;
    let path = self.artifact_path(key, version, &entry.sha256);

    match hash_file(&path) {
      Ok(actual) if actual.0 == entry.sha256 => {
        debug!(coordinate = %coordinate, "artifact cache hit");
        Some(ResolvedArtifact {
          key: key.clone(),
          version: version.clone(),
          repository: CACHE_REPOSITORY.to_string(),
          path,
          sha256: entry.sha256,
        })
      }
      Ok(actual) => {
        warn!(coordinate = %coordinate, expected = %entry.sha256, actual = %actual, "cached artifact corrupted, ignoring");
        None
      }
      Err(_) => {
        debug!(coordinate = %coordinate, "indexed artifact missing from cache");
        None
      }
    }
  }

  /// Versions of `key` present in the index.
  pub fn versions(&self, key: &ArtifactKey) -> Vec<ArtifactVersion> {
    let prefix = format!("{key}:");
    let mut versions: Vec<ArtifactVersion> = self
      .lock_index()
      .entries
      .keys()
      .filter_map(|coordinate| coordinate.strip_prefix(&prefix))
      .filter_map(|version| ArtifactVersion::parse(version).ok())
      .collect();
    versions.sort();
    versions
  }

  /// Store fetched bytes and record them in the index.
  pub fn store(
    &self,
    key: &ArtifactKey,
    version: &ArtifactVersion,
    repository: &str,
    bytes: &[u8],
    sha256: &str,
  ) -> Result<ResolvedArtifact, ResolveError> {
    let path = self.artifact_path(key, version, sha256);
    if let Some(parent) = path.parent() {
      fs::create_dir_all(parent).map_err(|e| cache_error(parent, e))?;
    }

    // Write atomically so a crashed fetch never leaves a truncated artifact.
    let temp_path = path.with_extension("jar.tmp");
    fs::write(&temp_path, bytes).map_err(|e| cache_error(&temp_path, e))?;
    fs::rename(&temp_path, &path).map_err(|e| cache_error(&path, e))?;

    let fetched_at = SystemTime::now()
      .duration_since(UNIX_EPOCH)
      .unwrap_or_default()
      .as_secs();

    {
      let mut index = self.lock_index();
      index.entries.insert(
        format!("{key}:{version}"),
        CacheEntry {
          sha256: sha256.to_string(),
          repository: repository.to_string(),
          fetched_at,
        },
      );
      self.save_index(&index)?;
    }

    Ok(ResolvedArtifact {
      key: key.clone(),
      version: version.clone(),
      repository: repository.to_string(),
      path,
      sha256: sha256.to_string(),
    })
  }

  fn save_index(&self, index: &CacheIndex) -> Result<(), ResolveError> {
    fs::create_dir_all(&self.root).map_err(|e| cache_error(&self.root, e))?;

    let path = self.root.join(INDEX_FILENAME);
    let temp_path = self.root.join("index.json.tmp");
    let content = serde_json::to_string_pretty(index).map_err(|e| ResolveError::Cache {
      path: path.clone(),
      message: e.to_string(),
    })?;
    fs::write(&temp_path, content).map_err(|e| cache_error(&temp_path, e))?;
    fs::rename(&temp_path, &path).map_err(|e| cache_error(&path, e))?;
    Ok(())
  }

  fn lock_index(&self) -> std::sync::MutexGuard<'_, CacheIndex> {
    // A poisoned index is still a valid map; keep using it.
    self.index.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
  }
}

fn cache_error(path: &Path, e: io::Error) -> ResolveError {
  ResolveError::Cache {
    path: path.to_path_buf(),
    message: e.to_string(),
  }
}
