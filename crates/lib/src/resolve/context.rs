//! Session-scoped resolution state.
//!
//! A [`ResolutionContext`] owns the repository search order, the artifact
//! cache, and the memo tables for one build session. Every resolver call
//! goes through it, so a coordinate is fetched at most once per session
//! even when several modules (or concurrent tasks) ask for it.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::config::ConfigError;

use super::cache::ArtifactCache;
use super::coordinate::{ArtifactKey, ArtifactVersion};
use super::repository::{RepoError, Repository, RepositorySpec};
use super::types::{ResolveError, ResolvedArtifact};

type Memo<K, V> = Mutex<HashMap<K, Arc<OnceCell<Result<V, ResolveError>>>>>;

/// Repositories, cache, and per-session memoization.
#[derive(Debug)]
pub struct ResolutionContext {
  repositories: Vec<Repository>,
  cache: ArtifactCache,
  offline: bool,
  artifacts: Memo<(ArtifactKey, ArtifactVersion), ResolvedArtifact>,
  listings: Memo<ArtifactKey, Vec<ArtifactVersion>>,
  fetches: AtomicUsize,
}

impl ResolutionContext {
  pub fn new(repositories: Vec<Repository>, cache: ArtifactCache, offline: bool) -> Self {
    Self {
      repositories,
      cache,
      offline,
      artifacts: Mutex::new(HashMap::new()),
      listings: Mutex::new(HashMap::new()),
      fetches: AtomicUsize::new(0),
    }
  }

  /// Build a context from declared repositories.
  pub fn from_specs(
    specs: &[RepositorySpec],
    project_dir: &Path,
    cache: ArtifactCache,
    offline: bool,
  ) -> Result<Self, ConfigError> {
    let repositories = specs
      .iter()
      .map(|spec| Repository::from_spec(spec, project_dir))
      .collect::<Result<Vec<_>, _>>()?;
    Ok(Self::new(repositories, cache, offline))
  }

  pub fn cache(&self) -> &ArtifactCache {
    &self.cache
  }

  pub fn is_offline(&self) -> bool {
    self.offline
  }

  /// Number of artifact lookups that went past the session memo.
  pub fn fetch_count(&self) -> usize {
    self.fetches.load(Ordering::SeqCst)
  }

  /// Resolve a concrete coordinate to a cached file.
  ///
  /// Concurrent callers for the same coordinate share one lookup.
  pub async fn artifact(
    &self,
    key: &ArtifactKey,
    version: &ArtifactVersion,
  ) -> Result<ResolvedArtifact, ResolveError> {
    let cell = memo_cell(&self.artifacts, (key.clone(), version.clone()));
    cell.get_or_init(|| self.fetch_artifact(key, version)).await.clone()
  }

  /// All versions of `key` known to the cache and the repositories.
  pub async fn versions(&self, key: &ArtifactKey) -> Result<Vec<ArtifactVersion>, ResolveError> {
    let cell = memo_cell(&self.listings, key.clone());
    cell.get_or_init(|| self.list_versions(key)).await.clone()
  }

  fn usable(&self, repository: &Repository) -> bool {
    !(self.offline && repository.is_remote())
  }

  async fn fetch_artifact(
    &self,
    key: &ArtifactKey,
    version: &ArtifactVersion,
  ) -> Result<ResolvedArtifact, ResolveError> {
    self.fetches.fetch_add(1, Ordering::SeqCst);
    let coordinate = format!("{key}:{version}");

    if let Some(hit) = self.cache.lookup(key, version) {
      return Ok(hit);
    }

    let mut attempted = Vec::new();
    for repository in &self.repositories {
      let endpoint = format!("{} ({})", repository.name(), repository.location());
      if !self.usable(repository) {
        attempted.push(format!("{endpoint}: skipped, offline"));
        continue;
      }

      match repository.fetch(key, version).await {
        Ok(fetched) => {
          info!(coordinate = %coordinate, repository = %repository.name(), "resolved artifact");
          return self
            .cache
            .store(key, version, repository.name(), &fetched.bytes, &fetched.sha256);
        }
        Err(RepoError::NotFound) => {
          debug!(coordinate = %coordinate, repository = %repository.name(), "artifact not in repository");
          attempted.push(endpoint);
        }
        Err(RepoError::Failed(message)) => {
          warn!(coordinate = %coordinate, repository = %repository.name(), error = %message, "repository request failed");
          attempted.push(format!("{endpoint}: {message}"));
        }
        Err(RepoError::ChecksumMismatch { expected, actual }) => {
          return Err(ResolveError::ChecksumMismatch {
            coordinate,
            expected,
            actual,
          });
        }
      }
    }

    Err(ResolveError::NotFound { coordinate, attempted })
  }

  async fn list_versions(&self, key: &ArtifactKey) -> Result<Vec<ArtifactVersion>, ResolveError> {
    let mut versions = self.cache.versions(key);
    let mut attempted = vec![format!("cache ({})", self.cache.root().display())];

    for repository in &self.repositories {
      let endpoint = format!("{} ({})", repository.name(), repository.location());
      if !self.usable(repository) {
        attempted.push(format!("{endpoint}: skipped, offline"));
        continue;
      }
      match repository.list_versions(key).await {
        Ok(listed) => versions.extend(listed),
        Err(RepoError::NotFound) => attempted.push(endpoint),
        Err(e) => {
          warn!(artifact = %key, repository = %repository.name(), error = %e, "version listing failed");
          attempted.push(format!("{endpoint}: {e}"));
        }
      }
    }

    versions.sort();
    versions.dedup();
    if versions.is_empty() {
      return Err(ResolveError::NotFound {
        coordinate: key.to_string(),
        attempted,
      });
    }
    Ok(versions)
  }
}

fn memo_cell<K, V>(memo: &Memo<K, V>, key: K) -> Arc<OnceCell<Result<V, ResolveError>>>
where
  K: std::hash::Hash + Eq,
{
  let mut cells = memo.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
  cells.entry(key).or_default().clone()
}
