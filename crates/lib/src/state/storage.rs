//! Build state storage.
//!
//! # Storage Layout
//!
//! ```text
//! {build_dir}/.brick/
//! ├── state.json        # BuildState
//! └── lock              # BuildLock
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::consts::{STATE_DIR, STATE_SCHEMA};
use crate::graph::TaskId;

use super::types::{BuildState, StateError, TaskRecord};

const STATE_FILENAME: &str = "state.json";

/// Reads and writes `state.json` for one project.
#[derive(Debug, Clone)]
pub struct StateStore {
  dir: PathBuf,
}

impl StateStore {
  pub fn new(dir: PathBuf) -> Self {
    Self { dir }
  }

  /// Store under `{build_dir}/.brick`.
  pub fn for_build_dir(build_dir: &Path) -> Self {
    Self::new(build_dir.join(STATE_DIR))
  }

  pub fn dir(&self) -> &Path {
    &self.dir
  }

  pub fn path(&self) -> PathBuf {
    self.dir.join(STATE_FILENAME)
  }

  /// Load the stored state.
  ///
  /// A missing file is an empty state. A file carrying a different schema tag
  /// is discarded with a warning, so every task runs again.
  pub fn load(&self) -> Result<BuildState, StateError> {
    let path = self.path();

    let content = match fs::read_to_string(&path) {
      Ok(content) => content,
      Err(e) if e.kind() == io::ErrorKind::NotFound => {
        debug!(path = %path.display(), "no build state yet");
        return Ok(BuildState::new());
      }
      Err(e) => return Err(StateError::Read(e)),
    };

    let value: serde_json::Value = serde_json::from_str(&content).map_err(StateError::Parse)?;
    let schema = value.get("schema").and_then(|s| s.as_str()).unwrap_or_default();
    if schema != STATE_SCHEMA {
      warn!(
        path = %path.display(),
        found = %schema,
        expected = STATE_SCHEMA,
        "build state has a different schema, discarding it"
      );
      return Ok(BuildState::new());
    }

    serde_json::from_value(value).map_err(StateError::Parse)
  }

  /// Write the state atomically (temp file, then rename).
  pub fn save(&self, state: &BuildState) -> Result<(), StateError> {
    fs::create_dir_all(&self.dir).map_err(StateError::CreateDir)?;

    let path = self.path();
    let temp_path = self.dir.join("state.json.tmp");

    let content = serde_json::to_string_pretty(state).map_err(StateError::Serialize)?;
    fs::write(&temp_path, &content).map_err(StateError::Write)?;
    fs::rename(&temp_path, &path).map_err(StateError::Write)?;

    Ok(())
  }
}

/// Serializes state updates from concurrently finishing tasks.
///
/// Every record is persisted immediately, so an interrupted build keeps the
/// fingerprints of the tasks that did finish.
#[derive(Debug, Clone)]
pub struct StateWriter {
  store: StateStore,
  state: Arc<Mutex<BuildState>>,
}

impl StateWriter {
  pub fn new(store: StateStore, state: BuildState) -> Self {
    Self {
      store,
      state: Arc::new(Mutex::new(state)),
    }
  }

  pub async fn record(&self, id: TaskId, record: TaskRecord) -> Result<(), StateError> {
    let mut state = self.state.lock().await;
    state.record(id, record);
    self.store.save(&state)
  }

  /// Drop the record of a task that no longer succeeds.
  pub async fn forget(&self, id: &TaskId) -> Result<(), StateError> {
    let mut state = self.state.lock().await;
    if state.tasks.remove(id).is_some() {
      self.store.save(&state)?;
    }
    Ok(())
  }

  pub async fn snapshot(&self) -> BuildState {
    self.state.lock().await.clone()
  }
}

/// Seconds since the Unix epoch.
pub fn unix_now() -> u64 {
  SystemTime::now()
    .duration_since(UNIX_EPOCH)
    .unwrap_or_default()
    .as_secs()
}
