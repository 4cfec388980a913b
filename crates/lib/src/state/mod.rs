//! Build state: per-task fingerprints persisted between builds, and the
//! lock that keeps two builds of one project from running at once.

mod lock;
mod storage;
mod types;

pub use lock::{BuildLock, BuildLockError, LockMetadata};
pub use storage::{StateStore, StateWriter, unix_now};
pub use types::{BuildState, StateError, TaskRecord};
