//! Test utilities for brick-lib.
//!
//! Cross-platform helpers for tests that need to run shell commands as task
//! actions, plus small project fixtures.

use std::path::Path;

/// Returns a shell command that writes `content` into `file` (relative to the
/// module directory).
#[cfg(unix)]
pub fn write_file_cmd(file: &str, content: &str) -> String {
  format!("mkdir -p \"$(dirname '{file}')\" && printf '%s' '{content}' > '{file}'")
}

#[cfg(windows)]
pub fn write_file_cmd(file: &str, content: &str) -> String {
  format!("New-Item -ItemType File -Force -Path '{file}' -Value '{content}' | Out-Null")
}

/// Returns a shell command that always fails.
#[cfg(unix)]
pub fn failing_cmd() -> String {
  "exit 3".to_string()
}

#[cfg(windows)]
pub fn failing_cmd() -> String {
  "exit 3".to_string()
}

/// Write `content` to `root/relative`, creating parent directories.
pub fn write(root: &Path, relative: &str, content: &str) {
  let path = root.join(relative);
  if let Some(parent) = path.parent() {
    std::fs::create_dir_all(parent).unwrap();
  }
  std::fs::write(path, content).unwrap();
}

/// A bare module named `name` living in `root/name`, building into
/// `root/build/name`.
pub fn module(name: &str, root: &Path) -> crate::descriptor::Module {
  crate::descriptor::Module {
    name: name.to_string(),
    dir: root.join(name),
    build_dir: root.join("build").join(name),
    plugins: vec![],
    dependencies: vec![],
    config: Default::default(),
    variants: Default::default(),
    tasks: vec![],
    origin: "brick.toml".to_string(),
  }
}
