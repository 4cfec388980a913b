//! Copy and delete actions.

use std::fs;
use std::path::{Path, PathBuf};

use glob::Pattern;
use tracing::debug;
use walkdir::WalkDir;

use crate::execute::types::ExecuteError;

/// Copy `from` into the directory `into`.
///
/// Directories are copied recursively; a single file lands as
/// `into/<file name>`. Paths relative to `from` that match any `exclude`
/// glob are skipped, and an excluded directory skips everything below it.
/// A missing source copies nothing.
///
/// # Returns
///
/// The number of files copied.
pub fn copy_tree(from: &Path, into: &Path, exclude: &[String]) -> Result<usize, ExecuteError> {
  let patterns = compile_patterns(exclude)?;

  if !from.exists() {
    debug!(from = %from.display(), "copy source does not exist, nothing to copy");
    return Ok(0);
  }

  fs::create_dir_all(into).map_err(|e| ExecuteError::io(into, e))?;

  if from.is_file() {
    let Some(name) = from.file_name() else {
      return Ok(0);
    };
    if is_excluded(&patterns, Path::new(name)) {
      return Ok(0);
    }
    let target = into.join(name);
    fs::copy(from, &target).map_err(|e| ExecuteError::io(&target, e))?;
    return Ok(1);
  }

  let mut copied = 0;
  let walker = WalkDir::new(from)
    .min_depth(1)
    .sort_by_file_name()
    .into_iter()
    .filter_entry(|entry| {
      let relative = entry.path().strip_prefix(from).unwrap_or(entry.path());
      !is_excluded(&patterns, relative)
    });

  for entry in walker {
    let entry = entry.map_err(|e| {
      let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| from.to_path_buf());
      ExecuteError::io(path, std::io::Error::other(e.to_string()))
    })?;
    let relative = entry.path().strip_prefix(from).unwrap_or(entry.path());
    let target = into.join(relative);

    if entry.file_type().is_dir() {
      fs::create_dir_all(&target).map_err(|e| ExecuteError::io(&target, e))?;
    } else {
      if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).map_err(|e| ExecuteError::io(parent, e))?;
      }
      fs::copy(entry.path(), &target).map_err(|e| ExecuteError::io(&target, e))?;
      copied += 1;
    }
  }

  debug!(from = %from.display(), into = %into.display(), copied, "copied files");
  Ok(copied)
}

/// Remove files and directories; missing paths are ignored.
pub fn delete_paths(paths: &[PathBuf]) -> Result<(), ExecuteError> {
  for path in paths {
    let result = match fs::symlink_metadata(path) {
      Ok(meta) if meta.is_dir() => fs::remove_dir_all(path),
      Ok(_) => fs::remove_file(path),
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
      Err(e) => Err(e),
    };
    result.map_err(|e| ExecuteError::io(path, e))?;
    debug!(path = %path.display(), "deleted");
  }
  Ok(())
}

fn compile_patterns(exclude: &[String]) -> Result<Vec<Pattern>, ExecuteError> {
  exclude
    .iter()
    .map(|raw| {
      Pattern::new(raw).map_err(|e| ExecuteError::Pattern {
        pattern: raw.clone(),
        message: e.to_string(),
      })
    })
    .collect()
}

/// Match with `/` separators on every platform.
fn is_excluded(patterns: &[Pattern], relative: &Path) -> bool {
  if patterns.is_empty() {
    return false;
  }
  let normalized: Vec<String> = relative
    .components()
    .map(|c| c.as_os_str().to_string_lossy().into_owned())
    .collect();
  let normalized = normalized.join("/");
  patterns.iter().any(|p| p.matches(&normalized))
}
