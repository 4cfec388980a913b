//! SDK location discovery.
//!
//! The SDK directory comes from `sdk.dir` in the project's `local.properties`
//! or, failing that, from the first set variable in [`SDK_ENV_VARS`].

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::consts::{LOCAL_PROPERTIES_FILENAME, SDK_DIR_PROPERTY, SDK_ENV_VARS};

use super::ConfigError;

/// Locate the SDK for the project rooted at `project_dir`.
///
/// # Errors
///
/// Returns `SdkNotFound` when neither the properties file nor any of the
/// environment variables provide a non-empty value, or `Read` when the
/// properties file exists but cannot be read.
pub fn resolve_sdk_path(project_dir: &Path) -> Result<PathBuf, ConfigError> {
  let properties_path = project_dir.join(LOCAL_PROPERTIES_FILENAME);

  match std::fs::read_to_string(&properties_path) {
    Ok(content) => {
      let properties = parse_properties(&content);
      if let Some(dir) = properties.get(SDK_DIR_PROPERTY).filter(|v| !v.is_empty()) {
        debug!(path = %dir, source = %properties_path.display(), "sdk location from properties");
        return Ok(PathBuf::from(dir));
      }
    }
    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
    Err(e) => {
      return Err(ConfigError::Read {
        origin: properties_path.display().to_string(),
        source: e,
      });
    }
  }

  for var in SDK_ENV_VARS {
    if let Ok(dir) = std::env::var(var)
      && !dir.is_empty()
    {
      debug!(path = %dir, var = %var, "sdk location from environment");
      return Ok(PathBuf::from(dir));
    }
  }

  Err(ConfigError::SdkNotFound {
    property: SDK_DIR_PROPERTY,
    properties: properties_path,
    env_vars: SDK_ENV_VARS.join(", "),
  })
}

/// Parse Java-style properties content.
///
/// Supports `key=value` and `key: value`, `#` and `!` comments, trailing
/// backslash line continuations, and the common escapes (`\:`, `\=`, `\\`,
/// `\t`, `\n`). Later duplicates win.
pub fn parse_properties(content: &str) -> BTreeMap<String, String> {
  let mut properties = BTreeMap::new();
  let mut logical = String::new();

  for raw_line in content.lines() {
    let line = raw_line.trim_start();

    if logical.is_empty() && (line.is_empty() || line.starts_with('#') || line.starts_with('!')) {
      continue;
    }

    if ends_with_continuation(line) {
      logical.push_str(&line[..line.len() - 1]);
      continue;
    }

    logical.push_str(line);
    if let Some((key, value)) = split_property(&logical) {
      properties.insert(key, value);
    }
    logical.clear();
  }

  if !logical.is_empty()
    && let Some((key, value)) = split_property(&logical)
  {
    properties.insert(key, value);
  }

  properties
}

/// An odd number of trailing backslashes continues the line.
fn ends_with_continuation(line: &str) -> bool {
  line.chars().rev().take_while(|c| *c == '\\').count() % 2 == 1
}

fn split_property(line: &str) -> Option<(String, String)> {
  let mut escaped = false;
  let mut split_at = None;
  for (idx, c) in line.char_indices() {
    if escaped {
      escaped = false;
      continue;
    }
    match c {
      '\\' => escaped = true,
      '=' | ':' => {
        split_at = Some(idx);
        break;
      }
      _ => {}
    }
  }

  let (key, value) = match split_at {
    Some(idx) => (&line[..idx], &line[idx + 1..]),
    None => (line, ""),
  };

  let key = unescape(key.trim());
  if key.is_empty() {
    return None;
  }
  Some((key, unescape(value.trim())))
}

fn unescape(raw: &str) -> String {
  let mut out = String::with_capacity(raw.len());
  let mut chars = raw.chars();
  while let Some(c) = chars.next() {
    if c != '\\' {
      out.push(c);
      continue;
    }
    match chars.next() {
      Some('t') => out.push('\t'),
      Some('n') => out.push('\n'),
      Some('r') => out.push('\r'),
      Some(other) => out.push(other),
      None => {}
    }
  }
  out
}
