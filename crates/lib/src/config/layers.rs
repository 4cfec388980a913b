//! Ordered configuration layers.
//!
//! A module's effective configuration is assembled from layers pushed in
//! precedence order (project defaults, module options, variant overrides,
//! command-line overrides). Layers are never edited once pushed; the
//! effective value of a key is taken from the last layer that sets it.

use std::collections::BTreeMap;

use serde::Serialize;

use super::ConfigError;

/// A named set of key/value options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConfigLayer {
  pub name: String,
  pub values: BTreeMap<String, String>,
}

impl ConfigLayer {
  pub fn new(name: impl Into<String>, values: BTreeMap<String, String>) -> Self {
    Self {
      name: name.into(),
      values,
    }
  }
}

/// Layers in ascending precedence.
#[derive(Debug, Clone, Default)]
pub struct ConfigLayers {
  layers: Vec<ConfigLayer>,
}

impl ConfigLayers {
  pub fn new() -> Self {
    Self::default()
  }

  /// Append a layer that shadows every layer pushed before it.
  pub fn push(&mut self, layer: ConfigLayer) {
    self.layers.push(layer);
  }

  pub fn layers(&self) -> &[ConfigLayer] {
    &self.layers
  }

  /// Resolve to the effective configuration, last write wins per key.
  pub fn resolve(&self) -> ResolvedConfig {
    let mut resolved = ResolvedConfig::default();
    for layer in &self.layers {
      for (key, value) in &layer.values {
        resolved.values.insert(key.clone(), value.clone());
        resolved.origins.insert(key.clone(), layer.name.clone());
      }
    }
    resolved
  }
}

/// Effective configuration of one module.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResolvedConfig {
  values: BTreeMap<String, String>,
  origins: BTreeMap<String, String>,
}

impl ResolvedConfig {
  pub fn get(&self, key: &str) -> Option<&str> {
    self.values.get(key).map(String::as_str)
  }

  /// Comma-separated list value, trimmed, empty items dropped.
  pub fn get_list(&self, key: &str) -> Vec<String> {
    self
      .get(key)
      .map(|v| {
        v.split(',')
          .map(str::trim)
          .filter(|s| !s.is_empty())
          .map(str::to_string)
          .collect()
      })
      .unwrap_or_default()
  }

  /// Name of the layer that supplied the effective value of `key`.
  pub fn origin(&self, key: &str) -> Option<&str> {
    self.origins.get(key).map(String::as_str)
  }

  pub fn values(&self) -> &BTreeMap<String, String> {
    &self.values
  }
}

/// Parse a command-line `key=value` override.
pub fn parse_override(raw: &str) -> Result<(String, String), ConfigError> {
  match raw.split_once('=') {
    Some((key, value)) if !key.trim().is_empty() => Ok((key.trim().to_string(), value.to_string())),
    _ => Err(ConfigError::InvalidOverride(raw.to_string())),
  }
}
