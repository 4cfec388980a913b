//! Plugins expand modules into tasks.
//!
//! Each plugin is a [`Plugin`] trait object registered under an identifier.
//! Aliases map alternative ids onto a registered plugin.

mod base;
mod copy;
mod exec;

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::config::ResolvedConfig;
use crate::descriptor::Module;
use crate::graph::Task;

pub use base::BasePlugin;
pub use copy::CopyPlugin;
pub use exec::ExecPlugin;

/// Expands a module into tasks.
pub trait Plugin: Send + Sync {
  fn id(&self) -> &str;

  /// Produce this plugin's tasks for `module` under its effective `config`.
  ///
  /// Errors are reported as configuration errors naming the plugin and module.
  fn expand(&self, module: &Module, config: &ResolvedConfig) -> Result<Vec<Task>, String>;
}

/// Plugins by identifier.
#[derive(Clone, Default)]
pub struct PluginRegistry {
  plugins: BTreeMap<String, Arc<dyn Plugin>>,
  aliases: BTreeMap<String, String>,
}

impl std::fmt::Debug for PluginRegistry {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("PluginRegistry")
      .field("plugins", &self.plugins.keys().collect::<Vec<_>>())
      .field("aliases", &self.aliases)
      .finish()
  }
}

impl PluginRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  /// Registry with `base`, `exec` and `copy`.
  pub fn with_builtins() -> Self {
    let mut registry = Self::new();
    registry.register(Arc::new(BasePlugin));
    registry.register(Arc::new(ExecPlugin));
    registry.register(Arc::new(CopyPlugin));
    registry.alias("lifecycle", "base");
    registry.alias("command", "exec");
    registry.alias("resources", "copy");
    registry
  }

  /// Register a plugin, replacing any plugin with the same id.
  pub fn register(&mut self, plugin: Arc<dyn Plugin>) {
    self.plugins.insert(plugin.id().to_string(), plugin);
  }

  pub fn alias(&mut self, alias: impl Into<String>, target: impl Into<String>) {
    self.aliases.insert(alias.into(), target.into());
  }

  /// Look up a plugin by id or alias.
  pub fn get(&self, id: &str) -> Option<Arc<dyn Plugin>> {
    let id = self.aliases.get(id).map(String::as_str).unwrap_or(id);
    self.plugins.get(id).cloned()
  }

  pub fn contains(&self, id: &str) -> bool {
    self.get(id).is_some()
  }

  pub fn ids(&self) -> Vec<&str> {
    self.plugins.keys().map(String::as_str).collect()
  }
}
