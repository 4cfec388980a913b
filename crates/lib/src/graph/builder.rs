//! Expansion of a project into its task graph.

use std::collections::BTreeMap;

use tracing::{debug, info};

use crate::config::{ConfigError, ResolvedConfig};
use crate::descriptor::{Project, module_layers};
use crate::plugin::PluginRegistry;

use super::dag::TaskGraph;
use super::error::GraphError;
use super::task::Task;

/// Expands every module through its plugins and links the tasks.
pub struct GraphBuilder<'a> {
  project: &'a Project,
  registry: &'a PluginRegistry,
  variant: String,
  overrides: BTreeMap<String, String>,
}

impl<'a> GraphBuilder<'a> {
  pub fn new(project: &'a Project, registry: &'a PluginRegistry) -> Self {
    Self {
      project,
      registry,
      variant: crate::consts::DEFAULT_VARIANT.to_string(),
      overrides: BTreeMap::new(),
    }
  }

  pub fn variant(mut self, variant: impl Into<String>) -> Self {
    self.variant = variant.into();
    self
  }

  pub fn overrides(mut self, overrides: BTreeMap<String, String>) -> Self {
    self.overrides = overrides;
    self
  }

  /// Effective configuration of every module, by module name.
  pub fn module_configs(&self) -> BTreeMap<String, ResolvedConfig> {
    self
      .project
      .modules
      .iter()
      .map(|module| {
        let config = module_layers(self.project, module, &self.variant, &self.overrides).resolve();
        (module.name.clone(), config)
      })
      .collect()
  }

  pub fn build(&self) -> Result<TaskGraph, GraphError> {
    let configs = self.module_configs();
    let mut tasks: Vec<Task> = Vec::new();

    for module in &self.project.modules {
      let config = &configs[&module.name];

      for plugin_id in &module.plugins {
        let plugin = self.registry.get(plugin_id).ok_or_else(|| ConfigError::UnknownPlugin {
          plugin: plugin_id.clone(),
          module: Some(module.name.clone()),
        })?;

        let expanded = plugin.expand(module, config).map_err(|message| ConfigError::Plugin {
          plugin: plugin_id.clone(),
          module: module.name.clone(),
          message,
        })?;
        debug!(module = %module.name, plugin = %plugin_id, tasks = expanded.len(), "plugin expanded");

        tasks.extend(expanded);
      }
    }

    let graph = TaskGraph::from_tasks(tasks)?;
    info!(tasks = graph.len(), variant = %self.variant, "task graph ready");
    Ok(graph)
  }
}
