mod build;
mod deps;
mod tasks;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use brick_lib::plugin::PluginRegistry;
use brick_lib::session::{BuildError, BuildOptions};

use crate::output::print_error;

pub use build::{BuildArgs, cmd_build};
pub use deps::{DepsArgs, cmd_deps};
pub use tasks::{TasksArgs, cmd_tasks};

/// Options shared by every command that reads a project.
#[derive(Args, Debug, Clone)]
pub struct ProjectArgs {
  /// Project directory containing the root brick.toml
  #[arg(short = 'C', long = "project-dir", default_value = ".")]
  pub project_dir: PathBuf,

  /// Variant to configure (default: debug)
  #[arg(long)]
  pub variant: Option<String>,

  /// Override a configuration key (`key=value`), applied last
  #[arg(short = 'P', value_name = "KEY=VALUE", value_parser = parse_override)]
  pub overrides: Vec<(String, String)>,
}

impl ProjectArgs {
  pub fn options(&self) -> BuildOptions {
    let mut options = BuildOptions::new(&self.project_dir);
    options.variant = self.variant.clone();
    options.overrides = self.overrides.iter().cloned().collect();
    options
  }
}

/// Parse a `key=value` override.
pub fn parse_override(raw: &str) -> Result<(String, String), String> {
  let Some((key, value)) = raw.split_once('=') else {
    return Err(format!("expected KEY=VALUE, got `{raw}`"));
  };
  let key = key.trim();
  if key.is_empty() {
    return Err(format!("missing key in `{raw}`"));
  }
  Ok((key.to_string(), value.to_string()))
}

/// Registry with the built-in plugins.
fn registry() -> PluginRegistry {
  PluginRegistry::with_builtins()
}

fn runtime() -> Result<tokio::runtime::Runtime> {
  tokio::runtime::Runtime::new().context("Failed to create async runtime")
}

/// Print a session error and return its exit code.
fn report_error(err: &BuildError) -> i32 {
  print_error(&err.to_string());
  err.exit_code()
}
