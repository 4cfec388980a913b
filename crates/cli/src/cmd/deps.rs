//! Implementation of the `brick deps` command.
//!
//! Resolves the external dependencies of every module and prints the
//! selected artifacts, or the errors for modules that failed to resolve.

use std::collections::BTreeMap;

use anyhow::Result;
use clap::Args;
use owo_colors::{OwoColorize, Stream};
use serde::Serialize;

use brick_lib::resolve::{ResolutionReport, ResolvedArtifact};
use brick_lib::session::{EXIT_RESOLUTION_FAILURE, EXIT_SUCCESS, load, resolve};

use super::{ProjectArgs, registry, report_error, runtime};
use crate::output::{OutputFormat, print_error, print_json, print_success, symbols};

#[derive(Args, Debug)]
pub struct DepsArgs {
  #[command(flatten)]
  pub project: ProjectArgs,

  /// Only use the artifact cache and file repositories
  #[arg(long)]
  pub offline: bool,

  /// Output format
  #[arg(short = 'o', long, value_enum, default_value = "text")]
  pub output: OutputFormat,
}

#[derive(Debug, Serialize)]
struct ModuleDeps<'a> {
  artifacts: &'a [ResolvedArtifact],
  errors: Vec<String>,
}

pub fn cmd_deps(args: DepsArgs) -> Result<i32> {
  let mut options = args.project.options();
  options.offline = args.offline;

  let registry = registry();
  let project = match load(&options, &registry) {
    Ok(project) => project,
    Err(err) => return Ok(report_error(&err)),
  };
  let rt = runtime()?;
  let report = match rt.block_on(resolve(&project, &options)) {
    Ok(report) => report,
    Err(err) => return Ok(report_error(&err)),
  };

  if args.output.is_json() {
    print_json(&module_deps(&report))?;
  } else {
    print_deps(&report);
  }

  Ok(if report.is_success() {
    EXIT_SUCCESS
  } else {
    EXIT_RESOLUTION_FAILURE
  })
}

fn module_deps(report: &ResolutionReport) -> BTreeMap<&str, ModuleDeps<'_>> {
  report
    .modules
    .iter()
    .map(|(name, resolution)| {
      (
        name.as_str(),
        ModuleDeps {
          artifacts: &resolution.artifacts,
          errors: resolution.errors.iter().map(ToString::to_string).collect(),
        },
      )
    })
    .collect()
}

fn print_deps(report: &ResolutionReport) {
  for (name, resolution) in &report.modules {
    println!("{}", name.if_supports_color(Stream::Stdout, |s| s.bold()));
    if resolution.artifacts.is_empty() && resolution.errors.is_empty() {
      println!("  (no external dependencies)");
    }
    for artifact in &resolution.artifacts {
      println!(
        "  {} {}",
        artifact.coordinate(),
        format!("({})", artifact.repository).if_supports_color(Stream::Stdout, |s| s.dimmed())
      );
    }
    for error in &resolution.errors {
      println!("  {} {}", symbols::ERROR, error);
    }
  }

  println!();
  let failed = report.failures().len();
  if failed == 0 {
    print_success("All dependencies resolved");
  } else {
    print_error(&format!("{failed} module(s) failed to resolve"));
  }
}
