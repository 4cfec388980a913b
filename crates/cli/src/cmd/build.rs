//! Implementation of the `brick build` command.
//!
//! Loads the project, resolves dependencies, and runs the selected tasks
//! incrementally. Tasks whose inputs and outputs are unchanged since their
//! last successful run are reported as up to date.

use std::time::Duration;

use anyhow::Result;
use clap::Args;
use tracing::info;

use brick_lib::execute::{BuildReport, SkipReason, TaskOutcome};
use brick_lib::session::{build, report_exit_code};

use super::{ProjectArgs, registry, report_error, runtime};
use crate::output::{
  OutputFormat, format_duration, print_error, print_info, print_json, print_skipped, print_stat, print_success,
  print_warning,
};

#[derive(Args, Debug)]
pub struct BuildArgs {
  #[command(flatten)]
  pub project: ProjectArgs,

  /// Task to run (`module:task`, or a name matched in every module); repeatable
  #[arg(long = "task", value_name = "ID")]
  pub tasks: Vec<String>,

  /// Stop starting new tasks after the first failure
  #[arg(long)]
  pub fail_fast: bool,

  /// Maximum number of tasks running at once (default: available parallelism)
  #[arg(short, long)]
  pub jobs: Option<usize>,

  /// Only use the artifact cache and file repositories
  #[arg(long)]
  pub offline: bool,

  /// Output format
  #[arg(short = 'o', long, value_enum, default_value = "text")]
  pub output: OutputFormat,
}

/// Execute the build command.
///
/// # Returns
///
/// The process exit code: `0` on success, `1` when a task failed or was
/// blocked, `2` for configuration errors and cycles, `3` when dependencies
/// could not be resolved.
pub fn cmd_build(args: BuildArgs) -> Result<i32> {
  let mut options = args.project.options();
  options.tasks = args.tasks;
  options.fail_fast = args.fail_fast;
  options.jobs = args.jobs;
  options.offline = args.offline;

  let registry = registry();
  let rt = runtime()?;
  let report = match rt.block_on(build(&options, &registry)) {
    Ok(report) => report,
    Err(err) => return Ok(report_error(&err)),
  };
  info!(
    executed = report.executed(),
    up_to_date = report.up_to_date(),
    elapsed_ms = report.elapsed.as_millis() as u64,
    "build finished"
  );

  if args.output.is_json() {
    print_json(&report)?;
  } else {
    print_report(&report);
  }

  Ok(report_exit_code(&report))
}

fn print_report(report: &BuildReport) {
  for (module, errors) in &report.resolution_errors {
    for error in errors {
      print_warning(&format!("{module}: {error}"));
    }
  }

  for id in &report.start_order {
    let duration = report.durations.get(id).copied().unwrap_or(Duration::ZERO);
    match report.outcome(id) {
      Some(TaskOutcome::Succeeded) => print_success(&format!("{id} ({})", format_duration(duration))),
      Some(TaskOutcome::Failed { error }) => print_error(&format!("{id} failed: {error}")),
      _ => {}
    }
  }

  for (id, outcome) in &report.outcomes {
    if let TaskOutcome::Skipped { reason } = outcome {
      match reason {
        SkipReason::UpToDate => print_skipped(&format!("{id} up to date")),
        reason => print_skipped(&format!("{id} skipped: {reason}")),
      }
    }
  }

  println!();
  print_stat("Executed", &report.executed().to_string());
  print_stat("Up to date", &report.up_to_date().to_string());
  print_stat("Failed", &report.failures().len().to_string());
  print_stat("Not run", &report.not_run().len().to_string());
  print_stat("Elapsed", &format_duration(report.elapsed));
  println!();

  if report.outcomes.is_empty() {
    print_info("Nothing to build");
  } else if report.is_success() {
    print_success("Build succeeded");
  } else {
    print_error("Build failed");
  }
}
