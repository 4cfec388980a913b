//! Implementation of the `brick tasks` command.
//!
//! Prints the task graph as execution waves: every task in a wave depends
//! only on tasks of earlier waves. Dependencies are not resolved, so the
//! command works offline and without an SDK.

use anyhow::Result;
use clap::Args;
use owo_colors::{OwoColorize, Stream};
use serde::Serialize;

use brick_lib::graph::TaskGraph;
use brick_lib::session::{EXIT_SUCCESS, load, plan};

use super::{ProjectArgs, registry, report_error};
use crate::output::{OutputFormat, print_info, print_json, symbols};

#[derive(Args, Debug)]
pub struct TasksArgs {
  #[command(flatten)]
  pub project: ProjectArgs,

  /// Restrict the listing to these tasks and their dependencies
  #[arg(long = "task", value_name = "ID")]
  pub tasks: Vec<String>,

  /// Output format
  #[arg(short = 'o', long, value_enum, default_value = "text")]
  pub output: OutputFormat,
}

#[derive(Debug, Serialize)]
struct TaskEntry {
  id: String,
  action: String,
  cacheable: bool,
  depends_on: Vec<String>,
}

#[derive(Debug, Serialize)]
struct TaskListing {
  waves: Vec<Vec<TaskEntry>>,
}

pub fn cmd_tasks(args: TasksArgs) -> Result<i32> {
  let mut options = args.project.options();
  options.tasks = args.tasks;

  let registry = registry();
  let graph = match load(&options, &registry).and_then(|project| plan(&project, &registry, &options)) {
    Ok(graph) => graph,
    Err(err) => return Ok(report_error(&err)),
  };

  let listing = listing(&graph);
  if args.output.is_json() {
    print_json(&listing)?;
  } else if listing.waves.is_empty() {
    print_info("No tasks");
  } else {
    print_listing(&listing);
  }

  Ok(EXIT_SUCCESS)
}

fn listing(graph: &TaskGraph) -> TaskListing {
  let waves = graph
    .waves()
    .into_iter()
    .map(|wave| {
      wave
        .iter()
        .filter_map(|id| graph.task(id))
        .map(|task| TaskEntry {
          id: task.id.to_string(),
          action: task.action.describe(),
          cacheable: task.cacheable,
          depends_on: graph.dependencies(&task.id).iter().map(ToString::to_string).collect(),
        })
        .collect()
    })
    .collect();
  TaskListing { waves }
}

fn print_listing(listing: &TaskListing) {
  for (index, wave) in listing.waves.iter().enumerate() {
    let title = format!("Wave {}", index + 1);
    println!("{}", title.if_supports_color(Stream::Stdout, |s| s.bold()));
    for task in wave {
      println!(
        "  {} {}",
        task.id,
        task.action.if_supports_color(Stream::Stdout, |s| s.dimmed())
      );
      if !task.depends_on.is_empty() {
        println!("    {} {}", symbols::ARROW, task.depends_on.join(", "));
      }
    }
  }
}
