mod cmd;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::cmd::{BuildArgs, DepsArgs, TasksArgs, cmd_build, cmd_deps, cmd_tasks};
use crate::output::print_error;

/// brick - incremental multi-module build engine
#[derive(Parser)]
#[command(name = "brick")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Enable verbose logging (debug level)
  #[arg(short, long, global = true)]
  verbose: bool,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Resolve dependencies and run tasks incrementally
  Build(BuildArgs),

  /// List the task graph as execution waves
  Tasks(TasksArgs),

  /// Resolve and print the dependencies of every module
  Deps(DepsArgs),
}

fn init_logging(verbose: bool) {
  let default = if verbose { "debug" } else { "warn" };
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .without_time()
    .init();
}

fn run(cli: Cli) -> Result<i32> {
  match cli.command {
    Commands::Build(args) => cmd_build(args),
    Commands::Tasks(args) => cmd_tasks(args),
    Commands::Deps(args) => cmd_deps(args),
  }
}

fn main() {
  let cli = Cli::parse();
  init_logging(cli.verbose);

  let code = match run(cli) {
    Ok(code) => code,
    Err(err) => {
      print_error(&format!("{err:#}"));
      brick_lib::session::EXIT_EXECUTION_FAILURE
    }
  };
  std::process::exit(code);
}
