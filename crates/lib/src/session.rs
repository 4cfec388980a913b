//! Build orchestration.
//!
//! One build invocation runs these phases in order:
//!
//! 1. Load and merge the project descriptors
//! 2. Locate the SDK
//! 3. Expand plugins into the task graph and select the requested tasks
//! 4. Resolve external dependencies per module and attach them as classpath
//! 5. Take the build lock and load the previous build state
//! 6. Execute, recording fingerprints as tasks succeed
//!
//! Configuration problems and cycles fail before any repository is
//! contacted. Resolution failures are reported per module; the tasks of
//! those modules are skipped.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use crate::config::{ConfigError, resolve_sdk_path};
use crate::consts::DEFAULT_VARIANT;
use crate::descriptor::{Project, load_from_dir};
use crate::execute::{ActionRunner, BuildReport, ExecuteConfig, Executor, TaskRunner};
use crate::graph::{CycleError, GraphBuilder, GraphError, TaskGraph};
use crate::platform::paths::artifact_cache_dir;
use crate::plugin::PluginRegistry;
use crate::resolve::{ArtifactCache, ResolutionContext, ResolutionReport, ResolveError, resolve_project};
use crate::state::{BuildLock, BuildLockError, StateError, StateStore, StateWriter};

/// Process exit code of a successful build.
pub const EXIT_SUCCESS: i32 = 0;
/// Process exit code when a task failed or never ran.
pub const EXIT_EXECUTION_FAILURE: i32 = 1;
/// Process exit code for configuration errors, cycles, and a missing SDK.
pub const EXIT_CONFIG_ERROR: i32 = 2;
/// Process exit code when dependencies could not be resolved.
pub const EXIT_RESOLUTION_FAILURE: i32 = 3;

/// Settings of one build invocation.
#[derive(Debug, Clone)]
pub struct BuildOptions {
  pub project_dir: PathBuf,
  /// Requested task ids or names; empty builds every task that is not
  /// explicit-only.
  pub tasks: Vec<String>,
  pub fail_fast: bool,
  /// Worker limit; `None` uses the available parallelism.
  pub jobs: Option<usize>,
  /// Variant name; `None` selects `debug`.
  pub variant: Option<String>,
  /// `-P key=value` overrides, applied last.
  pub overrides: BTreeMap<String, String>,
  /// Only consult the artifact cache and file repositories.
  pub offline: bool,
  /// Artifact cache location; `None` uses the platform cache dir.
  pub cache_dir: Option<PathBuf>,
}

impl BuildOptions {
  pub fn new(project_dir: impl Into<PathBuf>) -> Self {
    Self {
      project_dir: project_dir.into(),
      tasks: Vec::new(),
      fail_fast: false,
      jobs: None,
      variant: None,
      overrides: BTreeMap::new(),
      offline: false,
      cache_dir: None,
    }
  }

  pub fn variant(&self) -> &str {
    self.variant.as_deref().unwrap_or(DEFAULT_VARIANT)
  }

  pub fn cache_dir(&self) -> PathBuf {
    self.cache_dir.clone().unwrap_or_else(artifact_cache_dir)
  }

  pub fn execute_config(&self) -> ExecuteConfig {
    let mut config = ExecuteConfig {
      fail_fast: self.fail_fast,
      ..Default::default()
    };
    if let Some(jobs) = self.jobs {
      config.jobs = jobs.max(1);
    }
    config
  }
}

/// Errors that stop a build before or around execution.
///
/// Task failures are not errors here; they are outcomes in the
/// [`BuildReport`].
#[derive(Debug, Error)]
pub enum BuildError {
  #[error(transparent)]
  Config(#[from] ConfigError),

  #[error(transparent)]
  Cycle(#[from] CycleError),

  /// The artifact cache could not be opened.
  #[error(transparent)]
  Resolve(#[from] ResolveError),

  #[error(transparent)]
  State(#[from] StateError),

  #[error(transparent)]
  Lock(#[from] BuildLockError),
}

impl From<GraphError> for BuildError {
  fn from(err: GraphError) -> Self {
    match err {
      GraphError::Config(e) => BuildError::Config(e),
      GraphError::Cycle(e) => BuildError::Cycle(e),
    }
  }
}

impl BuildError {
  pub fn exit_code(&self) -> i32 {
    match self {
      BuildError::Config(_) | BuildError::Cycle(_) => EXIT_CONFIG_ERROR,
      BuildError::Resolve(_) => EXIT_RESOLUTION_FAILURE,
      BuildError::State(_) | BuildError::Lock(_) => EXIT_EXECUTION_FAILURE,
    }
  }
}

/// Exit code for a build that ran to completion.
pub fn report_exit_code(report: &BuildReport) -> i32 {
  if report.is_success() {
    EXIT_SUCCESS
  } else if !report.resolution_errors.is_empty() {
    EXIT_RESOLUTION_FAILURE
  } else {
    EXIT_EXECUTION_FAILURE
  }
}

/// Load the project in `options.project_dir` and check the variant.
pub fn load(options: &BuildOptions, registry: &PluginRegistry) -> Result<Project, BuildError> {
  let project_dir = dunce::canonicalize(&options.project_dir).map_err(|_| ConfigError::NoDescriptors {
    dir: options.project_dir.clone(),
    file: crate::consts::DESCRIPTOR_FILENAME,
  })?;
  let project = load_from_dir(&project_dir, registry)?;
  check_variant(&project, options.variant())?;
  info!(project = %project.name, modules = project.modules.len(), "loaded project");
  Ok(project)
}

/// Resolve the external dependencies of every module.
pub async fn resolve(project: &Project, options: &BuildOptions) -> Result<ResolutionReport, BuildError> {
  let cache = ArtifactCache::open(options.cache_dir())?;
  let ctx = ResolutionContext::from_specs(&project.repositories, &project.root_dir, cache, options.offline)?;
  let report = resolve_project(project, Arc::new(ctx)).await;
  for (module, errors) in report.failures() {
    for error in errors {
      warn!(module = %module, error = %error, "unresolved dependency");
    }
  }
  Ok(report)
}

/// Build the task graph and restrict it to the requested tasks.
pub fn plan(project: &Project, registry: &PluginRegistry, options: &BuildOptions) -> Result<TaskGraph, BuildError> {
  let graph = GraphBuilder::new(project, registry)
    .variant(options.variant())
    .overrides(options.overrides.clone())
    .build()?;
  Ok(graph.select(&options.tasks)?)
}

/// Run a build with the local action runner.
pub async fn build(options: &BuildOptions, registry: &PluginRegistry) -> Result<BuildReport, BuildError> {
  run_build(options, registry, None).await
}

/// Run a build with a custom runner; the SDK is still required.
pub async fn build_with_runner(
  options: &BuildOptions,
  registry: &PluginRegistry,
  runner: Arc<dyn TaskRunner>,
) -> Result<BuildReport, BuildError> {
  run_build(options, registry, Some(runner)).await
}

async fn run_build(
  options: &BuildOptions,
  registry: &PluginRegistry,
  runner: Option<Arc<dyn TaskRunner>>,
) -> Result<BuildReport, BuildError> {
  let project = load(options, registry)?;
  let sdk = resolve_sdk_path(&project.root_dir)?;
  info!(sdk = %sdk.display(), "located sdk");

  let mut graph = plan(&project, registry, options)?;
  info!(tasks = graph.len(), variant = %options.variant(), "planned build");

  let resolution = resolve(&project, options).await?;
  graph.attach_classpath(&resolution);

  let store = StateStore::for_build_dir(&project.build_dir);
  let _lock = BuildLock::acquire(store.dir(), &project.root_dir, &command_line(options))?;
  let previous = store.load()?;
  let writer = StateWriter::new(store, previous.clone());

  let unresolved = unresolved_modules(&resolution, &graph);
  let runner = runner.unwrap_or_else(|| Arc::new(ActionRunner::new(Some(sdk))));
  let mut report = Executor::new(runner, options.execute_config())
    .with_state(previous, writer)
    .with_unresolved(unresolved.iter().cloned())
    .execute(&graph)
    .await;

  report.resolution_errors = resolution
    .failures()
    .into_iter()
    .filter(|(module, _)| unresolved.contains(module))
    .collect();
  Ok(report)
}

/// Failed modules that own at least one selected task.
fn unresolved_modules(resolution: &ResolutionReport, graph: &TaskGraph) -> BTreeSet<String> {
  let in_graph: BTreeSet<&str> = graph.tasks().iter().map(|t| t.module.as_str()).collect();
  resolution
    .failures()
    .into_keys()
    .filter(|module| in_graph.contains(module.as_str()))
    .collect()
}

fn check_variant(project: &Project, variant: &str) -> Result<(), ConfigError> {
  let declared = project.variant_names();
  if variant == DEFAULT_VARIANT || declared.iter().any(|v| v == variant) {
    return Ok(());
  }
  Err(ConfigError::UnknownVariant {
    variant: variant.to_string(),
    declared: if declared.is_empty() {
      "none".to_string()
    } else {
      declared.join(", ")
    },
  })
}

/// Description of the build recorded in the lock file.
fn command_line(options: &BuildOptions) -> String {
  let mut parts = vec!["brick build".to_string()];
  parts.extend(options.tasks.iter().map(|t| format!("--task={t}")));
  if let Some(variant) = &options.variant {
    parts.push(format!("--variant={variant}"));
  }
  parts.join(" ")
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::execute::{ExecuteError, SkipReason, TaskOutcome};
  use crate::graph::{Task, TaskId};
  use crate::util::testutil::write;
  use async_trait::async_trait;
  use serial_test::serial;
  use std::sync::Mutex;
  use tempfile::TempDir;

  #[derive(Default)]
  struct CountingRunner {
    runs: Mutex<Vec<TaskId>>,
  }

  impl CountingRunner {
    fn runs(&self) -> Vec<TaskId> {
      self.runs.lock().unwrap().clone()
    }
  }

  #[async_trait]
  impl TaskRunner for CountingRunner {
    async fn run(&self, task: &Task) -> Result<(), ExecuteError> {
      self.runs.lock().unwrap().push(task.id.clone());
      for output in &task.outputs {
        std::fs::create_dir_all(output.parent().unwrap()).unwrap();
        std::fs::write(output, task.id.as_str()).unwrap();
      }
      Ok(())
    }
  }

  #[derive(Default)]
  struct ClasspathRunner {
    seen: Mutex<BTreeMap<TaskId, Vec<PathBuf>>>,
  }

  #[async_trait]
  impl TaskRunner for ClasspathRunner {
    async fn run(&self, task: &Task) -> Result<(), ExecuteError> {
      self.seen.lock().unwrap().insert(task.id.clone(), task.classpath.clone());
      Ok(())
    }
  }

  const APP: &str = r#"
[project]
name = "demo"

[[repositories]]
name = "local"
url = "repo"

[[modules]]
name = "app"
plugins = ["base", "exec"]
dependencies = [{ coordinate = "org.example:util:1.0.0" }]

[[modules.tasks]]
name = "compile"
command = "cc"
inputs = ["src"]
outputs = ["out/app"]

[[modules.tasks]]
name = "package"
command = "pack"
inputs = ["out/app"]
outputs = ["out/app.zip"]
"#;

  struct Fixture {
    root: TempDir,
    cache: TempDir,
  }

  impl Fixture {
    fn new(descriptor: &str) -> Self {
      let root = TempDir::new().unwrap();
      write(root.path(), "brick.toml", descriptor);
      write(root.path(), "local.properties", "sdk.dir=/opt/sdk\n");
      write(root.path(), "app/src/main.c", "int main() {}");
      write(root.path(), "repo/org/example/util/1.0.0/util-1.0.0.jar", "util");
      Self {
        root,
        cache: TempDir::new().unwrap(),
      }
    }

    fn options(&self) -> BuildOptions {
      let mut options = BuildOptions::new(self.root.path());
      options.cache_dir = Some(self.cache.path().to_path_buf());
      options
    }
  }

  fn id(raw: &str) -> TaskId {
    TaskId::from_qualified(raw)
  }

  #[tokio::test]
  async fn second_build_runs_nothing() {
    let fixture = Fixture::new(APP);
    let registry = PluginRegistry::with_builtins();

    let runner = Arc::new(CountingRunner::default());
    let report = build_with_runner(&fixture.options(), &registry, runner.clone())
      .await
      .unwrap();
    assert!(report.is_success(), "{report:?}");
    assert_eq!(report_exit_code(&report), EXIT_SUCCESS);
    assert!(runner.runs().contains(&id("app:compile")));
    let compile = runner.runs().iter().position(|t| *t == id("app:compile"));
    let package = runner.runs().iter().position(|t| *t == id("app:package"));
    assert!(compile < package);

    let runner = Arc::new(CountingRunner::default());
    let report = build_with_runner(&fixture.options(), &registry, runner.clone())
      .await
      .unwrap();
    assert!(report.is_success());
    assert!(runner.runs().is_empty(), "ran {:?}", runner.runs());
  }

  #[tokio::test]
  async fn task_selection_limits_the_build() {
    let fixture = Fixture::new(APP);
    let registry = PluginRegistry::with_builtins();
    let mut options = fixture.options();
    options.tasks = vec!["compile".to_string()];

    let runner = Arc::new(CountingRunner::default());
    let report = build_with_runner(&options, &registry, runner.clone()).await.unwrap();

    assert_eq!(runner.runs(), vec![id("app:compile")]);
    assert_eq!(report.outcomes.len(), 1);
  }

  #[tokio::test]
  async fn unresolved_dependency_skips_module_tasks() {
    let fixture = Fixture::new(&APP.replace("util:1.0.0", "missing:1.0.0"));
    let registry = PluginRegistry::with_builtins();

    let runner = Arc::new(CountingRunner::default());
    let report = build_with_runner(&fixture.options(), &registry, runner.clone())
      .await
      .unwrap();

    assert!(runner.runs().is_empty());
    assert_eq!(report_exit_code(&report), EXIT_RESOLUTION_FAILURE);
    assert_eq!(
      report.outcome(&id("app:compile")),
      Some(&TaskOutcome::skipped(SkipReason::Unresolved("app".to_string())))
    );
    let errors = &report.resolution_errors["app"];
    assert!(errors[0].contains("org.example:missing"), "{errors:?}");
  }

  #[tokio::test]
  async fn resolved_artifacts_reach_task_classpath() {
    let fixture = Fixture::new(APP);
    let registry = PluginRegistry::with_builtins();

    let runner = Arc::new(ClasspathRunner::default());
    let report = build_with_runner(&fixture.options(), &registry, runner.clone())
      .await
      .unwrap();
    assert!(report.is_success(), "{report:?}");

    let seen = runner.seen.lock().unwrap();
    let classpath = &seen[&id("app:compile")];
    assert_eq!(classpath.len(), 1);
    assert!(classpath[0].starts_with(fixture.cache.path()));
    assert!(classpath[0].ends_with("util-1.0.0.jar"));
  }

  #[tokio::test]
  async fn configuration_errors_surface_before_resolution() {
    let descriptor = r#"
[project]
name = "demo"

[[repositories]]
name = "local"
url = "repo"

[[modules]]
name = "app"
plugins = ["exec"]
dependencies = [{ coordinate = "org.example:util:1.0.0" }]

[[modules.tasks]]
name = "loop"
command = "true"
depends_on = ["loop"]
"#;
    let fixture = Fixture::new(descriptor);
    let registry = PluginRegistry::with_builtins();

    let err = build_with_runner(&fixture.options(), &registry, Arc::new(CountingRunner::default()))
      .await
      .unwrap_err();
    assert!(matches!(err, BuildError::Cycle(_)));

    let mut options = fixture.options();
    options.tasks = vec!["app:deploy".to_string()];
    let err = build_with_runner(&options, &registry, Arc::new(CountingRunner::default()))
      .await
      .unwrap_err();
    assert!(matches!(err, BuildError::Config(ConfigError::UnknownTask(_))));

    // Nothing was looked up, so the artifact cache was never written.
    assert_eq!(std::fs::read_dir(fixture.cache.path()).unwrap().count(), 0);
  }

  #[tokio::test]
  async fn cycle_fails_before_any_task_runs() {
    let descriptor = r#"
[project]
name = "demo"

[[modules]]
name = "app"
plugins = ["exec"]

[[modules.tasks]]
name = "loop"
command = "true"
depends_on = ["loop"]
"#;
    let fixture = Fixture::new(descriptor);
    let registry = PluginRegistry::with_builtins();

    let runner = Arc::new(CountingRunner::default());
    let err = build_with_runner(&fixture.options(), &registry, runner.clone())
      .await
      .unwrap_err();

    assert!(matches!(err, BuildError::Cycle(_)));
    assert_eq!(err.exit_code(), EXIT_CONFIG_ERROR);
    assert_eq!(err.to_string(), "dependency cycle detected: app:loop -> app:loop");
    assert!(runner.runs().is_empty());
  }

  #[test]
  #[serial]
  fn missing_sdk_is_a_configuration_error() {
    let fixture = Fixture::new(APP);
    std::fs::remove_file(fixture.root.path().join("local.properties")).unwrap();
    let registry = PluginRegistry::with_builtins();
    let runner = Arc::new(CountingRunner::default());

    let result = temp_env::with_vars([("BRICK_SDK_HOME", None::<&str>), ("BRICK_SDK", None::<&str>)], || {
      tokio::runtime::Runtime::new()
        .unwrap()
        .block_on(build_with_runner(&fixture.options(), &registry, runner.clone()))
    });

    let err = result.unwrap_err();
    assert!(matches!(err, BuildError::Config(ConfigError::SdkNotFound { .. })));
    assert_eq!(err.exit_code(), EXIT_CONFIG_ERROR);
    assert!(runner.runs().is_empty());
  }

  #[tokio::test]
  async fn unknown_variant_is_rejected() {
    let fixture = Fixture::new(APP);
    let mut options = fixture.options();
    options.variant = Some("staging".to_string());

    let err = build_with_runner(&options, &PluginRegistry::with_builtins(), Arc::new(CountingRunner::default()))
      .await
      .unwrap_err();

    assert_eq!(err.to_string(), "unknown variant `staging` (declared: none)");
  }

  #[tokio::test]
  async fn unknown_task_is_a_configuration_error() {
    let fixture = Fixture::new(APP);
    let mut options = fixture.options();
    options.tasks = vec!["app:deploy".to_string()];

    let err = build_with_runner(&options, &PluginRegistry::with_builtins(), Arc::new(CountingRunner::default()))
      .await
      .unwrap_err();

    assert!(matches!(err, BuildError::Config(ConfigError::UnknownTask(_))));
  }

  #[tokio::test]
  async fn concurrent_build_is_refused() {
    let fixture = Fixture::new(APP);
    let registry = PluginRegistry::with_builtins();
    let project = load(&fixture.options(), &registry).unwrap();
    let store = StateStore::for_build_dir(&project.build_dir);
    let _held = BuildLock::acquire(store.dir(), &project.root_dir, "brick build").unwrap();

    let err = build_with_runner(&fixture.options(), &registry, Arc::new(CountingRunner::default()))
      .await
      .unwrap_err();

    assert!(matches!(err, BuildError::Lock(BuildLockError::Contention { .. })));
  }

  #[test]
  fn options_defaults() {
    let options = BuildOptions::new("/p");
    assert_eq!(options.variant(), "debug");
    assert!(options.execute_config().jobs >= 1);

    let mut options = BuildOptions::new("/p");
    options.jobs = Some(0);
    assert_eq!(options.execute_config().jobs, 1);
  }

  #[test]
  fn report_exit_codes() {
    let mut report = BuildReport::default();
    assert_eq!(report_exit_code(&report), EXIT_SUCCESS);

    report.outcomes.insert(id("app:a"), TaskOutcome::failed("boom"));
    assert_eq!(report_exit_code(&report), EXIT_EXECUTION_FAILURE);

    report.resolution_errors.insert("app".to_string(), vec!["x".to_string()]);
    assert_eq!(report_exit_code(&report), EXIT_RESOLUTION_FAILURE);
  }
}
