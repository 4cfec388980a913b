//! Incremental task execution.
//!
//! The executor walks a [`TaskGraph`] with a ready queue:
//! - a task becomes ready once every dependency is satisfied
//! - ready tasks run concurrently, bounded by a semaphore
//! - tasks whose fingerprint and outputs match the last run are skipped
//! - failures block every transitive dependent; fail-fast stops dispatch

pub mod actions;
pub mod fingerprint;
pub mod types;

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::graph::{Task, TaskGraph, TaskId};
use crate::state::{BuildState, StateWriter, TaskRecord, unix_now};

pub use actions::{ActionRunner, TaskRunner};
pub use types::{BuildReport, ExecuteConfig, ExecuteError, SkipReason, TaskOutcome, TaskState};

/// Runs a task graph against the previous build state.
pub struct Executor {
  runner: Arc<dyn TaskRunner>,
  config: ExecuteConfig,
  previous: BuildState,
  writer: Option<StateWriter>,
  unresolved: BTreeSet<String>,
}

impl Executor {
  pub fn new(runner: Arc<dyn TaskRunner>, config: ExecuteConfig) -> Self {
    Self {
      runner,
      config,
      previous: BuildState::new(),
      writer: None,
      unresolved: BTreeSet::new(),
    }
  }

  /// Skip decisions use `previous`; successful tasks are recorded through
  /// `writer`.
  pub fn with_state(mut self, previous: BuildState, writer: StateWriter) -> Self {
    self.previous = previous;
    self.writer = Some(writer);
    self
  }

  /// Modules whose dependencies failed to resolve; their tasks never run.
  pub fn with_unresolved<I, S>(mut self, modules: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.unresolved.extend(modules.into_iter().map(Into::into));
    self
  }

  /// Execute every task of `graph` and report what happened to each.
  pub async fn execute(&self, graph: &TaskGraph) -> BuildReport {
    let started = Instant::now();
    let jobs = self.config.jobs.max(1);
    info!(tasks = graph.len(), jobs, fail_fast = self.config.fail_fast, "starting execution");

    let mut schedule = Schedule::new(graph);
    for id in schedule.order.clone() {
      if let Some(task) = graph.task(&id)
        && self.unresolved.contains(&task.module)
        && schedule.is_pending(&id)
      {
        warn!(task = %id, module = %task.module, "skipping task of unresolved module");
        schedule.finish(&id, TaskOutcome::skipped(SkipReason::Unresolved(task.module.clone())));
      }
    }
    schedule.seed();

    let semaphore = Arc::new(Semaphore::new(jobs));
    let mut running: JoinSet<(TaskId, TaskOutcome, Duration)> = JoinSet::new();
    let mut in_flight: HashMap<tokio::task::Id, TaskId> = HashMap::new();
    let mut cancelled = false;

    loop {
      while !cancelled && schedule.has_ready() {
        let Ok(permit) = Arc::clone(&semaphore).try_acquire_owned() else {
          break;
        };
        let Some(id) = schedule.next_ready() else {
          break;
        };
        let Some(task) = graph.task(&id).cloned() else {
          continue;
        };

        schedule.start(&id);
        let runner = Arc::clone(&self.runner);
        let previous = self.previous.get(&id).cloned();
        let writer = self.writer.clone();
        let handle = running.spawn(async move {
          let _permit = permit;
          let started = Instant::now();
          let outcome = run_task(&task, runner.as_ref(), previous.as_ref(), writer.as_ref()).await;
          (task.id, outcome, started.elapsed())
        });
        in_flight.insert(handle.id(), id);
      }

      let Some(joined) = running.join_next_with_id().await else {
        break;
      };
      let (id, outcome) = match joined {
        Ok((worker, (id, outcome, elapsed))) => {
          in_flight.remove(&worker);
          schedule.report.durations.insert(id.clone(), elapsed);
          (id, outcome)
        }
        Err(join_error) => {
          let Some(id) = in_flight.remove(&join_error.id()) else {
            error!(error = %join_error, "lost track of a task worker");
            continue;
          };
          let error = ExecuteError::Worker(join_error.to_string());
          error!(task = %id, error = %error, "task worker failed");
          (id, TaskOutcome::failed(error.to_string()))
        }
      };

      let failed = matches!(outcome, TaskOutcome::Failed { .. });
      schedule.finish(&id, outcome);
      if failed && self.config.fail_fast && !cancelled {
        warn!(task = %id, "fail-fast: no further tasks will start");
        cancelled = true;
      }
    }

    schedule.cancel_remaining();

    let mut report = schedule.report;
    report.elapsed = started.elapsed();
    info!(
      executed = report.executed(),
      up_to_date = report.up_to_date(),
      failed = report.failures().len(),
      elapsed = ?report.elapsed,
      "execution complete"
    );
    report
  }
}

/// Run one task, or skip it when its last recorded run is still valid.
async fn run_task(
  task: &Task,
  runner: &dyn TaskRunner,
  previous: Option<&TaskRecord>,
  writer: Option<&StateWriter>,
) -> TaskOutcome {
  let fingerprint = match fingerprint::fingerprint(task) {
    Ok(fingerprint) => fingerprint,
    Err(e) => {
      error!(task = %task.id, error = %e, "failed to fingerprint task");
      return TaskOutcome::failed(e.to_string());
    }
  };

  if task.cacheable
    && let Some(previous) = previous
    && previous.fingerprint == fingerprint
  {
    match fingerprint::outputs_hash(task) {
      Ok(outputs) if outputs == previous.outputs => {
        debug!(task = %task.id, fingerprint = %fingerprint.short(), "up-to-date");
        return TaskOutcome::skipped(SkipReason::UpToDate);
      }
      Ok(_) => debug!(task = %task.id, "outputs changed since last run"),
      Err(e) => debug!(task = %task.id, error = %e, "could not hash outputs"),
    }
  }

  info!(task = %task.id, action = %task.action.describe(), "running task");
  if let Err(e) = runner.run(task).await {
    error!(task = %task.id, error = %e, "task failed");
    if let Some(writer) = writer
      && let Err(state_error) = writer.forget(&task.id).await
    {
      warn!(task = %task.id, error = %state_error, "failed to persist build state");
    }
    return TaskOutcome::failed(e.to_string());
  }

  if task.cacheable
    && let Some(writer) = writer
  {
    match fingerprint::outputs_hash(task) {
      Ok(outputs) => {
        let record = TaskRecord {
          fingerprint,
          outputs,
          recorded_at_unix: unix_now(),
        };
        if let Err(e) = writer.record(task.id.clone(), record).await {
          warn!(task = %task.id, error = %e, "failed to persist build state");
        }
      }
      Err(e) => warn!(task = %task.id, error = %e, "could not hash outputs, task will run next time"),
    }
  }

  debug!(task = %task.id, "task succeeded");
  TaskOutcome::Succeeded
}

/// Per-task bookkeeping of one execution.
struct Schedule<'g> {
  graph: &'g TaskGraph,
  /// Topological order; ties in the ready queue go to the earlier task.
  order: Vec<TaskId>,
  position: HashMap<TaskId, usize>,
  states: HashMap<TaskId, TaskState>,
  /// Dependencies not yet finished, per task.
  waiting: HashMap<TaskId, usize>,
  ready: BTreeSet<(usize, TaskId)>,
  report: BuildReport,
}

impl<'g> Schedule<'g> {
  fn new(graph: &'g TaskGraph) -> Self {
    let order = graph.topological_order();
    let position = order.iter().enumerate().map(|(i, id)| (id.clone(), i)).collect();
    let states = order.iter().map(|id| (id.clone(), TaskState::Pending)).collect();
    let waiting = order
      .iter()
      .map(|id| (id.clone(), graph.dependencies(id).len()))
      .collect();
    Self {
      graph,
      order,
      position,
      states,
      waiting,
      ready: BTreeSet::new(),
      report: BuildReport::default(),
    }
  }

  fn is_pending(&self, id: &TaskId) -> bool {
    matches!(self.states.get(id), Some(TaskState::Pending))
  }

  /// Queue every pending task without dependencies.
  fn seed(&mut self) {
    for id in self.order.clone() {
      if self.is_pending(&id) && self.waiting.get(&id).copied().unwrap_or(0) == 0 {
        self.make_ready(&id);
      }
    }
  }

  fn has_ready(&self) -> bool {
    !self.ready.is_empty()
  }

  fn next_ready(&mut self) -> Option<TaskId> {
    self.ready.pop_first().map(|(_, id)| id)
  }

  fn make_ready(&mut self, id: &TaskId) {
    let position = self.position.get(id).copied().unwrap_or(usize::MAX);
    self.ready.insert((position, id.clone()));
    self.transition(id, TaskState::Ready);
  }

  fn start(&mut self, id: &TaskId) {
    self.report.start_order.push(id.clone());
    self.transition(id, TaskState::Running);
  }

  fn transition(&mut self, id: &TaskId, state: TaskState) {
    debug!(task = %id, state = ?state, "task state");
    self.states.insert(id.clone(), state);
  }

  /// Record a terminal outcome and release or block the dependents.
  fn finish(&mut self, id: &TaskId, outcome: TaskOutcome) {
    let mut work = vec![(id.clone(), outcome)];

    while let Some((id, outcome)) = work.pop() {
      let blocked = match &outcome {
        TaskOutcome::Succeeded
        | TaskOutcome::Skipped {
          reason: SkipReason::UpToDate,
        } => None,
        TaskOutcome::Skipped {
          reason: SkipReason::Blocked(cause),
        } => Some(SkipReason::Blocked(cause.clone())),
        TaskOutcome::Skipped {
          reason: SkipReason::Cancelled,
        } => Some(SkipReason::Cancelled),
        TaskOutcome::Failed { .. }
        | TaskOutcome::Skipped {
          reason: SkipReason::Unresolved(_),
        } => Some(SkipReason::Blocked(id.clone())),
      };

      self.report.outcomes.insert(id.clone(), outcome.clone());
      self.transition(&id, TaskState::Done(outcome));

      for dependent in self.graph.dependents(&id) {
        if let Some(count) = self.waiting.get_mut(&dependent) {
          *count = count.saturating_sub(1);
        }
        if !self.is_pending(&dependent) {
          continue;
        }
        match &blocked {
          Some(reason) => {
            if matches!(reason, SkipReason::Blocked(_)) {
              warn!(task = %dependent, reason = %reason, "skipping task");
            }
            // Mark now so a second failed dependency does not queue it twice.
            self.transition(&dependent, TaskState::Done(TaskOutcome::skipped(reason.clone())));
            work.push((dependent, TaskOutcome::skipped(reason.clone())));
          }
          None => {
            if self.waiting.get(&dependent).copied().unwrap_or(0) == 0 {
              self.make_ready(&dependent);
            }
          }
        }
      }
    }
  }

  /// Everything that never started is cancelled.
  fn cancel_remaining(&mut self) {
    self.ready.clear();
    for id in self.order.clone() {
      if matches!(
        self.states.get(&id),
        Some(TaskState::Pending | TaskState::Ready | TaskState::Running)
      ) {
        self.report.outcomes.insert(id.clone(), TaskOutcome::skipped(SkipReason::Cancelled));
        self.transition(&id, TaskState::Done(TaskOutcome::skipped(SkipReason::Cancelled)));
      }
    }
  }
}
