//! Task DAG.
//!
//! Edges point from a dependency to its dependent. They come from declared
//! `depends_on` references, from `required_by` hooks, and from path overlap
//! between one task's outputs and another task's inputs.

use std::collections::{BTreeSet, HashMap, HashSet};

use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::Serialize;
use tracing::debug;

use crate::config::ConfigError;
use crate::resolve::ResolutionReport;

use super::error::{CycleError, GraphError};
use super::task::{Task, TaskId};

/// Why an edge exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
  /// Declared through `depends_on` or a `required_by` hook.
  Explicit,
  /// One task produces a path the other consumes.
  Inferred,
}

#[derive(Clone, Copy)]
enum Mark {
  Visiting,
  Done,
}

/// An acyclic graph of tasks.
#[derive(Debug, Clone)]
pub struct TaskGraph {
  graph: DiGraph<Task, EdgeKind>,
  nodes: HashMap<TaskId, NodeIndex>,
}

impl TaskGraph {
  /// Build the graph and verify it is acyclic.
  ///
  /// # Errors
  ///
  /// - `DuplicateTask` when two tasks share an id
  /// - `UnknownTaskDependency` when a `depends_on` reference names no task
  /// - `Cycle` when the dependencies loop, with the full cycle path
  pub fn from_tasks(tasks: Vec<Task>) -> Result<Self, GraphError> {
    let mut graph = DiGraph::new();
    let mut nodes = HashMap::new();

    for task in tasks {
      if nodes.contains_key(&task.id) {
        return Err(ConfigError::DuplicateTask(task.id.to_string()).into());
      }
      let id = task.id.clone();
      let idx = graph.add_node(task);
      nodes.insert(id, idx);
    }

    let mut dag = Self { graph, nodes };
    dag.add_explicit_edges()?;
    dag.add_inferred_edges();

    if let Some(path) = dag.find_cycle() {
      return Err(CycleError { path }.into());
    }

    debug!(tasks = dag.len(), edges = dag.graph.edge_count(), "task graph built");
    Ok(dag)
  }

  fn add_explicit_edges(&mut self) -> Result<(), ConfigError> {
    let mut edges = Vec::new();

    for idx in self.graph.node_indices() {
      let task = &self.graph[idx];

      for reference in &task.depends_on {
        let target = task.qualify(reference);
        let Some(&dep) = self.nodes.get(&target) else {
          return Err(ConfigError::UnknownTaskDependency {
            task: task.id.to_string(),
            target: target.to_string(),
          });
        };
        edges.push((dep, idx));
      }

      // Hooks are soft: `assemble` only exists when the module applies `base`.
      for reference in &task.required_by {
        let target = task.qualify(reference);
        match self.nodes.get(&target) {
          Some(&dependent) => edges.push((idx, dependent)),
          None => debug!(task = %task.id, hook = %target, "hook target not defined, ignoring"),
        }
      }
    }

    for (from, to) in edges {
      self.connect(from, to, EdgeKind::Explicit);
    }
    Ok(())
  }

  fn add_inferred_edges(&mut self) {
    let mut edges = Vec::new();

    for producer in self.graph.node_indices() {
      for consumer in self.graph.node_indices() {
        if producer == consumer {
          continue;
        }
        let outputs = &self.graph[producer].outputs;
        let inputs = &self.graph[consumer].inputs;
        let overlaps = outputs
          .iter()
          .any(|out| inputs.iter().any(|input| out.starts_with(input) || input.starts_with(out)));
        if overlaps {
          edges.push((producer, consumer));
        }
      }
    }

    for (from, to) in edges {
      self.connect(from, to, EdgeKind::Inferred);
    }
  }

  fn connect(&mut self, from: NodeIndex, to: NodeIndex, kind: EdgeKind) {
    if self.graph.find_edge(from, to).is_none() {
      self.graph.add_edge(from, to, kind);
    }
  }

  /// Depth-first search along dependencies, tracking the recursion stack.
  fn find_cycle(&self) -> Option<Vec<TaskId>> {
    let mut marks: HashMap<NodeIndex, Mark> = HashMap::new();
    let mut stack: Vec<NodeIndex> = Vec::new();

    for start in self.sorted(self.graph.node_indices()) {
      if marks.contains_key(&start) {
        continue;
      }
      if let Some(cycle) = self.visit(start, &mut marks, &mut stack) {
        return Some(cycle);
      }
    }
    None
  }

  fn visit(
    &self,
    node: NodeIndex,
    marks: &mut HashMap<NodeIndex, Mark>,
    stack: &mut Vec<NodeIndex>,
  ) -> Option<Vec<TaskId>> {
    marks.insert(node, Mark::Visiting);
    stack.push(node);

    for dep in self.sorted(self.graph.neighbors_directed(node, Direction::Incoming)) {
      match marks.get(&dep) {
        Some(Mark::Visiting) => {
          let start = stack.iter().position(|n| *n == dep)?;
          let mut path: Vec<TaskId> = stack[start..].iter().map(|n| self.graph[*n].id.clone()).collect();
          path.push(self.graph[dep].id.clone());
          return Some(path);
        }
        Some(Mark::Done) => {}
        None => {
          if let Some(cycle) = self.visit(dep, marks, stack) {
            return Some(cycle);
          }
        }
      }
    }

    stack.pop();
    marks.insert(node, Mark::Done);
    None
  }

  fn sorted(&self, indices: impl Iterator<Item = NodeIndex>) -> Vec<NodeIndex> {
    let mut indices: Vec<NodeIndex> = indices.collect();
    indices.sort_by(|a, b| self.graph[*a].id.cmp(&self.graph[*b].id));
    indices.dedup();
    indices
  }

  /// Tasks grouped into waves: every task's dependencies are in earlier
  /// waves. Tasks within a wave are sorted by id.
  pub fn waves(&self) -> Vec<Vec<TaskId>> {
    // Kahn's algorithm, one level at a time
    let mut in_degree: HashMap<NodeIndex, usize> = self
      .graph
      .node_indices()
      .map(|idx| (idx, self.graph.neighbors_directed(idx, Direction::Incoming).count()))
      .collect();
    let mut remaining: HashSet<NodeIndex> = self.graph.node_indices().collect();
    let mut waves = Vec::new();

    while !remaining.is_empty() {
      let ready = self.sorted(remaining.iter().copied().filter(|idx| in_degree[idx] == 0));
      if ready.is_empty() {
        break;
      }

      for &idx in &ready {
        remaining.remove(&idx);
        for dependent in self.graph.neighbors_directed(idx, Direction::Outgoing) {
          if let Some(degree) = in_degree.get_mut(&dependent) {
            *degree = degree.saturating_sub(1);
          }
        }
      }

      waves.push(ready.into_iter().map(|idx| self.graph[idx].id.clone()).collect());
    }

    waves
  }

  /// A topological order: dependencies before dependents.
  pub fn topological_order(&self) -> Vec<TaskId> {
    self.waves().into_iter().flatten().collect()
  }

  /// Restrict the graph to the requested tasks and everything they depend on.
  ///
  /// A request is either a full id (`app:compile`) or a bare task name that
  /// selects the task of that name in every module. An empty request keeps
  /// every task that is not explicit-only.
  pub fn select(&self, requested: &[String]) -> Result<TaskGraph, ConfigError> {
    let mut roots = Vec::new();
    if requested.is_empty() {
      roots.extend(self.graph.node_indices().filter(|idx| !self.graph[*idx].explicit_only));
    }
    for request in requested {
      let matched: Vec<NodeIndex> = if request.contains(':') {
        self.nodes.get(&TaskId::from_qualified(request)).copied().into_iter().collect()
      } else {
        self
          .graph
          .node_indices()
          .filter(|idx| self.graph[*idx].id.name() == request)
          .collect()
      };
      if matched.is_empty() {
        return Err(ConfigError::UnknownTask(request.clone()));
      }
      roots.extend(matched);
    }

    let mut keep: BTreeSet<NodeIndex> = BTreeSet::new();
    let mut queue = roots;
    while let Some(idx) = queue.pop() {
      if keep.insert(idx) {
        queue.extend(self.graph.neighbors_directed(idx, Direction::Incoming));
      }
    }

    let graph = self
      .graph
      .filter_map(|idx, task| keep.contains(&idx).then(|| task.clone()), |_, kind| Some(*kind));
    let nodes = graph
      .node_indices()
      .map(|idx| (graph[idx].id.clone(), idx))
      .collect();

    debug!(requested = ?requested, selected = keep.len(), "task selection");
    Ok(TaskGraph { graph, nodes })
  }

  /// Give every task the resolved artifacts of its module as classpath.
  pub fn attach_classpath(&mut self, resolution: &ResolutionReport) {
    for task in self.graph.node_weights_mut() {
      task.classpath = resolution
        .artifacts(&task.module)
        .iter()
        .map(|artifact| artifact.path.clone())
        .collect();
    }
  }

  pub fn task(&self, id: &TaskId) -> Option<&Task> {
    self.nodes.get(id).map(|idx| &self.graph[*idx])
  }

  /// All tasks, sorted by id.
  pub fn tasks(&self) -> Vec<&Task> {
    self
      .sorted(self.graph.node_indices())
      .into_iter()
      .map(|idx| &self.graph[idx])
      .collect()
  }

  /// Direct dependencies of a task.
  pub fn dependencies(&self, id: &TaskId) -> Vec<TaskId> {
    self.neighbors(id, Direction::Incoming)
  }

  /// Tasks that directly depend on `id`.
  pub fn dependents(&self, id: &TaskId) -> Vec<TaskId> {
    self.neighbors(id, Direction::Outgoing)
  }

  fn neighbors(&self, id: &TaskId, direction: Direction) -> Vec<TaskId> {
    let Some(&idx) = self.nodes.get(id) else {
      return Vec::new();
    };
    self
      .sorted(self.graph.neighbors_directed(idx, direction))
      .into_iter()
      .map(|n| self.graph[n].id.clone())
      .collect()
  }

  /// Every edge as `(dependency, dependent, kind)`, sorted.
  pub fn edges(&self) -> Vec<(TaskId, TaskId, EdgeKind)> {
    let mut edges: Vec<_> = self
      .graph
      .edge_indices()
      .filter_map(|e| {
        let (from, to) = self.graph.edge_endpoints(e)?;
        Some((self.graph[from].id.clone(), self.graph[to].id.clone(), self.graph[e]))
      })
      .collect();
    edges.sort_by(|a, b| (&a.0, &a.1).cmp(&(&b.0, &b.1)));
    edges
  }

  pub fn contains(&self, id: &TaskId) -> bool {
    self.nodes.contains_key(id)
  }

  pub fn len(&self) -> usize {
    self.nodes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.nodes.is_empty()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::graph::TaskAction;
  use crate::util::testutil::module;
  use std::path::Path;

  fn task(module_name: &str, name: &str) -> Task {
    Task::new(&module(module_name, Path::new("/p")), name, TaskAction::Lifecycle)
  }

  fn position(order: &[TaskId], id: &str) -> usize {
    order.iter().position(|t| t.as_str() == id).unwrap()
  }

  #[test]
  fn topological_order_respects_every_edge() {
    let tasks = vec![
      task("app", "build").depends_on(["assemble", "check"]),
      task("app", "assemble").depends_on(["compile", "core:jar"]),
      task("app", "check"),
      task("app", "compile").depends_on(["core:jar"]),
      task("core", "jar").outputs(["out/core.jar"]),
      task("app", "package").inputs(["../core/out"]),
    ];
    let graph = TaskGraph::from_tasks(tasks).unwrap();
    let order = graph.topological_order();
    assert_eq!(order.len(), 6);

    for (from, to, _) in graph.edges() {
      assert!(
        position(&order, from.as_str()) < position(&order, to.as_str()),
        "{from} must come before {to}"
      );
    }
  }

  #[test]
  fn infers_edges_from_paths() {
    let tasks = vec![
      task("core", "jar").outputs(["out/core.jar"]),
      task("app", "package").inputs(["../core/out"]),
      task("app", "unrelated").inputs(["src"]),
    ];
    let graph = TaskGraph::from_tasks(tasks).unwrap();

    assert_eq!(
      graph.edges(),
      vec![(
        TaskId::new("core", "jar"),
        TaskId::new("app", "package"),
        EdgeKind::Inferred
      )]
    );
  }

  #[test]
  fn hooks_attach_to_existing_targets_only() {
    let tasks = vec![
      task("app", "assemble"),
      task("app", "compile").required_by(["assemble"]),
      task("core", "compile").required_by(["assemble"]),
    ];
    let graph = TaskGraph::from_tasks(tasks).unwrap();
    assert_eq!(
      graph.dependencies(&TaskId::new("app", "assemble")),
      vec![TaskId::new("app", "compile")]
    );
    assert!(graph.dependents(&TaskId::new("core", "compile")).is_empty());
  }

  #[test]
  fn self_dependency_is_a_cycle() {
    let err = TaskGraph::from_tasks(vec![task("app", "x").depends_on(["x"])]).unwrap_err();
    match err {
      GraphError::Cycle(cycle) => assert_eq!(cycle.to_string(), "dependency cycle detected: app:x -> app:x"),
      other => panic!("unexpected error: {other}"),
    }
  }

  #[test]
  fn cycle_path_names_every_task() {
    let tasks = vec![
      task("app", "a").depends_on(["b"]),
      task("app", "b").depends_on(["core:c"]),
      task("core", "c").depends_on(["app:a"]),
    ];
    let err = TaskGraph::from_tasks(tasks).unwrap_err();
    match err {
      GraphError::Cycle(cycle) => {
        let path: Vec<_> = cycle.path.iter().map(TaskId::as_str).collect();
        assert_eq!(path, vec!["app:a", "app:b", "core:c", "app:a"]);
      }
      other => panic!("unexpected error: {other}"),
    }
  }

  #[test]
  fn unknown_dependency_and_duplicates() {
    let err = TaskGraph::from_tasks(vec![task("app", "a").depends_on(["ghost"])]).unwrap_err();
    assert!(matches!(
      err,
      GraphError::Config(ConfigError::UnknownTaskDependency { ref target, .. }) if target == "app:ghost"
    ));

    let err = TaskGraph::from_tasks(vec![task("app", "a"), task("app", "a")]).unwrap_err();
    assert!(matches!(err, GraphError::Config(ConfigError::DuplicateTask(_))));
  }

  #[test]
  fn waves_group_independent_tasks() {
    let tasks = vec![
      task("app", "a"),
      task("app", "b"),
      task("app", "c").depends_on(["a", "b"]),
      task("app", "d").depends_on(["c"]),
    ];
    let waves = TaskGraph::from_tasks(tasks).unwrap().waves();
    let names: Vec<Vec<&str>> = waves.iter().map(|w| w.iter().map(TaskId::name).collect()).collect();
    assert_eq!(names, vec![vec!["a", "b"], vec!["c"], vec!["d"]]);
  }

  #[test]
  fn selection_includes_transitive_dependencies() {
    let tasks = vec![
      task("app", "build").depends_on(["assemble"]),
      task("app", "assemble").depends_on(["core:assemble"]),
      task("core", "assemble"),
      task("core", "build").depends_on(["assemble"]),
      task("app", "clean").explicit_only(),
    ];
    let graph = TaskGraph::from_tasks(tasks).unwrap();

    let selected = graph.select(&["app:assemble".to_string()]).unwrap();
    let ids: Vec<_> = selected.tasks().iter().map(|t| t.id.to_string()).collect();
    assert_eq!(ids, vec!["app:assemble", "core:assemble"]);
    assert_eq!(selected.edges().len(), 1);

    let by_name = graph.select(&["build".to_string()]).unwrap();
    assert_eq!(by_name.len(), 4);

    assert!(matches!(
      graph.select(&["nope".to_string()]),
      Err(ConfigError::UnknownTask(_))
    ));
    assert_eq!(graph.select(&[]).unwrap().len(), 4);
    assert_eq!(graph.select(&["clean".to_string()]).unwrap().len(), 1);
  }

  #[test]
  fn classpath_follows_module_resolution() {
    use crate::resolve::{ArtifactKey, ArtifactVersion, ModuleResolution, ResolvedArtifact};

    let mut graph = TaskGraph::from_tasks(vec![task("app", "compile"), task("core", "jar")]).unwrap();
    let mut report = ResolutionReport::default();
    report.modules.insert(
      "app".to_string(),
      ModuleResolution {
        artifacts: vec![ResolvedArtifact {
          key: ArtifactKey::new("g", "a"),
          version: ArtifactVersion::parse("1.2").unwrap(),
          repository: "local".to_string(),
          path: "/cache/g/a/1.2/abc/a-1.2.jar".into(),
          sha256: "abc".to_string(),
        }],
        errors: vec![],
      },
    );

    graph.attach_classpath(&report);

    let compile = graph.task(&TaskId::from_qualified("app:compile")).unwrap();
    assert_eq!(compile.classpath, vec![Path::new("/cache/g/a/1.2/abc/a-1.2.jar").to_path_buf()]);
    assert!(graph.task(&TaskId::from_qualified("core:jar")).unwrap().classpath.is_empty());
  }
}
