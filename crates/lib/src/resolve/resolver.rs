//! Version selection and project-wide resolution.
//!
//! Resolution runs in two phases. Planning gathers every requirement in a
//! module's resolution scope and selects one version per `group:artifact`;
//! strict-pin conflicts are detected here, before anything is downloaded.
//! Fetching then resolves each selected coordinate through the session
//! [`ResolutionContext`].

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{debug, error, info};

use crate::descriptor::{Module, Project};

use super::context::ResolutionContext;
use super::coordinate::{ArtifactKey, ArtifactVersion, VersionConstraint};
use super::types::{ModuleResolution, Requirement, ResolutionReport, ResolveError};

/// The module plus every module reachable through project dependencies,
/// starting with `module` itself.
pub fn resolution_scope<'a>(project: &'a Project, module: &'a Module) -> Vec<&'a Module> {
  let mut scope = Vec::new();
  let mut visited = BTreeSet::new();
  let mut queue = VecDeque::from([module]);

  while let Some(current) = queue.pop_front() {
    if !visited.insert(current.name.as_str()) {
      continue;
    }
    scope.push(current);
    for target in current.project_dependencies() {
      if let Some(dep) = project.module(target) {
        queue.push_back(dep);
      }
    }
  }

  scope
}

/// Every external requirement in the scope of `module`, grouped by artifact.
pub fn scope_requirements(project: &Project, module: &Module) -> BTreeMap<ArtifactKey, Vec<Requirement>> {
  let mut requirements: BTreeMap<ArtifactKey, Vec<Requirement>> = BTreeMap::new();
  for member in resolution_scope(project, module) {
    for (coordinate, _scope) in member.external_dependencies() {
      requirements.entry(coordinate.key.clone()).or_default().push(Requirement {
        module: member.name.clone(),
        constraint: coordinate.constraint.clone(),
      });
    }
  }
  requirements
}

/// Select the version of `key` that satisfies every requirement.
///
/// - A strict pin wins, provided all strict pins agree and every other
///   requirement accepts it.
/// - Otherwise the highest bare version is used when every range accepts it.
/// - Otherwise the highest listed version accepted by every requirement.
///
/// Strict pins never consult repositories, so a conflicting pin is rejected
/// without any network or cache access. Declared versions keep their
/// spelling; only listed versions are read from repositories.
pub async fn select(
  key: &ArtifactKey,
  requirements: &[Requirement],
  ctx: &ResolutionContext,
) -> Result<ArtifactVersion, ResolveError> {
  let conflict = || ResolveError::VersionConflict {
    key: key.clone(),
    requirements: requirements.to_vec(),
  };

  let mut pins = requirements.iter().filter_map(|r| match &r.constraint {
    VersionConstraint::Strict(v) => Some(v),
    _ => None,
  });
  if let Some(pinned) = pins.next() {
    if pins.any(|other| other.semver() != pinned.semver()) {
      return Err(conflict());
    }
    if !requirements.iter().all(|r| r.constraint.accepts(pinned.semver())) {
      return Err(conflict());
    }
    return Ok(pinned.clone());
  }

  let preferred = requirements
    .iter()
    .filter_map(|r| match &r.constraint {
      VersionConstraint::Prefer(v) => Some(v),
      _ => None,
    })
    .max();
  if let Some(preferred) = preferred
    && requirements.iter().all(|r| r.constraint.accepts(preferred.semver()))
  {
    return Ok(preferred.clone());
  }

  let available = ctx.versions(key).await?;
  available
    .iter()
    .rev()
    .find(|v| requirements.iter().all(|r| r.constraint.accepts(v.semver())))
    .cloned()
    .ok_or_else(|| ResolveError::NoMatchingVersion {
      key: key.clone(),
      constraints: requirements
        .iter()
        .map(|r| r.constraint.to_string())
        .collect::<Vec<_>>()
        .join(", "),
      available: available.iter().map(ToString::to_string).collect(),
    })
}

/// Resolve every module of `project`.
///
/// Failures are collected per module; one module failing does not stop the
/// others from resolving.
pub async fn resolve_project(project: &Project, ctx: Arc<ResolutionContext>) -> ResolutionReport {
  info!(modules = project.modules.len(), offline = ctx.is_offline(), "resolving dependencies");

  type Plan = (Vec<(ArtifactKey, ArtifactVersion)>, Vec<ResolveError>);
  let mut plans: BTreeMap<String, Plan> = BTreeMap::new();
  for module in &project.modules {
    let mut selected = Vec::new();
    let mut errors = Vec::new();
    for (key, requirements) in scope_requirements(project, module) {
      match select(&key, &requirements, &ctx).await {
        Ok(version) => {
          debug!(module = %module.name, artifact = %key, version = %version, "selected version");
          selected.push((key, version));
        }
        Err(e) => errors.push(e),
      }
    }
    plans.insert(module.name.clone(), (selected, errors));
  }

  // Fetch each distinct coordinate once, concurrently.
  let distinct: BTreeSet<(ArtifactKey, ArtifactVersion)> = plans
    .values()
    .filter(|(_, errors)| errors.is_empty())
    .flat_map(|(selected, _)| selected.iter().cloned())
    .collect();

  let mut set = JoinSet::new();
  for (key, version) in distinct {
    let ctx = ctx.clone();
    set.spawn(async move {
      let result = ctx.artifact(&key, &version).await;
      ((key, version), result)
    });
  }

  let mut fetched = HashMap::new();
  while let Some(joined) = set.join_next().await {
    match joined {
      Ok((coordinate, result)) => {
        fetched.insert(coordinate, result);
      }
      Err(e) => error!(error = %e, "artifact fetch task panicked"),
    }
  }

  let mut report = ResolutionReport::default();
  for (module, (selected, mut errors)) in plans {
    let mut artifacts = Vec::new();
    if errors.is_empty() {
      for coordinate in &selected {
        match fetched.get(coordinate) {
          Some(Ok(artifact)) => artifacts.push(artifact.clone()),
          Some(Err(e)) => errors.push(e.clone()),
          None => errors.push(ResolveError::NotFound {
            coordinate: format!("{}:{}", coordinate.0, coordinate.1),
            attempted: Vec::new(),
          }),
        }
      }
    }

    for e in &errors {
      error!(module = %module, error = %e, "dependency resolution failed");
    }
    report.modules.insert(module, ModuleResolution { artifacts, errors });
  }

  report
}
