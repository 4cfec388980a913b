//! Dependency resolution.
//!
//! Coordinates declared by modules are resolved against the artifact cache
//! and an ordered list of repositories, one version per `group:artifact`
//! within each module's resolution scope.

pub mod cache;
mod context;
mod coordinate;
pub mod repository;
mod resolver;
mod types;

pub use cache::ArtifactCache;
pub use context::ResolutionContext;
pub use coordinate::{ArtifactKey, ArtifactVersion, DependencyCoordinate, VersionConstraint};
pub use repository::{RepoError, Repository, RepositorySpec};
pub use resolver::{resolution_scope, resolve_project, scope_requirements, select};
pub use types::{ModuleResolution, Requirement, ResolutionReport, ResolveError, ResolvedArtifact};
