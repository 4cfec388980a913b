//! Task graph construction.
//!
//! Plugins expand modules into [`Task`]s; [`TaskGraph`] links them through
//! declared and inferred dependencies, rejects cycles, and provides
//! selection, topological order and execution waves.

mod builder;
mod dag;
mod error;
mod task;

pub use builder::GraphBuilder;
pub use dag::{EdgeKind, TaskGraph};
pub use error::{CycleError, GraphError};
pub use task::{Task, TaskAction, TaskId};
