//! brick-lib: build graph resolution and incremental task execution
//!
//! This crate provides the pieces a build runs through:
//! - `descriptor`: loading and merging `brick.toml` project descriptors
//! - `resolve`: dependency resolution against Maven-layout repositories
//! - `plugin`: plugins that expand modules into tasks
//! - `graph`: the task DAG with selection, ordering and waves
//! - `execute`: the incremental, parallel task executor
//! - `session`: one build invocation end to end

pub mod config;
pub mod consts;
pub mod descriptor;
pub mod execute;
pub mod graph;
pub mod platform;
pub mod plugin;
pub mod resolve;
pub mod session;
pub mod state;
pub mod util;
