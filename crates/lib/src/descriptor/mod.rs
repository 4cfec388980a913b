//! Project descriptors.
//!
//! A project is described by `brick.toml` at its root plus optional
//! `brick.toml` files one directory below. The loader merges them into a
//! [`Project`].

mod load;
mod types;

pub use load::{DescriptorSource, discover, load_from_dir, load_project, module_layers};
pub use types::{DependencyDecl, DependencyTarget, Module, PluginDecl, Project, TaskDecl};
