use crate::config::ResolvedConfig;
use crate::descriptor::Module;
use crate::graph::{Task, TaskAction};

use super::Plugin;

/// Lifecycle tasks every module gets: `assemble`, `check`, `build`, `clean`.
pub struct BasePlugin;

impl Plugin for BasePlugin {
  fn id(&self) -> &str {
    "base"
  }

  fn expand(&self, module: &Module, config: &ResolvedConfig) -> Result<Vec<Task>, String> {
    let assemble = Task::new(module, "assemble", TaskAction::Lifecycle).config(config);
    let check = Task::new(module, "check", TaskAction::Lifecycle).config(config);
    let build = Task::new(module, "build", TaskAction::Lifecycle)
      .depends_on(["assemble", "check"])
      .config(config);
    let clean = Task::new(
      module,
      "clean",
      TaskAction::Delete {
        paths: vec![module.build_dir.clone()],
      },
    )
    .cacheable(false)
    .explicit_only();

    Ok(vec![assemble, check, build, clean])
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::util::testutil::module;
  use std::path::Path;

  #[test]
  fn lifecycle_tasks() {
    let module = module("app", Path::new("/p"));
    let tasks = BasePlugin.expand(&module, &ResolvedConfig::default()).unwrap();
    let names: Vec<_> = tasks.iter().map(|t| t.id.name()).collect();
    assert_eq!(names, vec!["assemble", "check", "build", "clean"]);

    let build = &tasks[2];
    assert_eq!(build.depends_on, vec!["assemble", "check"]);

    let clean = &tasks[3];
    assert!(!clean.cacheable);
    assert!(clean.explicit_only);
    assert_eq!(
      clean.action,
      TaskAction::Delete {
        paths: vec![module.build_dir.clone()]
      }
    );
  }
}
