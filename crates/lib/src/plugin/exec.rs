use crate::config::ResolvedConfig;
use crate::descriptor::Module;
use crate::graph::{Task, TaskAction};

use super::Plugin;

/// Shell-command tasks declared in `[[modules.tasks]]`.
pub struct ExecPlugin;

impl Plugin for ExecPlugin {
  fn id(&self) -> &str {
    "exec"
  }

  fn expand(&self, module: &Module, config: &ResolvedConfig) -> Result<Vec<Task>, String> {
    let mut tasks = Vec::with_capacity(module.tasks.len());
    for decl in &module.tasks {
      if decl.name.is_empty() || decl.name.contains(':') {
        return Err(format!("invalid task name `{}`", decl.name));
      }
      if decl.command.trim().is_empty() {
        return Err(format!("task `{}` has an empty command", decl.name));
      }

      let mut task = Task::new(
        module,
        &decl.name,
        TaskAction::Command {
          command: decl.command.clone(),
          env: decl.env.clone(),
        },
      )
      .inputs(&decl.inputs)
      .outputs(&decl.outputs)
      .depends_on(decl.depends_on.iter().cloned())
      .config(config)
      .cacheable(decl.cacheable);

      if decl.lifecycle {
        task = task.required_by(["assemble"]);
      }
      tasks.push(task);
    }
    Ok(tasks)
  }
}
