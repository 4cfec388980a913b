use crate::config::ResolvedConfig;
use crate::descriptor::Module;
use crate::graph::{Task, TaskAction};

use super::Plugin;

const DEFAULT_INTO: &str = "resources";

/// A `copyResources` task configured by `copy.from`, `copy.into` and
/// `copy.exclude`.
///
/// `copy.from` is relative to the module directory; `copy.into` is relative
/// to the module build directory and defaults to `resources`.
pub struct CopyPlugin;

impl Plugin for CopyPlugin {
  fn id(&self) -> &str {
    "copy"
  }

  fn expand(&self, module: &Module, config: &ResolvedConfig) -> Result<Vec<Task>, String> {
    let from = config.get("copy.from").ok_or("`copy.from` is not set")?;
    let into = module.build_dir.join(config.get("copy.into").unwrap_or(DEFAULT_INTO));
    let exclude = config.get_list("copy.exclude");

    for pattern in &exclude {
      glob::Pattern::new(pattern).map_err(|e| format!("invalid exclude pattern `{pattern}`: {e}"))?;
    }

    let from = module.dir.join(from);
    let task = Task::new(
      module,
      "copyResources",
      TaskAction::Copy {
        from: from.clone(),
        into: into.clone(),
        exclude,
      },
    )
    .inputs([from])
    .outputs([into])
    .required_by(["assemble"])
    .config(config);

    Ok(vec![task])
  }
}
