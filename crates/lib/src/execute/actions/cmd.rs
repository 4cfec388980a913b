//! Command action implementation.
//!
//! Commands run through the platform shell in the module directory. The
//! caller's environment is inherited so toolchains on `PATH` keep working;
//! the task's own variables are layered on top.

use std::collections::BTreeMap;
use std::path::Path;

use tokio::process::Command;
use tracing::{debug, info};

use crate::execute::types::ExecuteError;

/// Execute a shell command.
///
/// # Arguments
///
/// * `cmd` - The command string to execute
/// * `env` - Variables added to the inherited environment
/// * `cwd` - Working directory
///
/// # Returns
///
/// The stdout of the command on success (trimmed).
pub async fn execute_cmd(cmd: &str, env: &BTreeMap<String, String>, cwd: &Path) -> Result<String, ExecuteError> {
  info!(cmd = %cmd, "executing command");

  let (shell_cmd, shell_args) = get_shell();

  let mut command = Command::new(&shell_cmd);
  command.args(&shell_args).arg(cmd).current_dir(cwd).envs(env);

  debug!(shell = %shell_cmd, working_dir = ?cwd, "spawning process");

  let output = command.output().await.map_err(|source| ExecuteError::Spawn {
    cmd: cmd.to_string(),
    source,
  })?;

  if !output.status.success() {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stdout = String::from_utf8_lossy(&output.stdout);

    if !stdout.is_empty() {
      debug!(stdout = %stdout, "command stdout");
    }

    return Err(ExecuteError::CmdFailed {
      cmd: cmd.to_string(),
      code: output.status.code(),
      stderr: stderr.into_owned(),
    });
  }

  let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();

  if !stdout.is_empty() {
    debug!(stdout = %stdout, "command output");
  }

  Ok(stdout)
}

/// Get the shell command and arguments for the current platform.
///
/// `/bin/sh` (Unix) and `powershell.exe` (Windows). `$SHELL` is ignored.
fn get_shell() -> (String, Vec<String>) {
  #[cfg(unix)]
  {
    ("/bin/sh".to_string(), vec!["-c".to_string()])
  }

  #[cfg(windows)]
  {
    (
      "powershell.exe".to_string(),
      vec![
        "-NoProfile".to_string(),
        "-ExecutionPolicy".to_string(),
        "Bypass".to_string(),
        "-Command".to_string(),
      ],
    )
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  /// Unix: echo $VAR
  /// Windows: Write-Output $env:VAR
  #[cfg(unix)]
  fn echo_env(var: &str) -> String {
    format!("echo ${}", var)
  }

  #[cfg(windows)]
  fn echo_env(var: &str) -> String {
    format!("Write-Output $env:{}", var)
  }

  #[cfg(unix)]
  fn create_cwd_marker() -> &'static str {
    "touch cwd_marker"
  }

  #[cfg(windows)]
  fn create_cwd_marker() -> &'static str {
    "New-Item -ItemType File -Path cwd_marker -Force"
  }

  #[tokio::test]
  async fn execute_simple_command() {
    let temp_dir = TempDir::new().unwrap();

    let result = execute_cmd("echo hello", &BTreeMap::new(), temp_dir.path())
      .await
      .unwrap();

    assert_eq!(result, "hello");
  }

  #[tokio::test]
  async fn execute_command_with_env() {
    let temp_dir = TempDir::new().unwrap();
    let mut env = BTreeMap::new();
    env.insert("BRICK_TASK".to_string(), "app:compile".to_string());

    let result = execute_cmd(&echo_env("BRICK_TASK"), &env, temp_dir.path())
      .await
      .unwrap();

    assert_eq!(result, "app:compile");
  }

  #[tokio::test]
  async fn execute_command_inherits_path() {
    let temp_dir = TempDir::new().unwrap();

    let result = execute_cmd(&echo_env("PATH"), &BTreeMap::new(), temp_dir.path())
      .await
      .unwrap();

    assert!(!result.is_empty());
  }

  #[tokio::test]
  async fn execute_command_with_cwd() {
    let temp_dir = TempDir::new().unwrap();
    let sub_dir = temp_dir.path().join("subdir");
    tokio::fs::create_dir(&sub_dir).await.unwrap();

    execute_cmd(create_cwd_marker(), &BTreeMap::new(), &sub_dir)
      .await
      .unwrap();

    assert!(sub_dir.join("cwd_marker").exists());
  }

  #[tokio::test]
  #[cfg(unix)]
  async fn execute_command_failure_keeps_stderr() {
    let temp_dir = TempDir::new().unwrap();

    let result = execute_cmd("echo broken 1>&2; exit 3", &BTreeMap::new(), temp_dir.path()).await;

    match result {
      Err(ExecuteError::CmdFailed { code, stderr, .. }) => {
        assert_eq!(code, Some(3));
        assert!(stderr.contains("broken"));
      }
      other => panic!("expected CmdFailed, got {other:?}"),
    }
  }

  #[tokio::test]
  #[cfg(unix)]
  async fn execute_multiline_command() {
    let temp_dir = TempDir::new().unwrap();

    let cmd = r#"
      x=1
      y=2
      echo $((x + y))
    "#;

    let result = execute_cmd(cmd, &BTreeMap::new(), temp_dir.path()).await.unwrap();

    assert_eq!(result, "3");
  }

  #[test]
  #[cfg(unix)]
  fn builds_use_posix_sh() {
    assert_eq!(get_shell(), ("/bin/sh".to_string(), vec!["-c".to_string()]));
  }
}
