//! Shared test helpers for CLI integration tests.

use std::path::PathBuf;

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use tempfile::TempDir;

/// Project with a compile task feeding a package task, and one external
/// dependency served from a file repository inside the project.
pub const APP_PROJECT: &str = r#"
[project]
name = "demo"

[[repositories]]
name = "local"
url = "repo"

[[modules]]
name = "app"
plugins = ["base", "exec"]
dependencies = [{ coordinate = "org.example:util:1.0.0" }]

[[modules.tasks]]
name = "compile"
command = "cp src/main.c out/app"
inputs = ["src"]
outputs = ["out/app"]

[[modules.tasks]]
name = "package"
command = "cat out/app > out/app.zip"
depends_on = ["compile"]
inputs = ["out/app"]
outputs = ["out/app.zip"]
"#;

/// Isolated test environment.
///
/// Each test gets its own temporary directory with an isolated project,
/// artifact cache, and SDK location.
pub struct TestEnv {
  pub temp: TempDir,
}

impl TestEnv {
  /// Create a project from descriptor content, with an SDK configured in
  /// `local.properties` and the `util` artifact in the file repository.
  pub fn project(descriptor: &str) -> Self {
    let env = Self::empty();
    env.write_file("project/brick.toml", descriptor);
    let sdk = env.sdk_path();
    env.write_file("project/local.properties", &format!("sdk.dir={}\n", sdk.display()));
    env.write_file("project/app/src/main.c", "int main() { return 0; }\n");
    env.write_file("project/repo/org/example/util/1.0.0/util-1.0.0.jar", "util");
    env
  }

  /// Create an empty test environment.
  ///
  /// Use this when you need to manually set up the directory structure.
  pub fn empty() -> Self {
    let temp = TempDir::new().unwrap();
    Self { temp }
  }

  /// Write a file relative to the temp directory.
  pub fn write_file(&self, relative_path: &str, content: &str) {
    let path = self.temp.path().join(relative_path);
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, content).unwrap();
  }

  /// Remove a file relative to the temp directory.
  pub fn remove_file(&self, relative_path: &str) {
    std::fs::remove_file(self.temp.path().join(relative_path)).unwrap();
  }

  /// Project root.
  pub fn project_path(&self) -> PathBuf {
    let p = self.temp.path().join("project");
    std::fs::create_dir_all(&p).unwrap();
    dunce::canonicalize(&p).unwrap_or(p)
  }

  /// Artifact cache (isolated per test).
  pub fn cache_path(&self) -> PathBuf {
    let p = self.temp.path().join("cache");
    std::fs::create_dir_all(&p).unwrap();
    dunce::canonicalize(&p).unwrap_or(p)
  }

  /// SDK directory referenced from `local.properties`.
  pub fn sdk_path(&self) -> PathBuf {
    let p = self.temp.path().join("sdk");
    std::fs::create_dir_all(&p).unwrap();
    dunce::canonicalize(&p).unwrap_or(p)
  }

  /// Get a pre-configured Command for the brick binary.
  ///
  /// Runs against the test project with `-C`, and isolates the environment:
  /// - `BRICK_CACHE_DIR`: Isolated artifact cache
  /// - `BRICK_SDK_HOME`, `BRICK_SDK`: Removed so only `local.properties` counts
  pub fn brick_cmd(&self, subcommand: &str) -> Command {
    let mut cmd: Command = cargo_bin_cmd!("brick");
    cmd.arg(subcommand).arg("-C").arg(self.project_path());
    cmd.env("BRICK_CACHE_DIR", self.cache_path());
    cmd.env_remove("BRICK_SDK_HOME");
    cmd.env_remove("BRICK_SDK");
    cmd.env_remove("RUST_LOG");
    cmd
  }
}
