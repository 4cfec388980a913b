//! Deps command integration tests.

use predicates::prelude::*;

use super::common::{APP_PROJECT, TestEnv};

#[test]
fn deps_lists_resolved_artifacts() {
  let env = TestEnv::project(APP_PROJECT);

  env
    .brick_cmd("deps")
    .assert()
    .success()
    .stdout(predicate::str::contains("org.example:util:1.0.0"))
    .stdout(predicate::str::contains("All dependencies resolved"));
}

#[test]
fn deps_populates_the_artifact_cache() {
  let env = TestEnv::project(APP_PROJECT);

  env.brick_cmd("deps").assert().success();

  let cached = walk_files(&env.cache_path());
  assert!(
    cached.iter().any(|p| p.ends_with("util-1.0.0.jar")),
    "cache contents: {cached:?}"
  );
}

#[test]
fn deps_reports_unresolved_modules() {
  let env = TestEnv::project(&APP_PROJECT.replace("util:1.0", "missing:1.0"));

  env
    .brick_cmd("deps")
    .assert()
    .code(3)
    .stdout(predicate::str::contains("org.example:missing"))
    .stdout(predicate::str::contains("1 module(s) failed to resolve"));
}

#[test]
fn deps_json_output() {
  let env = TestEnv::project(APP_PROJECT);

  let output = env.brick_cmd("deps").args(["-o", "json"]).output().unwrap();
  assert!(output.status.success());

  let modules: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
  let artifacts = modules["app"]["artifacts"].as_array().unwrap();
  assert_eq!(artifacts.len(), 1);
  assert_eq!(artifacts[0]["version"], "1.0.0");
  assert!(modules["app"]["errors"].as_array().unwrap().is_empty());
}

#[test]
fn deps_keep_published_version_spelling() {
  let env = TestEnv::project(&APP_PROJECT.replace(
    r#"dependencies = [{ coordinate = "org.example:util:1.0.0" }]"#,
    r#"dependencies = [{ coordinate = "org.example:short:1.2" }, { coordinate = "org.example:ranged:[1.0,2.0)" }]"#,
  ));
  env.write_file("project/repo/org/example/short/1.2/short-1.2.jar", "short");
  env.write_file("project/repo/org/example/ranged/1.5/ranged-1.5.jar", "ranged");
  env.write_file("project/repo/org/example/ranged/2.0/ranged-2.0.jar", "too new");

  env
    .brick_cmd("deps")
    .assert()
    .success()
    .stdout(predicate::str::contains("org.example:short:1.2 "))
    .stdout(predicate::str::contains("org.example:ranged:1.5 "))
    .stdout(predicate::str::contains("All dependencies resolved"));

  let cached = walk_files(&env.cache_path());
  assert!(cached.iter().any(|p| p.ends_with("short-1.2.jar")), "cache contents: {cached:?}");
  assert!(cached.iter().any(|p| p.ends_with("ranged-1.5.jar")), "cache contents: {cached:?}");
}

fn walk_files(dir: &std::path::Path) -> Vec<std::path::PathBuf> {
  let mut files = Vec::new();
  let mut pending = vec![dir.to_path_buf()];
  while let Some(dir) = pending.pop() {
    for entry in std::fs::read_dir(&dir).unwrap() {
      let path = entry.unwrap().path();
      if path.is_dir() {
        pending.push(path);
      } else {
        files.push(path);
      }
    }
  }
  files
}
