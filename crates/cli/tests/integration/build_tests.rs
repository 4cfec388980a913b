//! Build command integration tests.

use predicates::prelude::*;

use super::common::{APP_PROJECT, TestEnv};

#[test]
#[cfg(unix)]
fn build_runs_tasks_and_writes_outputs() {
  let env = TestEnv::project(APP_PROJECT);

  env
    .brick_cmd("build")
    .assert()
    .success()
    .stdout(predicate::str::contains("app:compile"))
    .stdout(predicate::str::contains("Build succeeded"));

  let packaged = std::fs::read_to_string(env.project_path().join("app/out/app.zip")).unwrap();
  assert_eq!(packaged, "int main() { return 0; }\n");
}

#[test]
#[cfg(unix)]
fn second_build_is_up_to_date() {
  let env = TestEnv::project(APP_PROJECT);

  env.brick_cmd("build").assert().success();

  env
    .brick_cmd("build")
    .assert()
    .success()
    .stdout(predicate::str::contains("app:compile up to date"))
    .stdout(predicate::str::contains("app:package up to date"))
    .stdout(predicate::str::contains("Executed: 0"));
}

#[test]
#[cfg(unix)]
fn changed_input_reruns_dependents() {
  let env = TestEnv::project(APP_PROJECT);
  env.brick_cmd("build").assert().success();

  env.write_file("project/app/src/main.c", "int main() { return 1; }\n");
  env
    .brick_cmd("build")
    .assert()
    .success()
    .stdout(predicate::str::contains("app:compile up to date").not())
    .stdout(predicate::str::contains("app:package up to date").not());

  let packaged = std::fs::read_to_string(env.project_path().join("app/out/app.zip")).unwrap();
  assert_eq!(packaged, "int main() { return 1; }\n");
}

#[test]
#[cfg(unix)]
fn task_selection_runs_only_dependencies() {
  let env = TestEnv::project(APP_PROJECT);

  env
    .brick_cmd("build")
    .args(["--task", "app:compile"])
    .assert()
    .success();

  let out = env.project_path().join("app/out");
  assert!(out.join("app").exists());
  assert!(!out.join("app.zip").exists());
}

#[test]
#[cfg(unix)]
fn failing_task_blocks_dependents() {
  let env = TestEnv::project(&APP_PROJECT.replace("cp src/main.c out/app", "exit 7"));

  env
    .brick_cmd("build")
    .assert()
    .code(1)
    .stderr(predicate::str::contains("app:compile failed"))
    .stdout(predicate::str::contains("app:package skipped: blocked by app:compile"));
}

#[test]
#[cfg(unix)]
fn json_report() {
  let env = TestEnv::project(APP_PROJECT);

  let output = env.brick_cmd("build").args(["-o", "json", "--jobs", "2"]).output().unwrap();
  assert!(output.status.success());

  let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
  assert_eq!(report["outcomes"]["app:compile"]["outcome"], "succeeded");
  assert!(report["start_order"].as_array().unwrap().len() >= 2);
  assert!(report["elapsed_ms"].is_u64());
}

#[test]
fn cycle_exits_with_configuration_error() {
  let env = TestEnv::project(&APP_PROJECT.replace("depends_on = [\"compile\"]", "depends_on = [\"package\"]"));

  env
    .brick_cmd("build")
    .assert()
    .code(2)
    .stderr(predicate::str::contains("dependency cycle detected: app:package -> app:package"));

  assert!(!env.project_path().join("app/out").exists());
}

#[test]
fn missing_sdk_exits_with_configuration_error() {
  let env = TestEnv::project(APP_PROJECT);
  env.remove_file("project/local.properties");

  env
    .brick_cmd("build")
    .assert()
    .code(2)
    .stderr(predicate::str::contains("SDK location not found"));
}

#[test]
#[cfg(unix)]
fn sdk_from_environment() {
  let env = TestEnv::project(&APP_PROJECT.replace("cp src/main.c out/app", "true"));
  env.remove_file("project/local.properties");

  env
    .brick_cmd("build")
    .args(["--task", "app:compile"])
    .env("BRICK_SDK_HOME", env.sdk_path())
    .assert()
    .success();
}

#[test]
fn unresolved_dependency_exits_with_resolution_failure() {
  let env = TestEnv::project(&APP_PROJECT.replace("util:1.0", "missing:1.0"));

  env
    .brick_cmd("build")
    .args(["--offline"])
    .assert()
    .code(3)
    .stderr(predicate::str::contains("org.example:missing"))
    .stdout(predicate::str::contains("unresolved dependencies in app"));

  assert!(!env.project_path().join("app/out").exists());
}
