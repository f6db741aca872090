use std::fs;

use distbuild_lib::workdir_lock::WorkdirLock;

use super::common::{TWO_COMPONENTS, TestEnv};

#[test]
fn test_status_lists_published_components() {
  let env = TestEnv::empty();
  env.publish_previous_build(TWO_COMPONENTS);

  let output = env.distbuild_cmd().arg("status").output().unwrap();

  assert!(output.status.success());
  let stdout = String::from_utf8_lossy(&output.stdout);
  assert!(stdout.contains("Current generation: 0"));
  assert!(stdout.contains("Components: 2"));
  assert!(stdout.contains("acl acl-0-r1"));
  assert!(stdout.contains("demo demo-0-r1"));
  assert!(!String::from_utf8_lossy(&output.stderr).contains("Missing build results"));
}

#[test]
fn test_status_json_reports_generation() {
  let env = TestEnv::empty();
  env.publish_previous_build(TWO_COMPONENTS);

  let output = env.distbuild_cmd().args(["status", "--json"]).output().unwrap();

  assert!(output.status.success());
  let state: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
  assert_eq!(state["generation"], 0);
  let components = state["components"].as_array().unwrap();
  assert_eq!(components.len(), 2);
  assert_eq!(components[0]["pkgname"], "acl");
  assert_eq!(components[0]["present"], true);
}

#[test]
fn test_status_warns_about_missing_results() {
  let env = TestEnv::empty();
  let generation = env.publish_previous_build(TWO_COMPONENTS);
  fs::remove_dir_all(generation.join("demo-0-r1")).unwrap();

  let output = env.distbuild_cmd().arg("status").output().unwrap();

  assert!(output.status.success());
  let stderr = String::from_utf8_lossy(&output.stderr);
  assert!(stderr.contains("Missing build results (will rebuild): demo"), "stderr: {}", stderr);
}

#[test]
fn test_status_refused_while_build_runs() {
  let env = TestEnv::empty();
  env.publish_previous_build(TWO_COMPONENTS);
  let snapshot = env.workdir().join("snapshot.json");
  let _build = WorkdirLock::exclusive(&env.workdir(), "build", Some(&snapshot)).unwrap();

  let output = env.distbuild_cmd().arg("status").output().unwrap();

  assert!(!output.status.success());
  let stderr = String::from_utf8_lossy(&output.stderr);
  assert!(stderr.contains("`distbuild build`"), "stderr: {}", stderr);
  assert!(stderr.contains(&snapshot.display().to_string()), "stderr: {}", stderr);
}

#[test]
fn test_status_marks_missing_component_row() {
  let env = TestEnv::empty();
  let generation = env.publish_previous_build(TWO_COMPONENTS);
  fs::remove_dir_all(generation.join("acl-0-r1")).unwrap();

  let output = env.distbuild_cmd().args(["-v", "status"]).output().unwrap();

  assert!(output.status.success());
  let stdout = String::from_utf8_lossy(&output.stdout);
  assert!(stdout.contains("[missing]"), "stdout: {}", stdout);
  assert!(stdout.contains("demo demo-0-r1 ("), "stdout: {}", stdout);
}
