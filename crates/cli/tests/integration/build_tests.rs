use std::fs;
use std::path::PathBuf;

use distbuild_lib::workdir_lock::WorkdirLock;

use super::common::{TWO_COMPONENTS, TestEnv};

#[test]
fn test_build_reuses_everything_when_cached() {
  let env = TestEnv::empty();
  env.write_snapshot(TWO_COMPONENTS);
  env.publish_previous_build(TWO_COMPONENTS);
  let sentinel = env.temp.path().join("changed.stamp");

  let output = env
    .distbuild_cmd()
    .arg("build")
    .arg("--touch-if-changed")
    .arg(&sentinel)
    .output()
    .unwrap();

  assert!(
    output.status.success(),
    "build failed: {}",
    String::from_utf8_lossy(&output.stderr)
  );
  let stdout = String::from_utf8_lossy(&output.stdout);
  assert!(stdout.contains("No changes"));
  assert!(stdout.contains("Reused: 2"));
  assert!(!sentinel.exists());
  assert_eq!(fs::read_link(env.workdir().join("build")).unwrap(), PathBuf::from("build.0"));
  assert!(!env.workdir().join("build.1").exists());
}

#[test]
fn test_build_with_missing_mirror_keeps_previous_generation() {
  let env = TestEnv::empty();
  env.publish_previous_build(TWO_COMPONENTS);
  // Bumping a revision invalidates `acl`, whose mirror does not exist.
  env.write_snapshot(&TWO_COMPONENTS.replacen(
    r#"acl.git", "revision": "r1""#,
    r#"acl.git", "revision": "r2""#,
    1,
  ));

  let output = env.distbuild_cmd().arg("build").output().unwrap();

  assert!(!output.status.success());
  let stderr = String::from_utf8_lossy(&output.stderr);
  assert!(stderr.contains("acl"), "unexpected error: {}", stderr);
  assert!(stderr.contains("no mirror"), "unexpected error: {}", stderr);
  assert_eq!(fs::read_link(env.workdir().join("build")).unwrap(), PathBuf::from("build.0"));
  assert!(env.workdir().join("build.0/acl-0-r1").is_dir());
}

#[test]
fn test_build_refuses_locked_workdir() {
  let env = TestEnv::empty();
  env.write_snapshot(TWO_COMPONENTS);
  let snapshot = env.workdir().join("snapshot.json");
  let _held = WorkdirLock::exclusive(&env.workdir(), "build", Some(&snapshot)).unwrap();

  let output = env.distbuild_cmd().arg("build").output().unwrap();

  assert!(!output.status.success());
  let stderr = String::from_utf8_lossy(&output.stderr);
  assert!(stderr.contains("is busy"), "unexpected error: {}", stderr);
  assert!(stderr.contains(&snapshot.display().to_string()), "unexpected error: {}", stderr);
  assert!(!env.workdir().join("build").exists());
}

#[test]
fn test_build_recovers_from_interrupted_run() {
  let env = TestEnv::empty();
  env.write_snapshot(TWO_COMPONENTS);
  env.publish_previous_build(TWO_COMPONENTS);
  fs::create_dir_all(env.workdir().join("build.1/rpms")).unwrap();
  fs::write(env.workdir().join("build.1/partial"), "x").unwrap();

  let output = env.distbuild_cmd().arg("build").output().unwrap();

  assert!(output.status.success());
  assert!(!env.workdir().join("build.1").exists());
  assert_eq!(fs::read_link(env.workdir().join("build")).unwrap(), PathBuf::from("build.0"));
}
