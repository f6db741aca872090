//! Shared test helpers for CLI integration tests.

use std::path::PathBuf;

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use distbuild_lib::cache::{BuildCache, CacheEntry, component_hash};
use distbuild_lib::snapshot::parse_snapshot;
use tempfile::TempDir;

/// Snapshot with two components and no distgit records.
pub const TWO_COMPONENTS: &str = r#"{
  "root": { "mock": "fedora-rawhide-x86_64" },
  "components": [
    { "name": "demo", "pkgname": "demo", "src": "https://example.com/demo.git", "revision": "r1" },
    { "name": "acl", "pkgname": "acl", "src": "https://example.com/acl.git", "revision": "r1" }
  ]
}"#;

/// Isolated work directory.
pub struct TestEnv {
  pub temp: TempDir,
}

impl TestEnv {
  pub fn empty() -> Self {
    let temp = TempDir::new().unwrap();
    std::fs::create_dir_all(temp.path().join("work")).unwrap();
    Self { temp }
  }

  pub fn workdir(&self) -> PathBuf {
    self.temp.path().join("work")
  }

  pub fn write_snapshot(&self, content: &str) {
    std::fs::write(self.workdir().join("snapshot.json"), content).unwrap();
  }

  /// Publish generation 0 as if a previous build of `snapshot` succeeded.
  ///
  /// Each component gets a result directory `<pkgname>-0-r1` holding one
  /// binary package, and the cache records the component's current hash, so
  /// building the same snapshot again reuses everything.
  pub fn publish_previous_build(&self, snapshot: &str) -> PathBuf {
    let snapshot = parse_snapshot(snapshot).unwrap();
    let generation = self.workdir().join("build.0");
    std::fs::create_dir_all(generation.join("rpms")).unwrap();

    let mut cache = BuildCache::new();
    for component in &snapshot.components {
      let dirname = format!("{}-0-r1", component.pkgname);
      let result_dir = generation.join(&dirname);
      std::fs::create_dir_all(&result_dir).unwrap();
      std::fs::write(result_dir.join(format!("{}.x86_64.rpm", dirname)), "bin").unwrap();
      cache.insert(
        component.pkgname.clone(),
        CacheEntry {
          dirname,
          hashv0: component_hash(component).unwrap(),
        },
      );
    }
    cache.save(&generation.join("buildstate.json")).unwrap();
    std::os::unix::fs::symlink("build.0", self.workdir().join("build")).unwrap();
    generation
  }

  /// Command for the distbuild binary pointed at this work directory.
  pub fn distbuild_cmd(&self) -> Command {
    let mut cmd: Command = cargo_bin_cmd!("distbuild");
    cmd.env_remove("RUST_LOG");
    cmd.env_remove("DISTBUILD_PRESERVE_TEMP");
    cmd.arg("--workdir").arg(self.workdir());
    cmd
  }
}
