//! Build command implementation.

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use tracing::debug;

use distbuild_lib::compile::MockChain;
use distbuild_lib::harvest::CreateRepo;
use distbuild_lib::mirror::GitMirror;
use distbuild_lib::orchestrate::{BuildOptions, Toolchain, build};
use distbuild_lib::paths::{mirror_dir, snapshot_path};
use distbuild_lib::snapshot::load_snapshot;
use distbuild_lib::srpm::RpmBuild;
use distbuild_lib::workdir_lock::WorkdirLock;

use crate::output::print_report;

pub struct BuildArgs {
  pub tempdir: Option<PathBuf>,
  pub touch_if_changed: Option<PathBuf>,
  pub logdir: Option<PathBuf>,
  pub preserve_temp: bool,
}

pub fn cmd_build(workdir: &Path, args: BuildArgs) -> Result<()> {
  let start = Instant::now();

  let snapshot_file = snapshot_path(workdir);
  let _lock = WorkdirLock::exclusive(workdir, "build", Some(&snapshot_file))
    .context("Failed to acquire work directory lock")?;

  let snapshot =
    load_snapshot(&snapshot_file).with_context(|| format!("Failed to load snapshot {}", snapshot_file.display()))?;
  debug!(
    path = %snapshot_file.display(),
    components = snapshot.components.len(),
    "loaded snapshot"
  );

  let mut options = BuildOptions::new(workdir.to_path_buf());
  options.tempdir = args.tempdir;
  options.touch_if_changed = args.touch_if_changed;
  options.logdir = args.logdir;
  options.preserve_temp |= args.preserve_temp;

  let mirror = GitMirror::new(mirror_dir(workdir));
  let toolchain = Toolchain {
    mirror: &mirror,
    packager: &RpmBuild,
    compiler: &MockChain,
    indexer: &CreateRepo,
  };

  let report = build(&snapshot, &options, toolchain).context("Build failed")?;

  print_report(&report, start.elapsed());

  Ok(())
}
