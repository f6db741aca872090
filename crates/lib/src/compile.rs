//! Batch compilation of dirty source packages.

use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::info;

use crate::exec::{ExecError, display_command, run_status};

/// Dependency-aware batch build over a set of source packages.
///
/// For every input the compiler leaves a result directory named after the
/// package under `output_dir`, holding the built packages, a `status.json`
/// marker and build logs.
pub trait BatchCompiler {
  /// Build `srpms` against the `profile` build root and return the exit status
  /// of the whole batch.
  fn compile(&self, profile: &str, output_dir: &Path, srpms: &[PathBuf]) -> Result<i32, ExecError>;
}

/// `mockchain --recurse`, so a later package can build against binaries
/// produced earlier in the same batch.
#[derive(Debug, Clone, Copy, Default)]
pub struct MockChain;

impl MockChain {
  fn command(profile: &str, output_dir: &Path, srpms: &[PathBuf]) -> Command {
    let mut cmd = Command::new("mockchain");
    cmd
      .arg("--recurse")
      .arg("-r")
      .arg(profile)
      .arg("-l")
      .arg(output_dir)
      .args(srpms);
    cmd
  }
}

impl BatchCompiler for MockChain {
  fn compile(&self, profile: &str, output_dir: &Path, srpms: &[PathBuf]) -> Result<i32, ExecError> {
    let mut cmd = Self::command(profile, output_dir, srpms);
    info!(cmd = %display_command(&cmd), packages = srpms.len(), "performing mockchain");
    run_status(&mut cmd)
  }
}
