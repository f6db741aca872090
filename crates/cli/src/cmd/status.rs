//! Status command implementation.
//!
//! Displays the published generation and the components its cache records.

use std::path::Path;

use anyhow::{Context, Result, ensure};

use distbuild_lib::orchestrate::current_state;
use distbuild_lib::workdir_lock::WorkdirLock;

use crate::output::{print_json, print_state};

pub fn cmd_status(workdir: &Path, verbose: bool, json: bool) -> Result<()> {
  ensure!(workdir.is_dir(), "Work directory not found: {}", workdir.display());

  let _lock = WorkdirLock::shared(workdir).context("Failed to acquire work directory lock")?;
  let state = current_state(workdir).context("Failed to read build state")?;

  if json {
    return print_json(&state);
  }
  print_state(&state, verbose);
  Ok(())
}
