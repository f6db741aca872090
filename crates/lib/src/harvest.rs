//! Collecting batch compiler results into the published tree.
//!
//! After compilation the staging generation looks like:
//!
//! ```text
//! build.N/
//! ├── rpms/                      # flat package directory, indexed
//! ├── <pkg>-<v>-<r>/             # one result directory per component
//! │   ├── *.rpm
//! │   ├── status.json
//! │   └── *.log
//! ├── repodata/
//! └── packages -> rpms
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

use thiserror::Error;
use tracing::{debug, info};

use crate::cache::BuildCache;
use crate::consts::{PACKAGES_LINK, RPM_SUFFIX, RPMS_DIRNAME, SRPM_SUFFIX, STATUS_MARKER, TEMP_SRPM_SUFFIX};
use crate::exec::{ExecError, run_sync};
use crate::util::fs::{FsError, create_dir, hardlink_or_copy, move_file, symlink};

/// Builds a package repository index.
pub trait RepoIndexer {
  /// Index the packages in `rpm_dir`, writing metadata under `build_dir`.
  fn index(&self, build_dir: &Path, rpm_dir: &Path) -> Result<(), ExecError>;
}

/// `createrepo_c -o . <rpm_dir>` run from the build directory.
#[derive(Debug, Clone, Copy, Default)]
pub struct CreateRepo;

impl CreateRepo {
  fn command(build_dir: &Path, rpm_dir: &Path) -> Command {
    let mut cmd = Command::new("createrepo_c");
    cmd.arg("-o").arg(".").arg(rpm_dir).current_dir(build_dir);
    cmd
  }
}

impl RepoIndexer for CreateRepo {
  fn index(&self, build_dir: &Path, rpm_dir: &Path) -> Result<(), ExecError> {
    run_sync(&mut Self::command(build_dir, rpm_dir))
  }
}

#[derive(Debug, Error)]
pub enum HarvestError {
  #[error("no build results for '{pkgname}' in {dir}")]
  MissingResult { pkgname: String, dir: PathBuf },

  #[error("more than one source package built for '{pkgname}': {names:?}")]
  MultipleSourcePackages { pkgname: String, names: Vec<String> },

  #[error("I/O error at {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error(transparent)]
  Fs(#[from] FsError),

  #[error(transparent)]
  Exec(#[from] ExecError),
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> HarvestError + '_ {
  move |source| HarvestError::Io {
    path: path.to_path_buf(),
    source,
  }
}

/// File names in `dir`, sorted.
fn sorted_names(dir: &Path) -> Result<Vec<String>, HarvestError> {
  let mut names = Vec::new();
  for entry in fs::read_dir(dir).map_err(io_error(dir))? {
    let entry = entry.map_err(io_error(dir))?;
    names.push(entry.file_name().to_string_lossy().to_string());
  }
  names.sort();
  Ok(names)
}

/// Move build logs out of every result directory holding a status marker.
///
/// Each `<build_dir>/<result>/*.{json,log}` goes to `<logdir>/<result>/`.
/// Returns the number of result directories processed.
pub fn move_logs(build_dir: &Path, logdir: &Path) -> Result<usize, HarvestError> {
  let mut moved = 0;
  for dirname in sorted_names(build_dir)? {
    let result_dir = build_dir.join(&dirname);
    if !result_dir.join(STATUS_MARKER).is_file() {
      continue;
    }

    let dest = logdir.join(&dirname);
    create_dir(&dest)?;
    for name in sorted_names(&result_dir)? {
      if name.ends_with(".json") || name.ends_with(".log") {
        move_file(&result_dir.join(&name), &dest.join(&name))?;
      }
    }
    debug!(result = %dirname, dest = %dest.display(), "moved build logs");
    moved += 1;
  }
  Ok(moved)
}

/// Link every component's packages into `rpm_dir`.
///
/// Walks all cache entries in `pkgname` order, so reused components stay in
/// the repository alongside rebuilt ones. Placeholder source packages handed
/// to the compiler are deleted along the way. Returns the linked file names.
pub fn harvest(build_dir: &Path, rpm_dir: &Path, cache: &BuildCache) -> Result<Vec<String>, HarvestError> {
  let mut linked = Vec::new();

  for (pkgname, entry) in cache.entries() {
    let result_dir = build_dir.join(&entry.dirname);
    if !result_dir.is_dir() {
      return Err(HarvestError::MissingResult {
        pkgname: pkgname.clone(),
        dir: result_dir,
      });
    }

    let mut srpms = Vec::new();
    for name in sorted_names(&result_dir)? {
      let path = result_dir.join(&name);
      if name.ends_with(TEMP_SRPM_SUFFIX) {
        fs::remove_file(&path).map_err(io_error(&path))?;
        continue;
      }
      if !name.ends_with(RPM_SUFFIX) {
        continue;
      }
      if name.ends_with(SRPM_SUFFIX) {
        srpms.push(name.clone());
        if srpms.len() > 1 {
          return Err(HarvestError::MultipleSourcePackages {
            pkgname: pkgname.clone(),
            names: srpms,
          });
        }
      }
      hardlink_or_copy(&path, &rpm_dir.join(&name))?;
      linked.push(name);
    }
  }

  remove_placeholders(rpm_dir)?;
  info!(packages = linked.len(), "harvested packages");
  Ok(linked)
}

/// Delete compiler input placeholders from the flat package directory.
fn remove_placeholders(rpm_dir: &Path) -> Result<(), HarvestError> {
  for name in sorted_names(rpm_dir)? {
    if name.ends_with(TEMP_SRPM_SUFFIX) {
      let path = rpm_dir.join(&name);
      fs::remove_file(&path).map_err(io_error(&path))?;
    }
  }
  Ok(())
}

/// Index `rpm_dir` and add the `packages -> rpms` link.
pub fn publish_index(build_dir: &Path, rpm_dir: &Path, indexer: &dyn RepoIndexer) -> Result<(), HarvestError> {
  indexer.index(build_dir, rpm_dir)?;

  let link = build_dir.join(PACKAGES_LINK);
  symlink(Path::new(RPMS_DIRNAME), &link).map_err(io_error(&link))?;
  debug!(build_dir = %build_dir.display(), "indexed repository");
  Ok(())
}
