//! Work directory layout.
//!
//! ```text
//! <workdir>/
//! ├── snapshot.json        # resolved components (input)
//! ├── src/                 # version-control mirrors
//! ├── build -> build.<N>   # current published generation
//! └── .distbuild.lock
//! ```

use std::path::{Path, PathBuf};

use crate::consts::{BUILD_DIRNAME, BUILD_STATE_FILENAME, LOCK_FILENAME, MIRROR_DIRNAME, SNAPSHOT_FILENAME};

pub fn snapshot_path(workdir: &Path) -> PathBuf {
  workdir.join(SNAPSHOT_FILENAME)
}

pub fn mirror_dir(workdir: &Path) -> PathBuf {
  workdir.join(MIRROR_DIRNAME)
}

pub fn build_dir(workdir: &Path) -> PathBuf {
  workdir.join(BUILD_DIRNAME)
}

pub fn lock_path(workdir: &Path) -> PathBuf {
  workdir.join(LOCK_FILENAME)
}

/// Cache file of the generation rooted at `generation_dir`.
pub fn build_state_path(generation_dir: &Path) -> PathBuf {
  generation_dir.join(BUILD_STATE_FILENAME)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn layout_is_relative_to_workdir() {
    let workdir = Path::new("/srv/overlay");
    assert_eq!(snapshot_path(workdir), PathBuf::from("/srv/overlay/snapshot.json"));
    assert_eq!(mirror_dir(workdir), PathBuf::from("/srv/overlay/src"));
    assert_eq!(build_dir(workdir), PathBuf::from("/srv/overlay/build"));
    assert_eq!(lock_path(workdir), PathBuf::from("/srv/overlay/.distbuild.lock"));
  }
}
