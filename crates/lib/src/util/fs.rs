//! Filesystem helpers for populating generations.
//!
//! Everything here prefers hardlinks so unchanged packages share inodes across
//! generations, falling back to copies when linking is not possible (for
//! example across filesystems).

use std::fs;
use std::io;
use std::path::Path;

use thiserror::Error;
use tracing::debug;
use walkdir::WalkDir;

#[derive(Debug, Error)]
pub enum FsError {
  #[error("failed to link {from} to {to}: {source}")]
  Link {
    from: String,
    to: String,
    #[source]
    source: io::Error,
  },

  #[error("failed to walk {path}: {message}")]
  Walk { path: String, message: String },

  #[error("failed to create directory {path}: {source}")]
  CreateDir {
    path: String,
    #[source]
    source: io::Error,
  },

  #[error("failed to move {from} to {to}: {source}")]
  Move {
    from: String,
    to: String,
    #[source]
    source: io::Error,
  },
}

/// Hardlink `src` to `dest`, copying when the link fails for any reason
/// other than an existing destination.
pub fn hardlink_or_copy(src: &Path, dest: &Path) -> Result<(), FsError> {
  let link_err = |source| FsError::Link {
    from: src.display().to_string(),
    to: dest.display().to_string(),
    source,
  };

  match fs::hard_link(src, dest) {
    Ok(()) => Ok(()),
    Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Err(link_err(e)),
    Err(e) => {
      debug!(src = %src.display(), error = %e, "hardlink failed, copying");
      fs::copy(src, dest).map(|_| ()).map_err(link_err)
    }
  }
}

/// Recreate the tree at `src` under `dest` with hardlinked files.
///
/// Directories are created fresh and symlinks are recreated with the same
/// target. `dest` must not exist yet.
pub fn clone_tree(src: &Path, dest: &Path) -> Result<(), FsError> {
  for entry in WalkDir::new(src).sort_by_file_name() {
    let entry = entry.map_err(|e| FsError::Walk {
      path: src.display().to_string(),
      message: e.to_string(),
    })?;
    let rel = entry.path().strip_prefix(src).unwrap_or(entry.path());
    let target = dest.join(rel);
    let file_type = entry.file_type();

    if file_type.is_dir() {
      create_dir(&target)?;
    } else if file_type.is_symlink() {
      let link_target = fs::read_link(entry.path()).map_err(|source| FsError::Link {
        from: entry.path().display().to_string(),
        to: target.display().to_string(),
        source,
      })?;
      symlink(&link_target, &target).map_err(|source| FsError::Link {
        from: link_target.display().to_string(),
        to: target.display().to_string(),
        source,
      })?;
    } else {
      hardlink_or_copy(entry.path(), &target)?;
    }
  }
  Ok(())
}

/// Move a file, copying and deleting when a rename would cross filesystems.
pub fn move_file(src: &Path, dest: &Path) -> Result<(), FsError> {
  let move_err = |source| FsError::Move {
    from: src.display().to_string(),
    to: dest.display().to_string(),
    source,
  };

  match fs::rename(src, dest) {
    Ok(()) => Ok(()),
    Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
      fs::copy(src, dest).map_err(move_err)?;
      fs::remove_file(src).map_err(move_err)
    }
    Err(e) => Err(move_err(e)),
  }
}

pub fn create_dir(path: &Path) -> Result<(), FsError> {
  fs::create_dir_all(path).map_err(|source| FsError::CreateDir {
    path: path.display().to_string(),
    source,
  })
}

/// Remove a file or directory tree, ignoring a missing path.
pub fn remove_all(path: &Path) -> io::Result<()> {
  match fs::symlink_metadata(path) {
    Ok(meta) if meta.is_dir() => fs::remove_dir_all(path),
    Ok(_) => fs::remove_file(path),
    Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
    Err(e) => Err(e),
  }
}

#[cfg(unix)]
pub fn symlink(target: &Path, link: &Path) -> io::Result<()> {
  std::os::unix::fs::symlink(target, link)
}
