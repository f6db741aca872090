//! Work directory locking.
//!
//! `build` holds an exclusive flock on `<workdir>/.distbuild.lock` for the
//! whole run and records itself in the file, so a second build (or a
//! `status` racing a commit) is refused with the name of the snapshot being
//! built. Read-only commands hold a shared lock and record nothing. The
//! record is cleared when the exclusive holder releases the lock.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::paths::lock_path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LockMode {
  Shared,
  Exclusive,
}

/// The running build, as recorded in the lock file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockHolder {
  pub pid: u32,
  pub command: String,
  /// Snapshot the holder is building, when it got that far.
  pub snapshot: Option<PathBuf>,
  pub started_at_unix: u64,
}

impl LockHolder {
  fn current(command: &str, snapshot: Option<&Path>) -> Self {
    Self {
      pid: std::process::id(),
      command: command.to_string(),
      snapshot: snapshot.map(Path::to_path_buf),
      started_at_unix: unix_now(),
    }
  }

  /// One-line description for contention errors.
  fn describe(&self) -> String {
    let age = unix_now().saturating_sub(self.started_at_unix);
    let target = match &self.snapshot {
      Some(snapshot) => format!(" of {}", snapshot.display()),
      None => String::new(),
    };
    format!(
      "`distbuild {}`{} (pid {}) started {}s ago",
      self.command, target, self.pid, age
    )
  }
}

#[derive(Debug, Error)]
pub enum WorkdirLockError {
  /// Another distbuild process holds the lock.
  #[error(
    "work directory {workdir} is busy: {holder}\n\
     If no distbuild process is running, remove {lock_path}"
  )]
  Busy {
    workdir: PathBuf,
    holder: String,
    lock_path: PathBuf,
  },

  #[error("failed to create work directory {path}: {source}")]
  CreateDir {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to open lock file {path}: {source}")]
  Open {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to lock {path}: {source}")]
  Flock {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to record lock holder in {path}: {source}")]
  Record {
    path: PathBuf,
    #[source]
    source: io::Error,
  },
}

/// Held for the lifetime of a command; released on drop.
#[derive(Debug)]
pub struct WorkdirLock {
  file: File,
  lock_path: PathBuf,
  mode: LockMode,
}

impl WorkdirLock {
  /// Lock `workdir` for a run that stages and publishes generations.
  pub fn exclusive(workdir: &Path, command: &str, snapshot: Option<&Path>) -> Result<Self, WorkdirLockError> {
    let lock = Self::acquire(workdir, LockMode::Exclusive)?;
    lock.record(&LockHolder::current(command, snapshot))?;
    Ok(lock)
  }

  /// Lock `workdir` for reading the published generation.
  pub fn shared(workdir: &Path) -> Result<Self, WorkdirLockError> {
    Self::acquire(workdir, LockMode::Shared)
  }

  fn acquire(workdir: &Path, mode: LockMode) -> Result<Self, WorkdirLockError> {
    std::fs::create_dir_all(workdir).map_err(|source| WorkdirLockError::CreateDir {
      path: workdir.to_path_buf(),
      source,
    })?;

    let lock_path = lock_path(workdir);
    let file = OpenOptions::new()
      .read(true)
      .write(true)
      .create(true)
      .truncate(false)
      .open(&lock_path)
      .map_err(|source| WorkdirLockError::Open {
        path: lock_path.clone(),
        source,
      })?;

    if let Err(source) = try_lock(&file, mode) {
      if source.kind() == io::ErrorKind::WouldBlock {
        return Err(WorkdirLockError::Busy {
          workdir: workdir.to_path_buf(),
          holder: describe_holder(&lock_path),
          lock_path,
        });
      }
      return Err(WorkdirLockError::Flock { path: lock_path, source });
    }

    debug!(path = %lock_path.display(), ?mode, "locked work directory");
    Ok(Self { file, lock_path, mode })
  }

  /// The holder recorded in the lock file, if any.
  pub fn holder(&self) -> io::Result<Option<LockHolder>> {
    let mut file = &self.file;
    file.seek(SeekFrom::Start(0))?;
    let mut contents = String::new();
    file.read_to_string(&mut contents)?;
    if contents.trim().is_empty() {
      return Ok(None);
    }
    serde_json::from_str(&contents).map(Some).map_err(io::Error::other)
  }

  pub fn lock_path(&self) -> &Path {
    &self.lock_path
  }

  fn record(&self, holder: &LockHolder) -> Result<(), WorkdirLockError> {
    let err = |source| WorkdirLockError::Record {
      path: self.lock_path.clone(),
      source,
    };
    self.file.set_len(0).map_err(err)?;
    let mut file = &self.file;
    file.seek(SeekFrom::Start(0)).map_err(err)?;
    serde_json::to_writer_pretty(&mut file, holder).map_err(|e| err(io::Error::other(e)))?;
    file.flush().map_err(err)
  }
}

impl Drop for WorkdirLock {
  fn drop(&mut self) {
    if self.mode == LockMode::Exclusive
      && let Err(e) = self.file.set_len(0)
    {
      warn!(path = %self.lock_path.display(), error = %e, "failed to clear lock holder");
    }
  }
}

/// Read whoever holds the lock without taking it.
fn describe_holder(lock_path: &Path) -> String {
  std::fs::read_to_string(lock_path)
    .ok()
    .and_then(|contents| serde_json::from_str::<LockHolder>(&contents).ok())
    .map(|holder| holder.describe())
    .unwrap_or_else(|| "held by a read-only command such as `distbuild status`".to_string())
}

fn unix_now() -> u64 {
  SystemTime::now()
    .duration_since(UNIX_EPOCH)
    .unwrap_or_default()
    .as_secs()
}

#[cfg(unix)]
fn try_lock(file: &File, mode: LockMode) -> io::Result<()> {
  use rustix::fs::{FlockOperation, flock};
  use std::os::unix::io::AsFd;

  let operation = match mode {
    LockMode::Shared => FlockOperation::NonBlockingLockShared,
    LockMode::Exclusive => FlockOperation::NonBlockingLockExclusive,
  };

  flock(file.as_fd(), operation).map_err(|e| io::Error::from_raw_os_error(e.raw_os_error()))
}
