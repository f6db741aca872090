//! Crash-safe publication of the output tree.
//!
//! The published path is a symlink to one generation directory:
//!
//! ```text
//! build -> build.3      # current generation
//! build.3/
//! build.4/              # staging, only while a run is in progress
//! ```
//!
//! A run stages a new generation next to the current one and either swaps the
//! symlink over to it with a single `rename(2)` (commit) or deletes it
//! (abandon). The current generation is never modified in place, so a crash
//! at any point leaves exactly one valid current tree.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::util::fs::{remove_all, symlink};

/// Generation identifier; the next generation is always `current + 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Generation(pub u64);

impl Generation {
  pub fn next(self) -> Self {
    Generation(self.0 + 1)
  }
}

impl fmt::Display for Generation {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapState {
  Idle,
  Staging(Generation),
  Committed(Generation),
  Abandoned,
}

impl fmt::Display for SwapState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      SwapState::Idle => write!(f, "idle"),
      SwapState::Staging(generation) => write!(f, "staging generation {}", generation),
      SwapState::Committed(generation) => write!(f, "committed generation {}", generation),
      SwapState::Abandoned => write!(f, "abandoned"),
    }
  }
}

#[derive(Debug, Error)]
pub enum SwapError {
  #[error("cannot {operation} while {state}")]
  InvalidState { operation: &'static str, state: SwapState },

  #[error("{0} must be a symlink to a generation directory")]
  NotASymlink(PathBuf),

  #[error("invalid swapped directory path: {0}")]
  InvalidPath(PathBuf),

  #[error("{context}: {source}")]
  Io {
    context: String,
    #[source]
    source: io::Error,
  },
}

impl SwapError {
  fn io(context: impl Into<String>, source: io::Error) -> Self {
    Self::Io {
      context: context.into(),
      source,
    }
  }
}

/// A directory published through an atomically swapped symlink.
///
/// Only one staging generation may exist at a time; concurrent users of the
/// same path must serialize externally.
#[derive(Debug)]
pub struct SwappedDirectory {
  path: PathBuf,
  parent: PathBuf,
  name: String,
  state: SwapState,
}

impl SwappedDirectory {
  pub fn new(path: PathBuf) -> Result<Self, SwapError> {
    let name = path
      .file_name()
      .and_then(|n| n.to_str())
      .map(str::to_string)
      .ok_or_else(|| SwapError::InvalidPath(path.clone()))?;
    let parent = path
      .parent()
      .map(Path::to_path_buf)
      .ok_or_else(|| SwapError::InvalidPath(path.clone()))?;

    Ok(Self {
      path,
      parent,
      name,
      state: SwapState::Idle,
    })
  }

  /// The stable published path (the symlink).
  pub fn path(&self) -> &Path {
    &self.path
  }

  pub fn state(&self) -> SwapState {
    self.state
  }

  /// Directory of a given generation.
  pub fn generation_path(&self, generation: Generation) -> PathBuf {
    self.parent.join(format!("{}.{}", self.name, generation))
  }

  /// Generation the published symlink points at, if any.
  pub fn current_generation(&self) -> Result<Option<Generation>, SwapError> {
    let meta = match fs::symlink_metadata(&self.path) {
      Ok(meta) => meta,
      Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
      Err(e) => return Err(SwapError::io(format!("failed to stat {}", self.path.display()), e)),
    };
    if !meta.file_type().is_symlink() {
      return Err(SwapError::NotASymlink(self.path.clone()));
    }

    let target = fs::read_link(&self.path)
      .map_err(|e| SwapError::io(format!("failed to read link {}", self.path.display()), e))?;
    let generation = target
      .file_name()
      .and_then(|n| n.to_str())
      .and_then(|n| self.parse_generation(n))
      .ok_or_else(|| SwapError::NotASymlink(self.path.clone()))?;
    Ok(Some(generation))
  }

  /// Directory of the current generation, if one has been committed.
  pub fn current_path(&self) -> Result<Option<PathBuf>, SwapError> {
    Ok(self.current_generation()?.map(|g| self.generation_path(g)))
  }

  /// Create a new, empty staging generation and return its path.
  ///
  /// Leftovers of interrupted runs (generation directories other than the
  /// current one) are removed first.
  pub fn prepare(&mut self) -> Result<PathBuf, SwapError> {
    if self.state != SwapState::Idle {
      return Err(SwapError::InvalidState {
        operation: "prepare",
        state: self.state,
      });
    }

    let current = self.current_generation()?;
    self.remove_stale(current)?;

    let staging = current.map(Generation::next).unwrap_or(Generation(0));
    let staging_path = self.generation_path(staging);
    fs::create_dir_all(&staging_path)
      .map_err(|e| SwapError::io(format!("failed to create {}", staging_path.display()), e))?;

    info!(path = %staging_path.display(), generation = staging.0, "prepared staging generation");
    self.state = SwapState::Staging(staging);
    Ok(staging_path)
  }

  /// Publish the staging generation and drop the previous one.
  pub fn commit(&mut self) -> Result<Generation, SwapError> {
    let SwapState::Staging(staging) = self.state else {
      return Err(SwapError::InvalidState {
        operation: "commit",
        state: self.state,
      });
    };
    let previous = self.current_generation()?;

    let swap_link = self.swap_link_path();
    remove_all(&swap_link).map_err(|e| SwapError::io(format!("failed to remove {}", swap_link.display()), e))?;
    let target = PathBuf::from(format!("{}.{}", self.name, staging));
    symlink(&target, &swap_link)
      .map_err(|e| SwapError::io(format!("failed to create link {}", swap_link.display()), e))?;
    fs::rename(&swap_link, &self.path)
      .map_err(|e| SwapError::io(format!("failed to publish {}", self.path.display()), e))?;
    self.state = SwapState::Committed(staging);
    info!(path = %self.path.display(), generation = staging.0, "committed generation");

    if let Some(previous) = previous {
      let previous_path = self.generation_path(previous);
      if let Err(e) = fs::remove_dir_all(&previous_path) {
        warn!(path = %previous_path.display(), error = %e, "failed to remove previous generation");
      }
    }
    Ok(staging)
  }

  /// Discard the staging generation, leaving the current one untouched.
  pub fn abandon(&mut self) -> Result<(), SwapError> {
    let SwapState::Staging(staging) = self.state else {
      return Err(SwapError::InvalidState {
        operation: "abandon",
        state: self.state,
      });
    };

    let staging_path = self.generation_path(staging);
    fs::remove_dir_all(&staging_path)
      .map_err(|e| SwapError::io(format!("failed to remove {}", staging_path.display()), e))?;
    debug!(path = %staging_path.display(), "abandoned staging generation");
    self.state = SwapState::Abandoned;
    Ok(())
  }

  fn swap_link_path(&self) -> PathBuf {
    self.parent.join(format!(".{}.swap", self.name))
  }

  fn parse_generation(&self, file_name: &str) -> Option<Generation> {
    let digits = file_name.strip_prefix(self.name.as_str())?.strip_prefix('.')?;
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
      return None;
    }
    digits.parse().ok().map(Generation)
  }

  fn remove_stale(&self, current: Option<Generation>) -> Result<(), SwapError> {
    let entries = match fs::read_dir(&self.parent) {
      Ok(entries) => entries,
      Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
      Err(e) => return Err(SwapError::io(format!("failed to read {}", self.parent.display()), e)),
    };

    for entry in entries {
      let entry = entry.map_err(|e| SwapError::io(format!("failed to read {}", self.parent.display()), e))?;
      let file_name = entry.file_name();
      let Some(generation) = file_name.to_str().and_then(|n| self.parse_generation(n)) else {
        continue;
      };
      if Some(generation) == current {
        continue;
      }
      warn!(path = %entry.path().display(), "removing leftover generation from an interrupted run");
      remove_all(&entry.path()).map_err(|e| SwapError::io(format!("failed to remove {}", entry.path().display()), e))?;
    }

    let swap_link = self.swap_link_path();
    remove_all(&swap_link).map_err(|e| SwapError::io(format!("failed to remove {}", swap_link.display()), e))
  }
}
