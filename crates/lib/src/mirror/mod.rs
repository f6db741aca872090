//! Version-control access for resolved components.
//!
//! Mirrors are populated by the resolution step; the build only needs two
//! read operations over them, expressed by [`SourceMirror`]:
//! - `describe`: nearest tag and a revision identifier for a commit
//! - `checkout`: materialize the tree of a commit into a directory

mod git;

pub use git::GitMirror;

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Result of describing a revision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Description {
  /// Nearest reachable tag, if any.
  pub tag: Option<String>,
  /// Revision identifier, stable for a fixed `(uri, revision)`.
  pub revision: String,
}

impl Description {
  /// `tag-revision`, or the bare revision when untagged.
  pub fn to_desc_string(&self) -> String {
    crate::version::describe_string(self.tag.as_deref(), &self.revision)
  }
}

/// Read access to mirrored source repositories.
///
/// Implementations must be deterministic for a fixed `(uri, revision)`.
pub trait SourceMirror {
  fn describe(&self, uri: &str, revision: &str) -> Result<Description, MirrorError>;

  /// Write the tree of `revision` to `dest`, which must not exist yet.
  fn checkout(&self, uri: &str, revision: &str, dest: &Path) -> Result<(), MirrorError>;
}

/// Errors that can occur while reading mirrors.
#[derive(Debug, Error)]
pub enum MirrorError {
  /// No mirror exists for the URI; the resolution step has not run.
  #[error("no mirror for '{uri}' at {path}")]
  MissingMirror { uri: String, path: PathBuf },

  /// Failed to open the mirror repository.
  #[error("failed to open repository at '{path}': {source}")]
  Open {
    path: PathBuf,
    #[source]
    source: Box<dyn std::error::Error + Send + Sync>,
  },

  /// The revision does not resolve to a single commit.
  #[error("revision '{rev}' not found in {uri}")]
  RevisionNotFound { uri: String, rev: String },

  #[error("failed to describe '{rev}' in {uri}: {source}")]
  Describe {
    uri: String,
    rev: String,
    #[source]
    source: Box<dyn std::error::Error + Send + Sync>,
  },

  #[error("failed to check out '{rev}' from {uri}: {source}")]
  Checkout {
    uri: String,
    rev: String,
    #[source]
    source: Box<dyn std::error::Error + Send + Sync>,
  },

  #[error("failed to write {path}: {source}")]
  Write {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
}

/// Location of the mirror for `uri` below `mirror_root`.
///
/// `scheme://host/path` maps to `<root>/<scheme>/<host>/<path>`; scp-style
/// `host:path` maps to `<root>/<host>/<path>`. A trailing `/` is ignored.
pub fn mirror_path(mirror_root: &Path, uri: &str) -> PathBuf {
  let trimmed = uri.trim_end_matches('/');
  let relative = match trimmed.split_once("://") {
    Some((scheme, rest)) => format!("{}/{}", scheme, rest.trim_start_matches('/')),
    None => trimmed.replacen(':', "/", 1),
  };

  let mut path = mirror_root.to_path_buf();
  for segment in relative.split('/').filter(|s| !s.is_empty() && *s != "." && *s != "..") {
    path.push(segment);
  }
  path
}
