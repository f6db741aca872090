//! Git mirrors read through gix.
//!
//! # Cache Structure
//!
//! Mirrors live at `<workdir>/src/<scheme>/<host>/<path>` (see
//! [`mirror_path`]) and may be bare or have a worktree; only the object
//! database is read.

use std::fs;
use std::path::{Path, PathBuf};

use gix::objs::tree::EntryKind;
use tracing::{debug, warn};

use super::{Description, MirrorError, SourceMirror, mirror_path};

/// Number of hex digits used for revision identifiers.
const SHORT_ID_LEN: usize = 12;

/// Reads local git mirrors.
#[derive(Debug, Clone)]
pub struct GitMirror {
  root: PathBuf,
}

impl GitMirror {
  /// Create a mirror reader rooted at `root` (usually `<workdir>/src`).
  pub fn new(root: PathBuf) -> Self {
    Self { root }
  }

  fn open(&self, uri: &str) -> Result<gix::Repository, MirrorError> {
    let path = mirror_path(&self.root, uri);
    if !path.exists() {
      return Err(MirrorError::MissingMirror {
        uri: uri.to_string(),
        path,
      });
    }

    debug!(uri, path = %path.display(), "opening mirror");
    gix::open(&path).map_err(|e| MirrorError::Open {
      path,
      source: Box::new(e),
    })
  }
}

/// Resolve a revision spec to the commit it names.
fn resolve_commit<'repo>(
  repo: &'repo gix::Repository,
  uri: &str,
  rev: &str,
) -> Result<gix::Commit<'repo>, MirrorError> {
  let not_found = || MirrorError::RevisionNotFound {
    uri: uri.to_string(),
    rev: rev.to_string(),
  };

  let id = repo.rev_parse_single(rev).map_err(|_| not_found())?;
  let object = id.object().map_err(|_| not_found())?;
  object.peel_to_commit().map_err(|_| not_found())
}

impl SourceMirror for GitMirror {
  /// Describe `rev` against all tags.
  ///
  /// With a reachable tag the revision is `<depth>.g<short-id>`, so commits
  /// past the same tag stay distinct and sort by distance; untagged commits
  /// use the bare short id.
  fn describe(&self, uri: &str, rev: &str) -> Result<Description, MirrorError> {
    let repo = self.open(uri)?;
    let commit = resolve_commit(&repo, uri, rev)?;
    let short_id = commit.id.to_hex_with_len(SHORT_ID_LEN).to_string();

    let resolution = commit
      .describe()
      .names(gix::commit::describe::SelectRef::AllTags)
      .try_resolve()
      .map_err(|e| MirrorError::Describe {
        uri: uri.to_string(),
        rev: rev.to_string(),
        source: Box::new(e),
      })?;

    let nearest_tag = resolution.and_then(|r| {
      let depth = r.outcome.depth;
      r.outcome.name.map(|name| (name.to_string(), depth))
    });

    let description = match nearest_tag {
      Some((tag, depth)) => Description {
        tag: Some(tag),
        revision: format!("{}.g{}", depth, short_id),
      },
      None => Description {
        tag: None,
        revision: short_id,
      },
    };

    debug!(uri, rev, tag = ?description.tag, revision = %description.revision, "described revision");
    Ok(description)
  }

  fn checkout(&self, uri: &str, rev: &str, dest: &Path) -> Result<(), MirrorError> {
    let checkout_err = |e: Box<dyn std::error::Error + Send + Sync>| MirrorError::Checkout {
      uri: uri.to_string(),
      rev: rev.to_string(),
      source: e,
    };
    let write_err = |path: &Path, source| MirrorError::Write {
      path: path.to_path_buf(),
      source,
    };

    let repo = self.open(uri)?;
    let commit = resolve_commit(&repo, uri, rev)?;
    let tree = commit.tree().map_err(|e| checkout_err(Box::new(e)))?;

    let mut recorder = gix::traverse::tree::Recorder::default();
    tree
      .traverse()
      .breadthfirst(&mut recorder)
      .map_err(|e| checkout_err(Box::new(e)))?;

    fs::create_dir_all(dest).map_err(|e| write_err(dest, e))?;

    for entry in recorder.records {
      let target = dest.join(entry.filepath.to_string());
      match entry.mode.kind() {
        EntryKind::Tree => {
          fs::create_dir_all(&target).map_err(|e| write_err(&target, e))?;
        }
        EntryKind::Blob | EntryKind::BlobExecutable | EntryKind::Link => {
          if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| write_err(parent, e))?;
          }
          let object = repo.find_object(entry.oid).map_err(|e| checkout_err(Box::new(e)))?;
          write_entry(entry.mode.kind(), &object.data, &target).map_err(|e| write_err(&target, e))?;
        }
        EntryKind::Commit => {
          warn!(uri, path = %entry.filepath, "skipping submodule during checkout");
        }
      }
    }

    debug!(uri, rev, dest = %dest.display(), "checked out tree");
    Ok(())
  }
}

#[cfg(unix)]
fn write_entry(kind: EntryKind, data: &[u8], target: &Path) -> std::io::Result<()> {
  use std::os::unix::fs::PermissionsExt;

  match kind {
    EntryKind::Link => {
      let link_target = PathBuf::from(String::from_utf8_lossy(data).into_owned());
      std::os::unix::fs::symlink(link_target, target)
    }
    EntryKind::BlobExecutable => {
      fs::write(target, data)?;
      fs::set_permissions(target, fs::Permissions::from_mode(0o755))
    }
    _ => fs::write(target, data),
  }
}
