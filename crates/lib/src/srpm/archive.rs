//! Source tarball creation.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use flate2::Compression;
use flate2::write::GzEncoder;
use tar::{EntryType, Header};
use thiserror::Error;
use tracing::debug;
use walkdir::WalkDir;

/// Entry names skipped anywhere in the tree (GNU tar `--exclude-vcs`).
const VCS_NAMES: &[&str] = &[
  "CVS",
  ".cvsignore",
  "RCS",
  "SCCS",
  ".svn",
  ".git",
  ".gitignore",
  ".gitattributes",
  ".gitmodules",
  ".arch-ids",
  "{arch}",
  "=RELEASE-ID",
  "=meta-update",
  "=update",
  ".bzr",
  ".bzrignore",
  ".bzrtags",
  ".hg",
  ".hgignore",
  ".hgtags",
  "_darcs",
];

#[derive(Debug, Error)]
pub enum ArchiveError {
  #[error("failed to walk {path}: {message}")]
  Walk { path: PathBuf, message: String },

  #[error("failed to archive {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: io::Error,
  },
}

fn is_vcs_entry(name: &str) -> bool {
  VCS_NAMES.contains(&name)
}

/// Write `src_dir` as a gzip tarball to `output`, with every entry placed
/// under `prefix/` instead of the directory's own name.
///
/// Entries are added in file-name order with zeroed ownership and timestamps,
/// so the same tree always yields the same archive.
pub fn create_tarball(src_dir: &Path, prefix: &str, output: &Path) -> Result<(), ArchiveError> {
  let io_err = |path: &Path| {
    let path = path.to_path_buf();
    move |source| ArchiveError::Io { path, source }
  };

  let file = File::create(output).map_err(io_err(output))?;
  let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));
  builder.follow_symlinks(false);

  let prefix = Path::new(prefix);
  append_dir(&mut builder, prefix).map_err(io_err(src_dir))?;

  let walker = WalkDir::new(src_dir)
    .min_depth(1)
    .sort_by_file_name()
    .into_iter()
    .filter_entry(|e| !e.file_name().to_str().is_some_and(is_vcs_entry));

  for entry in walker {
    let entry = entry.map_err(|e| ArchiveError::Walk {
      path: src_dir.to_path_buf(),
      message: e.to_string(),
    })?;
    let path = entry.path();
    let rel = path.strip_prefix(src_dir).unwrap_or(path);
    let name = prefix.join(rel);
    let meta = fs::symlink_metadata(path).map_err(io_err(path))?;

    if meta.is_dir() {
      append_dir(&mut builder, &name).map_err(io_err(path))?;
    } else if meta.file_type().is_symlink() {
      let target = fs::read_link(path).map_err(io_err(path))?;
      let mut header = new_header(EntryType::Symlink, 0o777, 0);
      builder
        .append_link(&mut header, &name, &target)
        .map_err(io_err(path))?;
    } else if meta.is_file() {
      let mut header = new_header(EntryType::Regular, file_mode(&meta), meta.len());
      let reader = File::open(path).map_err(io_err(path))?;
      builder.append_data(&mut header, &name, reader).map_err(io_err(path))?;
    } else {
      debug!(path = %path.display(), "skipping special file in archive");
    }
  }

  let encoder = builder.into_inner().map_err(io_err(output))?;
  let mut file = encoder.finish().map_err(io_err(output))?;
  file.flush().map_err(io_err(output))?;

  debug!(src = %src_dir.display(), output = %output.display(), "created tarball");
  Ok(())
}

fn new_header(kind: EntryType, mode: u32, size: u64) -> Header {
  let mut header = Header::new_gnu();
  header.set_entry_type(kind);
  header.set_mode(mode);
  header.set_size(size);
  header.set_mtime(0);
  header.set_uid(0);
  header.set_gid(0);
  header
}

fn append_dir<W: Write>(builder: &mut tar::Builder<W>, name: &Path) -> io::Result<()> {
  let mut header = new_header(EntryType::Directory, 0o755, 0);
  builder.append_data(&mut header, name, io::empty())
}

#[cfg(unix)]
fn file_mode(meta: &fs::Metadata) -> u32 {
  use std::os::unix::fs::PermissionsExt;

  if meta.permissions().mode() & 0o111 != 0 { 0o755 } else { 0o644 }
}
