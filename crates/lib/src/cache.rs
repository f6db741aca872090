//! Build cache carried between runs.
//!
//! The cache lives inside each published generation as `buildstate.json`
//! and maps a component's `pkgname` to the content hash of its configuration
//! and the directory holding its built artifacts.
//!
//! # File Format
//!
//! ```json
//! {
//!   "demo": {
//!     "dirname": "demo-1.2-3.gabc123",
//!     "hashv0": "9f86d081884c7d65..."
//!   }
//! }
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::snapshot::Component;
use crate::util::hash::{ContentHash, HashError, Hashable};

impl Hashable for Component {}

/// Content hash of a component's full resolved configuration.
pub fn component_hash(component: &Component) -> Result<ContentHash, HashError> {
  component.compute_hash()
}

/// One component's cached build.
///
/// Fields are declared in key order so the written JSON is sorted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
  /// Source package base name; also the generation subdirectory holding the
  /// component's artifacts.
  pub dirname: String,
  /// Hash of the component record that produced `dirname`.
  pub hashv0: ContentHash,
}

#[derive(Debug, Error)]
pub enum CacheError {
  #[error("failed to serialize build cache: {0}")]
  Serialize(#[source] serde_json::Error),

  #[error("failed to write build cache: {0}")]
  Write(#[source] io::Error),
}

/// Mapping from `pkgname` to its cached build, ordered by key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BuildCache {
  entries: BTreeMap<String, CacheEntry>,
}

impl BuildCache {
  pub fn new() -> Self {
    Self::default()
  }

  /// Load a cache file.
  ///
  /// A missing, unreadable or unparseable file is an empty cache: the worst
  /// outcome is a full rebuild.
  pub fn load(path: &Path) -> Self {
    let content = match fs::read_to_string(path) {
      Ok(content) => content,
      Err(e) if e.kind() == io::ErrorKind::NotFound => {
        debug!(path = %path.display(), "no previous build cache");
        return Self::new();
      }
      Err(e) => {
        warn!(path = %path.display(), error = %e, "failed to read build cache, starting empty");
        return Self::new();
      }
    };

    match serde_json::from_str(&content) {
      Ok(cache) => cache,
      Err(e) => {
        warn!(path = %path.display(), error = %e, "failed to parse build cache, starting empty");
        Self::new()
      }
    }
  }

  /// The entry for `pkgname` if it was built from a configuration with `hash`.
  pub fn lookup(&self, pkgname: &str, hash: &ContentHash) -> Option<&CacheEntry> {
    self.entries.get(pkgname).filter(|entry| entry.hashv0 == *hash)
  }

  pub fn get(&self, pkgname: &str) -> Option<&CacheEntry> {
    self.entries.get(pkgname)
  }

  pub fn insert(&mut self, pkgname: impl Into<String>, entry: CacheEntry) {
    self.entries.insert(pkgname.into(), entry);
  }

  /// Entries sorted by `pkgname`.
  pub fn entries(&self) -> impl Iterator<Item = (&String, &CacheEntry)> {
    self.entries.iter()
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  /// Write the cache with sorted keys.
  ///
  /// Uses atomic write (write to temp, then rename).
  pub fn save(&self, path: &Path) -> Result<(), CacheError> {
    let mut content = serde_json::to_string_pretty(self).map_err(CacheError::Serialize)?;
    content.push('\n');

    let temp_path = path.with_extension("json.tmp");
    fs::write(&temp_path, &content).map_err(CacheError::Write)?;
    fs::rename(&temp_path, path).map_err(CacheError::Write)?;
    Ok(())
  }
}
