use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Immutable input for one build run, as written by the resolution step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
  pub root: Root,
  pub components: Vec<Component>,
  /// Overlay-level keys carried through resolution (aliases, distgit prefix).
  #[serde(flatten)]
  pub extra: BTreeMap<String, Value>,
}

/// Build root selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Root {
  /// Chroot profile handed to the batch compiler.
  pub mock: String,
  #[serde(flatten)]
  pub extra: BTreeMap<String, Value>,
}

/// One buildable unit.
///
/// `src` and `revision` are fully resolved: no aliases and no moving refs.
/// Fields this crate does not interpret are kept in `extra` so they still
/// participate in the component's content hash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Component {
  /// Display name, also the upstream archive prefix.
  pub name: String,
  /// Packaging name; cache key and output file prefix.
  pub pkgname: String,
  pub src: String,
  pub revision: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub tag: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub distgit: Option<Distgit>,
  #[serde(flatten)]
  pub extra: BTreeMap<String, Value>,
}

/// Packaging metadata location for a component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Distgit {
  pub name: String,
  pub src: String,
  pub revision: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub patches: Option<PatchPolicy>,
  /// Shell command run in the packaging checkout before building the source package.
  #[serde(rename = "prep-command", default, skip_serializing_if = "Option::is_none")]
  pub prep_command: Option<String>,
  #[serde(flatten)]
  pub extra: BTreeMap<String, Value>,
}

/// What to do with patches declared by the packaging metadata.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatchPolicy {
  #[default]
  Keep,
  Drop,
}

impl PatchPolicy {
  pub fn parse(value: &str) -> Option<Self> {
    match value {
      "keep" => Some(Self::Keep),
      "drop" => Some(Self::Drop),
      _ => None,
    }
  }
}

impl fmt::Display for PatchPolicy {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Keep => write!(f, "keep"),
      Self::Drop => write!(f, "drop"),
    }
  }
}

impl Component {
  pub fn patch_policy(&self) -> PatchPolicy {
    self.distgit.as_ref().and_then(|d| d.patches).unwrap_or_default()
  }

  pub fn prep_command(&self) -> Option<&str> {
    self.distgit.as_ref().and_then(|d| d.prep_command.as_deref())
  }
}

/// Errors raised while reading or validating a snapshot.
///
/// All of these indicate an invalid input document and abort the run before
/// any subprocess is started.
#[derive(Debug, Error)]
pub enum SnapshotError {
  #[error("snapshot not found: {0}")]
  NotFound(PathBuf),

  #[error("failed to read snapshot: {0}")]
  Read(#[source] io::Error),

  #[error("failed to parse snapshot: {0}")]
  Parse(#[source] serde_json::Error),

  #[error("missing config key '{key}' in {context}")]
  MissingKey { context: String, key: String },

  #[error("invalid value for '{key}' in {context}: expected {expected}")]
  InvalidField {
    context: String,
    key: String,
    expected: &'static str,
  },

  #[error("component '{component}': unknown patches action '{value}'")]
  UnknownPatchPolicy { component: String, value: String },

  #[error("duplicate pkgname '{0}': components must have unique packaging names")]
  DuplicatePkgname(String),
}
