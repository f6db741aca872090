//! Package version/release derivation from version-control descriptions.
//!
//! The same derivation feeds both the cached source package name and the
//! `Version`/`Release` tags written into the spec, so a cache hit always
//! corresponds to identical strings.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Package `(version, release)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionTuple {
  pub version: String,
  pub release: String,
}

impl fmt::Display for VersionTuple {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}-{}", self.version, self.release)
  }
}

/// Derive the package version and release.
///
/// Version is the upstream tag (or `"0"`) with a leading `v` and then a
/// leading `<pkgname>-` removed and every `-` turned into `.`. Release is the
/// upstream revision, followed by `.` and the distgit description when one
/// exists.
pub fn derive_version(
  pkgname: &str,
  upstream_tag: Option<&str>,
  upstream_revision: &str,
  distgit_description: Option<&str>,
) -> VersionTuple {
  let pkg_prefix = format!("{}-", pkgname);
  let mut version = upstream_tag.unwrap_or("0");
  for prefix in ["v", pkg_prefix.as_str()] {
    if let Some(rest) = version.strip_prefix(prefix) {
      version = rest;
    }
  }

  let mut release = upstream_revision.to_string();
  if let Some(desc) = distgit_description {
    release.push('.');
    release.push_str(&desc.replace('-', "."));
  }

  VersionTuple {
    version: version.replace('-', "."),
    release,
  }
}

/// `tag-revision`, or the bare revision when untagged.
pub fn describe_string(tag: Option<&str>, revision: &str) -> String {
  match tag {
    Some(tag) => format!("{}-{}", tag, revision),
    None => revision.to_string(),
  }
}
