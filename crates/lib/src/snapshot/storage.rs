//! Snapshot loading and validation.
//!
//! The document is checked as raw JSON first so that a missing key or an
//! unknown patch policy is reported by name, then decoded into [`Snapshot`].

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::Path;

use serde_json::{Map, Value};
use tracing::debug;

use super::types::{PatchPolicy, Snapshot, SnapshotError};

/// Read and validate a snapshot file.
pub fn load_snapshot(path: &Path) -> Result<Snapshot, SnapshotError> {
  let content = fs::read_to_string(path).map_err(|e| {
    if e.kind() == io::ErrorKind::NotFound {
      SnapshotError::NotFound(path.to_path_buf())
    } else {
      SnapshotError::Read(e)
    }
  })?;

  let snapshot = parse_snapshot(&content)?;
  debug!(path = %path.display(), components = snapshot.components.len(), "loaded snapshot");
  Ok(snapshot)
}

/// Parse and validate snapshot JSON.
pub fn parse_snapshot(content: &str) -> Result<Snapshot, SnapshotError> {
  let value: Value = serde_json::from_str(content).map_err(SnapshotError::Parse)?;
  validate(&value)?;
  serde_json::from_value(value).map_err(SnapshotError::Parse)
}

fn validate(value: &Value) -> Result<(), SnapshotError> {
  let top = as_object(value, "snapshot", "snapshot")?;

  let root = as_object(require_key(top, "snapshot", "root")?, "snapshot", "root")?;
  require_string(root, "root", "mock")?;

  let components = require_key(top, "snapshot", "components")?
    .as_array()
    .ok_or_else(|| invalid("snapshot", "components", "an array"))?;

  let mut pkgnames = BTreeSet::new();
  for (idx, component) in components.iter().enumerate() {
    let position = format!("components[{}]", idx);
    let obj = as_object(component, "snapshot", &position)?;
    let context = match obj.get("name").and_then(Value::as_str) {
      Some(name) => format!("component '{}'", name),
      None => position,
    };

    let name = require_string(obj, &context, "name")?;
    let pkgname = require_string(obj, &context, "pkgname")?;
    require_string(obj, &context, "src")?;
    require_string(obj, &context, "revision")?;

    if !pkgnames.insert(pkgname.to_string()) {
      return Err(SnapshotError::DuplicatePkgname(pkgname.to_string()));
    }

    match obj.get("distgit") {
      None | Some(Value::Null) => {}
      Some(distgit) => validate_distgit(name, distgit, &context)?,
    }
  }

  Ok(())
}

fn validate_distgit(component: &str, value: &Value, context: &str) -> Result<(), SnapshotError> {
  let context = format!("{} distgit", context);
  let distgit = as_object(value, &context, "distgit")?;
  require_string(distgit, &context, "name")?;
  require_string(distgit, &context, "src")?;
  require_string(distgit, &context, "revision")?;

  match distgit.get("patches") {
    None | Some(Value::Null) => {}
    Some(Value::String(action)) if PatchPolicy::parse(action).is_some() => {}
    Some(other) => {
      let value = other.as_str().map(str::to_string).unwrap_or_else(|| other.to_string());
      return Err(SnapshotError::UnknownPatchPolicy {
        component: component.to_string(),
        value,
      });
    }
  }

  match distgit.get("prep-command") {
    None | Some(Value::Null) | Some(Value::String(_)) => Ok(()),
    Some(_) => Err(invalid(&context, "prep-command", "a string")),
  }
}

fn require_key<'a>(obj: &'a Map<String, Value>, context: &str, key: &str) -> Result<&'a Value, SnapshotError> {
  match obj.get(key) {
    Some(Value::Null) | None => Err(SnapshotError::MissingKey {
      context: context.to_string(),
      key: key.to_string(),
    }),
    Some(value) => Ok(value),
  }
}

fn require_string<'a>(obj: &'a Map<String, Value>, context: &str, key: &str) -> Result<&'a str, SnapshotError> {
  require_key(obj, context, key)?
    .as_str()
    .ok_or_else(|| invalid(context, key, "a string"))
}

fn as_object<'a>(value: &'a Value, context: &str, key: &str) -> Result<&'a Map<String, Value>, SnapshotError> {
  value.as_object().ok_or_else(|| invalid(context, key, "an object"))
}

fn invalid(context: &str, key: &str, expected: &'static str) -> SnapshotError {
  SnapshotError::InvalidField {
    context: context.to_string(),
    key: key.to_string(),
    expected,
  }
}
