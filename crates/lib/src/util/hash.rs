//! Hashing utilities for the build cache.
//!
//! A component's cache key is the SHA-256 of its canonical JSON form, see
//! [`Hashable`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

pub type HashError = serde_json::Error;

/// A full 64-character SHA-256 hash.
///
/// # Format
///
/// Lowercase hexadecimal, e.g. `"9f86d081884c7d65..."`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentHash(pub String);

impl std::fmt::Display for ContentHash {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.0)
  }
}

/// Content addressing for serializable records.
///
/// The record is serialized to JSON with object keys sorted at every level,
/// so two records with the same fields hash identically regardless of the
/// order they were read or built in.
pub trait Hashable: Serialize {
  fn compute_hash(&self) -> Result<ContentHash, HashError> {
    let canonical = canonical_json(self)?;
    Ok(hash_bytes(canonical.as_bytes()))
  }
}

/// Serialize `value` to compact JSON with lexicographically ordered keys.
pub fn canonical_json<T: Serialize + ?Sized>(value: &T) -> Result<String, HashError> {
  let value = serde_json::to_value(value)?;
  serde_json::to_string(&canonicalize(value))
}

fn canonicalize(value: Value) -> Value {
  match value {
    Value::Object(map) => {
      let mut entries: Vec<(String, Value)> = map.into_iter().collect();
      entries.sort_by(|a, b| a.0.cmp(&b.0));
      let mut sorted = Map::new();
      for (key, value) in entries {
        sorted.insert(key, canonicalize(value));
      }
      Value::Object(sorted)
    }
    Value::Array(items) => Value::Array(items.into_iter().map(canonicalize).collect()),
    other => other,
  }
}

/// Hash arbitrary bytes.
pub fn hash_bytes(data: &[u8]) -> ContentHash {
  let mut hasher = Sha256::new();
  hasher.update(data);
  ContentHash(hex::encode(hasher.finalize()))
}
