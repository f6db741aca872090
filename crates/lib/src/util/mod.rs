//! Shared utilities.
//!
//! Hashing and filesystem helpers used across the crate, plus test doubles
//! for the external tools.

pub mod fs;
pub mod hash;

#[cfg(test)]
pub mod testutil;
