//! Resolved component snapshot.
//!
//! The snapshot is produced by the resolution step and read once at the start
//! of a build run.

mod storage;
mod types;

pub use storage::{load_snapshot, parse_snapshot};
pub use types::*;
