//! distbuild-lib: incremental RPM builds from a resolved snapshot
//!
//! This crate provides the build pipeline behind `distbuild build`:
//! - `snapshot`: the resolved component list a run consumes
//! - `cache`: per-component configuration hashes carried between runs
//! - `srpm`: source package synthesis from upstream and packaging trees
//! - `compile` / `harvest`: batch compilation and repository assembly
//! - `swapdir`: crash-safe publication of output generations
//! - `orchestrate`: the run tying these together

pub mod cache;
pub mod compile;
pub mod consts;
pub mod exec;
pub mod harvest;
pub mod mirror;
pub mod orchestrate;
pub mod paths;
pub mod snapshot;
pub mod specfile;
pub mod srpm;
pub mod swapdir;
pub mod util;
pub mod version;
pub mod workdir_lock;
