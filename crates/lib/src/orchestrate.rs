//! The incremental build run.
//!
//! One run walks the snapshot in order, reuses every component whose
//! configuration hash matches the previous generation's cache, synthesizes
//! source packages for the rest and hands them to the batch compiler in a
//! single call. Results are harvested into a fresh generation that is only
//! published when something was rebuilt.

use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::cache::{BuildCache, CacheEntry, CacheError, component_hash};
use crate::compile::BatchCompiler;
use crate::consts::{PRESERVE_TEMP_ENV, RPMS_DIRNAME};
use crate::exec::ExecError;
use crate::harvest::{HarvestError, RepoIndexer, harvest, move_logs, publish_index};
use crate::mirror::SourceMirror;
use crate::paths::{build_dir, build_state_path};
use crate::snapshot::{Component, Snapshot};
use crate::srpm::{SourcePackager, SrpmError, Synthesizer};
use crate::swapdir::{Generation, SwapError, SwappedDirectory};
use crate::util::fs::{FsError, clone_tree, create_dir};
use crate::util::hash::HashError;

/// External tools used by a run.
#[derive(Clone, Copy)]
pub struct Toolchain<'a> {
  pub mirror: &'a dyn SourceMirror,
  pub packager: &'a dyn SourcePackager,
  pub compiler: &'a dyn BatchCompiler,
  pub indexer: &'a dyn RepoIndexer,
}

#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
  pub workdir: PathBuf,
  /// Parent of per-component scratch directories.
  pub tempdir: Option<PathBuf>,
  /// Touched only when a new generation is published.
  pub touch_if_changed: Option<PathBuf>,
  /// Destination of per-package build logs.
  pub logdir: Option<PathBuf>,
  pub preserve_temp: bool,
}

impl BuildOptions {
  pub fn new(workdir: PathBuf) -> Self {
    Self {
      workdir,
      preserve_temp: preserve_temp_from_env(),
      ..Self::default()
    }
  }
}

/// Whether `DISTBUILD_PRESERVE_TEMP` is set.
pub fn preserve_temp_from_env() -> bool {
  std::env::var_os(PRESERVE_TEMP_ENV).is_some()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildOutcome {
  /// A new generation was published.
  Changed { generation: Generation, packages: Vec<String> },
  /// Every component was reused; the current generation is untouched.
  Unchanged,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildReport {
  pub outcome: BuildOutcome,
  /// `pkgname`s synthesized and compiled in this run, in snapshot order.
  pub rebuilt: Vec<String>,
  /// `pkgname`s taken from the previous generation.
  pub reused: Vec<String>,
}

impl BuildReport {
  pub fn changed(&self) -> bool {
    matches!(self.outcome, BuildOutcome::Changed { .. })
  }
}

#[derive(Debug, Error)]
pub enum BuildError {
  #[error(transparent)]
  Swap(#[from] SwapError),

  #[error(transparent)]
  Cache(#[from] CacheError),

  #[error("failed to hash component '{component}': {source}")]
  Hash {
    component: String,
    #[source]
    source: HashError,
  },

  #[error("component '{component}': {source}")]
  Synthesis {
    component: String,
    #[source]
    source: SrpmError,
  },

  #[error(transparent)]
  Fs(#[from] FsError),

  #[error(transparent)]
  Exec(#[from] ExecError),

  #[error("mockchain exited with code {0}")]
  CompileFailed(i32),

  #[error(transparent)]
  Harvest(#[from] HarvestError),

  #[error("failed to update timestamp of {path}: {source}")]
  Touch {
    path: PathBuf,
    #[source]
    source: io::Error,
  },
}

/// State of one run, owned by [`build`] until the store is committed or
/// abandoned.
struct RunContext<'a> {
  options: &'a BuildOptions,
  toolchain: Toolchain<'a>,
  /// Previous generation, if one was ever published.
  current_dir: Option<PathBuf>,
  staging_dir: PathBuf,
  rpm_dir: PathBuf,
  old_cache: BuildCache,
  new_cache: BuildCache,
  /// Placeholder source packages for the compiler.
  dirty: Vec<PathBuf>,
  rebuilt: Vec<String>,
  reused: Vec<String>,
}

impl<'a> RunContext<'a> {
  fn open(store: &mut SwappedDirectory, options: &'a BuildOptions, toolchain: Toolchain<'a>) -> Result<Self, BuildError> {
    let current_dir = store.current_path()?;
    let staging_dir = store.prepare()?;
    let rpm_dir = staging_dir.join(RPMS_DIRNAME);
    create_dir(&rpm_dir)?;

    let old_cache = match &current_dir {
      Some(dir) => BuildCache::load(&build_state_path(dir)),
      None => BuildCache::new(),
    };
    debug!(entries = old_cache.len(), "loaded previous build cache");

    Ok(Self {
      options,
      toolchain,
      current_dir,
      staging_dir,
      rpm_dir,
      old_cache,
      new_cache: BuildCache::new(),
      dirty: Vec::new(),
      rebuilt: Vec::new(),
      reused: Vec::new(),
    })
  }

  /// Previous generation's result directory for a cache hit, if it still
  /// exists.
  fn cached_dir(&self, entry: &CacheEntry) -> Option<PathBuf> {
    let dir = self.current_dir.as_ref()?.join(&entry.dirname);
    if dir.is_dir() {
      Some(dir)
    } else {
      warn!(dirname = %entry.dirname, "cached build directory is missing, rebuilding");
      None
    }
  }

  fn process(&mut self, synth: &Synthesizer<'_>, component: &Component) -> Result<(), BuildError> {
    let pkgname = &component.pkgname;
    let hash = component_hash(component).map_err(|source| BuildError::Hash {
      component: component.name.clone(),
      source,
    })?;

    if let Some(entry) = self.old_cache.lookup(pkgname, &hash)
      && let Some(cached) = self.cached_dir(entry)
    {
      info!(pkgname = %pkgname, dirname = %entry.dirname, "reusing cached build");
      clone_tree(&cached, &self.staging_dir.join(&entry.dirname))?;
      self.new_cache.insert(pkgname.clone(), entry.clone());
      self.reused.push(pkgname.clone());
      return Ok(());
    }

    let srpm = synth
      .ensure_srpm(component, &self.rpm_dir)
      .map_err(|source| BuildError::Synthesis {
        component: component.name.clone(),
        source,
      })?;
    self.new_cache.insert(
      pkgname.clone(),
      CacheEntry {
        dirname: srpm.base,
        hashv0: hash,
      },
    );
    self.dirty.push(srpm.path);
    self.rebuilt.push(pkgname.clone());
    Ok(())
  }

  /// Compile, harvest and index the staging generation.
  fn complete(&self, profile: &str) -> Result<Vec<String>, BuildError> {
    let status = self.toolchain.compiler.compile(profile, &self.staging_dir, &self.dirty)?;

    if let Some(logdir) = &self.options.logdir {
      let moved = move_logs(&self.staging_dir, logdir)?;
      debug!(logdir = %logdir.display(), moved, "moved build logs");
    }
    if status != 0 {
      return Err(BuildError::CompileFailed(status));
    }

    let packages = harvest(&self.staging_dir, &self.rpm_dir, &self.new_cache)?;
    publish_index(&self.staging_dir, &self.rpm_dir, self.toolchain.indexer)?;
    self.new_cache.save(&build_state_path(&self.staging_dir))?;
    Ok(packages)
  }
}

/// Run one incremental build of `snapshot`.
///
/// On error nothing is published; the staging generation stays on disk for
/// inspection and is removed by the next run.
pub fn build(snapshot: &Snapshot, options: &BuildOptions, toolchain: Toolchain<'_>) -> Result<BuildReport, BuildError> {
  let mut store = SwappedDirectory::new(build_dir(&options.workdir))?;
  let mut run = RunContext::open(&mut store, options, toolchain)?;

  let synth = Synthesizer::new(toolchain.mirror, toolchain.packager)
    .tempdir(options.tempdir.clone())
    .preserve_temp(options.preserve_temp);

  for component in &snapshot.components {
    run.process(&synth, component)?;
  }

  if run.dirty.is_empty() {
    store.abandon()?;
    info!("no changes");
    return Ok(BuildReport {
      outcome: BuildOutcome::Unchanged,
      rebuilt: run.rebuilt,
      reused: run.reused,
    });
  }

  info!(rebuilt = run.dirty.len(), reused = run.reused.len(), "building changed components");
  let packages = run.complete(&snapshot.root.mock)?;
  let generation = store.commit()?;

  if let Some(sentinel) = &options.touch_if_changed {
    touch(sentinel)?;
    info!(path = %sentinel.display(), "updated timestamp");
  }

  Ok(BuildReport {
    outcome: BuildOutcome::Changed { generation, packages },
    rebuilt: run.rebuilt,
    reused: run.reused,
  })
}

/// Create `path` if needed and set its modification time to now.
fn touch(path: &Path) -> Result<(), BuildError> {
  let touch_err = |source| BuildError::Touch {
    path: path.to_path_buf(),
    source,
  };
  let file = OpenOptions::new().create(true).append(true).open(path).map_err(touch_err)?;
  file.set_modified(SystemTime::now()).map_err(touch_err)
}

/// Published state of a work directory.
#[derive(Debug, Clone, Serialize)]
pub struct BuildState {
  pub generation: Option<u64>,
  pub path: Option<PathBuf>,
  pub components: Vec<ComponentState>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ComponentState {
  pub pkgname: String,
  pub dirname: String,
  pub hashv0: String,
  /// Whether the result directory exists in the current generation.
  pub present: bool,
}

/// Read the current generation and its cache without modifying anything.
pub fn current_state(workdir: &Path) -> Result<BuildState, BuildError> {
  let store = SwappedDirectory::new(build_dir(workdir))?;
  let generation = store.current_generation()?;
  let Some(generation) = generation else {
    return Ok(BuildState {
      generation: None,
      path: None,
      components: Vec::new(),
    });
  };

  let path = store.generation_path(generation);
  let cache = BuildCache::load(&build_state_path(&path));
  let components = cache
    .entries()
    .map(|(pkgname, entry)| ComponentState {
      pkgname: pkgname.clone(),
      dirname: entry.dirname.clone(),
      hashv0: entry.hashv0.0.clone(),
      present: fs::metadata(path.join(&entry.dirname)).is_ok_and(|m| m.is_dir()),
    })
    .collect();

  Ok(BuildState {
    generation: Some(generation.0),
    path: Some(path),
    components,
  })
}
