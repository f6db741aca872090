//! Source package synthesis.
//!
//! Turns a component's upstream tree and packaging metadata into a single
//! `.src.rpm` placed in the run's flat package directory, where it serves as
//! input to the batch compiler.
//!
//! # Temporary Layout
//!
//! ```text
//! <tempdir>/distbuild-srpmsXXXX/
//! ├── <name>/                        # upstream checkout
//! └── distgit-<distgit name>/        # packaging checkout (or the tempdir
//!     ├── <pkg>.spec                 #   itself when the spec ships upstream)
//!     ├── <name>-<desc>.tar.gz
//!     └── <pkg>-<v>-<r>.src.rpm
//! ```

mod archive;

pub use archive::{ArchiveError, create_tarball};

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::consts::{DIST_TAG, SPEC_DISCLAIMER, SRPM_SUFFIX, TEMP_SRPM_SUFFIX};
use crate::exec::{ExecError, run_shell, run_sync};
use crate::mirror::{Description, MirrorError, SourceMirror};
use crate::snapshot::{Component, PatchPolicy};
use crate::specfile::{SpecError, SpecFile, find_spec};
use crate::util::fs::{FsError, hardlink_or_copy};
use crate::version::{VersionTuple, derive_version};

const TEMPDIR_PREFIX: &str = "distbuild-srpms";

/// rpmbuild macros redirected into the packaging directory.
const RPMBUILD_DIRS: &[&str] = &["_sourcedir", "_specdir", "_builddir", "_srcrpmdir", "_rpmdir"];

/// Builds a source package from a prepared packaging directory.
pub trait SourcePackager {
  /// Build `spec_name` in `dir`, leaving the `.src.rpm` in `dir`.
  fn build_source_package(&self, dir: &Path, spec_name: &str) -> Result<(), ExecError>;
}

/// `rpmbuild -bs` with every working directory pointed at the packaging
/// directory, so nothing touches `~/rpmbuild`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RpmBuild;

impl SourcePackager for RpmBuild {
  fn build_source_package(&self, dir: &Path, spec_name: &str) -> Result<(), ExecError> {
    let mut cmd = Command::new("rpmbuild");
    for name in RPMBUILD_DIRS {
      cmd.arg("--define").arg(format!("%{} {}", name, dir.display()));
    }
    cmd.arg("-bs").arg(spec_name).current_dir(dir);
    run_sync(&mut cmd)
  }
}

#[derive(Debug, Error)]
pub enum SrpmError {
  #[error(transparent)]
  Mirror(#[from] MirrorError),

  #[error(transparent)]
  Spec(#[from] SpecError),

  #[error(transparent)]
  Archive(#[from] ArchiveError),

  #[error(transparent)]
  Exec(#[from] ExecError),

  #[error(transparent)]
  Fs(#[from] FsError),

  #[error("component '{component}' has no distgit and ships no {spec}")]
  MissingSpec { component: String, spec: String },

  #[error("no .src.rpm found in {0}")]
  NoSourcePackage(PathBuf),

  #[error("multiple .src.rpm found in {dir}: {names:?}")]
  MultipleSourcePackages { dir: PathBuf, names: Vec<String> },

  #[error("failed to create temporary directory: {0}")]
  TempDir(#[source] io::Error),

  #[error("I/O error at {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: io::Error,
  },
}

/// A synthesized source package in the flat package directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourcePackage {
  /// `<pkgname>-<version>-<release>`; names the compiler's result directory.
  pub base: String,
  pub version: VersionTuple,
  /// Full path of the `.temp.src.rpm` placeholder.
  pub path: PathBuf,
}

/// Synthesizes source packages for components missing from the cache.
pub struct Synthesizer<'a> {
  mirror: &'a dyn SourceMirror,
  packager: &'a dyn SourcePackager,
  tempdir: Option<PathBuf>,
  preserve_temp: bool,
}

impl<'a> Synthesizer<'a> {
  pub fn new(mirror: &'a dyn SourceMirror, packager: &'a dyn SourcePackager) -> Self {
    Self {
      mirror,
      packager,
      tempdir: None,
      preserve_temp: false,
    }
  }

  /// Parent directory for per-component scratch directories (default: the
  /// system temporary directory).
  pub fn tempdir(mut self, tempdir: Option<PathBuf>) -> Self {
    self.tempdir = tempdir;
    self
  }

  /// Keep scratch directories after synthesis for inspection.
  pub fn preserve_temp(mut self, preserve: bool) -> Self {
    self.preserve_temp = preserve;
    self
  }

  /// Produce `<rpm_dir>/<pkgname>-<version>-<release>.temp.src.rpm`.
  pub fn ensure_srpm(&self, component: &Component, rpm_dir: &Path) -> Result<SourcePackage, SrpmError> {
    let upstream = self.mirror.describe(&component.src, &component.revision)?;
    let distgit_desc = match &component.distgit {
      Some(distgit) => Some(self.mirror.describe(&distgit.src, &distgit.revision)?.to_desc_string()),
      None => None,
    };

    let version = derive_version(
      &component.pkgname,
      upstream.tag.as_deref(),
      &upstream.revision,
      distgit_desc.as_deref(),
    );
    let base = format!("{}-{}", component.pkgname, version);
    let target = rpm_dir.join(format!("{}{}", base, TEMP_SRPM_SUFFIX));

    let mut builder = tempfile::Builder::new();
    builder.prefix(TEMPDIR_PREFIX);
    let scratch = match &self.tempdir {
      Some(dir) => builder.tempdir_in(dir),
      None => builder.tempdir(),
    }
    .map_err(SrpmError::TempDir)?;

    let result = self.generate(component, &upstream, &version, scratch.path(), &target);

    if self.preserve_temp {
      let kept = scratch.keep();
      info!(path = %kept.display(), "preserving temporary directory");
    } else if let Err(e) = scratch.close() {
      warn!(error = %e, "failed to remove temporary directory");
    }

    result?;
    info!(pkgname = %component.pkgname, srpm = %target.display(), "synthesized source package");
    Ok(SourcePackage {
      base,
      version,
      path: target,
    })
  }

  fn generate(
    &self,
    component: &Component,
    upstream: &Description,
    version: &VersionTuple,
    scratch: &Path,
    target: &Path,
  ) -> Result<(), SrpmError> {
    let upstream_co = scratch.join(&component.name);
    self.mirror.checkout(&component.src, &component.revision, &upstream_co)?;

    let packaging_dir = match &component.distgit {
      Some(distgit) => {
        let dir = scratch.join(format!("distgit-{}", distgit.name));
        self.mirror.checkout(&distgit.src, &distgit.revision, &dir)?;
        dir
      }
      None => {
        let spec = format!("{}.spec", component.pkgname);
        let shipped = upstream_co.join(&spec);
        if !shipped.is_file() {
          return Err(SrpmError::MissingSpec {
            component: component.name.clone(),
            spec,
          });
        }
        fs::copy(&shipped, scratch.join(&spec)).map_err(|source| SrpmError::Io { path: shipped, source })?;
        scratch.to_path_buf()
      }
    };

    let tar_dirname = format!("{}-{}", component.name, upstream.to_desc_string());
    let tarname = format!("{}.tar.gz", tar_dirname);
    create_tarball(&upstream_co, &tar_dirname, &packaging_dir.join(&tarname))?;

    let spec_name = find_spec(&packaging_dir)?;
    edit_spec(
      &packaging_dir.join(&spec_name),
      component,
      version,
      &tarname,
      &tar_dirname,
    )?;

    if let Some(prep) = component.prep_command() {
      run_shell(prep, &packaging_dir)?;
    }

    self.packager.build_source_package(&packaging_dir, &spec_name)?;
    let srpm = single_srpm(&packaging_dir)?;
    hardlink_or_copy(&srpm, target)?;
    Ok(())
  }
}

/// Point the spec at the generated tarball and derived version.
fn edit_spec(
  path: &Path,
  component: &Component,
  version: &VersionTuple,
  tarname: &str,
  tar_dirname: &str,
) -> Result<(), SpecError> {
  let mut spec = SpecFile::load(path)?;

  let source_tag = if spec.get_tag("Source0").is_some() { "Source0" } else { "Source" };
  spec.set_tag(source_tag, tarname);
  spec.set_tag("Version", &version.version);
  spec.set_tag("Release", &format!("{}{}", version.release, DIST_TAG));
  spec.set_setup_dirname(tar_dirname)?;

  match component.patch_policy() {
    PatchPolicy::Keep => {}
    PatchPolicy::Drop => {
      let removed = spec.wipe_patches();
      debug!(component = %component.name, removed, "dropped patches");
    }
  }

  spec.prepend_line(SPEC_DISCLAIMER);
  spec.save()
}

/// The one `.src.rpm` in `dir`.
fn single_srpm(dir: &Path) -> Result<PathBuf, SrpmError> {
  let entries = fs::read_dir(dir).map_err(|source| SrpmError::Io {
    path: dir.to_path_buf(),
    source,
  })?;

  let mut names: Vec<String> = entries
    .filter_map(Result::ok)
    .map(|e| e.file_name().to_string_lossy().to_string())
    .filter(|name| name.ends_with(SRPM_SUFFIX))
    .collect();
  names.sort();

  match names.len() {
    0 => Err(SrpmError::NoSourcePackage(dir.to_path_buf())),
    1 => Ok(dir.join(&names[0])),
    _ => Err(SrpmError::MultipleSourcePackages {
      dir: dir.to_path_buf(),
      names,
    }),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::util::testutil::{FakeMirror, FakePackager, component, spec_text, write_tree};
  use tempfile::TempDir;

  struct Fixture {
    temp: TempDir,
    mirror: FakeMirror,
  }

  impl Fixture {
    /// Upstream `file:///up/demo` shipping `demo.spec`, packaging repo
    /// `file:///pkgs/demo` with its own spec.
    fn new() -> Self {
      let temp = TempDir::new().unwrap();
      let spec = spec_text("demo");
      let upstream = temp.path().join("fixtures/upstream");
      write_tree(&upstream, &[("demo.spec", spec.as_str()), ("src/main.c", "int main;")]);
      let distgit = temp.path().join("fixtures/distgit");
      write_tree(&distgit, &[("demo.spec", spec.as_str()), ("fix-build.patch", "")]);

      let mut mirror = FakeMirror::new();
      mirror.add("file:///up/demo", upstream);
      mirror.add("file:///pkgs/demo", distgit);
      fs::create_dir_all(temp.path().join("rpms")).unwrap();
      fs::create_dir_all(temp.path().join("tmp")).unwrap();
      Self { temp, mirror }
    }

    fn rpm_dir(&self) -> PathBuf {
      self.temp.path().join("rpms")
    }

    fn tmp(&self) -> PathBuf {
      self.temp.path().join("tmp")
    }

    fn tmp_is_empty(&self) -> bool {
      fs::read_dir(self.tmp()).unwrap().next().is_none()
    }
  }

  const PLAIN: &str = r#"{ "name": "demo", "pkgname": "demo", "src": "file:///up/demo", "revision": "r1" }"#;

  #[test]
  fn upstream_spec_without_distgit() {
    let fx = Fixture::new();
    let packager = FakePackager::default();
    let synth = Synthesizer::new(&fx.mirror, &packager).tempdir(Some(fx.tmp()));

    let srpm = synth.ensure_srpm(&component(PLAIN), &fx.rpm_dir()).unwrap();

    assert_eq!(srpm.base, "demo-0-r1");
    assert_eq!(srpm.path, fx.rpm_dir().join("demo-0-r1.temp.src.rpm"));
    assert!(srpm.path.is_file());
    assert!(fx.tmp_is_empty());

    let spec = packager.specs.borrow()[0].clone();
    let lines: Vec<&str> = spec.lines().collect();
    assert_eq!(lines[0], SPEC_DISCLAIMER);
    assert!(lines.contains(&"Version: 0"));
    assert!(lines.contains(&"Release: r1%{?dist}"));
    assert!(lines.contains(&"Source0: demo-r1.tar.gz"));
    assert!(lines.contains(&"%setup -q -n demo-r1"));
    assert!(lines.contains(&"Patch0: fix-build.patch"));
  }

  #[test]
  fn distgit_with_tag_and_dropped_patches() {
    let mut fx = Fixture::new();
    fx.mirror.tag("file:///up/demo", "v1.2");
    fx.mirror.tag("file:///pkgs/demo", "pkg-3");
    let packager = FakePackager::default();
    let synth = Synthesizer::new(&fx.mirror, &packager).tempdir(Some(fx.tmp()));
    let demo = component(
      r#"{ "name": "demo", "pkgname": "demo", "src": "file:///up/demo", "revision": "r1",
           "distgit": { "name": "demo", "src": "file:///pkgs/demo", "revision": "d1", "patches": "drop" } }"#,
    );

    let srpm = synth.ensure_srpm(&demo, &fx.rpm_dir()).unwrap();

    assert_eq!(srpm.version.version, "1.2");
    assert_eq!(srpm.version.release, "r1.pkg.3.d1");
    assert_eq!(srpm.base, "demo-1.2-r1.pkg.3.d1");

    let spec = packager.specs.borrow()[0].clone();
    assert!(spec.contains("Source0: demo-v1.2-r1.tar.gz"));
    assert!(spec.contains("%setup -q -n demo-v1.2-r1"));
    assert!(!spec.contains("Patch0:"));
    assert!(!spec.contains("%patch"));
  }

  #[test]
  fn failing_prep_command_aborts_and_cleans_up() {
    let fx = Fixture::new();
    let packager = FakePackager::default();
    let synth = Synthesizer::new(&fx.mirror, &packager).tempdir(Some(fx.tmp()));
    let demo = component(
      r#"{ "name": "demo", "pkgname": "demo", "src": "file:///up/demo", "revision": "r1",
           "distgit": { "name": "demo", "src": "file:///pkgs/demo", "revision": "d1",
                        "prep-command": "test -f demo.spec && exit 4" } }"#,
    );

    let err = synth.ensure_srpm(&demo, &fx.rpm_dir()).unwrap_err();

    assert!(matches!(err, SrpmError::Exec(ExecError::CmdFailed { code: Some(4), .. })));
    assert_eq!(packager.calls.get(), 0);
    assert!(fx.tmp_is_empty());
  }

  #[test]
  fn zero_or_several_srpms_are_fatal() {
    let fx = Fixture::new();

    let none = FakePackager {
      outputs: 0,
      ..FakePackager::default()
    };
    let err = Synthesizer::new(&fx.mirror, &none)
      .tempdir(Some(fx.tmp()))
      .ensure_srpm(&component(PLAIN), &fx.rpm_dir())
      .unwrap_err();
    assert!(matches!(err, SrpmError::NoSourcePackage(_)));

    let two = FakePackager {
      outputs: 2,
      ..FakePackager::default()
    };
    let err = Synthesizer::new(&fx.mirror, &two)
      .tempdir(Some(fx.tmp()))
      .ensure_srpm(&component(PLAIN), &fx.rpm_dir())
      .unwrap_err();
    assert!(matches!(err, SrpmError::MultipleSourcePackages { ref names, .. } if names.len() == 2));
    assert!(fs::read_dir(fx.rpm_dir()).unwrap().next().is_none());
  }

  #[test]
  fn missing_upstream_spec() {
    let fx = Fixture::new();
    let packager = FakePackager::default();
    let other = component(r#"{ "name": "demo", "pkgname": "other", "src": "file:///up/demo", "revision": "r1" }"#);

    let err = Synthesizer::new(&fx.mirror, &packager)
      .tempdir(Some(fx.tmp()))
      .ensure_srpm(&other, &fx.rpm_dir())
      .unwrap_err();

    assert!(matches!(err, SrpmError::MissingSpec { ref spec, .. } if spec == "other.spec"));
  }

  #[test]
  fn preserve_temp_keeps_scratch_directory() {
    let fx = Fixture::new();
    let packager = FakePackager::default();
    let synth = Synthesizer::new(&fx.mirror, &packager)
      .tempdir(Some(fx.tmp()))
      .preserve_temp(true);

    synth.ensure_srpm(&component(PLAIN), &fx.rpm_dir()).unwrap();

    let kept: Vec<_> = fs::read_dir(fx.tmp()).unwrap().map(|e| e.unwrap().path()).collect();
    assert_eq!(kept.len(), 1);
    assert!(kept[0].join("demo/src/main.c").is_file());
    assert!(kept[0].join("demo-r1.tar.gz").is_file());
  }

  #[test]
  fn unknown_mirror_fails_before_checkout() {
    let fx = Fixture::new();
    let packager = FakePackager::default();
    let missing = component(r#"{ "name": "x", "pkgname": "x", "src": "file:///nowhere", "revision": "r1" }"#);

    let err = Synthesizer::new(&fx.mirror, &packager)
      .tempdir(Some(fx.tmp()))
      .ensure_srpm(&missing, &fx.rpm_dir())
      .unwrap_err();

    assert!(matches!(err, SrpmError::Mirror(MirrorError::MissingMirror { .. })));
    assert_eq!(fx.mirror.checkouts.get(), 0);
  }
}
