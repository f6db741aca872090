//! Test doubles for the external packaging tools.
//!
//! The fakes reproduce the on-disk contracts of the real tools closely enough
//! for the orchestrator to run end to end inside a temporary directory:
//! mirrors serve fixture trees, the packager emits one `.src.rpm`, the
//! compiler lays out one result directory per input and the indexer writes a
//! `repodata/` directory.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::compile::BatchCompiler;
use crate::consts::{SRPM_SUFFIX, STATUS_MARKER, TEMP_SRPM_SUFFIX};
use crate::exec::ExecError;
use crate::harvest::RepoIndexer;
use crate::mirror::{Description, MirrorError, SourceMirror};
use crate::snapshot::{Component, Snapshot, parse_snapshot};
use crate::srpm::SourcePackager;
use crate::util::hash::{ContentHash, hash_bytes};

/// Copy a directory tree with real copies, never hardlinks.
pub fn copy_tree(src: &Path, dest: &Path) {
  for entry in WalkDir::new(src).sort_by_file_name() {
    let entry = entry.unwrap();
    let rel = entry.path().strip_prefix(src).unwrap();
    let target = dest.join(rel);
    if entry.file_type().is_dir() {
      fs::create_dir_all(&target).unwrap();
    } else {
      fs::copy(entry.path(), &target).unwrap();
    }
  }
}

/// Write `files` (relative path, content) below `root`.
pub fn write_tree(root: &Path, files: &[(&str, &str)]) {
  for (rel, content) in files {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
  }
}

/// Digest of a published tree: relative paths, file contents and symlink
/// targets in walk order. Used to compare two generations for identity.
pub fn tree_digest(root: &Path) -> ContentHash {
  let mut listing = Vec::new();
  for entry in WalkDir::new(root).min_depth(1).sort_by_file_name() {
    let entry = entry.unwrap();
    let rel = entry.path().strip_prefix(root).unwrap().to_string_lossy().into_owned();
    let kind = entry.file_type();
    let line = if kind.is_symlink() {
      format!("L {} -> {}", rel, fs::read_link(entry.path()).unwrap().display())
    } else if kind.is_dir() {
      format!("D {}", rel)
    } else {
      format!("F {} {}", rel, hash_bytes(&fs::read(entry.path()).unwrap()))
    };
    listing.push(line);
  }
  hash_bytes(listing.join("\n").as_bytes())
}

/// Snapshot document around the given component JSON objects.
pub fn snapshot(components: &[&str]) -> Snapshot {
  let doc = format!(
    r#"{{ "root": {{ "mock": "fedora-rawhide-x86_64" }}, "components": [ {} ] }}"#,
    components.join(", ")
  );
  parse_snapshot(&doc).unwrap()
}

/// A single validated component.
pub fn component(json: &str) -> Component {
  snapshot(&[json]).components.remove(0)
}

/// Minimal spec file for a package named `name`.
pub fn spec_text(name: &str) -> String {
  format!(
    "Name: {name}\n\
     Version: 0\n\
     Release: 1\n\
     Summary: test package\n\
     License: MIT\n\
     Source0: placeholder.tar.gz\n\
     Patch0: fix-build.patch\n\
     Patch1: fix-tests.patch\n\
     \n\
     %description\n\
     Test package.\n\
     \n\
     %prep\n\
     %setup -q\n\
     %patch0 -p1\n\
     %patch1 -p1\n\
     \n\
     %files\n"
  )
}

/// Mirror serving fixture directories keyed by URI.
///
/// `describe` reports the configured tag (if any) and the requested revision
/// as the revision identifier.
#[derive(Debug, Default)]
pub struct FakeMirror {
  trees: BTreeMap<String, PathBuf>,
  tags: BTreeMap<String, String>,
  pub describes: Cell<usize>,
  pub checkouts: Cell<usize>,
}

impl FakeMirror {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn add(&mut self, uri: &str, tree: PathBuf) {
    self.trees.insert(uri.to_string(), tree);
  }

  pub fn tag(&mut self, uri: &str, tag: &str) {
    self.tags.insert(uri.to_string(), tag.to_string());
  }

  fn tree(&self, uri: &str) -> Result<&PathBuf, MirrorError> {
    self.trees.get(uri).ok_or_else(|| MirrorError::MissingMirror {
      uri: uri.to_string(),
      path: PathBuf::from(uri),
    })
  }
}

impl SourceMirror for FakeMirror {
  fn describe(&self, uri: &str, revision: &str) -> Result<Description, MirrorError> {
    self.describes.set(self.describes.get() + 1);
    self.tree(uri)?;
    Ok(Description {
      tag: self.tags.get(uri).cloned(),
      revision: revision.to_string(),
    })
  }

  fn checkout(&self, uri: &str, _revision: &str, dest: &Path) -> Result<(), MirrorError> {
    self.checkouts.set(self.checkouts.get() + 1);
    let tree = self.tree(uri)?;
    copy_tree(tree, dest);
    Ok(())
  }
}

/// Packager that writes `<spec stem>-fake.src.rpm` holding the spec text.
#[derive(Debug)]
pub struct FakePackager {
  /// Number of `.src.rpm` files each call produces.
  pub outputs: usize,
  pub calls: Cell<usize>,
  /// Spec texts seen by the packager, in call order.
  pub specs: RefCell<Vec<String>>,
}

impl Default for FakePackager {
  fn default() -> Self {
    Self {
      outputs: 1,
      calls: Cell::new(0),
      specs: RefCell::new(Vec::new()),
    }
  }
}

impl SourcePackager for FakePackager {
  fn build_source_package(&self, dir: &Path, spec_name: &str) -> Result<(), ExecError> {
    self.calls.set(self.calls.get() + 1);
    let spec = fs::read_to_string(dir.join(spec_name)).unwrap();
    let stem = spec_name.trim_end_matches(".spec");
    for i in 0..self.outputs {
      fs::write(dir.join(format!("{}-fake{}{}", stem, i, SRPM_SUFFIX)), &spec).unwrap();
    }
    self.specs.borrow_mut().push(spec);
    Ok(())
  }
}

/// Compiler that mimics mockchain's result layout.
///
/// For every input `<base>.temp.src.rpm` it creates `<output>/<base>/` holding
/// a copy of the input, a final source package, one binary package, a status
/// marker and a build log.
#[derive(Debug, Default)]
pub struct FakeCompiler {
  pub exit_code: i32,
  pub calls: Cell<usize>,
  pub inputs: RefCell<Vec<PathBuf>>,
}

impl FakeCompiler {
  pub fn failing(exit_code: i32) -> Self {
    Self {
      exit_code,
      ..Self::default()
    }
  }
}

impl BatchCompiler for FakeCompiler {
  fn compile(&self, _profile: &str, output_dir: &Path, srpms: &[PathBuf]) -> Result<i32, ExecError> {
    self.calls.set(self.calls.get() + 1);
    for srpm in srpms {
      let file_name = srpm.file_name().unwrap().to_str().unwrap();
      let base = file_name.strip_suffix(TEMP_SRPM_SUFFIX).unwrap();
      let result_dir = output_dir.join(base);
      fs::create_dir_all(&result_dir).unwrap();

      let content = fs::read(srpm).unwrap();
      fs::write(result_dir.join(file_name), &content).unwrap();
      fs::write(result_dir.join(format!("{}{}", base, SRPM_SUFFIX)), &content).unwrap();
      fs::write(result_dir.join(format!("{}.x86_64.rpm", base)), &content).unwrap();
      fs::write(result_dir.join(STATUS_MARKER), format!("{{\"status\": {}}}\n", self.exit_code)).unwrap();
      fs::write(result_dir.join("build.log"), format!("building {}\n", base)).unwrap();
    }
    self.inputs.borrow_mut().extend(srpms.iter().cloned());
    Ok(self.exit_code)
  }
}

/// Indexer writing `repodata/repomd.xml` listing the indexed packages.
#[derive(Debug, Default)]
pub struct FakeIndexer {
  pub calls: Cell<usize>,
}

impl RepoIndexer for FakeIndexer {
  fn index(&self, build_dir: &Path, rpm_dir: &Path) -> Result<(), ExecError> {
    self.calls.set(self.calls.get() + 1);
    let mut names: Vec<String> = fs::read_dir(rpm_dir)
      .unwrap()
      .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
      .collect();
    names.sort();

    let repodata = build_dir.join("repodata");
    fs::create_dir_all(&repodata).unwrap();
    fs::write(repodata.join("repomd.xml"), names.join("\n")).unwrap();
    Ok(())
  }
}
