//! Minimal RPM spec file editing.
//!
//! Only the operations source package synthesis needs: reading and setting
//! preamble tags, pointing `%setup`/`%autosetup` at the archive directory, and
//! removing patch declarations. Tags are only recognized in preamble regions
//! (the start of the file and each `%package` block), so text in
//! `%description` or `%changelog` is never mistaken for a tag.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

const SPEC_EXTENSION: &str = ".spec";

/// Section markers that end a preamble region.
const BODY_SECTIONS: &[&str] = &[
  "description",
  "prep",
  "build",
  "install",
  "check",
  "clean",
  "files",
  "changelog",
  "pre",
  "post",
  "preun",
  "postun",
  "pretrans",
  "posttrans",
  "verifyscript",
  "triggerin",
  "triggerun",
  "triggerpostun",
  "generate_buildrequires",
  "conf",
];

#[derive(Debug, Error)]
pub enum SpecError {
  #[error("no .spec file found in {0}")]
  NotFound(PathBuf),

  #[error("multiple .spec files found in {dir}: {names:?}")]
  Multiple { dir: PathBuf, names: Vec<String> },

  #[error("failed to read {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to write {path}: {source}")]
  Write {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("no %setup or %autosetup line in {0}")]
  NoSetup(PathBuf),
}

/// Find the single `.spec` file in `dir` and return its file name.
pub fn find_spec(dir: &Path) -> Result<String, SpecError> {
  let entries = fs::read_dir(dir).map_err(|source| SpecError::Read {
    path: dir.to_path_buf(),
    source,
  })?;

  let mut names = Vec::new();
  for entry in entries {
    let entry = entry.map_err(|source| SpecError::Read {
      path: dir.to_path_buf(),
      source,
    })?;
    let name = entry.file_name().to_string_lossy().to_string();
    if name.ends_with(SPEC_EXTENSION) && entry.path().is_file() {
      names.push(name);
    }
  }
  names.sort();

  match names.len() {
    0 => Err(SpecError::NotFound(dir.to_path_buf())),
    1 => Ok(names.remove(0)),
    _ => Err(SpecError::Multiple {
      dir: dir.to_path_buf(),
      names,
    }),
  }
}

/// An editable spec file.
#[derive(Debug, Clone)]
pub struct SpecFile {
  path: PathBuf,
  lines: Vec<String>,
  trailing_newline: bool,
}

impl SpecFile {
  pub fn load(path: &Path) -> Result<Self, SpecError> {
    let text = fs::read_to_string(path).map_err(|source| SpecError::Read {
      path: path.to_path_buf(),
      source,
    })?;
    Ok(Self::from_text(path.to_path_buf(), &text))
  }

  pub fn from_text(path: PathBuf, text: &str) -> Self {
    Self {
      path,
      lines: text.lines().map(str::to_string).collect(),
      trailing_newline: text.ends_with('\n'),
    }
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  pub fn text(&self) -> String {
    let mut text = self.lines.join("\n");
    if self.trailing_newline {
      text.push('\n');
    }
    text
  }

  pub fn save(&self) -> Result<(), SpecError> {
    fs::write(&self.path, self.text()).map_err(|source| SpecError::Write {
      path: self.path.clone(),
      source,
    })
  }

  /// Value of the first preamble tag named `tag` (case-insensitive).
  pub fn get_tag(&self, tag: &str) -> Option<String> {
    self
      .preamble_lines()
      .find_map(|idx| match parse_tag(&self.lines[idx]) {
        Some((key, value)) if key.eq_ignore_ascii_case(tag) => Some(value.trim().to_string()),
        _ => None,
      })
  }

  /// Set the first preamble tag named `tag`, or add it after `Name:`.
  pub fn set_tag(&mut self, tag: &str, value: &str) {
    let existing = self.preamble_lines().find(|&idx| {
      parse_tag(&self.lines[idx])
        .map(|(key, _)| key.eq_ignore_ascii_case(tag))
        .unwrap_or(false)
    });

    match existing {
      Some(idx) => {
        let line = &self.lines[idx];
        let colon = line.find(':').unwrap_or(line.len());
        let (head, rest) = line.split_at(colon + 1);
        let spacing: String = rest.chars().take_while(|c| c.is_whitespace()).collect();
        let spacing = if spacing.is_empty() { " ".to_string() } else { spacing };
        self.lines[idx] = format!("{}{}{}", head, spacing, value);
      }
      None => {
        let after_name = self
          .preamble_lines()
          .find(|&idx| matches!(parse_tag(&self.lines[idx]), Some((key, _)) if key.eq_ignore_ascii_case("Name")))
          .map(|idx| idx + 1)
          .unwrap_or(0);
        self.lines.insert(after_name, format!("{}: {}", tag, value));
      }
    }
  }

  /// Make `%setup`/`%autosetup` unpack into `dirname`.
  pub fn set_setup_dirname(&mut self, dirname: &str) -> Result<(), SpecError> {
    let idx = self
      .lines
      .iter()
      .position(|line| {
        let trimmed = line.trim_start();
        macro_name(trimmed) == Some("setup") || macro_name(trimmed) == Some("autosetup")
      })
      .ok_or_else(|| SpecError::NoSetup(self.path.clone()))?;

    let mut tokens = Vec::new();
    let mut words = self.lines[idx].split_whitespace();
    while let Some(word) = words.next() {
      if word == "-n" {
        words.next();
      } else if let Some(rest) = word.strip_prefix("-n")
        && !rest.is_empty()
        && !rest.starts_with('-')
      {
        continue;
      } else {
        tokens.push(word);
      }
    }

    self.lines[idx] = format!("{} -n {}", tokens.join(" "), dirname);
    Ok(())
  }

  /// Number of `PatchN:` declarations.
  pub fn patch_count(&self) -> usize {
    self.preamble_lines().filter(|&idx| is_patch_tag(&self.lines[idx])).count()
  }

  /// Remove all `PatchN:` declarations and `%patch` application lines.
  ///
  /// Returns the number of declarations removed.
  pub fn wipe_patches(&mut self) -> usize {
    let declarations: Vec<usize> = self.preamble_lines().filter(|&idx| is_patch_tag(&self.lines[idx])).collect();
    let removed = declarations.len();

    let mut idx = 0;
    self.lines.retain(|line| {
      let keep = !declarations.contains(&idx) && !is_patch_application(line);
      idx += 1;
      keep
    });
    removed
  }

  /// Insert `line` at the top of the file.
  pub fn prepend_line(&mut self, line: &str) {
    self.lines.insert(0, line.to_string());
  }

  /// Indices of lines inside preamble regions.
  fn preamble_lines(&self) -> impl Iterator<Item = usize> + '_ {
    let mut in_preamble = true;
    self.lines.iter().enumerate().filter_map(move |(idx, line)| {
      if let Some(name) = macro_name(line.trim_start()) {
        if name == "package" {
          in_preamble = true;
          return None;
        }
        if BODY_SECTIONS.contains(&name) {
          in_preamble = false;
          return None;
        }
      }
      in_preamble.then_some(idx)
    })
  }
}

/// Name of a `%macro` at the start of a line (`%patch0 -p1` gives `patch0`).
fn macro_name(line: &str) -> Option<&str> {
  let rest = line.strip_prefix('%')?;
  let end = rest
    .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
    .unwrap_or(rest.len());
  (end > 0).then(|| &rest[..end])
}

/// Split `Key: value` when `Key` is a plain tag name.
fn parse_tag(line: &str) -> Option<(&str, &str)> {
  let (key, value) = line.split_once(':')?;
  let key = key.trim_end();
  let valid = !key.is_empty()
    && key.chars().next().is_some_and(|c| c.is_ascii_alphabetic())
    && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '(' || c == ')');
  valid.then_some((key, value))
}

fn is_patch_tag(line: &str) -> bool {
  match parse_tag(line) {
    Some((key, _)) => {
      let lower = key.to_ascii_lowercase();
      lower
        .strip_prefix("patch")
        .is_some_and(|digits| digits.chars().all(|c| c.is_ascii_digit()))
    }
    None => false,
  }
}

fn is_patch_application(line: &str) -> bool {
  macro_name(line.trim_start())
    .and_then(|name| name.strip_prefix("patch"))
    .is_some_and(|digits| digits.chars().all(|c| c.is_ascii_digit()))
}
