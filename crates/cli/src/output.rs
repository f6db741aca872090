//! Terminal rendering of build reports and the published generation.
//!
//! Summaries go to stdout. Warnings and the final error go to stderr, which
//! keeps `status --json` output machine readable.

use std::fmt::Display;
use std::time::Duration;

use anyhow::Context;
use owo_colors::{OwoColorize, Stream};

use distbuild_lib::orchestrate::{BuildOutcome, BuildReport, BuildState, ComponentState};

/// Hash prefix shown next to a component in verbose status output.
const HASH_PREFIX_LEN: usize = 12;

/// Leading glyph of a summary line.
#[derive(Debug, Clone, Copy)]
enum Mark {
  Done,
  Note,
  Warn,
  Fail,
}

impl Mark {
  fn paint(self, stream: Stream) -> String {
    match self {
      Mark::Done => "✓".if_supports_color(stream, |s| s.green()).to_string(),
      Mark::Note => "•".if_supports_color(stream, |s| s.blue()).to_string(),
      Mark::Warn => "⚠".if_supports_color(stream, |s| s.yellow()).to_string(),
      Mark::Fail => "✗".if_supports_color(stream, |s| s.red()).to_string(),
    }
  }
}

fn headline(mark: Mark, message: &str) {
  println!("{} {}", mark.paint(Stream::Stdout), message);
}

fn field(label: &str, value: impl Display) {
  println!("  {}: {}", label.if_supports_color(Stream::Stdout, |s| s.dimmed()), value);
}

fn names_or_none(names: &[String]) -> String {
  if names.is_empty() {
    "none".to_string()
  } else {
    names.join(", ")
  }
}

/// Wall-clock time of a run: tenths of a second below a minute, then
/// minutes and zero-padded seconds.
fn elapsed_text(elapsed: Duration) -> String {
  let secs = elapsed.as_secs();
  if secs < 60 {
    format!("{:.1}s", elapsed.as_secs_f64())
  } else {
    format!("{}m{:02}s", secs / 60, secs % 60)
  }
}

/// Summary printed after `distbuild build`.
pub fn print_report(report: &BuildReport, elapsed: Duration) {
  match &report.outcome {
    BuildOutcome::Changed { generation, packages } => {
      headline(Mark::Done, &format!("Published generation {}", generation));
      field("Rebuilt", names_or_none(&report.rebuilt));
      field("Reused", names_or_none(&report.reused));
      field("Packages", packages.len());
    }
    BuildOutcome::Unchanged => {
      headline(Mark::Note, "No changes.");
      field("Reused", report.reused.len());
    }
  }
  field("Took", elapsed_text(elapsed));
}

/// One line of the component table: pkgname, result directory and, when
/// verbose, the cached configuration hash prefix.
fn component_row(component: &ComponentState, verbose: bool) -> String {
  let mut row = format!("{} {}", component.pkgname, component.dirname);
  if verbose {
    let len = component.hashv0.len().min(HASH_PREFIX_LEN);
    row.push_str(&format!(" ({})", &component.hashv0[..len]));
  }
  if !component.present {
    row.push_str(" [missing]");
  }
  row
}

/// Human-readable view of `distbuild status`.
pub fn print_state(state: &BuildState, verbose: bool) {
  let Some(generation) = state.generation else {
    headline(
      Mark::Note,
      "No generation published yet. Run 'distbuild build' to create one.",
    );
    return;
  };

  headline(Mark::Done, &format!("Current generation: {}", generation));
  if let Some(path) = &state.path {
    field("Path", path.display());
  }
  field("Components", state.components.len());

  if !state.components.is_empty() {
    println!();
    for component in &state.components {
      let mark = if component.present { Mark::Note } else { Mark::Warn };
      println!("  {} {}", mark.paint(Stream::Stdout), component_row(component, verbose));
    }
  }

  let missing: Vec<String> = state
    .components
    .iter()
    .filter(|c| !c.present)
    .map(|c| c.pkgname.clone())
    .collect();
  if !missing.is_empty() {
    eprintln!(
      "{} {}",
      Mark::Warn.paint(Stream::Stderr),
      format!("Missing build results (will rebuild): {}", missing.join(", "))
        .if_supports_color(Stream::Stderr, |s| s.yellow())
    );
  }
}

pub fn print_error(message: &str) {
  eprintln!(
    "{} {}",
    Mark::Fail.paint(Stream::Stderr),
    message.if_supports_color(Stream::Stderr, |s| s.red())
  );
}

pub fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
  let json = serde_json::to_string_pretty(value).context("Failed to serialize to JSON")?;
  println!("{}", json);
  Ok(())
}
