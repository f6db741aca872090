//! Blocking subprocess execution for the external packaging tools.

use std::io;
use std::path::Path;
use std::process::Command;

use thiserror::Error;
use tracing::{debug, info};

/// Errors from running an external command.
#[derive(Debug, Error)]
pub enum ExecError {
  /// The command could not be started at all.
  #[error("failed to spawn {cmd}: {source}")]
  Spawn {
    cmd: String,
    #[source]
    source: io::Error,
  },

  /// The command ran and exited unsuccessfully. `code` is `None` when it was
  /// killed by a signal.
  #[error("command failed with exit code {code:?}: {cmd}")]
  CmdFailed { cmd: String, code: Option<i32> },
}

/// Render a command line for logs and error messages.
pub fn display_command(cmd: &Command) -> String {
  let mut parts = vec![cmd.get_program().to_string_lossy().to_string()];
  parts.extend(cmd.get_args().map(|arg| arg.to_string_lossy().to_string()));
  parts.join(" ")
}

/// Run a command to completion and return its exit code.
///
/// A signal-terminated process reports `-1`.
pub fn run_status(cmd: &mut Command) -> Result<i32, ExecError> {
  let rendered = display_command(cmd);
  debug!(cmd = %rendered, cwd = ?cmd.get_current_dir(), "running command");

  let status = cmd.status().map_err(|source| ExecError::Spawn {
    cmd: rendered.clone(),
    source,
  })?;

  let code = status.code().unwrap_or(-1);
  debug!(cmd = %rendered, code, "command finished");
  Ok(code)
}

/// Run a command, failing unless it exits with status zero.
pub fn run_sync(cmd: &mut Command) -> Result<(), ExecError> {
  let rendered = display_command(cmd);
  debug!(cmd = %rendered, cwd = ?cmd.get_current_dir(), "running command");

  let status = cmd.status().map_err(|source| ExecError::Spawn {
    cmd: rendered.clone(),
    source,
  })?;

  if status.success() {
    Ok(())
  } else {
    Err(ExecError::CmdFailed {
      cmd: rendered,
      code: status.code(),
    })
  }
}

/// Run `script` through `/bin/sh -c` in `cwd`.
pub fn run_shell(script: &str, cwd: &Path) -> Result<(), ExecError> {
  info!(script, cwd = %cwd.display(), "executing preparation command");
  run_sync(Command::new("/bin/sh").arg("-c").arg(script).current_dir(cwd))
}
