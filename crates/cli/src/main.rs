mod cmd;
mod output;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::cmd::BuildArgs;
use crate::output::print_error;

/// distbuild - incremental RPM builds from a resolved component snapshot
#[derive(Parser)]
#[command(name = "distbuild")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Enable verbose output
  #[arg(short, long, global = true)]
  verbose: bool,

  /// Work directory holding snapshot.json, src/ and build/
  #[arg(long, global = true, default_value = ".")]
  workdir: PathBuf,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Build changed components and publish a new generation
  Build {
    /// Directory for temporary working files
    #[arg(long)]
    tempdir: Option<PathBuf>,

    /// Create or update the timestamp of this path if a change occurred
    #[arg(long)]
    touch_if_changed: Option<PathBuf>,

    /// Store build logs in this directory
    #[arg(long)]
    logdir: Option<PathBuf>,

    /// Keep temporary checkouts (also enabled by DISTBUILD_PRESERVE_TEMP)
    #[arg(long)]
    preserve_temp: bool,
  },

  /// Show the published generation and its build cache
  Status {
    /// Output as JSON
    #[arg(long)]
    json: bool,
  },
}

fn init_tracing(verbose: bool) {
  let default = if verbose { "debug" } else { "info" };
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .without_time()
    .init();
}

fn main() -> ExitCode {
  let cli = Cli::parse();
  init_tracing(cli.verbose);

  let result = match cli.command {
    Commands::Build {
      tempdir,
      touch_if_changed,
      logdir,
      preserve_temp,
    } => cmd::cmd_build(
      &cli.workdir,
      BuildArgs {
        tempdir,
        touch_if_changed,
        logdir,
        preserve_temp,
      },
    ),
    Commands::Status { json } => cmd::cmd_status(&cli.workdir, cli.verbose, json),
  };

  match result {
    Ok(()) => ExitCode::SUCCESS,
    Err(e) => {
      print_error(&format!("{:#}", e));
      ExitCode::FAILURE
    }
  }
}
