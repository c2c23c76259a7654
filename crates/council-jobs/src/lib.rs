use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;
pub mod config;
pub mod error;
pub mod utils;

use crate::commands::cleanup::CleanupArgs;
use crate::commands::exec::ExecArgs;
use crate::commands::start::StartArgs;
use crate::commands::status::StatusArgs;
use crate::commands::wait::WaitArgs;
use crate::config::{AppContext, load_config};

pub use crate::commands::cleanup::{SweepReport, sweep};
pub use crate::commands::start::{LaunchRequest, launch};
pub use crate::commands::wait::{WaitOptions, WaitOutcome, wait_for};

/// Council Jobs - run long council deliberations detached and collect them later.
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
  #[command(subcommand)]
  command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
  /// Launch a payload in a detached session and print its descriptor as JSON
  Start(StartArgs),
  /// Block until a session completes, then print its captured output
  Wait(WaitArgs),
  /// Show the state of one session or list all known sessions
  Status(StatusArgs),
  /// Kill and delete sessions older than a given age
  Cleanup(CleanupArgs),
  /// Run the payload inside the detached host (internal)
  #[command(hide = true)]
  Exec(ExecArgs),
}

pub fn parse() -> Cli {
  Cli::parse()
}

/// Run the CLI and return the process exit code.
///
/// # Errors
/// Returns an error when the selected command fails. Use
/// [`error::exit_code_for`] to map it onto the documented exit codes.
pub fn run() -> Result<i32> {
  let cli = parse();

  match cli.command {
    // The wrapper receives everything it needs via argv and never reads config files.
    Commands::Exec(args) => {
      commands::exec::run(&args)?;
      Ok(0)
    }
    Commands::Start(args) => {
      commands::start::run(&app_context()?, &args)?;
      Ok(0)
    }
    Commands::Wait(args) => commands::wait::run(&app_context()?, &args),
    Commands::Status(args) => commands::status::run(&app_context()?, &args),
    Commands::Cleanup(args) => {
      commands::cleanup::run(&app_context()?, &args)?;
      Ok(0)
    }
  }
}

fn app_context() -> Result<AppContext> {
  let cwd = std::env::current_dir()?;
  let config = load_config()?;
  Ok(AppContext::new(config, cwd))
}
