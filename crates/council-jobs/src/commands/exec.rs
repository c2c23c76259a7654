use std::fs;
use std::os::unix::process::{CommandExt as _, ExitStatusExt as _};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Args;
use log::debug;

use crate::{log_error, log_warn};
use crate::utils::capture::{append_line, tee_child_output};
use crate::utils::secret::read_secret_file;
use crate::utils::session::markers;

/// Exit code recorded when the payload cannot be started at all.
pub const SPAWN_FAILURE_CODE: i32 = 127;

/// Arguments of the execution wrapper. The launcher builds them; users never should.
#[derive(Debug, Clone, Args)]
pub struct ExecArgs {
  /// Session id, for log messages only
  pub session: String,
  #[arg(long)]
  pub output: PathBuf,
  #[arg(long)]
  pub done: PathBuf,
  #[arg(long)]
  pub pid_file: PathBuf,
  #[arg(long)]
  pub error_file: PathBuf,
  #[arg(long)]
  pub secret_file: PathBuf,
  #[arg(long)]
  pub prompt_file: PathBuf,
  #[arg(long)]
  pub args_file: PathBuf,
  /// Environment variable the credential is exported under
  #[arg(long)]
  pub secret_env: String,
  /// Flag placed before each auxiliary file
  #[arg(long, allow_hyphen_values = true)]
  pub file_flag: String,
  /// Payload program and its leading arguments
  #[arg(last = true, required = true)]
  pub payload: Vec<String>,
}

/// Run the payload and leave the completion markers behind.
///
/// Order matters: pid first, then the payload, then the error marker, then
/// removal of the transient files, and the done marker strictly last. Once
/// the payload has run, the done marker is written no matter what failed
/// on the way; those failures are logged and noted in the capture.
///
/// # Errors
/// Returns an error if the pid file or the done marker cannot be written.
/// Payload failures are recorded, not returned.
pub fn run(args: &ExecArgs) -> Result<()> {
  markers::write_pid(&args.pid_file, std::process::id())?;

  let code = match run_payload(args) {
    Ok(code) => code,
    Err(err) => {
      note(args, &format!("payload did not run: {err:#}"));
      SPAWN_FAILURE_CODE
    }
  };
  debug!("session {} payload exited with {code}", args.session);

  if code != 0
    && let Err(err) = markers::write_exit_code(&args.error_file, code)
  {
    note(args, &format!("failed to record exit code {code}: {err:#}"));
  }
  remove_transient_files(args);

  markers::write_done(&args.done, Utc::now())
}

/// Log a wrapper-side problem and keep it in the capture for `wait` to show.
fn note(args: &ExecArgs, message: &str) {
  log_error!("council-jobs: {message}");
  let _ = append_line(&args.output, &format!("council-jobs: {message}"));
}

fn run_payload(args: &ExecArgs) -> Result<i32> {
  let secret = read_secret_file(&args.secret_file)?;
  let files = read_args_file(&args.args_file)?;
  let prompt = fs::read_to_string(&args.prompt_file)
    .with_context(|| format!("failed to read {}", args.prompt_file.display()))?;

  let argv = payload_argv(&args.payload, &args.file_flag, &files, &prompt);
  let (program, rest) = argv
    .split_first()
    .ok_or_else(|| anyhow::anyhow!("payload command is empty"))?;

  // Own process group: the host's hangup no longer reaches the payload, so
  // cleanup kills the group recorded in the pid file instead.
  let mut child = Command::new(program)
    .args(rest)
    .env(&args.secret_env, secret.expose())
    .stdin(Stdio::null())
    .stdout(Stdio::piped())
    .stderr(Stdio::piped())
    .process_group(0)
    .spawn()
    .with_context(|| format!("failed to spawn {program}"))?;

  if let Err(err) = markers::write_payload_group(&args.pid_file, std::process::id(), child.id()) {
    log_warn!("council-jobs: {err:#}");
  }

  let mut stdout = std::io::stdout();
  let captured = tee_child_output(&mut child, &args.output, &mut stdout);
  if let Err(err) = &captured {
    // Unread pipes would block the payload forever.
    drop(child.stdout.take());
    drop(child.stderr.take());
    note(args, &format!("output capture failed: {err:#}"));
  }
  let status = child.wait().context("failed to wait for payload")?;
  Ok(exit_code_of(status))
}

fn read_args_file(path: &Path) -> Result<Vec<String>> {
  let raw = fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
  if raw.trim().is_empty() {
    return Ok(Vec::new());
  }
  serde_json::from_str(&raw).with_context(|| format!("invalid file list in {}", path.display()))
}

/// Payload argv: program and leading args, `<file_flag> <path>` per file, then the prompt.
#[must_use]
pub fn payload_argv(payload: &[String], file_flag: &str, files: &[String], prompt: &str) -> Vec<String> {
  let mut argv = payload.to_vec();
  for file in files {
    argv.push(file_flag.to_string());
    argv.push(file.clone());
  }
  argv.push(prompt.to_string());
  argv
}

/// Exit code of the payload; signals map to `128 + signal` like a shell reports them.
#[must_use]
pub fn exit_code_of(status: ExitStatus) -> i32 {
  status
    .code()
    .unwrap_or_else(|| 128 + status.signal().unwrap_or(0))
}

fn remove_transient_files(args: &ExecArgs) {
  for path in [&args.secret_file, &args.prompt_file, &args.args_file] {
    if let Err(err) = fs::remove_file(path)
      && err.kind() != std::io::ErrorKind::NotFound
    {
      log_error!("failed to remove {}: {}", path.display(), err);
    }
  }
}
