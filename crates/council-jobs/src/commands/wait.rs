use std::io::Write;
use std::time::{Duration, Instant};

use anyhow::Result;
use clap::Args;

use crate::config::AppContext;
use crate::error::{EXIT_RUNNING, JobError};
use crate::utils::log::t;
use crate::utils::session::{SessionId, SessionPaths, markers};
use crate::utils::tmux;
use crate::{log_info, log_warn};

#[derive(Debug, Args)]
pub struct WaitArgs {
  /// Session id printed by `start`
  pub session: String,
  /// Give up after this many seconds (the session keeps running)
  #[arg(long, value_name = "SECS")]
  pub timeout: Option<u64>,
  /// Seconds between completion checks
  #[arg(long, value_name = "SECS")]
  pub poll: Option<u64>,
  /// Check once and exit 1 if the session is still running
  #[arg(long)]
  pub no_wait: bool,
}

#[derive(Debug, Clone)]
pub struct WaitOptions {
  pub timeout: Duration,
  pub poll: Duration,
  pub block: bool,
  pub tail_lines: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
  Completed,
  StillRunning,
}

pub fn run(ctx: &AppContext, args: &WaitArgs) -> Result<i32> {
  let id = SessionId::parse(&args.session)?;
  let opts = WaitOptions {
    timeout: args
      .timeout
      .map_or_else(|| ctx.config.wait_timeout(), Duration::from_secs),
    poll: args
      .poll
      .map_or_else(|| ctx.config.poll_interval(), |s| Duration::from_secs(s.max(1))),
    block: !args.no_wait,
    tail_lines: ctx.config.wait.tail_lines,
  };
  let mut stdout = anstream::stdout();
  match wait_for(ctx, &id, &opts, &mut stdout)? {
    WaitOutcome::Completed => Ok(0),
    WaitOutcome::StillRunning => {
      log_info!("Session {} is still running", t::id(&id));
      Ok(EXIT_RUNNING)
    }
  }
}

/// Wait for a session's completion marker and print its output to `out`.
///
/// Purely a reader: the only side effect on the session is tearing down its
/// host after completion was observed. Safe to abandon at any point.
///
/// # Errors
/// Returns [`JobError::NotFound`] when neither host nor marker exist and
/// [`JobError::Timeout`] when the marker does not appear in time.
pub fn wait_for(
  ctx: &AppContext,
  id: &SessionId,
  opts: &WaitOptions,
  out: &mut dyn Write,
) -> Result<WaitOutcome> {
  let paths = SessionPaths::new(&ctx.state_dir, id.clone());
  let name = id.as_str();

  if !tmux::has_session(&ctx.config, name) {
    if paths.done().exists() {
      emit_completed(&paths, out)?;
      return Ok(WaitOutcome::Completed);
    }
    return Err(JobError::NotFound(id.to_string()).into());
  }

  let start = Instant::now();
  loop {
    if paths.done().exists() {
      emit_completed(&paths, out)?;
      teardown(ctx, name);
      return Ok(WaitOutcome::Completed);
    }
    if !opts.block {
      return Ok(WaitOutcome::StillRunning);
    }
    if !tmux::has_session(&ctx.config, name) && !paths.done().exists() {
      // Host was killed (e.g. by cleanup) before the wrapper could finish.
      return Err(JobError::NotFound(id.to_string()).into());
    }

    let elapsed = start.elapsed();
    if elapsed >= opts.timeout {
      emit_timeout(&paths, opts, out)?;
      return Err(
        JobError::Timeout {
          id: id.to_string(),
          secs: opts.timeout.as_secs(),
        }
        .into(),
      );
    }

    let remaining = opts.timeout - elapsed;
    log_info!(
      "{}",
      t::dim(format!(
        "waiting on {name}: elapsed {}s, remaining {}s, {} bytes captured",
        elapsed.as_secs(),
        remaining.as_secs(),
        markers::output_size(&paths.output())
      ))
    );
    std::thread::sleep(opts.poll.min(remaining));
  }
}

/// Header, full output and the error section if any. Identical on every call
/// for a completed session.
fn emit_completed(paths: &SessionPaths, out: &mut dyn Write) -> Result<()> {
  let completed_at = markers::read_done(&paths.done()).unwrap_or_default();
  writeln!(out, "=== Session {} completed at {} ===", paths.id(), completed_at)?;
  let output = markers::read_output(&paths.output())?;
  out.write_all(output.as_bytes())?;
  if !output.is_empty() && !output.ends_with('\n') {
    writeln!(out)?;
  }
  if let Some(marker) = markers::read_error_marker(&paths.error()) {
    writeln!(out, "=== WARNING: payload exited with an error ===")?;
    writeln!(out, "{marker}")?;
    log_warn!("Session {} finished with {}", paths.id(), marker);
  }
  out.flush()?;
  Ok(())
}

fn emit_timeout(paths: &SessionPaths, opts: &WaitOptions, out: &mut dyn Write) -> Result<()> {
  writeln!(
    out,
    "=== Timed out after {}s; last {} lines of output ===",
    opts.timeout.as_secs(),
    opts.tail_lines
  )?;
  let tail = markers::tail_output(&paths.output(), opts.tail_lines)?;
  if !tail.is_empty() {
    writeln!(out, "{tail}")?;
  }
  out.flush()?;
  Ok(())
}

/// Best-effort: a host that is already gone is fine.
fn teardown(ctx: &AppContext, name: &str) {
  if let Err(err) = tmux::kill_session(&ctx.config, name) {
    log::debug!("teardown of {name} failed: {err:#}");
  }
}
