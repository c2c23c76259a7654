use std::ffi::OsStr;
use std::path::Path;
use std::process::Stdio;

use anyhow::{Context, Result};
use log::debug;

use crate::config::JobsConfig;

use super::common::{exact_target, exact_window_target, run_cmd, tmux};
use super::server::prepare_server;

/// Start a detached tmux session named `name` running `program args...`.
///
/// The program and its arguments are handed to tmux as separate argv entries,
/// which tmux executes directly without a shell. The pane stays around after
/// the program exits so the output remains attachable until someone tears
/// the session down.
///
/// # Errors
/// Returns an error if tmux is missing or `new-session` fails.
pub fn start_session<I, S>(
  cfg: &JobsConfig,
  name: &str,
  cwd: &Path,
  program: &Path,
  args: I,
) -> Result<()>
where
  I: IntoIterator<Item = S>,
  S: AsRef<OsStr>,
{
  prepare_server(cfg)?;
  let mut cmd = tmux(cfg);
  cmd
    .arg("new-session")
    .arg("-d")
    .arg("-s")
    .arg(name)
    .arg("-c")
    .arg(cwd)
    .arg(program)
    .args(args)
    .stdin(Stdio::null());
  run_cmd(&mut cmd).context("tmux new-session failed")?;

  // The wrapper may already be done; a vanished session is not an error here.
  if let Err(err) = run_cmd(
    tmux(cfg)
      .arg("set-option")
      .arg("-w")
      .arg("-t")
      .arg(exact_window_target(name))
      .arg("remain-on-exit")
      .arg("on"),
  ) {
    debug!("set remain-on-exit for {name}: {err:#}");
  }
  Ok(())
}

/// Whether a session with exactly this name exists on our server.
/// A missing tmux binary or server counts as "no".
#[must_use]
pub fn has_session(cfg: &JobsConfig, name: &str) -> bool {
  tmux(cfg)
    .arg("has-session")
    .arg("-t")
    .arg(exact_target(name))
    .stdout(Stdio::null())
    .stderr(Stdio::null())
    .status()
    .is_ok_and(|st| st.success())
}

/// Kill a session and every process in it. No graceful shutdown is attempted.
///
/// # Errors
/// Returns an error if the tmux command fails, including when the session does not exist.
pub fn kill_session(cfg: &JobsConfig, name: &str) -> Result<()> {
  run_cmd(
    tmux(cfg)
      .arg("kill-session")
      .arg("-t")
      .arg(exact_target(name)),
  )
}

/// Names of all sessions on our server. Empty when tmux or the server is absent.
///
/// # Errors
/// Returns an error only if tmux exists but cannot be spawned for another reason.
pub fn list_session_names(cfg: &JobsConfig) -> Result<Vec<String>> {
  let output = tmux(cfg)
    .arg("list-sessions")
    .arg("-F")
    .arg("#{session_name}")
    .stdin(Stdio::null())
    .output();
  let output = match output {
    Ok(o) => o,
    Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
    Err(e) => return Err(e).context("tmux list-sessions failed"),
  };
  if !output.status.success() {
    return Ok(Vec::new());
  }
  Ok(
    String::from_utf8_lossy(&output.stdout)
      .lines()
      .map(str::trim)
      .filter(|l| !l.is_empty())
      .map(ToString::to_string)
      .collect(),
  )
}

/// Check if the session's pane has exited (kept around by `remain-on-exit`).
///
/// # Errors
/// Returns an error if tmux cannot be spawned.
pub fn pane_dead(cfg: &JobsConfig, name: &str) -> Result<bool> {
  let out = tmux(cfg)
    .arg("list-panes")
    .arg("-F")
    .arg("#{pane_dead}")
    .arg("-t")
    .arg(exact_window_target(name))
    .output()
    .context("tmux list-panes failed")?;
  if !out.status.success() {
    return Ok(false);
  }
  let s = String::from_utf8_lossy(&out.stdout);
  Ok(s.lines().any(|l| l.trim() == "1"))
}
