use std::path::PathBuf;
use std::process::Command;

use anyhow::{Context, Result};
use log::debug;

use crate::config::JobsConfig;

/// Overrides the tmux server socket. Highest precedence.
pub const SOCKET_ENV: &str = "COUNCIL_JOBS_TMUX_SOCKET";

/// Get the tmux socket path from environment or config.
///
/// Precedence:
/// 1) `$COUNCIL_JOBS_TMUX_SOCKET`
/// 2) `tmux.socket_path` from config
/// 3) `$XDG_RUNTIME_DIR/council-jobs-tmux.sock`
/// 4) `~/.local/run/council-jobs-tmux.sock`
#[must_use]
pub fn tmux_socket_path(cfg: &JobsConfig) -> PathBuf {
  if let Ok(env_path) = std::env::var(SOCKET_ENV)
    && !env_path.trim().is_empty()
  {
    return PathBuf::from(env_path);
  }
  if let Some(ref tmux) = cfg.tmux
    && let Some(ref p) = tmux.socket_path
  {
    return crate::config::expand_home(p);
  }
  if let Ok(xdg_runtime) = std::env::var("XDG_RUNTIME_DIR") {
    return PathBuf::from(xdg_runtime).join("council-jobs-tmux.sock");
  }
  let home = std::env::var("HOME").unwrap_or_else(|_| ".".into());
  PathBuf::from(home).join(".local/run/council-jobs-tmux.sock")
}

/// Get base tmux command arguments with socket path.
#[must_use]
pub fn tmux_args_base(cfg: &JobsConfig) -> Vec<String> {
  let sock = tmux_socket_path(cfg);
  vec!["-S".to_string(), sock.display().to_string()]
}

/// A `tmux` command bound to our dedicated server socket.
pub(super) fn tmux(cfg: &JobsConfig) -> Command {
  let mut cmd = Command::new("tmux");
  cmd.args(tmux_args_base(cfg));
  cmd
}

/// Run a command quietly and return an error with its stderr if it fails.
///
/// # Errors
/// Returns an error if the command fails to spawn or exits with non-zero status.
pub(super) fn run_cmd(cmd: &mut Command) -> Result<()> {
  debug!("run {cmd:?}");
  let output = cmd.output().with_context(|| format!("spawn {cmd:?}"))?;
  if output.status.success() {
    Ok(())
  } else {
    let stderr = String::from_utf8_lossy(&output.stderr);
    anyhow::bail!("command failed: {cmd:?}: {}", stderr.trim())
  }
}

/// Target a session by exact name. Plain names are prefix-matched by tmux,
/// which would confuse `council-..-1` with `council-..-12`.
pub(super) fn exact_target(name: &str) -> String {
  format!("={name}")
}

/// Exact session match for commands taking a window or pane target.
pub(super) fn exact_window_target(name: &str) -> String {
  format!("={name}:")
}
