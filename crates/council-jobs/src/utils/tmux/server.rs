use std::process::Stdio;

use anyhow::{Context, Result};

use crate::config::JobsConfig;

use super::common::{tmux, tmux_socket_path};

/// Ensure the socket directory exists with proper permissions (0700).
///
/// # Errors
/// Returns an error if the directory cannot be created or permissions cannot be set.
fn ensure_socket_directory(cfg: &JobsConfig) -> Result<()> {
  use std::os::unix::fs::PermissionsExt;

  let sock = tmux_socket_path(cfg);
  let Some(dir) = sock.parent() else {
    return Ok(());
  };

  std::fs::create_dir_all(dir)
    .with_context(|| format!("failed to create socket directory: {}", dir.display()))?;

  std::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o700))
    .with_context(|| format!("failed to set permissions on socket directory: {}", dir.display()))?;

  Ok(())
}

/// Whether a tmux server answers on our socket.
pub(super) fn is_server_responsive(cfg: &JobsConfig) -> bool {
  tmux(cfg)
    .arg("list-sessions")
    .stdout(Stdio::null())
    .stderr(Stdio::null())
    .status()
    .is_ok_and(|st| st.success())
}

/// Remove a stale socket file left behind by a server that is gone.
/// Best-effort.
fn cleanup_stale_socket(cfg: &JobsConfig) {
  let sock = tmux_socket_path(cfg);
  if sock.exists() && !is_server_responsive(cfg) {
    let _ = std::fs::remove_file(&sock);
  }
}

/// Prepare the socket location before the first `new-session`, which starts
/// the server on demand.
///
/// # Errors
/// Returns an error if tmux is not installed or the socket directory cannot be prepared.
pub fn prepare_server(cfg: &JobsConfig) -> Result<()> {
  crate::utils::which::require("tmux")?;
  ensure_socket_directory(cfg)?;
  cleanup_stale_socket(cfg);
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::TmuxConfig;
  use serial_test::serial;
  use std::os::unix::fs::PermissionsExt as _;

  #[test]
  #[serial]
  fn socket_directory_is_private() {
    let dir = tempfile::tempdir().expect("tmp");
    let sock = dir.path().join("run").join("jobs.sock");
    let cfg = JobsConfig {
      tmux: Some(TmuxConfig {
        socket_path: Some(sock.display().to_string()),
      }),
      ..Default::default()
    };
    ensure_socket_directory(&cfg).expect("create");
    let mode = std::fs::metadata(dir.path().join("run"))
      .unwrap()
      .permissions()
      .mode();
    assert_eq!(mode & 0o777, 0o700);
  }
}
