use std::collections::BTreeSet;
use std::fs;

use anyhow::{Context, Result};

use crate::config::AppContext;
use crate::utils::tmux;

use super::id::SessionId;
use super::markers;
use super::paths::{SessionPaths, session_id_of_file};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
  Completed {
    completed_at: String,
    output_bytes: u64,
    /// Error marker contents when the payload exited non-zero.
    error: Option<String>,
  },
  Running {
    pid: Option<u32>,
    output_bytes: u64,
    /// The host is still there but its wrapper exited without a completion marker.
    host_exited: bool,
  },
  NotFound,
}

impl SessionState {
  /// A non-zero exit still reads `completed`; the exit code is reported separately.
  #[must_use]
  pub fn label(&self) -> &'static str {
    match self {
      Self::Completed { .. } => "completed",
      Self::Running { .. } => "running",
      Self::NotFound => "not found",
    }
  }
}

/// Point-in-time state of a session. Never mutates anything.
///
/// The completion marker wins over host presence: a finished session stays
/// completed after its host is torn down.
#[must_use]
pub fn inspect(ctx: &AppContext, paths: &SessionPaths) -> SessionState {
  if let Some(completed_at) = markers::read_done(&paths.done()) {
    return SessionState::Completed {
      completed_at,
      output_bytes: markers::output_size(&paths.output()),
      error: markers::read_error_marker(&paths.error()),
    };
  }
  let name = paths.id().as_str();
  if tmux::has_session(&ctx.config, name) {
    return SessionState::Running {
      pid: markers::read_pid(&paths.pid()),
      output_bytes: markers::output_size(&paths.output()),
      host_exited: tmux::pane_dead(&ctx.config, name).unwrap_or(false),
    };
  }
  SessionState::NotFound
}

/// Every session id visible either as a tmux session or as files in the state directory.
///
/// # Errors
/// Returns an error if the state directory cannot be read.
pub fn known_sessions(ctx: &AppContext) -> Result<BTreeSet<SessionId>> {
  let mut ids: BTreeSet<SessionId> = tmux::list_session_names(&ctx.config)?
    .iter()
    .filter_map(|name| SessionId::parse(name).ok())
    .collect();

  if ctx.state_dir.exists() {
    for entry in fs::read_dir(&ctx.state_dir)
      .with_context(|| format!("failed to read {}", ctx.state_dir.display()))?
    {
      if let Some(id) = session_id_of_file(&entry?.path()) {
        ids.insert(id);
      }
    }
  }
  Ok(ids)
}

/// Delete every file of a session, including leftovers of a killed wrapper.
/// Returns how many files were removed.
///
/// # Errors
/// Returns an error if an existing file cannot be removed.
pub fn remove_session_files(paths: &SessionPaths) -> Result<usize> {
  let mut removed = 0usize;
  for path in paths.all() {
    match fs::remove_file(&path) {
      Ok(()) => removed += 1,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
      Err(e) => return Err(e).with_context(|| format!("failed to remove {}", path.display())),
    }
  }
  Ok(removed)
}
