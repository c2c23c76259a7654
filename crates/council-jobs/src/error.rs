//! Domain errors that select a process exit code.
//!
//! Everything else travels as `anyhow::Error` with context attached. Payload
//! failures are never represented here: they are recorded in the session's
//! error marker instead.

use thiserror::Error;

/// Exit code for "session not found" and "timed out".
pub const EXIT_NOT_FOUND_OR_TIMEOUT: i32 = 2;

/// Exit code for "still running".
pub const EXIT_RUNNING: i32 = 1;

/// Exit code for input errors, launch errors and anything unclassified.
pub const EXIT_FAILURE: i32 = 1;

#[derive(Debug, Error)]
pub enum JobError {
  #[error("no prompt provided: pass --prompt <TEXT> or --prompt-file <PATH>")]
  MissingPrompt,
  #[error("API key required. Set {env} (environment or ./.env) or add api_key to {store}")]
  MissingCredential { env: String, store: String },
  #[error("invalid session id: {0}")]
  InvalidSession(String),
  #[error("failed to launch session {id}: {reason}")]
  Launch { id: String, reason: String },
  #[error("session not found: {0}")]
  NotFound(String),
  #[error("timed out after {secs}s waiting for {id}; the session is still running")]
  Timeout { id: String, secs: u64 },
}

impl JobError {
  #[must_use]
  pub fn exit_code(&self) -> i32 {
    match self {
      Self::NotFound(_) | Self::Timeout { .. } => EXIT_NOT_FOUND_OR_TIMEOUT,
      Self::MissingPrompt
      | Self::MissingCredential { .. }
      | Self::InvalidSession(_)
      | Self::Launch { .. } => EXIT_FAILURE,
    }
  }
}

/// Map any error onto the CLI exit code contract. Unknown errors exit with 1.
#[must_use]
pub fn exit_code_for(err: &anyhow::Error) -> i32 {
  err.downcast_ref::<JobError>().map_or(EXIT_FAILURE, JobError::exit_code)
}
