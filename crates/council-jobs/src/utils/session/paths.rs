use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::id::SessionId;

const OUTPUT_EXT: &str = "out";
const DONE_EXT: &str = "done";
const PID_EXT: &str = "pid";
const ERROR_EXT: &str = "error";
const SECRET_EXT: &str = "secret";
const PROMPT_EXT: &str = "prompt";
const ARGS_EXT: &str = "args";
/// Staging name of the done marker; left behind if the wrapper dies mid-rename.
const DONE_TMP_EXT: &str = "done.tmp";

/// Every extension a session may leave in the state directory.
pub const SESSION_EXTENSIONS: &[&str] = &[
  OUTPUT_EXT,
  DONE_EXT,
  PID_EXT,
  ERROR_EXT,
  SECRET_EXT,
  PROMPT_EXT,
  ARGS_EXT,
  DONE_TMP_EXT,
];

/// Files making up one session record, all named `<id>.<ext>` in the state directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionPaths {
  dir: PathBuf,
  id: SessionId,
}

impl SessionPaths {
  pub fn new(dir: impl Into<PathBuf>, id: SessionId) -> Self {
    Self {
      dir: dir.into(),
      id,
    }
  }

  #[must_use]
  pub fn id(&self) -> &SessionId {
    &self.id
  }

  fn file(&self, ext: &str) -> PathBuf {
    self.dir.join(format!("{}.{ext}", self.id))
  }

  #[must_use]
  pub fn output(&self) -> PathBuf {
    self.file(OUTPUT_EXT)
  }

  #[must_use]
  pub fn done(&self) -> PathBuf {
    self.file(DONE_EXT)
  }

  /// Where the done marker is staged before the rename.
  #[must_use]
  pub fn done_tmp(&self) -> PathBuf {
    self.file(DONE_TMP_EXT)
  }

  #[must_use]
  pub fn pid(&self) -> PathBuf {
    self.file(PID_EXT)
  }

  #[must_use]
  pub fn error(&self) -> PathBuf {
    self.file(ERROR_EXT)
  }

  #[must_use]
  pub fn secret(&self) -> PathBuf {
    self.file(SECRET_EXT)
  }

  #[must_use]
  pub fn prompt(&self) -> PathBuf {
    self.file(PROMPT_EXT)
  }

  #[must_use]
  pub fn args(&self) -> PathBuf {
    self.file(ARGS_EXT)
  }

  /// Files only the launcher writes and the wrapper consumes.
  #[must_use]
  pub fn transient(&self) -> [PathBuf; 3] {
    [self.secret(), self.prompt(), self.args()]
  }

  #[must_use]
  pub fn all(&self) -> Vec<PathBuf> {
    SESSION_EXTENSIONS.iter().map(|ext| self.file(ext)).collect()
  }

  #[must_use]
  pub fn any_exists(&self) -> bool {
    self.all().iter().any(|p| p.exists())
  }

  #[must_use]
  pub fn descriptor(&self) -> SessionDescriptor {
    SessionDescriptor {
      session: self.id.to_string(),
      output: self.output(),
      done: self.done(),
      pid_file: self.pid(),
      error_file: self.error(),
    }
  }
}

/// What `start` prints and what the other commands need to find a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescriptor {
  pub session: String,
  pub output: PathBuf,
  pub done: PathBuf,
  pub pid_file: PathBuf,
  pub error_file: PathBuf,
}

/// The session id a state-directory file belongs to, if it is one of ours.
#[must_use]
pub fn session_id_of_file(path: &Path) -> Option<SessionId> {
  let name = path.file_name()?.to_str()?;
  SESSION_EXTENSIONS.iter().find_map(|ext| {
    let stem = name.strip_suffix(ext)?.strip_suffix('.')?;
    SessionId::parse(stem).ok()
  })
}
