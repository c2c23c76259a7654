use std::fmt;
use std::sync::OnceLock;

use chrono::{DateTime, NaiveDateTime, Utc};
use regex::Regex;

use crate::error::JobError;

pub const SESSION_PREFIX: &str = "council";

const STAMP_FORMAT: &str = "%Y%m%d-%H%M%S";

fn id_regex() -> &'static Regex {
  static ID_RE: OnceLock<Regex> = OnceLock::new();
  ID_RE.get_or_init(|| {
    Regex::new(r"^council-(\d{8}-\d{6})-(\d+)(?:-(\d+))?$").expect("valid session id regex")
  })
}

/// Session identifier: `council-<YYYYMMDD>-<HHMMSS>-<pid>[-<n>]`.
///
/// The timestamp is UTC at second granularity. The optional `-<n>` suffix is
/// only used when a launcher allocates more than one id in the same second.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionId(String);

impl SessionId {
  #[must_use]
  pub fn generate(now: DateTime<Utc>, pid: u32) -> Self {
    Self(format!(
      "{SESSION_PREFIX}-{}-{pid}",
      now.format(STAMP_FORMAT)
    ))
  }

  /// Variant of this id carrying the collision counter `n` (n >= 2).
  #[must_use]
  pub fn with_suffix(&self, n: u32) -> Self {
    let caps = id_regex().captures(&self.0);
    match caps {
      Some(c) => Self(format!("{SESSION_PREFIX}-{}-{}-{n}", &c[1], &c[2])),
      None => Self(format!("{}-{n}", self.0)),
    }
  }

  /// Validate untrusted input. Ids become file names, so anything not
  /// matching the exact shape is rejected.
  ///
  /// # Errors
  /// Returns [`JobError::InvalidSession`] for malformed ids.
  pub fn parse(raw: &str) -> Result<Self, JobError> {
    let raw = raw.trim();
    if id_regex().is_match(raw) {
      Ok(Self(raw.to_string()))
    } else {
      Err(JobError::InvalidSession(raw.to_string()))
    }
  }

  /// Creation time recovered from the id itself.
  #[must_use]
  pub fn created_at(&self) -> Option<DateTime<Utc>> {
    let caps = id_regex().captures(&self.0)?;
    NaiveDateTime::parse_from_str(&caps[1], STAMP_FORMAT)
      .ok()
      .map(|naive| naive.and_utc())
  }

  #[must_use]
  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl fmt::Display for SessionId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}
