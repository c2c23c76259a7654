use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::Write as _;
use std::os::unix::fs::OpenOptionsExt as _;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::config::{PayloadConfig, expand_home};
use crate::error::JobError;
use crate::log_warn;

/// Dotenv file looked up in the working directory of `start`.
pub const DOTENV_FILE: &str = ".env";

/// API credential handed to the payload. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
  pub fn new(value: impl Into<String>) -> Self {
    Self(value.into())
  }

  #[must_use]
  pub fn expose(&self) -> &str {
    &self.0
  }
}

impl fmt::Debug for Secret {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str("Secret(***)")
  }
}

#[derive(Debug, Default, Deserialize)]
struct SecretStore {
  #[serde(default)]
  api_key: Option<String>,
}

/// Look up the credential. First non-empty value wins: the environment
/// variable, then the same key in `<cwd>/.env`, then the YAML store.
///
/// The `.env` file is only read, never exported into the process environment.
///
/// # Errors
/// Returns [`JobError::MissingCredential`] when no source has a value, or
/// an error if the store exists but is not valid YAML.
pub fn load_credential(cfg: &PayloadConfig, cwd: &Path) -> Result<Secret> {
  if let Ok(value) = std::env::var(&cfg.secret_env)
    && !value.trim().is_empty()
  {
    return Ok(Secret::new(value.trim()));
  }

  if let Some(value) = dotenv_value(&cwd.join(DOTENV_FILE), &cfg.secret_env)
    && !value.trim().is_empty()
  {
    return Ok(Secret::new(value.trim()));
  }

  let store = expand_home(&cfg.secret_store);
  if store.exists() {
    let data =
      fs::read_to_string(&store).with_context(|| format!("failed to read {}", store.display()))?;
    if !data.trim().is_empty() {
      let parsed: SecretStore = serde_yaml::from_str(&data)
        .with_context(|| format!("invalid YAML in {}", store.display()))?;
      if let Some(key) = parsed.api_key
        && !key.trim().is_empty()
      {
        return Ok(Secret::new(key.trim()));
      }
    }
  }

  Err(
    JobError::MissingCredential {
      env: cfg.secret_env.clone(),
      store: cfg.secret_store.clone(),
    }
    .into(),
  )
}

/// Last value of `key` in a dotenv file. A malformed file is skipped with a warning.
fn dotenv_value(path: &Path, key: &str) -> Option<String> {
  if !path.is_file() {
    return None;
  }
  let entries = match dotenvy::from_path_iter(path) {
    Ok(entries) => entries,
    Err(err) => {
      log_warn!("Ignoring {}: {err}", path.display());
      return None;
    }
  };
  let mut found = None;
  for entry in entries {
    match entry {
      Ok((k, v)) if k == key => found = Some(v),
      Ok(_) => {}
      Err(err) => {
        log_warn!("Ignoring {}: {err}", path.display());
        return None;
      }
    }
  }
  found
}

/// Write the secret to a new file that is owner-only from the moment it exists.
///
/// # Errors
/// Returns an error if the file already exists or cannot be written.
pub fn write_secret_file(path: &Path, secret: &Secret) -> Result<()> {
  let mut file = OpenOptions::new()
    .write(true)
    .create_new(true)
    .mode(0o600)
    .open(path)
    .with_context(|| format!("failed to create {}", path.display()))?;
  file
    .write_all(secret.expose().as_bytes())
    .with_context(|| format!("failed to write {}", path.display()))?;
  file.sync_all()?;
  Ok(())
}

/// Read the secret back, ignoring a trailing newline.
///
/// # Errors
/// Returns an error if the file cannot be read or is empty.
pub fn read_secret_file(path: &Path) -> Result<Secret> {
  let raw = fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
  let value = raw.trim_end_matches(['\r', '\n']);
  if value.is_empty() {
    anyhow::bail!("secret file {} is empty", path.display());
  }
  Ok(Secret::new(value))
}
