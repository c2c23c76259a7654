use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use owo_colors::OwoColorize as _;
use serde::Deserialize;
use toml::Value as TomlValue;

/// Known top-level config keys.
const KNOWN_TOP_LEVEL_KEYS: &[&str] = &["state_dir", "payload", "tmux", "wait", "cleanup"];

/// Known keys within `[payload]`.
const KNOWN_PAYLOAD_KEYS: &[&str] = &["cmd", "file_flag", "secret_env", "secret_store"];

/// Known keys within `[tmux]`.
const KNOWN_TMUX_KEYS: &[&str] = &["socket_path"];

/// Known keys within `[wait]`.
const KNOWN_WAIT_KEYS: &[&str] = &["timeout_secs", "poll_secs", "tail_lines"];

/// Known keys within `[cleanup]`.
const KNOWN_CLEANUP_KEYS: &[&str] = &["max_age_hours"];

/// Overrides the directory holding session files.
pub const STATE_DIR_ENV: &str = "COUNCIL_JOBS_STATE_DIR";

/// Overrides the payload argv. Split with shell quoting rules.
pub const PAYLOAD_ENV: &str = "COUNCIL_JOBS_PAYLOAD";

const XDG_PREFIX: &str = "council-jobs";
const CONFIG_FILE: &str = "config.toml";

// Embed repository defaults
const DEFAULT_TOML: &str =
  include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/defaults/council-jobs.toml"));

#[derive(Debug, Clone, Deserialize)]
pub struct PayloadConfig {
  /// Program and leading arguments of the payload command.
  #[serde(default)]
  pub cmd: Vec<String>,
  /// Flag placed before every auxiliary file path.
  #[serde(default = "default_file_flag")]
  pub file_flag: String,
  /// Environment variable carrying the credential, both for lookup and for the payload.
  #[serde(default = "default_secret_env")]
  pub secret_env: String,
  /// YAML file with an `api_key` entry, consulted when the env var is unset.
  #[serde(default = "default_secret_store")]
  pub secret_store: String,
}

impl Default for PayloadConfig {
  fn default() -> Self {
    Self {
      cmd: vec!["small-council".to_string()],
      file_flag: default_file_flag(),
      secret_env: default_secret_env(),
      secret_store: default_secret_store(),
    }
  }
}

fn default_file_flag() -> String {
  "--file".to_string()
}

fn default_secret_env() -> String {
  "OPENROUTER_API_KEY".to_string()
}

fn default_secret_store() -> String {
  "~/.small-council.yaml".to_string()
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TmuxConfig {
  #[serde(default)]
  pub socket_path: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WaitConfig {
  #[serde(default = "default_timeout_secs")]
  pub timeout_secs: u64,
  #[serde(default = "default_poll_secs")]
  pub poll_secs: u64,
  /// Lines of output shown when a wait times out.
  #[serde(default = "default_tail_lines")]
  pub tail_lines: usize,
}

impl Default for WaitConfig {
  fn default() -> Self {
    Self {
      timeout_secs: default_timeout_secs(),
      poll_secs: default_poll_secs(),
      tail_lines: default_tail_lines(),
    }
  }
}

fn default_timeout_secs() -> u64 {
  1800
}

fn default_poll_secs() -> u64 {
  5
}

fn default_tail_lines() -> usize {
  50
}

#[derive(Debug, Clone, Deserialize)]
pub struct CleanupConfig {
  #[serde(default = "default_max_age_hours")]
  pub max_age_hours: u64,
}

impl Default for CleanupConfig {
  fn default() -> Self {
    Self {
      max_age_hours: default_max_age_hours(),
    }
  }
}

fn default_max_age_hours() -> u64 {
  24
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct JobsConfig {
  /// Directory for session files. Defaults to `$XDG_STATE_HOME/council-jobs/sessions`.
  #[serde(default)]
  pub state_dir: Option<String>,
  #[serde(default)]
  pub payload: PayloadConfig,
  #[serde(default)]
  pub tmux: Option<TmuxConfig>,
  #[serde(default)]
  pub wait: WaitConfig,
  #[serde(default)]
  pub cleanup: CleanupConfig,
}

impl JobsConfig {
  /// Resolve the payload argv with precedence: `$COUNCIL_JOBS_PAYLOAD` -> `payload.cmd`.
  ///
  /// # Errors
  /// Returns an error if the resolved argv is empty or the env var cannot be split.
  pub fn payload_argv(&self) -> Result<Vec<String>> {
    if let Ok(raw) = std::env::var(PAYLOAD_ENV)
      && !raw.trim().is_empty()
    {
      let tokens = shell_words::split(raw.trim())
        .with_context(|| format!("invalid {PAYLOAD_ENV}: {raw}"))?;
      if !tokens.is_empty() {
        return Ok(tokens);
      }
    }
    if self.payload.cmd.is_empty() || self.payload.cmd[0].trim().is_empty() {
      anyhow::bail!("payload.cmd not defined or empty");
    }
    Ok(self.payload.cmd.clone())
  }

  /// Resolve the state directory with precedence:
  /// 1) `$COUNCIL_JOBS_STATE_DIR`
  /// 2) `state_dir` from config
  /// 3) `$XDG_STATE_HOME/council-jobs/sessions`
  /// 4) `~/.local/state/council-jobs/sessions`
  #[must_use]
  pub fn state_dir(&self) -> PathBuf {
    if let Ok(dir) = std::env::var(STATE_DIR_ENV)
      && !dir.trim().is_empty()
    {
      return PathBuf::from(dir);
    }
    if let Some(dir) = &self.state_dir {
      return expand_home(dir);
    }
    let xdg = xdg::BaseDirectories::with_prefix(XDG_PREFIX);
    if let Some(state_home) = xdg.get_state_home() {
      return state_home.join("sessions");
    }
    expand_home("~/.local/state/council-jobs/sessions")
  }

  #[must_use]
  pub fn poll_interval(&self) -> Duration {
    Duration::from_secs(self.wait.poll_secs.max(1))
  }

  #[must_use]
  pub fn wait_timeout(&self) -> Duration {
    Duration::from_secs(self.wait.timeout_secs)
  }
}

/// Expand a leading `~/` using `$HOME`.
#[must_use]
pub fn expand_home(raw: &str) -> PathBuf {
  if let Some(rest) = raw.strip_prefix("~/") {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".into());
    return PathBuf::from(home).join(rest);
  }
  PathBuf::from(raw)
}

/// Resolved configuration plus the locations every command operates on.
#[derive(Debug, Clone)]
pub struct AppContext {
  pub config: JobsConfig,
  pub state_dir: PathBuf,
  pub cwd: PathBuf,
}

impl AppContext {
  /// Resolve the state directory without touching the filesystem; only
  /// `start` creates it.
  #[must_use]
  pub fn new(config: JobsConfig, cwd: PathBuf) -> Self {
    let state_dir = config.state_dir();
    Self {
      config,
      state_dir,
      cwd,
    }
  }
}

fn merge_values(base: &mut TomlValue, overlay: TomlValue) {
  match (base, overlay) {
    (TomlValue::Table(base_tbl), TomlValue::Table(overlay_tbl)) => {
      for (k, v) in overlay_tbl {
        match base_tbl.get_mut(&k) {
          Some(existing) => merge_values(existing, v),
          None => {
            base_tbl.insert(k, v);
          }
        }
      }
    }
    // Arrays and scalars: replace last-wins
    (base_slot, new_v) => *base_slot = new_v,
  }
}

fn warn_unknown_in(section: &str, table: &toml::Table, known: &[&str], file_path: &Path) {
  for key in table.keys() {
    if !known.contains(&key.as_str()) {
      eprintln!(
        "{}: unknown config key '{}.{}' in {} (known keys: {})",
        "warning".yellow(),
        section,
        key,
        file_path.display(),
        known.join(", ")
      );
    }
  }
}

/// Warn about unknown keys so typos do not silently fall back to defaults.
fn warn_unknown_keys(val: &TomlValue, file_path: &Path) {
  let TomlValue::Table(table) = val else {
    return;
  };

  for key in table.keys() {
    if !KNOWN_TOP_LEVEL_KEYS.contains(&key.as_str()) {
      eprintln!(
        "{}: unknown config key '{}' in {} (did you mean one of: {}?)",
        "warning".yellow(),
        key,
        file_path.display(),
        KNOWN_TOP_LEVEL_KEYS.join(", ")
      );
    }
  }

  let sections: [(&str, &[&str]); 4] = [
    ("payload", KNOWN_PAYLOAD_KEYS),
    ("tmux", KNOWN_TMUX_KEYS),
    ("wait", KNOWN_WAIT_KEYS),
    ("cleanup", KNOWN_CLEANUP_KEYS),
  ];
  for (section, known) in sections {
    if let Some(TomlValue::Table(sub)) = table.get(section) {
      warn_unknown_in(section, sub, known, file_path);
    }
  }
}

/// Load embedded defaults and merge the global XDG config on top.
///
/// # Errors
/// Returns an error if the global config cannot be read or is not valid TOML.
pub fn load_config() -> Result<JobsConfig> {
  let xdg = xdg::BaseDirectories::with_prefix(XDG_PREFIX);
  load_config_from(xdg.find_config_file(CONFIG_FILE).as_deref())
}

/// Same as [`load_config`] but with an explicit global config file.
///
/// # Errors
/// Returns an error if the file cannot be read or is not valid TOML.
pub fn load_config_from(global: Option<&Path>) -> Result<JobsConfig> {
  let mut merged: TomlValue =
    toml::from_str(DEFAULT_TOML).context("invalid embedded default config")?;

  if let Some(path) = global
    && path.exists()
  {
    let data =
      fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    let val: TomlValue =
      toml::from_str(&data).with_context(|| format!("invalid TOML in {}", path.display()))?;
    warn_unknown_keys(&val, path);
    merge_values(&mut merged, val);
  }

  let merged_str = toml::to_string(&merged).context("failed to serialize merged config")?;
  let cfg: JobsConfig = toml::from_str(&merged_str).context("failed to parse merged config")?;
  Ok(cfg)
}
