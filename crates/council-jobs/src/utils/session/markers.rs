//! Reading and writing the small marker files of a session.
//!
//! Writers: only the execution wrapper. Readers: everyone else.

use std::fs;
use std::io::Write as _;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};

pub const COMPLETED_TAG: &str = "COMPLETED";
const EXIT_CODE_KEY: &str = "EXIT_CODE=";

/// Record the wrapper's pid. Written once at wrapper startup.
///
/// # Errors
/// Returns an error if the file cannot be written.
pub fn write_pid(path: &Path, pid: u32) -> Result<()> {
  fs::write(path, format!("{pid}\n")).with_context(|| format!("failed to write {}", path.display()))
}

/// Rewrite the pid file as `<wrapper pid>` then `<payload process group>`,
/// so a sweep can kill the payload even when it ignores hangups.
///
/// # Errors
/// Returns an error if the file cannot be written.
pub fn write_payload_group(path: &Path, pid: u32, pgid: u32) -> Result<()> {
  fs::write(path, format!("{pid}\n{pgid}\n"))
    .with_context(|| format!("failed to write {}", path.display()))
}

/// Wrapper pid from the first line of the pid file.
#[must_use]
pub fn read_pid(path: &Path) -> Option<u32> {
  fs::read_to_string(path).ok()?.lines().next()?.trim().parse().ok()
}

/// Payload process group from the second line, once the payload was spawned.
#[must_use]
pub fn read_payload_group(path: &Path) -> Option<u32> {
  fs::read_to_string(path).ok()?.lines().nth(1)?.trim().parse().ok()
}

/// Record a non-zero payload exit code as `EXIT_CODE=<n>`.
///
/// # Errors
/// Returns an error if the file cannot be written.
pub fn write_exit_code(path: &Path, code: i32) -> Result<()> {
  fs::write(path, format!("{EXIT_CODE_KEY}{code}\n"))
    .with_context(|| format!("failed to write {}", path.display()))
}

/// Raw error marker contents, if present.
#[must_use]
pub fn read_error_marker(path: &Path) -> Option<String> {
  fs::read_to_string(path).ok().map(|s| s.trim().to_string())
}

#[must_use]
pub fn parse_exit_code(marker: &str) -> Option<i32> {
  marker
    .lines()
    .find_map(|l| l.trim().strip_prefix(EXIT_CODE_KEY))
    .and_then(|v| v.trim().parse().ok())
}

/// Write the completion marker `<RFC3339> COMPLETED`.
///
/// The marker is written to a sibling temp file, synced, then renamed into
/// place so a reader never sees a partial marker.
///
/// # Errors
/// Returns an error if the temp file cannot be written or renamed.
pub fn write_done(path: &Path, at: DateTime<Utc>) -> Result<()> {
  let mut tmp = path.as_os_str().to_owned();
  tmp.push(".tmp");
  let tmp = std::path::PathBuf::from(tmp);
  {
    let mut file =
      fs::File::create(&tmp).with_context(|| format!("failed to create {}", tmp.display()))?;
    writeln!(
      file,
      "{} {COMPLETED_TAG}",
      at.to_rfc3339_opts(SecondsFormat::Secs, true)
    )?;
    file.sync_all()?;
  }
  fs::rename(&tmp, path)
    .with_context(|| format!("failed to move {} into place", path.display()))
}

/// Completion timestamp text from a marker, or `None` when the marker is absent.
/// A marker without the tag still counts as completed; the timestamp is then
/// whatever the file holds.
#[must_use]
pub fn read_done(path: &Path) -> Option<String> {
  let raw = fs::read_to_string(path).ok()?;
  let line = raw.lines().next().unwrap_or("").trim();
  let stamp = line
    .strip_suffix(COMPLETED_TAG)
    .map_or(line, str::trim_end)
    .to_string();
  Some(stamp)
}

/// Bytes captured so far. Missing file counts as zero.
#[must_use]
pub fn output_size(path: &Path) -> u64 {
  fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}

/// Whole capture as text. Invalid UTF-8 is replaced, never fatal.
///
/// # Errors
/// Returns an error if the file exists but cannot be read.
pub fn read_output(path: &Path) -> Result<String> {
  match fs::read(path) {
    Ok(bytes) => Ok(String::from_utf8_lossy(&bytes).into_owned()),
    Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
    Err(e) => Err(e).with_context(|| format!("failed to read {}", path.display())),
  }
}

/// The last `n` lines of the capture, joined with newlines.
///
/// # Errors
/// Returns an error if the file exists but cannot be read.
pub fn tail_output(path: &Path, n: usize) -> Result<String> {
  let text = read_output(path)?;
  let lines: Vec<&str> = text.lines().collect();
  let start = lines.len().saturating_sub(n);
  Ok(lines[start..].join("\n"))
}
