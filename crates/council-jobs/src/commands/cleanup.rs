use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::Args;
use nix::sys::signal::{Signal, killpg};
use nix::unistd::{Pid, getpgid};

use crate::config::AppContext;
use crate::utils::log::t;
use crate::utils::session::{SessionPaths, known_sessions, markers, remove_session_files};
use crate::utils::tmux;
use crate::{log_info, log_success, log_warn};

#[derive(Debug, Args)]
pub struct CleanupArgs {
  /// Remove sessions at least this many hours old
  #[arg(long, value_name = "N")]
  pub hours: Option<u64>,
  /// Remove every session regardless of age
  #[arg(long, conflicts_with = "hours")]
  pub all: bool,
}

/// What a sweep did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
  pub killed_hosts: usize,
  pub killed_payloads: usize,
  pub removed_sessions: usize,
  pub removed_files: usize,
}

pub fn run(ctx: &AppContext, args: &CleanupArgs) -> Result<()> {
  let threshold = if args.all {
    None
  } else {
    let hours = args.hours.unwrap_or(ctx.config.cleanup.max_age_hours);
    Some(Duration::from_secs(hours.saturating_mul(3600)))
  };
  let report = sweep(ctx, threshold, Utc::now())?;
  if report.removed_sessions == 0 {
    log_info!("Nothing to clean up");
  } else {
    log_success!(
      "Removed {} session(s) ({} host(s) and {} payload(s) killed, {} file(s) deleted)",
      report.removed_sessions,
      report.killed_hosts,
      report.killed_payloads,
      report.removed_files
    );
  }
  Ok(())
}

/// Kill and delete every session whose id is at least `threshold` old at `now`.
/// `None` sweeps everything.
///
/// Hosts are killed without a grace period, so a payload caught mid-run
/// leaves no completion marker. A payload still running gets SIGKILL on its
/// process group after its host is gone; it never sees the host's hangup.
/// Ids that do not parse are never touched.
///
/// # Errors
/// Returns an error if the state directory cannot be listed or a session
/// file cannot be removed.
pub fn sweep(
  ctx: &AppContext,
  threshold: Option<Duration>,
  now: DateTime<Utc>,
) -> Result<SweepReport> {
  let live = tmux::list_session_names(&ctx.config)?;
  let mut report = SweepReport::default();

  for id in known_sessions(ctx)? {
    let Some(created) = id.created_at() else {
      continue;
    };
    if let Some(threshold) = threshold {
      // Ids stamped in the future count as brand new.
      let age = (now - created).to_std().unwrap_or_default();
      if age < threshold {
        continue;
      }
    }

    let paths = SessionPaths::new(&ctx.state_dir, id.clone());
    if live.iter().any(|name| name == id.as_str()) {
      match tmux::kill_session(&ctx.config, id.as_str()) {
        Ok(()) => report.killed_hosts += 1,
        Err(err) => log_warn!("Failed to kill host {}: {err:#}", id),
      }
    }
    if markers::read_done(&paths.done()).is_none() && kill_payload_group(&paths) {
      report.killed_payloads += 1;
    }
    let removed = remove_session_files(&paths)?;
    report.removed_files += removed;
    report.removed_sessions += 1;
    log_info!("Removed {}", t::id(&id));
  }
  Ok(report)
}

/// SIGKILL the process group recorded in the pid file. Returns whether a
/// signal was sent.
fn kill_payload_group(paths: &SessionPaths) -> bool {
  let Some(raw) = markers::read_payload_group(&paths.pid()).and_then(|g| i32::try_from(g).ok())
  else {
    return false;
  };
  // 0 and 1 would hit our own group or init.
  if raw <= 1 {
    return false;
  }
  let pgid = Pid::from_raw(raw);
  // Stale pid files may name a group that is gone or now led by someone else.
  if getpgid(Some(pgid)) != Ok(pgid) {
    return false;
  }
  match killpg(pgid, Signal::SIGKILL) {
    Ok(()) => true,
    Err(err) => {
      log_warn!("Failed to kill payload group {raw}: {err}");
      false
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::{JobsConfig, TmuxConfig};
  use crate::utils::session::SessionId;
  use chrono::TimeZone as _;
  use serial_test::serial;

  fn ctx(dir: &std::path::Path) -> AppContext {
    let state_dir = dir.join("state");
    std::fs::create_dir_all(&state_dir).unwrap();
    AppContext {
      config: JobsConfig {
        tmux: Some(TmuxConfig {
          socket_path: Some(dir.join("absent.sock").display().to_string()),
        }),
        ..Default::default()
      },
      state_dir,
      cwd: dir.to_path_buf(),
    }
  }

  fn seed(ctx: &AppContext, raw: &str) -> SessionPaths {
    let paths = SessionPaths::new(&ctx.state_dir, SessionId::parse(raw).expect("id"));
    std::fs::write(paths.output(), "out").unwrap();
    std::fs::write(paths.done(), "2026-10-16T00:00:00Z COMPLETED\n").unwrap();
    std::fs::write(paths.pid(), "42\n").unwrap();
    paths
  }

  #[test]
  #[serial]
  fn sweeps_only_sessions_past_the_threshold() {
    let dir = tempfile::tempdir().expect("tmp");
    let ctx = ctx(dir.path());
    let old = seed(&ctx, "council-20261014-080000-1");
    let fresh = seed(&ctx, "council-20261016-080000-2");
    std::fs::write(old.secret(), "leftover").unwrap();

    let now = Utc.with_ymd_and_hms(2026, 10, 16, 9, 0, 0).unwrap();
    let report = sweep(&ctx, Some(Duration::from_secs(24 * 3600)), now).expect("sweep");
    assert_eq!(
      report,
      SweepReport {
        killed_hosts: 0,
        killed_payloads: 0,
        removed_sessions: 1,
        removed_files: 4,
      }
    );
    assert!(!old.any_exists());
    assert!(fresh.done().exists());
  }

  #[test]
  #[serial]
  fn sweep_all_empties_the_state_dir_but_ignores_foreign_files() {
    let dir = tempfile::tempdir().expect("tmp");
    let ctx = ctx(dir.path());
    seed(&ctx, "council-20261016-085959-3");
    seed(&ctx, "council-20261016-085959-3-2");
    std::fs::write(ctx.state_dir.join("notes.txt"), "keep").unwrap();

    let now = Utc.with_ymd_and_hms(2026, 10, 16, 9, 0, 0).unwrap();
    let report = sweep(&ctx, None, now).expect("sweep");
    assert_eq!(report.removed_sessions, 2);
    assert!(known_sessions(&ctx).expect("list").is_empty());
    assert!(ctx.state_dir.join("notes.txt").exists());
  }

  #[test]
  #[serial]
  fn zero_threshold_includes_sessions_from_this_second() {
    let dir = tempfile::tempdir().expect("tmp");
    let ctx = ctx(dir.path());
    let paths = seed(&ctx, "council-20261016-090000-4");
    let now = Utc.with_ymd_and_hms(2026, 10, 16, 9, 0, 0).unwrap();
    let report = sweep(&ctx, Some(Duration::ZERO), now).expect("sweep");
    assert_eq!(report.removed_sessions, 1);
    assert!(!paths.any_exists());
  }

  #[test]
  #[serial]
  fn unfinished_payload_ignoring_hangups_is_killed() {
    use std::os::unix::process::{CommandExt as _, ExitStatusExt as _};

    let dir = tempfile::tempdir().expect("tmp");
    let ctx = ctx(dir.path());
    let paths = SessionPaths::new(
      &ctx.state_dir,
      SessionId::parse("council-20261016-080000-5").expect("id"),
    );
    let mut child = std::process::Command::new("/bin/sh")
      .arg("-c")
      .arg("trap '' HUP; sleep 30")
      .process_group(0)
      .spawn()
      .expect("spawn");
    std::fs::write(paths.output(), "started\n").unwrap();
    markers::write_payload_group(&paths.pid(), std::process::id(), child.id()).unwrap();

    let now = Utc.with_ymd_and_hms(2026, 10, 16, 9, 0, 0).unwrap();
    let report = sweep(&ctx, None, now).expect("sweep");
    assert_eq!(report.killed_payloads, 1);
    assert_eq!(report.removed_sessions, 1);
    let status = child.wait().expect("wait");
    assert_eq!(status.signal(), Some(9));
    assert!(!paths.any_exists());
  }

  #[test]
  #[serial]
  fn completed_session_group_is_left_alone() {
    let dir = tempfile::tempdir().expect("tmp");
    let ctx = ctx(dir.path());
    let paths = seed(&ctx, "council-20261016-080000-6");
    let mut child = std::process::Command::new("/bin/sh")
      .arg("-c")
      .arg("sleep 30")
      .spawn()
      .expect("spawn");
    markers::write_payload_group(&paths.pid(), std::process::id(), child.id()).unwrap();

    let now = Utc.with_ymd_and_hms(2026, 10, 16, 9, 0, 0).unwrap();
    let report = sweep(&ctx, None, now).expect("sweep");
    assert_eq!(report.killed_payloads, 0);
    assert!(child.try_wait().expect("try_wait").is_none());
    child.kill().unwrap();
    let _ = child.wait();
  }
}
