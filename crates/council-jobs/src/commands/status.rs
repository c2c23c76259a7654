use std::io::Write;

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::Args;

use crate::config::AppContext;
use crate::error::{EXIT_RUNNING, JobError};
use crate::log_warn;
use crate::utils::log::t;
use crate::utils::session::{SessionId, SessionPaths, SessionState, inspect, known_sessions, markers};
use crate::utils::term::{format_age, print_table};

#[derive(Debug, Args)]
pub struct StatusArgs {
  /// Session id printed by `start`
  #[arg(required_unless_present = "list", conflicts_with = "list")]
  pub session: Option<String>,
  /// List every known session
  #[arg(long)]
  pub list: bool,
}

pub fn run(ctx: &AppContext, args: &StatusArgs) -> Result<i32> {
  if args.list {
    let rows = list_rows(ctx, Utc::now())?;
    if rows.is_empty() {
      log_warn!("No sessions found");
    } else {
      print_table(&["SESSION", "STATUS", "AGE", "OUTPUT"], &rows);
    }
    return Ok(0);
  }

  let raw = args.session.as_deref().unwrap_or_default();
  let id = SessionId::parse(raw)?;
  let paths = SessionPaths::new(&ctx.state_dir, id.clone());
  let state = inspect(ctx, &paths);
  let mut stdout = anstream::stdout();
  describe(&id, &state, &mut stdout)?;

  match state {
    SessionState::Completed { .. } => Ok(0),
    SessionState::Running { host_exited, .. } => {
      if host_exited {
        log_warn!(
          "The wrapper of {} exited without a completion marker; run `council-jobs cleanup` to remove it",
          id
        );
      }
      Ok(EXIT_RUNNING)
    }
    SessionState::NotFound => Err(JobError::NotFound(id.to_string()).into()),
  }
}

/// Key/value report of one session.
fn describe(id: &SessionId, state: &SessionState, out: &mut dyn Write) -> Result<()> {
  writeln!(out, "session: {id}")?;
  writeln!(out, "status: {}", state.label())?;
  match state {
    SessionState::Completed {
      completed_at,
      output_bytes,
      error,
    } => {
      writeln!(out, "completed_at: {completed_at}")?;
      writeln!(out, "output_bytes: {output_bytes}")?;
      if let Some(marker) = error {
        let code = markers::parse_exit_code(marker)
          .map_or_else(|| "unknown".to_string(), |c| c.to_string());
        writeln!(out, "exit_code: {code}")?;
        log_warn!("Session {} finished with {}", id, marker);
      }
    }
    SessionState::Running {
      pid, output_bytes, ..
    } => {
      let pid = pid.map_or_else(|| "unknown".to_string(), |p| p.to_string());
      writeln!(out, "pid: {pid}")?;
      writeln!(out, "output_bytes: {output_bytes}")?;
    }
    SessionState::NotFound => {}
  }
  Ok(())
}

/// One table row per known session, sorted by id.
fn list_rows(ctx: &AppContext, now: DateTime<Utc>) -> Result<Vec<Vec<String>>> {
  let mut rows = Vec::new();
  for id in known_sessions(ctx)? {
    let paths = SessionPaths::new(&ctx.state_dir, id.clone());
    let state = inspect(ctx, &paths);
    let status = match &state {
      SessionState::Completed { error: None, .. } => t::ok(state.label()),
      // Still completed; the tint is the only hint of a non-zero exit.
      SessionState::Completed { error: Some(_), .. } => t::err(state.label()),
      SessionState::Running { .. } => t::warn(state.label()),
      // Files left behind without a host or a completion marker.
      SessionState::NotFound => t::dim("orphaned"),
    };
    let age = id
      .created_at()
      .and_then(|created| (now - created).to_std().ok())
      .map_or_else(|| "-".to_string(), format_age);
    let bytes = markers::output_size(&paths.output());
    rows.push(vec![t::id(&id), status, age, format!("{bytes}B")]);
  }
  Ok(rows)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::{JobsConfig, TmuxConfig};
  use crate::utils::term::strip_ansi_control_codes;
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

  #[test]
  fn non_zero_exit_still_reads_completed() {
    let id = SessionId::parse("council-20261016-090507-5").expect("id");
    let state = SessionState::Completed {
      completed_at: "2026-10-16T09:06:00Z".into(),
      output_bytes: 12,
      error: Some("EXIT_CODE=3".into()),
    };
    let mut out = Vec::new();
    describe(&id, &state, &mut out).unwrap();
    let text = String::from_utf8(out).unwrap();
    assert!(text.contains("status: completed\n"), "{text}");
    assert!(text.contains("completed_at: 2026-10-16T09:06:00Z\n"));
    assert!(text.contains("exit_code: 3\n"));
  }

  #[test]
  fn running_without_pid_reports_unknown() {
    let id = SessionId::parse("council-20261016-090507-6").expect("id");
    let state = SessionState::Running {
      pid: None,
      output_bytes: 0,
      host_exited: false,
    };
    let mut out = Vec::new();
    describe(&id, &state, &mut out).unwrap();
    assert!(String::from_utf8(out).unwrap().contains("pid: unknown\n"));
  }

  #[test]
  #[serial]
  fn list_rows_are_sorted_with_age() {
    let dir = tempfile::tempdir().expect("tmp");
    let ctx = ctx(dir.path());
    let done = SessionPaths::new(
      &ctx.state_dir,
      SessionId::parse("council-20261016-080000-7").expect("id"),
    );
    std::fs::write(done.output(), "abc").unwrap();
    std::fs::write(done.done(), "2026-10-16T08:01:00Z COMPLETED\n").unwrap();
    let orphan = SessionPaths::new(
      &ctx.state_dir,
      SessionId::parse("council-20261016-090000-8").expect("id"),
    );
    std::fs::write(orphan.output(), "").unwrap();
    let failed = SessionPaths::new(
      &ctx.state_dir,
      SessionId::parse("council-20261016-093000-9").expect("id"),
    );
    std::fs::write(failed.output(), "boom\n").unwrap();
    std::fs::write(failed.error(), "EXIT_CODE=2\n").unwrap();
    std::fs::write(failed.done(), "2026-10-16T09:31:00Z COMPLETED\n").unwrap();

    let now = Utc.with_ymd_and_hms(2026, 10, 16, 10, 0, 0).unwrap();
    let rows: Vec<Vec<String>> = list_rows(&ctx, now)
      .unwrap()
      .into_iter()
      .map(|r| r.iter().map(|c| strip_ansi_control_codes(c)).collect())
      .collect();
    assert_eq!(
      rows,
      vec![
        vec!["council-20261016-080000-7", "completed", "2h", "3B"],
        vec!["council-20261016-090000-8", "orphaned", "1h", "0B"],
        vec!["council-20261016-093000-9", "completed", "30m", "5B"],
      ]
    );
  }
}
