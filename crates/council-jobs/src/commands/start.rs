use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Args;

use crate::config::AppContext;
use crate::error::JobError;
use crate::utils::log::t;
use crate::utils::secret::{Secret, load_credential, write_secret_file};
use crate::utils::session::{
  SessionDescriptor, SessionId, SessionPaths, markers, remove_session_files,
};
use crate::utils::tmux;
use crate::{log_info, log_warn};

/// How long `start` waits for the wrapper to record its pid.
const STARTUP_TIMEOUT: Duration = Duration::from_secs(3);

/// Upper bound on collision suffixes tried within one second.
const MAX_ID_ATTEMPTS: u32 = 1000;

#[derive(Debug, Args)]
pub struct StartArgs {
  /// Prompt text passed to the payload
  #[arg(long, short = 'p')]
  pub prompt: Option<String>,
  /// Read the prompt from a file (wins over --prompt)
  #[arg(long, value_name = "PATH")]
  pub prompt_file: Option<PathBuf>,
  /// Auxiliary file handed to the payload (repeatable)
  #[arg(long = "file", short = 'f', value_name = "PATH")]
  pub files: Vec<PathBuf>,
}

/// Everything needed to launch one session. Passed by value; nothing is read
/// from ambient process state after this point.
#[derive(Debug, Clone)]
pub struct LaunchRequest {
  pub prompt: String,
  pub files: Vec<PathBuf>,
  pub secret: Secret,
  pub cwd: PathBuf,
}

pub fn run(ctx: &AppContext, args: &StartArgs) -> Result<()> {
  let prompt = resolve_prompt(args.prompt.as_deref(), args.prompt_file.as_deref())?;
  let secret = load_credential(&ctx.config.payload, &ctx.cwd)?;
  let request = LaunchRequest {
    prompt,
    files: args.files.clone(),
    secret,
    cwd: ctx.cwd.clone(),
  };
  let descriptor = launch(ctx, &request)?;
  println!("{}", serde_json::to_string(&descriptor)?);
  log_info!(
    "Started session {} (wait with `council-jobs wait {}`)",
    t::id(&descriptor.session),
    descriptor.session
  );
  Ok(())
}

/// Pick the prompt body. The file wins when both are given; blank input is rejected.
///
/// # Errors
/// Returns [`JobError::MissingPrompt`] for absent or blank prompts, or an
/// error if the prompt file cannot be read.
pub fn resolve_prompt(inline: Option<&str>, file: Option<&Path>) -> Result<String> {
  let body = match file {
    Some(path) => fs::read_to_string(path)
      .with_context(|| format!("failed to read prompt file {}", path.display()))?,
    None => inline.unwrap_or_default().to_string(),
  };
  if body.trim().is_empty() {
    return Err(JobError::MissingPrompt.into());
  }
  Ok(body)
}

/// Create a session record and start its wrapper in a detached tmux session.
///
/// On failure every file of the new session is removed and the host, if it
/// came up, is killed before the error is returned.
///
/// # Errors
/// Returns [`JobError::MissingPrompt`] for a blank prompt and
/// [`JobError::Launch`] when the record or the host cannot be created.
pub fn launch(ctx: &AppContext, request: &LaunchRequest) -> Result<SessionDescriptor> {
  if request.prompt.trim().is_empty() {
    return Err(JobError::MissingPrompt.into());
  }
  let payload = ctx.config.payload_argv()?;
  fs::create_dir_all(&ctx.state_dir)
    .with_context(|| format!("failed to create {}", ctx.state_dir.display()))?;

  let id = allocate_id(ctx, SessionId::generate(Utc::now(), std::process::id()))?;
  let paths = SessionPaths::new(&ctx.state_dir, id);

  match start_host(ctx, &paths, request, &payload) {
    Ok(()) => Ok(paths.descriptor()),
    Err(err) => {
      discard_partial(ctx, &paths);
      Err(
        JobError::Launch {
          id: paths.id().to_string(),
          reason: format!("{err:#}"),
        }
        .into(),
      )
    }
  }
}

/// First free variant of `base`: no files on disk and no host of that name.
fn allocate_id(ctx: &AppContext, base: SessionId) -> Result<SessionId> {
  let is_free = |id: &SessionId| {
    !SessionPaths::new(&ctx.state_dir, id.clone()).any_exists()
      && !tmux::has_session(&ctx.config, id.as_str())
  };
  if is_free(&base) {
    return Ok(base);
  }
  for n in 2..=MAX_ID_ATTEMPTS {
    let candidate = base.with_suffix(n);
    if is_free(&candidate) {
      return Ok(candidate);
    }
  }
  anyhow::bail!("no free session id for {base} after {MAX_ID_ATTEMPTS} attempts")
}

fn start_host(
  ctx: &AppContext,
  paths: &SessionPaths,
  request: &LaunchRequest,
  payload: &[String],
) -> Result<()> {
  write_secret_file(&paths.secret(), &request.secret)?;
  fs::write(paths.prompt(), &request.prompt)
    .with_context(|| format!("failed to write {}", paths.prompt().display()))?;
  let files: Vec<String> = request
    .files
    .iter()
    .map(|p| p.display().to_string())
    .collect();
  fs::write(paths.args(), serde_json::to_string(&files)?)
    .with_context(|| format!("failed to write {}", paths.args().display()))?;
  fs::write(paths.output(), b"")
    .with_context(|| format!("failed to create {}", paths.output().display()))?;

  let exe = std::env::current_exe().context("cannot locate own executable")?;
  let argv = wrapper_argv(paths, &ctx.config.payload.secret_env, &ctx.config.payload.file_flag, payload);
  tmux::start_session(&ctx.config, paths.id().as_str(), &request.cwd, &exe, &argv)?;
  wait_until_started(ctx, paths)
}

/// Arguments of the hidden `exec` subcommand. Paths and payload tokens stay
/// separate argv entries all the way into the wrapper.
#[must_use]
pub fn wrapper_argv(
  paths: &SessionPaths,
  secret_env: &str,
  file_flag: &str,
  payload: &[String],
) -> Vec<String> {
  let mut argv = vec!["exec".to_string(), paths.id().to_string()];
  let flags = [
    ("--output", paths.output()),
    ("--done", paths.done()),
    ("--pid-file", paths.pid()),
    ("--error-file", paths.error()),
    ("--secret-file", paths.secret()),
    ("--prompt-file", paths.prompt()),
    ("--args-file", paths.args()),
  ];
  for (flag, path) in flags {
    argv.push(flag.to_string());
    argv.push(path.display().to_string());
  }
  argv.push("--secret-env".to_string());
  argv.push(secret_env.to_string());
  argv.push(format!("--file-flag={file_flag}"));
  argv.push("--".to_string());
  argv.extend(payload.iter().cloned());
  argv
}

/// Block until the wrapper has written its pid (or already finished), so a
/// `status` right after `start` sees a running session with a pid.
fn wait_until_started(ctx: &AppContext, paths: &SessionPaths) -> Result<()> {
  let start = Instant::now();
  let mut delay_ms = 10u64;
  let max_delay_ms = 200u64;
  let name = paths.id().as_str();

  loop {
    if markers::read_pid(&paths.pid()).is_some() || paths.done().exists() {
      return Ok(());
    }
    let alive = tmux::has_session(&ctx.config, name)
      && !tmux::pane_dead(&ctx.config, name).unwrap_or(false);
    if !alive {
      // Re-check: the wrapper may have finished between the two checks.
      if markers::read_pid(&paths.pid()).is_some() || paths.done().exists() {
        return Ok(());
      }
      anyhow::bail!("detached host exited before the wrapper started");
    }
    if start.elapsed() >= STARTUP_TIMEOUT {
      log_warn!(
        "Session {} has not reported a pid after {:?}; it may still be starting",
        name,
        STARTUP_TIMEOUT
      );
      return Ok(());
    }
    std::thread::sleep(Duration::from_millis(delay_ms));
    delay_ms = (delay_ms * 2).min(max_delay_ms);
  }
}

fn discard_partial(ctx: &AppContext, paths: &SessionPaths) {
  let name = paths.id().as_str();
  if tmux::has_session(&ctx.config, name) {
    let _ = tmux::kill_session(&ctx.config, name);
  }
  let _ = remove_session_files(paths);
}
