use crate::common::test_env::TestEnv;
use anyhow::{Context, Result, anyhow};
use std::path::PathBuf;
use std::time::{Duration, Instant};

/// Parsed JSON descriptor printed by `start`.
#[derive(Debug, Clone)]
pub struct Started {
  pub session: String,
  pub output: PathBuf,
  pub done: PathBuf,
  pub pid_file: PathBuf,
  pub error_file: PathBuf,
}

impl TestEnv {
  pub fn start(&self, prompt: &str, extra_args: &[&str]) -> Result<Started> {
    let out = self
      .council()?
      .arg("start")
      .arg("--prompt")
      .arg(prompt)
      .args(extra_args)
      .output()
      .context("run start")?;
    if !out.status.success() {
      return Err(anyhow!(
        "start failed: {}",
        String::from_utf8_lossy(&out.stderr)
      ));
    }
    let stdout = String::from_utf8(out.stdout)?;
    let json: serde_json::Value =
      serde_json::from_str(stdout.trim()).with_context(|| format!("descriptor: {stdout}"))?;
    let field = |key: &str| -> Result<String> {
      json[key]
        .as_str()
        .map(ToString::to_string)
        .ok_or_else(|| anyhow!("descriptor lacks {key}: {stdout}"))
    };
    Ok(Started {
      session: field("session")?,
      output: PathBuf::from(field("output")?),
      done: PathBuf::from(field("done")?),
      pid_file: PathBuf::from(field("pid_file")?),
      error_file: PathBuf::from(field("error_file")?),
    })
  }

  pub fn session_file(&self, id: &str, ext: &str) -> PathBuf {
    self.state_dir().join(format!("{id}.{ext}"))
  }

  /// Run `wait` with a fast poll and return (exit code, stdout).
  pub fn wait_session(&self, id: &str, timeout_secs: u64) -> Result<(i32, String)> {
    let out = self
      .council()?
      .arg("wait")
      .arg(id)
      .arg("--timeout")
      .arg(timeout_secs.to_string())
      .arg("--poll")
      .arg("1")
      .output()
      .context("run wait")?;
    Ok((
      out.status.code().unwrap_or(-1),
      String::from_utf8_lossy(&out.stdout).to_string(),
    ))
  }

  /// Kill a host directly, bypassing the sweeper.
  pub fn kill_host(&self, id: &str) -> Result<()> {
    let status = std::process::Command::new("tmux")
      .arg("-S")
      .arg(self.tmux_socket())
      .arg("kill-session")
      .arg("-t")
      .arg(format!("={id}"))
      .status()
      .context("tmux kill-session")?;
    anyhow::ensure!(status.success(), "kill-session {id} failed");
    Ok(())
  }

  pub fn host_exists(&self, id: &str) -> bool {
    std::process::Command::new("tmux")
      .arg("-S")
      .arg(self.tmux_socket())
      .arg("has-session")
      .arg("-t")
      .arg(format!("={id}"))
      .output()
      .is_ok_and(|o| o.status.success())
  }

  pub fn session_files(&self) -> Vec<String> {
    std::fs::read_dir(self.state_dir())
      .map(|rd| {
        rd.filter_map(|e| e.ok())
          .map(|e| e.file_name().to_string_lossy().to_string())
          .filter(|name| name.starts_with("council-"))
          .collect()
      })
      .unwrap_or_default()
  }
}

pub fn wait_for_path(path: &std::path::Path, timeout: Duration) -> bool {
  let start = Instant::now();
  while start.elapsed() < timeout {
    if path.exists() {
      return true;
    }
    std::thread::sleep(Duration::from_millis(50));
  }
  path.exists()
}
