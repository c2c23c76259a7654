use anyhow::{Context, Result};
use assert_cmd::Command;
use std::path::{Path, PathBuf};
use temp_env::with_vars;
use tempfile::{Builder, TempDir};

pub const API_KEY: &str = "sk-test-council";

#[derive(Debug)]
pub struct TestEnv {
  temp: TempDir,
  runtime_dir: PathBuf,
  home: PathBuf,
}

impl TestEnv {
  pub fn run<F, R>(f: F) -> R
  where
    F: FnOnce(&TestEnv) -> R,
  {
    let env = TestEnv::new();
    with_vars(
      [
        ("HOME", Some(env.home_dir().display().to_string())),
        (
          "XDG_CONFIG_HOME",
          Some(env.home_dir().join(".config").display().to_string()),
        ),
        (
          "XDG_RUNTIME_DIR",
          Some(env.runtime_dir().display().to_string()),
        ),
      ],
      || f(&env),
    )
  }

  pub fn new() -> Self {
    let root = tmp_root();
    let temp = Builder::new()
      .prefix("council-jobs-test-")
      .tempdir_in(root)
      .expect("temp dir");
    if let Err(err) = ensure_fake_payload_at(temp.path()) {
      panic!("prepare fake payload failed: {err}");
    }
    let runtime_dir = runtime_dir_create();
    let home = temp.path().join("home");
    let _ = std::fs::create_dir_all(&home);
    Self {
      temp,
      runtime_dir,
      home,
    }
  }

  pub fn path(&self) -> &Path {
    self.temp.path()
  }

  pub fn runtime_dir(&self) -> &Path {
    &self.runtime_dir
  }

  pub fn home_dir(&self) -> &Path {
    &self.home
  }

  pub fn state_dir(&self) -> PathBuf {
    self.path().join("state")
  }

  pub fn tmux_socket(&self) -> PathBuf {
    self.runtime_dir.join("jobs.sock")
  }

  pub fn payload_path(&self) -> PathBuf {
    self.path().join("scripts").join("fake_payload.sh")
  }

  /// The binary with every location pointed into this environment and a
  /// credential in the environment.
  pub fn council(&self) -> Result<Command> {
    let mut cmd = Command::cargo_bin("council-jobs")?;
    cmd.current_dir(self.path());
    cmd.env("HOME", &self.home);
    cmd.env("XDG_CONFIG_HOME", self.home.join(".config"));
    cmd.env("XDG_STATE_HOME", self.home.join(".local/state"));
    cmd.env("XDG_RUNTIME_DIR", &self.runtime_dir);
    cmd.env("COUNCIL_JOBS_STATE_DIR", self.state_dir());
    cmd.env("COUNCIL_JOBS_TMUX_SOCKET", self.tmux_socket());
    cmd.env("COUNCIL_JOBS_PAYLOAD", self.payload_path());
    cmd.env("OPENROUTER_API_KEY", API_KEY);
    cmd.env("NO_COLOR", "1");
    Ok(cmd)
  }

  /// Whether detached sessions can run here at all.
  pub fn tmux_available(&self) -> bool {
    let has_tmux = std::process::Command::new("tmux")
      .arg("-V")
      .output()
      .is_ok_and(|o| o.status.success());
    has_tmux && self.sockets_available()
  }

  pub fn sockets_available(&self) -> bool {
    use std::os::unix::net::UnixListener;
    let nanos = std::time::SystemTime::now()
      .duration_since(std::time::UNIX_EPOCH)
      .map(|duration| duration.as_nanos())
      .unwrap_or(0);
    let probe = self.runtime_dir.join(format!("probe-{nanos}.sock"));
    match UnixListener::bind(&probe) {
      Ok(_listener) => {
        let _ = std::fs::remove_file(&probe);
        true
      }
      Err(_) => false,
    }
  }

  pub fn write_file(&self, relative: &str, body: &str) -> Result<PathBuf> {
    let path = self.path().join(relative);
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .with_context(|| format!("create parent dir for {}", path.display()))?;
    }
    std::fs::write(&path, body).with_context(|| format!("write {}", path.display()))?;
    Ok(path)
  }

  pub fn write_xdg_config(&self, body: &str) -> Result<PathBuf> {
    let path = self.home.join(".config/council-jobs/config.toml");
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .with_context(|| format!("create parent dir for {}", path.display()))?;
    }
    std::fs::write(&path, body).with_context(|| format!("write {}", path.display()))?;
    Ok(path)
  }
}

pub fn tmp_root() -> PathBuf {
  let manifest_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
  let workspace_root = manifest_dir
    .parent()
    .and_then(|parent| parent.parent())
    .unwrap_or(&manifest_dir)
    .to_path_buf();
  let root = workspace_root.join("target").join("test-tmp");
  let _ = std::fs::create_dir_all(&root);
  root
}

/// Short runtime dir under `target/.r/` so socket paths stay within the Unix limit.
pub fn runtime_dir_create() -> PathBuf {
  let nanos = std::time::SystemTime::now()
    .duration_since(std::time::UNIX_EPOCH)
    .map(|duration| duration.as_nanos())
    .unwrap_or(0);
  let manifest_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
  let workspace_root = manifest_dir
    .parent()
    .and_then(|parent| parent.parent())
    .unwrap_or(&manifest_dir)
    .to_path_buf();
  let runtime_base = workspace_root.join("target").join(".r");
  let _ = std::fs::create_dir_all(&runtime_base);
  let dir = runtime_base.join(format!("r{nanos}"));
  let _ = std::fs::create_dir_all(&dir);
  dir
}

/// Copy the fake payload into `<workdir>/scripts/fake_payload.sh` and make it executable.
pub fn ensure_fake_payload_at(workdir: &Path) -> Result<()> {
  use std::os::unix::fs::PermissionsExt as _;
  let src = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/fake_payload.sh");
  let scripts_dir = workdir.join("scripts");
  std::fs::create_dir_all(&scripts_dir)?;
  let dst = scripts_dir.join("fake_payload.sh");
  std::fs::copy(&src, &dst).with_context(|| format!("copy {} -> {}", src.display(), dst.display()))?;
  let mut perms = std::fs::metadata(&dst)?.permissions();
  perms.set_mode(0o755);
  std::fs::set_permissions(&dst, perms)?;
  Ok(())
}

impl Drop for TestEnv {
  fn drop(&mut self) {
    let _ = std::process::Command::new("tmux")
      .arg("-S")
      .arg(self.tmux_socket())
      .arg("kill-server")
      .output();
    let _ = std::fs::remove_dir_all(&self.runtime_dir);
  }
}
