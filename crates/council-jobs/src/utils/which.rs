use std::path::{Path, PathBuf};

use anyhow::Result;

/// Resolve `program` to an executable path by walking PATH entries.
#[must_use]
pub fn which(program: &str) -> Option<PathBuf> {
  if program.contains(std::path::MAIN_SEPARATOR) {
    let candidate = PathBuf::from(program);
    return is_executable(&candidate).then_some(candidate);
  }

  let paths = std::env::var_os("PATH")?;
  std::env::split_paths(&paths)
    .map(|dir| dir.join(program))
    .find(|candidate| is_executable(candidate))
}

/// Like [`which`] but fails with a message naming the missing program.
///
/// # Errors
/// Returns an error if `program` is not an executable on PATH.
pub fn require(program: &str) -> Result<PathBuf> {
  which(program).ok_or_else(|| anyhow::anyhow!("{program} is required but was not found on PATH"))
}

/// Returns true when `path` points to a regular executable file.
#[must_use]
pub fn is_executable(path: &Path) -> bool {
  use std::os::unix::fs::PermissionsExt as _;
  path.is_file()
    && std::fs::metadata(path)
      .map(|meta| meta.permissions().mode() & 0o111 != 0)
      .unwrap_or(false)
}
