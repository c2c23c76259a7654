#![allow(dead_code)]

pub mod jobs;
pub mod test_env;

/// Return early from a test when tmux or Unix sockets are unavailable.
#[macro_export]
macro_rules! skip_without_tmux {
  ($env:expr) => {
    if !$env.tmux_available() {
      eprintln!("skipping: tmux or unix sockets unavailable");
      return Ok(());
    }
  };
}
