/// Token styling helpers.
///
/// The `t` module stands for "tokens". Use these helpers to style
/// specific values inside info messages consistently across the CLI.
pub mod t {
  use std::fmt::Display;

  use owo_colors::OwoColorize as _;

  pub fn id(value: impl Display) -> String {
    format!("{}", value.to_string().blue())
  }

  pub fn ok(s: impl Display) -> String {
    format!("{}", s.to_string().green())
  }

  pub fn warn(s: impl Display) -> String {
    format!("{}", s.to_string().yellow())
  }

  pub fn err(s: impl Display) -> String {
    format!("{}", s.to_string().red())
  }

  pub fn dim(s: impl Display) -> String {
    format!("{}", s.to_string().dimmed())
  }
}

// Status lines always go to stderr: stdout is reserved for data (descriptor JSON, captured output).
// info = neutral, success/warn/error = full-line tint. Use `t::*` to highlight tokens in info lines.

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogLevel {
  Info,
  Success,
  Warn,
  Error,
}

/// Render a line for `level`. Tinting is applied here so callers pass plain text.
#[must_use]
pub fn render(level: LogLevel, text: &str) -> String {
  match level {
    LogLevel::Info => text.to_string(),
    LogLevel::Success => t::ok(text),
    LogLevel::Warn => t::warn(text),
    LogLevel::Error => t::err(text),
  }
}

pub fn emit(level: LogLevel, text: &str) {
  anstream::eprintln!("{}", render(level, text));
}

#[macro_export]
macro_rules! log_info {
  ($fmt:literal $(, $args:expr )* $(,)?) => {{
    $crate::utils::log::emit(
      $crate::utils::log::LogLevel::Info,
      &format!($fmt $(, $args )*)
    );
  }};
}

#[macro_export]
macro_rules! log_success {
  ($fmt:literal $(, $args:expr )* $(,)?) => {{
    $crate::utils::log::emit(
      $crate::utils::log::LogLevel::Success,
      &format!($fmt $(, $args )*)
    );
  }};
}

#[macro_export]
macro_rules! log_warn {
  ($fmt:literal $(, $args:expr )* $(,)?) => {{
    $crate::utils::log::emit(
      $crate::utils::log::LogLevel::Warn,
      &format!($fmt $(, $args )*)
    );
  }};
}

#[macro_export]
macro_rules! log_error {
  ($fmt:literal $(, $args:expr )* $(,)?) => {{
    $crate::utils::log::emit(
      $crate::utils::log::LogLevel::Error,
      &format!($fmt $(, $args )*)
    );
  }};
}
