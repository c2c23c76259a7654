use std::sync::OnceLock;
use std::time::Duration;

use owo_colors::OwoColorize as _;
use regex::Regex;

fn ansi_regex() -> &'static Regex {
  static ANSI_RE: OnceLock<Regex> = OnceLock::new();
  ANSI_RE.get_or_init(|| {
    Regex::new(r"\x1B\[[0-?]*[ -/]*[@-~]").expect("valid ANSI regex")
  })
}

pub fn strip_ansi_control_codes(input: &str) -> String {
  ansi_regex().replace_all(input, "").into_owned()
}

fn visible_len(s: &str) -> usize {
  strip_ansi_control_codes(s).chars().count()
}

/// Render a simple aligned table. Column widths are derived from the visible
/// length of headers and cells, so colored cells line up.
#[must_use]
pub fn render_table(headers: &[&str], rows: &[Vec<String>]) -> String {
  let cols = headers.len();
  let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
  for row in rows {
    for (i, cell) in row.iter().enumerate().take(cols) {
      widths[i] = widths[i].max(visible_len(cell));
    }
  }

  let mut out = String::new();
  let mut header_line = String::new();
  for (i, text) in headers.iter().enumerate() {
    header_line.push_str(text);
    if i + 1 < cols {
      header_line.push_str(&" ".repeat(widths[i].saturating_sub(text.len()) + 1));
    }
  }
  out.push_str(&header_line.dimmed().to_string());
  out.push('\n');

  for row in rows {
    for (i, cell) in row.iter().enumerate().take(cols) {
      out.push_str(cell);
      if i + 1 < cols {
        out.push_str(&" ".repeat(widths[i].saturating_sub(visible_len(cell)) + 1));
      }
    }
    out.push('\n');
  }
  out
}

/// Print a table to stdout, stripping colors when stdout is not a terminal.
pub fn print_table(headers: &[&str], rows: &[Vec<String>]) {
  anstream::print!("{}", render_table(headers, rows));
}

/// Compact age like `45s`, `12m`, `3h`, `2d`.
#[must_use]
pub fn format_age(age: Duration) -> String {
  let secs = age.as_secs();
  match secs {
    0..60 => format!("{secs}s"),
    60..3600 => format!("{}m", secs / 60),
    3600..86_400 => format!("{}h", secs / 3600),
    _ => format!("{}d", secs / 86_400),
  }
}
