//! CLI output formatting utilities.
//!
//! Provides consistent formatting for terminal output including colored status
//! messages, human-readable durations, and Unicode symbols.

use std::time::Duration;

use anyhow::Context;
use clap::ValueEnum;
use owo_colors::{OwoColorize, Stream};

use stagegate_lib::execute::StageStatus;
use stagegate_lib::verify::CheckStatus;

#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
  #[default]
  Text,
  Json,
}

impl OutputFormat {
  pub fn is_json(self) -> bool {
    matches!(self, OutputFormat::Json)
  }
}

pub mod symbols {
  pub const SUCCESS: &str = "✓";
  pub const ERROR: &str = "✗";
  pub const WARNING: &str = "⚠";
  pub const INFO: &str = "•";
  pub const ARROW: &str = "→";
  pub const SKIPPED: &str = "-";
  pub const BLOCKED: &str = "⊘";
}

pub fn truncate_hash(hash: &str) -> &str {
  let len = hash.len().min(12);
  &hash[..len]
}

pub fn format_duration(duration: Duration) -> String {
  let secs = duration.as_secs();
  let millis = duration.subsec_millis();

  if secs >= 60 {
    let mins = secs / 60;
    let remaining_secs = secs % 60;
    format!("{}m {}s", mins, remaining_secs)
  } else if secs > 0 {
    format!("{}.{:02}s", secs, millis / 10)
  } else {
    format!("{}ms", millis)
  }
}

/// Colored marker for a stage outcome.
pub fn stage_symbol(status: &StageStatus) -> String {
  match status {
    StageStatus::Succeeded => symbols::SUCCESS.if_supports_color(Stream::Stdout, |s| s.green()).to_string(),
    StageStatus::Failed => symbols::ERROR.if_supports_color(Stream::Stdout, |s| s.red()).to_string(),
    StageStatus::Blocked { .. } => symbols::BLOCKED.if_supports_color(Stream::Stdout, |s| s.yellow()).to_string(),
    StageStatus::Pending | StageStatus::Running => symbols::INFO.to_string(),
  }
}

/// Colored marker for a check outcome.
pub fn check_symbol(status: CheckStatus) -> String {
  match status {
    CheckStatus::Pass => symbols::SUCCESS.if_supports_color(Stream::Stdout, |s| s.green()).to_string(),
    CheckStatus::Fail => symbols::ERROR.if_supports_color(Stream::Stdout, |s| s.red()).to_string(),
    CheckStatus::Skipped => symbols::SKIPPED.if_supports_color(Stream::Stdout, |s| s.dimmed()).to_string(),
  }
}

pub fn dimmed(text: &str) -> String {
  text.if_supports_color(Stream::Stdout, |s| s.dimmed()).to_string()
}

pub fn print_success(message: &str) {
  println!(
    "{} {}",
    symbols::SUCCESS.if_supports_color(Stream::Stdout, |s| s.green()),
    message
  );
}

pub fn print_error(message: &str) {
  eprintln!(
    "{} {}",
    symbols::ERROR.if_supports_color(Stream::Stderr, |s| s.red()),
    message.if_supports_color(Stream::Stderr, |s| s.red())
  );
}

pub fn print_warning(message: &str) {
  eprintln!(
    "{} {}",
    symbols::WARNING.if_supports_color(Stream::Stderr, |s| s.yellow()),
    message.if_supports_color(Stream::Stderr, |s| s.yellow())
  );
}

pub fn print_info(message: &str) {
  println!(
    "{} {}",
    symbols::INFO.if_supports_color(Stream::Stdout, |s| s.blue()),
    message
  );
}

pub fn print_stat(label: &str, value: &str) {
  println!(
    "  {}: {}",
    label.if_supports_color(Stream::Stdout, |s| s.dimmed()),
    value
  );
}

pub fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
  let json = serde_json::to_string_pretty(value).context("Failed to serialize to JSON")?;
  println!("{}", json);
  Ok(())
}
