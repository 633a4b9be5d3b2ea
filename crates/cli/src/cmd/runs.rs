//! Implementation of the `stagegate runs` command.
//!
//! Lists persisted runs, newest first.

use std::process::ExitCode;
use std::time::{Duration, UNIX_EPOCH};

use anyhow::{Context, Result};

use stagegate_lib::ledger::LedgerStore;

use crate::output::{OutputFormat, print_info, print_json, symbols};

pub fn cmd_runs(format: OutputFormat) -> Result<ExitCode> {
  let store = LedgerStore::default_store();
  let mut runs = store.list_runs().context("Failed to load run index")?;
  runs.reverse();

  if format.is_json() {
    print_json(&runs)?;
    return Ok(ExitCode::SUCCESS);
  }

  if runs.is_empty() {
    print_info("No runs recorded. Run 'stagegate build' to create one.");
    return Ok(ExitCode::SUCCESS);
  }

  for run in &runs {
    let when = humantime::format_rfc3339_seconds(UNIX_EPOCH + Duration::from_secs(run.created_at));
    let status = if run.succeeded {
      symbols::SUCCESS
    } else {
      symbols::ERROR
    };
    println!(
      "{} {}  {}  target={}  stages={}  artifacts={}",
      status, run.id, when, run.target, run.stage_count, run.artifact_count
    );
  }

  Ok(ExitCode::SUCCESS)
}
