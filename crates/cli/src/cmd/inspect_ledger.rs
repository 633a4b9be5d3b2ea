//! Implementation of the `stagegate inspect-ledger` command.
//!
//! Prints the artifact ledger of a persisted run: every recorded artifact,
//! the stage that produced it, its kind, content hash and provenance.

use std::process::ExitCode;

use anyhow::{Context, Result, bail};

use stagegate_lib::ledger::{Artifact, LedgerStore};

use crate::cmd::build::print_report;
use crate::output::{OutputFormat, dimmed, print_info, print_json, print_stat, truncate_hash};

pub fn cmd_inspect_ledger(
  run_id: Option<&str>,
  stage: Option<&str>,
  verbose: bool,
  format: OutputFormat,
) -> Result<ExitCode> {
  let store = LedgerStore::default_store();

  let id = match run_id {
    Some(id) if id != "latest" => id.to_string(),
    _ => match store.latest_run().context("Failed to load run index")? {
      Some(meta) => meta.id,
      None => bail!("No runs recorded. Run 'stagegate build' first."),
    },
  };

  let record = store
    .load_run(&id)
    .with_context(|| format!("Failed to load run: {}", id))?;

  let artifacts: Vec<&Artifact> = record
    .report
    .artifacts
    .iter()
    .filter(|a| stage.is_none_or(|s| a.stage.as_str() == s))
    .collect();

  if format.is_json() {
    if verbose {
      print_json(&record)?;
    } else {
      print_json(&artifacts)?;
    }
    return Ok(ExitCode::SUCCESS);
  }

  print_stat("Run", &record.id);
  if let Some(descriptor) = &record.descriptor {
    print_stat("Descriptor", &descriptor.display().to_string());
  }
  print_stat("Target", record.report.target.as_str());
  print_stat("Succeeded", &record.report.succeeded.to_string());
  println!();

  if artifacts.is_empty() {
    print_info("No artifacts recorded");
  } else {
    for artifact in &artifacts {
      let provenance = artifact
        .produced_under
        .as_ref()
        .map(ToString::to_string)
        .unwrap_or_else(|| "any".to_string());
      println!("{}:{}", artifact.stage, artifact.path);
      println!(
        "    {}  {}  {}",
        artifact.kind,
        dimmed(truncate_hash(artifact.content_hash.as_str())),
        provenance
      );
    }
  }

  if verbose {
    println!();
    print_report(&record.report);
  }

  Ok(ExitCode::SUCCESS)
}
