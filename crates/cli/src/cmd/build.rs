//! Implementation of the `stagegate build` command.
//!
//! Plans the descriptor, runs every stage through the local shell executor,
//! persists the run record and prints the report.

use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};

use stagegate_lib::execute::{ExecuteConfig, Orchestrator, RunReport, StageFailure, StageStatus};
use stagegate_lib::ledger::{LedgerStore, RunRecord};

use crate::PlanArgs;
use crate::output::{
  OutputFormat, check_symbol, dimmed, format_duration, print_error, print_info, print_json, print_stat,
  print_success, print_warning, stage_symbol, truncate_hash,
};
use crate::cmd::{load_plan, shell_executor};

#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
  pub parallelism: Option<usize>,
  pub timeout: Option<Duration>,
  pub no_cache: bool,
  pub verify_reproducible: bool,
  pub shell: Option<String>,
}

pub fn cmd_build(args: &PlanArgs, options: BuildOptions, format: OutputFormat) -> Result<ExitCode> {
  let loaded = match load_plan(args) {
    Ok(loaded) => loaded,
    Err(invalid) => return Ok(invalid.exit(format)),
  };

  let mut config = ExecuteConfig {
    use_cache: !options.no_cache,
    verify_reproducible: options.verify_reproducible,
    ..ExecuteConfig::default()
  };
  if let Some(parallelism) = options.parallelism {
    config.parallelism = parallelism.max(1);
  }
  if let Some(timeout) = options.timeout {
    config.default_timeout = timeout;
  }

  let executor = Arc::new(shell_executor(&args.descriptor, options.shell.as_deref()));
  let store = LedgerStore::default_store();
  let orchestrator = Orchestrator::new(executor, config).with_store(store.clone());

  if !format.is_json() {
    print_info(&format!(
      "Building {} ({} stages)",
      args.descriptor.display(),
      loaded.plan.graph().len()
    ));
  }

  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let started = Instant::now();
  let report = rt.block_on(orchestrator.run(loaded.plan));
  let elapsed = started.elapsed();

  let descriptor = dunce::canonicalize(&args.descriptor).unwrap_or_else(|_| args.descriptor.clone());
  let record = RunRecord::new(report, Some(descriptor));
  store.save_run(&record).context("Failed to save run record")?;

  if format.is_json() {
    print_json(&record.report)?;
  } else {
    print_report(&record.report);
    println!();
    if record.report.succeeded {
      print_success(&format!(
        "Build succeeded in {} ({} artifacts)",
        format_duration(elapsed),
        record.report.artifacts.len()
      ));
      let failed = record.report.failed_stages().count();
      if failed > 0 {
        print_warning(&format!("{} stage(s) outside the target's dependencies failed", failed));
      }
    } else {
      let blocked = record.report.blocked_stages().count();
      if blocked > 0 {
        print_warning(&format!("{} stage(s) blocked by failed upstreams", blocked));
      }
      print_error(&format!("Build failed in {}", format_duration(elapsed)));
    }
    print_stat("Run", &record.id);
  }

  Ok(ExitCode::from(record.report.exit_code() as u8))
}

/// Human-readable per-stage report.
pub(crate) fn print_report(report: &RunReport) {
  for stage in &report.stages {
    let mut line = format!("{} {}  {}", stage_symbol(&stage.status), stage.id, dimmed(&stage.platform.to_string()));
    match &stage.status {
      StageStatus::Succeeded if stage.cache_hit => line.push_str(&format!("  {}", dimmed("(cached)"))),
      StageStatus::Succeeded | StageStatus::Failed => {
        line.push_str(&format!(
          "  {}",
          dimmed(&format_duration(Duration::from_millis(stage.duration_ms)))
        ));
      }
      StageStatus::Blocked { upstream } => line.push_str(&format!("  blocked by {}", upstream)),
      StageStatus::Pending | StageStatus::Running => {}
    }
    println!("{}", line);

    for transfer in &stage.transfers {
      println!(
        "    {} {}:{} {} {}",
        dimmed("copy"),
        transfer.source_stage,
        transfer.artifact.path,
        crate::output::symbols::ARROW,
        transfer.destination_path
      );
    }

    for check in &stage.checks {
      match &check.reason {
        Some(reason) => println!("    {} {}: {}", check_symbol(check.status), check.name, reason),
        None => println!("    {} {}", check_symbol(check.status), check.name),
      }
    }

    if let Some(failure) = &stage.failure {
      println!("    {}", failure);
      match failure {
        StageFailure::Verification {
          output: Some(output), ..
        } => {
          for line in output.stdout.lines().chain(output.stderr.lines()) {
            println!("      {}", dimmed(line));
          }
        }
        StageFailure::Executor {
          stderr: Some(stderr), ..
        } => {
          for line in stderr.lines() {
            println!("      {}", dimmed(line));
          }
        }
        _ => {}
      }
    }
  }

  if !report.artifacts.is_empty() {
    println!();
    println!("Artifacts:");
    for artifact in &report.artifacts {
      println!(
        "  {}:{}  {}  {}",
        artifact.stage,
        artifact.path,
        artifact.kind,
        dimmed(truncate_hash(artifact.content_hash.as_str()))
      );
    }
  }
}
