//! Implementation of the `stagegate plan` command.
//!
//! Validates a descriptor, resolves every stage's platform and predicts
//! transfer mismatches from declared artifact kinds. Nothing is executed.

use std::process::ExitCode;

use anyhow::Result;
use serde::Serialize;

use stagegate_lib::descriptor::StageId;
use stagegate_lib::platform::PlatformTarget;
use stagegate_lib::transfer::TransferError;

use crate::PlanArgs;
use crate::cmd::load_plan;
use crate::output::{OutputFormat, dimmed, print_error, print_json, print_stat, print_success};

#[derive(Serialize)]
struct PlanOutput<'a> {
  target: &'a StageId,
  waves: Vec<Vec<StageSummary<'a>>>,
  problems: &'a [TransferError],
}

#[derive(Serialize)]
struct StageSummary<'a> {
  id: StageId,
  platform: Option<&'a PlatformTarget>,
  upstream: Vec<StageId>,
  checks: usize,
}

pub fn cmd_plan(args: &PlanArgs, format: OutputFormat) -> Result<ExitCode> {
  let loaded = match load_plan(args) {
    Ok(loaded) => loaded,
    Err(invalid) => return Ok(invalid.exit(format)),
  };
  let plan = &loaded.plan;
  let graph = plan.graph();
  let problems = plan.preflight();

  let waves: Vec<Vec<StageSummary>> = graph
    .waves()
    .into_iter()
    .map(|wave| {
      wave
        .into_iter()
        .map(|id| StageSummary {
          platform: plan.platform(&id),
          upstream: graph.upstream(&id),
          checks: plan.gate().list(&id).len(),
          id,
        })
        .collect()
    })
    .collect();

  if format.is_json() {
    print_json(&PlanOutput {
      target: graph.terminal(),
      waves,
      problems: &problems,
    })?;
  } else {
    for (i, wave) in waves.iter().enumerate() {
      println!("Wave {}:", i + 1);
      for stage in wave {
        let platform = stage.platform.map(ToString::to_string).unwrap_or_default();
        let mut line = format!("  {}  {}", stage.id, dimmed(&platform));
        if !stage.upstream.is_empty() {
          let ups: Vec<&str> = stage.upstream.iter().map(StageId::as_str).collect();
          line.push_str(&format!("  <- {}", ups.join(", ")));
        }
        if stage.checks > 0 {
          line.push_str(&format!("  [{} checks]", stage.checks));
        }
        println!("{}", line);
      }
    }
    println!();
    print_stat("Target", graph.terminal().as_str());
    print_stat("Stages", &graph.len().to_string());
  }

  if problems.is_empty() {
    if !format.is_json() {
      print_success("Plan is valid");
    }
    Ok(ExitCode::SUCCESS)
  } else {
    for problem in &problems {
      print_error(&problem.to_string());
    }
    Ok(ExitCode::FAILURE)
  }
}
