//! Implementation of the `stagegate verify` command.
//!
//! Re-runs one stage's verification checks against the stage directory left
//! by the last build, without rebuilding anything.

use std::process::ExitCode;

use anyhow::{Context, Result};

use stagegate_lib::descriptor::StageId;
use stagegate_lib::execute::StageInvocation;
use stagegate_lib::verify::passed;

use crate::PlanArgs;
use crate::cmd::{EXIT_INVALID, load_plan, shell_executor};
use crate::output::{OutputFormat, check_symbol, dimmed, print_error, print_info, print_json, print_success};

pub fn cmd_verify(args: &PlanArgs, stage: Option<&str>, shell: Option<&str>, format: OutputFormat) -> Result<ExitCode> {
  let loaded = match load_plan(args) {
    Ok(loaded) => loaded,
    Err(invalid) => return Ok(invalid.exit(format)),
  };
  let plan = &loaded.plan;

  let stage_id = stage.map(StageId::new).unwrap_or_else(|| plan.graph().terminal().clone());
  let (Some(spec), Some(platform)) = (plan.graph().stage(&stage_id), plan.platform(&stage_id)) else {
    print_error(&format!("Unknown stage: {}", stage_id));
    return Ok(ExitCode::from(EXIT_INVALID));
  };

  let executor = shell_executor(&args.descriptor, shell);
  if !executor.stage_root(&stage_id).exists() {
    print_error(&format!(
      "Stage '{}' has not been built yet. Run 'stagegate build' first.",
      stage_id
    ));
    return Ok(ExitCode::FAILURE);
  }

  let invocation = StageInvocation {
    stage: spec.clone(),
    platform: platform.clone(),
    timeout: spec
      .timeout_secs
      .map(std::time::Duration::from_secs)
      .unwrap_or_else(|| stagegate_lib::execute::ExecuteConfig::default().default_timeout),
  };

  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let results = rt.block_on(plan.gate().run_checks(&invocation, &executor));

  if format.is_json() {
    print_json(&results)?;
  } else if results.is_empty() {
    print_info(&format!("Stage '{}' has no checks", stage_id));
  } else {
    for result in &results {
      match &result.reason {
        Some(reason) => println!("{} {}: {}", check_symbol(result.status), result.name, reason),
        None => println!("{} {}", check_symbol(result.status), result.name),
      }
      if let Some(output) = &result.output
        && result.reason.is_some()
      {
        for line in output.stdout.lines().chain(output.stderr.lines()) {
          println!("    {}", dimmed(line));
        }
      }
    }
  }

  if passed(&results) {
    if !format.is_json() {
      print_success(&format!("Stage '{}' verified", stage_id));
    }
    Ok(ExitCode::SUCCESS)
  } else {
    print_error(&format!("Verification of stage '{}' failed", stage_id));
    Ok(ExitCode::FAILURE)
  }
}
