//! Implementation of the `stagegate checks` command.

use std::process::ExitCode;

use anyhow::Result;

use stagegate_lib::descriptor::StageId;
use stagegate_lib::verify::VerificationCheck;

use crate::PlanArgs;
use crate::cmd::{EXIT_INVALID, load_plan};
use crate::output::{OutputFormat, dimmed, print_error, print_info, print_json};

pub fn cmd_checks(args: &PlanArgs, stage: Option<&str>, format: OutputFormat) -> Result<ExitCode> {
  let loaded = match load_plan(args) {
    Ok(loaded) => loaded,
    Err(invalid) => return Ok(invalid.exit(format)),
  };
  let gate = loaded.plan.gate();

  let checks: Vec<&VerificationCheck> = match stage {
    Some(id) => {
      let id = StageId::new(id);
      if !loaded.plan.graph().contains(&id) {
        print_error(&format!("Unknown stage: {}", id));
        return Ok(ExitCode::from(EXIT_INVALID));
      }
      gate.list(&id).iter().collect()
    }
    None => gate.iter().collect(),
  };

  if format.is_json() {
    print_json(&checks)?;
    return Ok(ExitCode::SUCCESS);
  }

  if checks.is_empty() {
    print_info("No checks registered");
    return Ok(ExitCode::SUCCESS);
  }

  for check in checks {
    println!("{}  {}", check.target_stage, check.name);
    println!("    {}", dimmed(&check.command));
    let expect = &check.expect;
    let mut rules = vec![format!("exit {}", expect.exit_code)];
    if let Some(needle) = &expect.stdout_contains {
      rules.push(format!("stdout contains '{}'", needle));
    }
    if let Some(needle) = &expect.output_excludes {
      rules.push(format!("output excludes '{}'", needle));
    }
    println!("    {}", dimmed(&rules.join(", ")));
  }

  Ok(ExitCode::SUCCESS)
}
