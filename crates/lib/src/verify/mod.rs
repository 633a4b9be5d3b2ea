//! Verification gate: declarative checks run inside a stage after its
//! artifacts arrive and its commands complete.
//!
//! Checks are data. They are registered when the plan is built, can be
//! listed without running anything, and can be re-run against an existing
//! stage independently of a build. A stage is promotable only when every
//! check passes; the first failure short-circuits the rest.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::descriptor::{CheckSpec, StageId};
use crate::execute::executor::{BuildExecutor, StageInvocation};
use crate::graph::StageGraph;

/// What a passing check looks like.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpectedOutcome {
  #[serde(default)]
  pub exit_code: i32,

  /// Substring that must appear in stdout.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub stdout_contains: Option<String>,

  /// Substring that must not appear in stdout or stderr, e.g. `symbol not found`.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub output_excludes: Option<String>,
}

impl ExpectedOutcome {
  /// Compare captured output against the expectation.
  ///
  /// Returns the reason for the first mismatch.
  pub fn evaluate(&self, output: &CheckOutput) -> Result<(), String> {
    match output.exit_code {
      Some(code) if code == self.exit_code => {}
      Some(code) => return Err(format!("exit code {} (expected {})", code, self.exit_code)),
      None => return Err("terminated by signal".to_string()),
    }

    if let Some(needle) = &self.stdout_contains
      && !output.stdout.contains(needle.as_str())
    {
      return Err(format!("stdout does not contain '{}'", needle));
    }

    if let Some(needle) = &self.output_excludes
      && (output.stdout.contains(needle.as_str()) || output.stderr.contains(needle.as_str()))
    {
      return Err(format!("output contains '{}'", needle));
    }

    Ok(())
  }
}

/// A check bound to the stage it runs in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationCheck {
  pub name: String,
  pub target_stage: StageId,
  pub command: String,
  pub expect: ExpectedOutcome,
}

impl VerificationCheck {
  pub fn from_spec(stage: &StageId, spec: &CheckSpec) -> Self {
    Self {
      name: spec.name.clone(),
      target_stage: stage.clone(),
      command: spec.command.clone(),
      expect: spec.expect.clone(),
    }
  }
}

/// Captured result of running a check command.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckOutput {
  /// `None` when the process was killed by a signal.
  pub exit_code: Option<i32>,
  pub stdout: String,
  pub stderr: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
  Pass,
  Fail,
  /// Not run because an earlier check of the same stage failed.
  Skipped,
}

impl fmt::Display for CheckStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      CheckStatus::Pass => write!(f, "pass"),
      CheckStatus::Fail => write!(f, "fail"),
      CheckStatus::Skipped => write!(f, "skipped"),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResult {
  pub name: String,
  pub stage: StageId,
  pub status: CheckStatus,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub output: Option<CheckOutput>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub reason: Option<String>,
}

impl CheckResult {
  fn skipped(check: &VerificationCheck) -> Self {
    Self {
      name: check.name.clone(),
      stage: check.target_stage.clone(),
      status: CheckStatus::Skipped,
      output: None,
      reason: None,
    }
  }
}

/// All registered checks, by stage.
#[derive(Debug, Clone, Default)]
pub struct VerificationGate {
  checks: BTreeMap<StageId, Vec<VerificationCheck>>,
}

impl VerificationGate {
  pub fn new() -> Self {
    Self::default()
  }

  /// Register every check declared in the graph's stages.
  pub fn from_graph(graph: &StageGraph) -> Self {
    let mut gate = Self::new();
    for stage in graph.stages() {
      for spec in &stage.checks {
        gate.register(VerificationCheck::from_spec(&stage.id, spec));
      }
    }
    gate
  }

  /// Add a check; checks run in registration order.
  pub fn register(&mut self, check: VerificationCheck) {
    self.checks.entry(check.target_stage.clone()).or_default().push(check);
  }

  pub fn list(&self, stage: &StageId) -> &[VerificationCheck] {
    self.checks.get(stage).map(Vec::as_slice).unwrap_or(&[])
  }

  pub fn iter(&self) -> impl Iterator<Item = &VerificationCheck> {
    self.checks.values().flatten()
  }

  pub fn len(&self) -> usize {
    self.checks.values().map(Vec::len).sum()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Run a stage's checks in order, stopping at the first failure.
  ///
  /// An executor error while running a check counts as a failure of that
  /// check.
  pub async fn run_checks(&self, invocation: &StageInvocation, executor: &dyn BuildExecutor) -> Vec<CheckResult> {
    let stage = &invocation.stage.id;
    let checks = self.list(stage);
    let mut results = Vec::with_capacity(checks.len());
    let mut failed = false;

    for check in checks {
      if failed {
        results.push(CheckResult::skipped(check));
        continue;
      }

      debug!(stage = %stage, check = %check.name, "running check");
      let result = match executor.run_check(invocation, check).await {
        Ok(output) => match check.expect.evaluate(&output) {
          Ok(()) => CheckResult {
            name: check.name.clone(),
            stage: stage.clone(),
            status: CheckStatus::Pass,
            output: Some(output),
            reason: None,
          },
          Err(reason) => CheckResult {
            name: check.name.clone(),
            stage: stage.clone(),
            status: CheckStatus::Fail,
            output: Some(output),
            reason: Some(reason),
          },
        },
        Err(e) => CheckResult {
          name: check.name.clone(),
          stage: stage.clone(),
          status: CheckStatus::Fail,
          output: None,
          reason: Some(e.to_string()),
        },
      };

      if result.status == CheckStatus::Fail {
        warn!(
          stage = %stage,
          check = %check.name,
          reason = result.reason.as_deref().unwrap_or(""),
          "check failed"
        );
        failed = true;
      } else {
        info!(stage = %stage, check = %check.name, "check passed");
      }
      results.push(result);
    }

    results
  }
}

/// Whether every result is a pass.
pub fn passed(results: &[CheckResult]) -> bool {
  results.iter().all(|r| r.status == CheckStatus::Pass)
}

/// The first failed check, if any.
pub fn first_failure(results: &[CheckResult]) -> Option<&CheckResult> {
  results.iter().find(|r| r.status == CheckStatus::Fail)
}
