//! In-memory executor for unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::descriptor::StageId;
use crate::ledger::CacheEntry;
use crate::transfer::TransferOperation;
use crate::verify::{CheckOutput, VerificationCheck};

use super::executor::{BuildExecutor, ExecutorError, ProducedArtifact, StageInvocation};

/// Records every call and produces deterministic hashes.
///
/// Declared artifacts hash to `<stage>:<path>` unless overridden; checks exit
/// zero unless their command has a canned output.
#[derive(Debug, Default)]
pub struct StubExecutor {
  hashes: Mutex<HashMap<(String, String), String>>,
  failing_stages: HashSet<String>,
  check_outputs: HashMap<String, CheckOutput>,
  reuse: bool,
  transfers: Mutex<Vec<TransferOperation>>,
  stage_runs: Mutex<Vec<String>>,
  check_calls: Mutex<Vec<String>>,
  resets: Mutex<Vec<String>>,
}

impl StubExecutor {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn fail_stage(mut self, stage: &str) -> Self {
    self.failing_stages.insert(stage.to_string());
    self
  }

  pub fn check_output(mut self, command: &str, output: CheckOutput) -> Self {
    self.check_outputs.insert(command.to_string(), output);
    self
  }

  pub fn reuse_cache(mut self) -> Self {
    self.reuse = true;
    self
  }

  pub fn set_hash(&self, stage: &str, path: &str, hash: &str) {
    self
      .hashes
      .lock()
      .unwrap()
      .insert((stage.to_string(), path.to_string()), hash.to_string());
  }

  pub fn transfers(&self) -> Vec<TransferOperation> {
    self.transfers.lock().unwrap().clone()
  }

  pub fn stage_runs(&self) -> Vec<String> {
    self.stage_runs.lock().unwrap().clone()
  }

  pub fn check_calls(&self) -> Vec<String> {
    self.check_calls.lock().unwrap().clone()
  }

  pub fn resets(&self) -> Vec<String> {
    self.resets.lock().unwrap().clone()
  }
}

#[async_trait]
impl BuildExecutor for StubExecutor {
  async fn transfer(&self, op: &TransferOperation) -> Result<(), ExecutorError> {
    self.transfers.lock().unwrap().push(op.clone());
    Ok(())
  }

  async fn reset_stage(&self, stage: &StageId) -> Result<(), ExecutorError> {
    self.resets.lock().unwrap().push(stage.to_string());
    Ok(())
  }

  async fn run_stage(&self, invocation: &StageInvocation) -> Result<Vec<ProducedArtifact>, ExecutorError> {
    let stage = invocation.stage.id.as_str();
    self.stage_runs.lock().unwrap().push(stage.to_string());

    if self.failing_stages.contains(stage) {
      return Err(ExecutorError::CommandFailed {
        cmd: invocation.stage.commands.join(" && "),
        code: Some(1),
        stderr: "stub failure".to_string(),
      });
    }

    let hashes = self.hashes.lock().unwrap();
    Ok(
      invocation
        .stage
        .artifacts
        .iter()
        .map(|decl| {
          let hash = hashes
            .get(&(stage.to_string(), decl.path.clone()))
            .cloned()
            .unwrap_or_else(|| format!("{}:{}", stage, decl.path));
          ProducedArtifact {
            path: decl.path.clone(),
            content_hash: hash.as_str().into(),
          }
        })
        .collect(),
    )
  }

  async fn run_check(&self, _invocation: &StageInvocation, check: &VerificationCheck) -> Result<CheckOutput, ExecutorError> {
    self.check_calls.lock().unwrap().push(check.command.clone());
    Ok(self.check_outputs.get(&check.command).cloned().unwrap_or(CheckOutput {
      exit_code: Some(0),
      stdout: String::new(),
      stderr: String::new(),
    }))
  }

  async fn reuse_cached(&self, _invocation: &StageInvocation, _entry: &CacheEntry) -> Result<bool, ExecutorError> {
    Ok(self.reuse)
  }
}
