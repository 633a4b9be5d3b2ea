//! The seam between the orchestrator and whatever actually builds stages.
//!
//! The engine never runs a container itself. A [`BuildExecutor`] receives a
//! fully validated request (artifacts to copy, commands to run, checks to
//! evaluate) and reports back what happened.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::descriptor::{StageId, StageSpec};
use crate::ledger::CacheEntry;
use crate::platform::PlatformTarget;
use crate::transfer::TransferOperation;
use crate::util::hash::{ContentHash, HashError};
use crate::verify::{CheckOutput, VerificationCheck};

#[derive(Debug, Error)]
pub enum ExecutorError {
  #[error("command failed with exit code {code:?}: {cmd}")]
  CommandFailed {
    cmd: String,
    code: Option<i32>,
    stderr: String,
  },

  #[error("timed out after {}s", .0.as_secs())]
  Timeout(Duration),

  #[error("stage '{stage}' did not produce declared artifact '{path}'")]
  MissingArtifact { stage: StageId, path: String },

  #[error("invalid artifact path '{0}'")]
  InvalidPath(String),

  #[error("io error at {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("hash error: {0}")]
  Hash(#[from] HashError),

  #[error("{0}")]
  Other(String),
}

/// Everything an executor needs to run one stage.
#[derive(Debug, Clone)]
pub struct StageInvocation {
  pub stage: StageSpec,
  pub platform: PlatformTarget,
  pub timeout: Duration,
}

/// An output reported by the executor after the stage's commands ran.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProducedArtifact {
  pub path: String,
  pub content_hash: ContentHash,
}

#[async_trait]
pub trait BuildExecutor: Send + Sync {
  /// Copy an artifact from its source stage into the destination stage.
  async fn transfer(&self, op: &TransferOperation) -> Result<(), ExecutorError>;

  /// Run the stage's commands and hash its declared outputs.
  ///
  /// Must return one entry per declared artifact.
  async fn run_stage(&self, invocation: &StageInvocation) -> Result<Vec<ProducedArtifact>, ExecutorError>;

  /// Run one verification command inside the stage.
  ///
  /// A non-zero exit is not an error here; it is captured in the output.
  async fn run_check(&self, invocation: &StageInvocation, check: &VerificationCheck) -> Result<CheckOutput, ExecutorError>;

  /// Discard whatever a previous run left in the stage, before it executes
  /// or after it was rejected.
  async fn reset_stage(&self, _stage: &StageId) -> Result<(), ExecutorError> {
    Ok(())
  }

  /// Make a cached stage's outputs available again without re-running it.
  ///
  /// Returns `false` when the cached outputs cannot be restored, in which
  /// case the stage is executed normally.
  async fn reuse_cached(&self, _invocation: &StageInvocation, _entry: &CacheEntry) -> Result<bool, ExecutorError> {
    Ok(false)
  }
}
