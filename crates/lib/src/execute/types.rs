//! Types for stage execution.
//!
//! This module defines stage states, failure causes, run reports and the
//! execution configuration.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::descriptor::StageId;
use crate::graph::{GraphError, ResolveError};
use crate::ledger::{Artifact, LedgerError};
use crate::platform::PlatformTarget;
use crate::transfer::{TransferError, TransferOperation};
use crate::util::hash::{ContentHash, ObjectHash};
use crate::verify::{CheckOutput, CheckResult};

/// Lifecycle of a stage within one run.
///
/// `Pending → Running → Succeeded | Failed`; a stage whose upstream failed
/// goes from `Pending` straight to `Blocked`. `Failed` and `Blocked` are
/// terminal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum StageStatus {
  Pending,
  Running,
  Succeeded,
  Failed,
  Blocked { upstream: StageId },
}

impl StageStatus {
  pub fn is_terminal(&self) -> bool {
    matches!(
      self,
      StageStatus::Succeeded | StageStatus::Failed | StageStatus::Blocked { .. }
    )
  }
}

impl fmt::Display for StageStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      StageStatus::Pending => write!(f, "pending"),
      StageStatus::Running => write!(f, "running"),
      StageStatus::Succeeded => write!(f, "succeeded"),
      StageStatus::Failed => write!(f, "failed"),
      StageStatus::Blocked { upstream } => write!(f, "blocked by {}", upstream),
    }
  }
}

/// Why a stage failed. Serializable so it survives in persisted runs.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StageFailure {
  #[error(
    "platform mismatch: artifact '{artifact_path}' from stage '{source_stage}' was built for {produced}, \
     but stage '{destination_stage}' runs on {required}"
  )]
  PlatformMismatch {
    artifact_path: String,
    source_stage: StageId,
    destination_stage: StageId,
    produced: PlatformTarget,
    required: PlatformTarget,
  },

  #[error("artifact mutation conflict: stage '{stage}' produced '{path}' as {attempted}, previously {existing}")]
  ArtifactMutationConflict {
    stage: StageId,
    path: String,
    existing: ContentHash,
    attempted: ContentHash,
  },

  #[error("verification failed: check '{check}' on stage '{stage}': {reason}")]
  Verification {
    stage: StageId,
    check: String,
    reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    output: Option<CheckOutput>,
  },

  #[error("transfer failed: {message}")]
  Transfer { message: String },

  #[error("executor error in stage '{stage}': {message}")]
  Executor {
    stage: StageId,
    message: String,
    /// Diagnostic output of the failing command, verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    stderr: Option<String>,
  },
}

impl From<TransferError> for StageFailure {
  fn from(err: TransferError) -> Self {
    match err {
      TransferError::PlatformMismatch {
        artifact_path,
        source_stage,
        destination_stage,
        produced,
        required,
      } => StageFailure::PlatformMismatch {
        artifact_path,
        source_stage,
        destination_stage,
        produced,
        required,
      },
      other => StageFailure::Transfer {
        message: other.to_string(),
      },
    }
  }
}

impl From<LedgerError> for StageFailure {
  fn from(err: LedgerError) -> Self {
    match err {
      LedgerError::MutationConflict {
        stage,
        path,
        existing,
        attempted,
      } => StageFailure::ArtifactMutationConflict {
        stage,
        path,
        existing,
        attempted,
      },
      LedgerError::MissingPlatform { stage, path, kind } => StageFailure::Executor {
        message: format!("{} artifact '{}' has no platform", kind, path),
        stage,
        stderr: None,
      },
    }
  }
}

impl StageFailure {
  pub fn from_check(result: &CheckResult) -> Self {
    StageFailure::Verification {
      stage: result.stage.clone(),
      check: result.name.clone(),
      reason: result.reason.clone().unwrap_or_default(),
      output: result.output.clone(),
    }
  }
}

/// Outcome of one stage in a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageReport {
  pub id: StageId,
  pub status: StageStatus,
  pub platform: PlatformTarget,

  #[serde(default)]
  pub cache_hit: bool,

  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub cache_key: Option<ObjectHash>,

  /// Transfers executed into this stage.
  #[serde(default)]
  pub transfers: Vec<TransferOperation>,

  #[serde(default)]
  pub checks: Vec<CheckResult>,

  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub failure: Option<StageFailure>,

  #[serde(default)]
  pub duration_ms: u64,
}

impl StageReport {
  pub fn new(id: StageId, platform: PlatformTarget) -> Self {
    Self {
      id,
      status: StageStatus::Pending,
      platform,
      cache_hit: false,
      cache_key: None,
      transfers: Vec::new(),
      checks: Vec::new(),
      failure: None,
      duration_ms: 0,
    }
  }

  pub fn fail(&mut self, failure: StageFailure) {
    self.status = StageStatus::Failed;
    self.failure = Some(failure);
  }
}

/// Outcome of a whole run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
  pub run_id: String,
  pub target: StageId,

  /// True iff the target and everything it depends on succeeded.
  pub succeeded: bool,

  /// Stage outcomes in declaration order.
  pub stages: Vec<StageReport>,

  /// Final ledger contents.
  pub artifacts: Vec<Artifact>,
}

impl RunReport {
  pub fn stage(&self, id: &StageId) -> Option<&StageReport> {
    self.stages.iter().find(|s| &s.id == id)
  }

  pub fn failed_stages(&self) -> impl Iterator<Item = &StageReport> {
    self.stages.iter().filter(|s| s.status == StageStatus::Failed)
  }

  pub fn blocked_stages(&self) -> impl Iterator<Item = &StageReport> {
    self
      .stages
      .iter()
      .filter(|s| matches!(s.status, StageStatus::Blocked { .. }))
  }

  /// Process exit code for this run: 1 when the build did not succeed or
  /// any stage failed, even one the target does not depend on.
  pub fn exit_code(&self) -> i32 {
    if self.succeeded && self.failed_stages().next().is_none() {
      0
    } else {
      1
    }
  }
}

/// Problems with a descriptor detected before anything executes.
#[derive(Debug, Error)]
pub enum PlanError {
  #[error(transparent)]
  Graph(#[from] GraphError),

  #[error("{}", join_errors(.0))]
  Resolve(Vec<ResolveError>),
}

fn join_errors(errors: &[ResolveError]) -> String {
  errors.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("; ")
}

/// Configuration for a build run.
#[derive(Debug, Clone)]
pub struct ExecuteConfig {
  /// Maximum number of stages executing at once.
  pub parallelism: usize,

  /// Stage timeout when the descriptor gives none.
  pub default_timeout: Duration,

  /// Skip stages whose cache key matches a previous successful run.
  pub use_cache: bool,

  /// Re-execute cached stages and fail if any output hash changed.
  pub verify_reproducible: bool,
}

impl Default for ExecuteConfig {
  fn default() -> Self {
    Self {
      parallelism: num_cpus(),
      default_timeout: Duration::from_secs(3600),
      use_cache: true,
      verify_reproducible: false,
    }
  }
}

/// Get the number of CPUs for default parallelism.
fn num_cpus() -> usize {
  std::thread::available_parallelism().map(|p| p.get()).unwrap_or(4)
}
