//! Artifact ledger: what each stage produced, and under which platform.
//!
//! The ledger is append-only within a run. Each `(stage, path)` key is
//! written once by the stage that owns it; recording the same key again with
//! the same hash is a no-op, with a different hash it is a
//! [`LedgerError::MutationConflict`]. The ledger knows nothing of the DAG.

pub mod cache;
pub mod storage;

use std::fmt;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::descriptor::StageId;
use crate::platform::PlatformTarget;
use crate::util::hash::ContentHash;

pub use cache::{CacheEntry, StageCacheKey};
pub use storage::{LedgerStore, RunMetadata, RunRecord, StoreError};

/// How an artifact relates to the platform it was produced on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
  /// Platform-agnostic content (sources, bundled JS). Always transferable.
  Source,
  /// Output of native compilation, bound to its producing platform.
  CompiledBinary,
  /// A tree containing compiled code somewhere (e.g. `node_modules`).
  Mixed,
}

impl ArtifactKind {
  /// Whether transfers of this kind are gated on platform compatibility.
  pub fn is_platform_bound(&self) -> bool {
    !matches!(self, ArtifactKind::Source)
  }
}

impl fmt::Display for ArtifactKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ArtifactKind::Source => write!(f, "source"),
      ArtifactKind::CompiledBinary => write!(f, "compiled_binary"),
      ArtifactKind::Mixed => write!(f, "mixed"),
    }
  }
}

/// One recorded stage output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
  pub stage: StageId,
  pub path: String,
  pub content_hash: ContentHash,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub produced_under: Option<PlatformTarget>,
  pub kind: ArtifactKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum LedgerError {
  #[error("stage '{stage}' re-recorded '{path}' with hash {attempted} (already recorded as {existing})")]
  MutationConflict {
    stage: StageId,
    path: String,
    existing: ContentHash,
    attempted: ContentHash,
  },

  #[error("stage '{stage}' recorded {kind} artifact '{path}' without a platform")]
  MissingPlatform {
    stage: StageId,
    path: String,
    kind: ArtifactKind,
  },
}

type ArtifactKey = (StageId, String);

/// Concurrent, append-only artifact record for one run.
#[derive(Debug, Default)]
pub struct ArtifactLedger {
  entries: DashMap<ArtifactKey, Artifact>,
}

impl ArtifactLedger {
  pub fn new() -> Self {
    Self::default()
  }

  /// Record a stage output.
  ///
  /// `platform` is required for platform-bound kinds and dropped for `Source`.
  pub fn record_artifact(
    &self,
    stage: &StageId,
    path: &str,
    hash: ContentHash,
    platform: Option<&PlatformTarget>,
    kind: ArtifactKind,
  ) -> Result<Artifact, LedgerError> {
    let produced_under = match (kind.is_platform_bound(), platform) {
      (true, None) => {
        return Err(LedgerError::MissingPlatform {
          stage: stage.clone(),
          path: path.to_string(),
          kind,
        });
      }
      (true, Some(p)) => Some(p.clone()),
      (false, _) => None,
    };

    let artifact = Artifact {
      stage: stage.clone(),
      path: path.to_string(),
      content_hash: hash,
      produced_under,
      kind,
    };

    match self.entries.entry((stage.clone(), path.to_string())) {
      Entry::Occupied(existing) => {
        let existing = existing.get();
        if existing.content_hash == artifact.content_hash {
          Ok(existing.clone())
        } else {
          Err(LedgerError::MutationConflict {
            stage: stage.clone(),
            path: path.to_string(),
            existing: existing.content_hash.clone(),
            attempted: artifact.content_hash,
          })
        }
      }
      Entry::Vacant(slot) => {
        debug!(stage = %stage, path, hash = %artifact.content_hash, "recorded artifact");
        slot.insert(artifact.clone());
        Ok(artifact)
      }
    }
  }

  pub fn lookup_artifact(&self, stage: &StageId, path: &str) -> Option<Artifact> {
    self
      .entries
      .get(&(stage.clone(), path.to_string()))
      .map(|entry| entry.value().clone())
  }

  /// Every artifact, sorted by stage then path.
  pub fn snapshot(&self) -> Vec<Artifact> {
    let mut out: Vec<Artifact> = self.entries.iter().map(|entry| entry.value().clone()).collect();
    out.sort_by(|a, b| (&a.stage, &a.path).cmp(&(&b.stage, &b.path)));
    out
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }
}
