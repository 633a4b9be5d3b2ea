//! Stage cache keys.
//!
//! A stage may be skipped when its inputs, base image and effective platform
//! exactly match a previous successful execution. The key is the truncated
//! hash of all of those, including the content hashes of every consumed
//! artifact, so any upstream change invalidates downstream entries.

use serde::{Deserialize, Serialize};

use crate::descriptor::{ArtifactDecl, StageId, StageSpec};
use crate::platform::PlatformTarget;
use crate::transfer::TransferOperation;
use crate::util::hash::{Hashable, ObjectHash};

use super::Artifact;

/// Everything that determines a stage's outputs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageCacheKey<'a> {
  pub stage: &'a StageId,
  pub base_image: &'a str,
  pub platform: &'a PlatformTarget,
  pub commands: &'a [String],
  pub outputs: &'a [ArtifactDecl],
  pub inputs: Vec<CacheInput<'a>>,
}

/// A consumed artifact as it contributes to the cache key.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheInput<'a> {
  pub destination: &'a str,
  pub content_hash: &'a str,
}

impl Hashable for StageCacheKey<'_> {}

impl<'a> StageCacheKey<'a> {
  pub fn new(stage: &'a StageSpec, platform: &'a PlatformTarget, transfers: &'a [TransferOperation]) -> Self {
    let mut inputs: Vec<CacheInput<'a>> = transfers
      .iter()
      .map(|t| CacheInput {
        destination: &t.destination_path,
        content_hash: t.artifact.content_hash.as_str(),
      })
      .collect();
    inputs.sort_by(|a, b| a.destination.cmp(b.destination));

    Self {
      stage: &stage.id,
      base_image: &stage.base_image,
      platform,
      commands: &stage.commands,
      outputs: &stage.artifacts,
      inputs,
    }
  }

  pub fn key(&self) -> Result<ObjectHash, serde_json::Error> {
    self.compute_hash()
  }
}

/// Outputs of a successful stage execution, stored under its cache key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
  pub key: ObjectHash,
  pub stage: StageId,
  pub run_id: String,
  pub created_at: u64,
  pub artifacts: Vec<Artifact>,
}
