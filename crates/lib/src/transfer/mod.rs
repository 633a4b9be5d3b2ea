//! Transfer planner: decides whether an upstream artifact may be copied into
//! a downstream stage.
//!
//! Platform-agnostic (`source`) artifacts always transfer. Anything compiled
//! is checked against the destination stage's effective platform with the
//! configured compatibility predicate; a mismatch is reported with both
//! stages and both platforms so the fix is obvious. Planning for a stage is
//! all-or-nothing: no copy is executed unless every consume is valid.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::descriptor::{ArtifactRef, StageId, StageSpec};
use crate::graph::{ResolvedPlatforms, StageGraph};
use crate::ledger::{Artifact, ArtifactLedger};
use crate::platform::{CompatibilityPredicate, PlatformTarget};

/// A validated copy of one artifact into a downstream stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferOperation {
  pub artifact: Artifact,
  pub source_stage: StageId,
  pub destination_stage: StageId,
  pub destination_path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum TransferError {
  #[error(
    "artifact '{artifact_path}' from stage '{source_stage}' was built for {produced}, \
     but stage '{destination_stage}' runs on {required}"
  )]
  PlatformMismatch {
    artifact_path: String,
    source_stage: StageId,
    destination_stage: StageId,
    produced: PlatformTarget,
    required: PlatformTarget,
  },

  #[error("stage '{destination}' consumes '{path}' from '{stage}', which has not been recorded")]
  ArtifactNotFound {
    stage: StageId,
    path: String,
    destination: StageId,
  },

  #[error("stage '{0}' has no resolved platform")]
  UnresolvedStage(StageId),
}

/// Plans transfers against the artifacts recorded so far in a run.
#[derive(Debug, Clone, Copy)]
pub struct TransferPlanner<'a> {
  ledger: &'a ArtifactLedger,
  platforms: &'a ResolvedPlatforms,
  predicate: &'a dyn CompatibilityPredicate,
}

impl<'a> TransferPlanner<'a> {
  pub fn new(
    ledger: &'a ArtifactLedger,
    platforms: &'a ResolvedPlatforms,
    predicate: &'a dyn CompatibilityPredicate,
  ) -> Self {
    Self {
      ledger,
      platforms,
      predicate,
    }
  }

  /// Validate one consume of `destination`.
  pub fn plan_transfer(&self, reference: &ArtifactRef, destination: &StageId) -> Result<TransferOperation, TransferError> {
    let artifact = self
      .ledger
      .lookup_artifact(&reference.stage, &reference.path)
      .ok_or_else(|| TransferError::ArtifactNotFound {
        stage: reference.stage.clone(),
        path: reference.path.clone(),
        destination: destination.clone(),
      })?;

    if artifact.kind.is_platform_bound() {
      let required = self
        .platforms
        .get(destination)
        .ok_or_else(|| TransferError::UnresolvedStage(destination.clone()))?;

      // The ledger refuses platform-bound artifacts without provenance.
      if let Some(produced) = &artifact.produced_under
        && !produced.is_compatible_with(required, self.predicate)
      {
        return Err(TransferError::PlatformMismatch {
          artifact_path: artifact.path.clone(),
          source_stage: reference.stage.clone(),
          destination_stage: destination.clone(),
          produced: produced.clone(),
          required: required.clone(),
        });
      }
    }

    debug!(
      artifact = %artifact.path,
      from = %reference.stage,
      to = %destination,
      kind = %artifact.kind,
      "transfer planned"
    );

    Ok(TransferOperation {
      source_stage: reference.stage.clone(),
      destination_stage: destination.clone(),
      destination_path: reference.destination().to_string(),
      artifact,
    })
  }

  /// Plan every consume of a stage. Any failure rejects the whole set.
  pub fn plan_stage_transfers(&self, stage: &StageSpec) -> Result<Vec<TransferOperation>, TransferError> {
    stage
      .consumes
      .iter()
      .map(|reference| self.plan_transfer(reference, &stage.id))
      .collect()
  }
}

/// Predict platform mismatches before anything runs.
///
/// Uses declared artifact kinds and resolved platforms; an artifact's
/// provenance is assumed to be its producing stage's effective platform.
pub fn preflight(
  graph: &StageGraph,
  platforms: &ResolvedPlatforms,
  predicate: &dyn CompatibilityPredicate,
) -> Vec<TransferError> {
  let mut problems = Vec::new();

  for stage in graph.stages() {
    let Some(required) = platforms.get(&stage.id) else {
      problems.push(TransferError::UnresolvedStage(stage.id.clone()));
      continue;
    };

    for reference in &stage.consumes {
      let Some(decl) = graph.stage(&reference.stage).and_then(|up| up.artifact(&reference.path)) else {
        continue;
      };
      if !decl.kind.is_platform_bound() {
        continue;
      }
      let Some(produced) = platforms.get(&reference.stage) else {
        continue;
      };
      if !produced.is_compatible_with(required, predicate) {
        problems.push(TransferError::PlatformMismatch {
          artifact_path: reference.path.clone(),
          source_stage: reference.stage.clone(),
          destination_stage: stage.id.clone(),
          produced: produced.clone(),
          required: required.clone(),
        });
      }
    }
  }

  problems
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::descriptor::BuildDescriptor;
  use crate::graph::resolve_all;
  use crate::ledger::ArtifactKind;
  use crate::platform::{CompatPolicy, ImageRegistry};

  fn p(s: &str) -> PlatformTarget {
    s.parse().unwrap()
  }

  /// `builder` on `builder_platform` exporting `/out/native.bin`, consumed
  /// by `runtime` on `runtime_platform`.
  fn two_stage(builder_platform: &str, runtime_platform: &str, kind: ArtifactKind) -> (StageGraph, ResolvedPlatforms) {
    let mut builder = StageSpec::new("builder", "builder-image");
    builder.platform = Some(p(builder_platform));
    builder.artifacts = vec![crate::descriptor::ArtifactDecl {
      path: "/out/native.bin".to_string(),
      kind,
    }];

    let mut runtime = StageSpec::new("runtime", "runtime-image");
    runtime.platform = Some(p(runtime_platform));
    runtime.consumes = vec![ArtifactRef::new("builder", "/out/native.bin")];

    let descriptor = BuildDescriptor {
      target: None,
      stages: vec![builder, runtime],
    };
    let graph = StageGraph::from_descriptor(&descriptor).unwrap();
    let platforms = resolve_all(&graph, &ImageRegistry::default(), None).unwrap();
    (graph, platforms)
  }

  fn record(ledger: &ArtifactLedger, platform: &str, kind: ArtifactKind) {
    ledger
      .record_artifact(
        &StageId::new("builder"),
        "/out/native.bin",
        "deadbeef".into(),
        Some(&p(platform)),
        kind,
      )
      .unwrap();
  }

  #[test]
  fn incompatible_compiled_artifact_is_rejected() {
    let builder = "linux/amd64/glibc-2.36/libstdc++-12";
    let runtime = "linux/arm64/musl-1.2.4/libstdc++-13";
    let (graph, platforms) = two_stage(builder, runtime, ArtifactKind::CompiledBinary);
    let ledger = ArtifactLedger::new();
    record(&ledger, builder, ArtifactKind::CompiledBinary);

    let planner = TransferPlanner::new(&ledger, &platforms, &CompatPolicy::Minimum);
    let err = planner
      .plan_stage_transfers(graph.stage(&StageId::new("runtime")).unwrap())
      .unwrap_err();

    assert_eq!(
      err,
      TransferError::PlatformMismatch {
        artifact_path: "/out/native.bin".to_string(),
        source_stage: StageId::new("builder"),
        destination_stage: StageId::new("runtime"),
        produced: p(builder),
        required: p(runtime),
      }
    );
    let message = err.to_string();
    assert!(message.contains("linux/amd64/glibc-2.36/libstdc++-12"));
    assert!(message.contains("linux/arm64/musl-1.2.4/libstdc++-13"));
  }

  #[test]
  fn compatible_compiled_artifact_transfers() {
    let builder = "linux/arm64/musl-1.2.4/libstdc++-12";
    let runtime = "linux/arm64/musl-1.2.4/libstdc++-13";
    let (graph, platforms) = two_stage(builder, runtime, ArtifactKind::CompiledBinary);
    let ledger = ArtifactLedger::new();
    record(&ledger, builder, ArtifactKind::CompiledBinary);

    let planner = TransferPlanner::new(&ledger, &platforms, &CompatPolicy::Minimum);
    let ops = planner
      .plan_stage_transfers(graph.stage(&StageId::new("runtime")).unwrap())
      .unwrap();

    assert_eq!(ops.len(), 1);
    assert_eq!(ops[0].source_stage, StageId::new("builder"));
    assert_eq!(ops[0].destination_path, "/out/native.bin");
    assert_eq!(ops[0].artifact.content_hash.as_str(), "deadbeef");
  }

  #[test]
  fn source_artifact_ignores_platform() {
    let (graph, platforms) = two_stage(
      "linux/amd64/glibc-2.36/libstdc++-12",
      "linux/arm64/musl-1.2.4/libstdc++-13",
      ArtifactKind::Source,
    );
    let ledger = ArtifactLedger::new();
    ledger
      .record_artifact(
        &StageId::new("builder"),
        "/out/native.bin",
        "deadbeef".into(),
        None,
        ArtifactKind::Source,
      )
      .unwrap();

    let planner = TransferPlanner::new(&ledger, &platforms, &CompatPolicy::Exact);
    assert!(
      planner
        .plan_stage_transfers(graph.stage(&StageId::new("runtime")).unwrap())
        .is_ok()
    );
    assert!(preflight(&graph, &platforms, &CompatPolicy::Exact).is_empty());
  }

  #[test]
  fn unrecorded_artifact_is_not_found() {
    let platform = "linux/amd64/musl-1.2.4/libstdc++-13";
    let (_graph, platforms) = two_stage(platform, platform, ArtifactKind::Mixed);
    let ledger = ArtifactLedger::new();
    let planner = TransferPlanner::new(&ledger, &platforms, &CompatPolicy::Minimum);

    let err = planner
      .plan_transfer(&ArtifactRef::new("builder", "/out/native.bin"), &StageId::new("runtime"))
      .unwrap_err();
    assert!(matches!(err, TransferError::ArtifactNotFound { .. }));
  }

  #[test]
  fn destination_override_is_used() {
    let platform = "linux/amd64/musl-1.2.4/libstdc++-13";
    let (_graph, platforms) = two_stage(platform, platform, ArtifactKind::Mixed);
    let ledger = ArtifactLedger::new();
    record(&ledger, platform, ArtifactKind::Mixed);
    let planner = TransferPlanner::new(&ledger, &platforms, &CompatPolicy::Minimum);

    let mut reference = ArtifactRef::new("builder", "/out/native.bin");
    reference.dest = Some("/usr/local/bin/native".to_string());
    let op = planner.plan_transfer(&reference, &StageId::new("runtime")).unwrap();
    assert_eq!(op.destination_path, "/usr/local/bin/native");
  }

  #[test]
  fn preflight_predicts_mismatch() {
    let (graph, platforms) = two_stage(
      "linux/amd64/musl-1.2.4/libstdc++-13",
      "linux/amd64/musl-1.2.4/libstdc++-10",
      ArtifactKind::CompiledBinary,
    );
    let problems = preflight(&graph, &platforms, &CompatPolicy::Minimum);
    assert_eq!(problems.len(), 1);
    assert!(matches!(problems[0], TransferError::PlatformMismatch { .. }));
  }
}
