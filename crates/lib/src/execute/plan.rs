//! Build plans: a descriptor validated, resolved and ready to execute.

use std::sync::Arc;

use tracing::{debug, info};

use crate::descriptor::{BuildDescriptor, StageId};
use crate::graph::{ResolvedPlatforms, StageGraph, resolve_all};
use crate::platform::{CompatibilityPredicate, ImageRegistry, PlatformOverride, PlatformTarget};
use crate::transfer::{TransferError, preflight};
use crate::verify::VerificationGate;

use super::types::PlanError;

/// The validated graph, effective platforms and registered checks of one run.
///
/// Building a plan has no side effects; every structural or resolution error
/// surfaces here, before any stage executes.
#[derive(Debug, Clone)]
pub struct BuildPlan {
  graph: StageGraph,
  platforms: ResolvedPlatforms,
  gate: VerificationGate,
  predicate: Arc<dyn CompatibilityPredicate>,
}

impl BuildPlan {
  pub fn new(
    descriptor: &BuildDescriptor,
    registry: &ImageRegistry,
    over: Option<&PlatformOverride>,
  ) -> Result<Self, PlanError> {
    let graph = StageGraph::from_descriptor(descriptor)?;
    let platforms = resolve_all(&graph, registry, over).map_err(PlanError::Resolve)?;
    let gate = VerificationGate::from_graph(&graph);

    for (stage, platform) in platforms.iter() {
      debug!(stage = %stage, platform = %platform, "resolved platform");
    }
    info!(
      stages = graph.len(),
      checks = gate.len(),
      target = %graph.terminal(),
      policy = %registry.policy,
      "build plan ready"
    );

    Ok(Self {
      graph,
      platforms,
      gate,
      predicate: Arc::new(registry.policy),
    })
  }

  pub fn graph(&self) -> &StageGraph {
    &self.graph
  }

  pub fn platforms(&self) -> &ResolvedPlatforms {
    &self.platforms
  }

  pub fn platform(&self, stage: &StageId) -> Option<&PlatformTarget> {
    self.platforms.get(stage)
  }

  pub fn gate(&self) -> &VerificationGate {
    &self.gate
  }

  pub fn predicate(&self) -> &dyn CompatibilityPredicate {
    self.predicate.as_ref()
  }

  /// Transfers predicted to fail from declared kinds and resolved platforms.
  pub fn preflight(&self) -> Vec<TransferError> {
    preflight(&self.graph, &self.platforms, self.predicate.as_ref())
  }
}
