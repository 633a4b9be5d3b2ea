//! Platform resolution: the effective platform of every stage.
//!
//! Resolution is pure: the same graph, registry and override always give the
//! same result. Precedence, highest first:
//!
//! 1. a complete run-wide override
//! 2. the stage's declared platform
//! 3. conflict among upstream declared platforms (an error)
//! 4. the base image's registered platform
//! 5. the platform all upstream stages agree on
//!
//! A partial override (`os/arch` only) is layered on the result of 2–5.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::descriptor::StageId;
use crate::platform::{ImageRegistry, PlatformOverride, PlatformTarget};

use super::StageGraph;

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum ResolveError {
  #[error("stage '{stage}' has no declared platform and its upstreams disagree: {}", Conflicts(.conflicts))]
  Ambiguity {
    stage: StageId,
    conflicts: Vec<(StageId, PlatformTarget)>,
  },

  #[error("stage '{stage}' has no declared platform and base image '{image}' is not in the registry")]
  UnknownBaseImage { stage: StageId, image: String },

  #[error("stage '{0}' is not part of the graph")]
  UnknownStage(StageId),
}

struct Conflicts<'a>(&'a [(StageId, PlatformTarget)]);

impl fmt::Display for Conflicts<'_> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    for (i, (stage, platform)) in self.0.iter().enumerate() {
      if i > 0 {
        write!(f, ", ")?;
      }
      write!(f, "{} = {}", stage, platform)?;
    }
    Ok(())
  }
}

/// Resolve one stage's effective platform.
pub fn resolve_effective_platform(
  stage_id: &StageId,
  graph: &StageGraph,
  registry: &ImageRegistry,
  over: Option<&PlatformOverride>,
) -> Result<PlatformTarget, ResolveError> {
  let stage = graph
    .stage(stage_id)
    .ok_or_else(|| ResolveError::UnknownStage(stage_id.clone()))?;

  if let Some(full) = over.and_then(PlatformOverride::complete) {
    return Ok(full);
  }

  let resolved = match &stage.platform {
    Some(declared) => declared.clone(),
    None => inherit(stage_id, &stage.base_image, graph, registry)?,
  };

  Ok(match over {
    Some(partial) => partial.apply(&resolved),
    None => resolved,
  })
}

fn inherit(
  stage_id: &StageId,
  base_image: &str,
  graph: &StageGraph,
  registry: &ImageRegistry,
) -> Result<PlatformTarget, ResolveError> {
  let declared: Vec<(StageId, PlatformTarget)> = graph
    .upstream(stage_id)
    .into_iter()
    .filter_map(|up| {
      let platform = graph.stage(&up)?.platform.clone()?;
      Some((up, platform))
    })
    .collect();

  let first = declared.first().map(|(_, p)| p);
  if declared.iter().any(|(_, p)| Some(p) != first) {
    return Err(ResolveError::Ambiguity {
      stage: stage_id.clone(),
      conflicts: declared,
    });
  }

  if let Some(platform) = registry.lookup(base_image) {
    return Ok(platform.clone());
  }

  first.cloned().ok_or_else(|| ResolveError::UnknownBaseImage {
    stage: stage_id.clone(),
    image: base_image.to_string(),
  })
}

/// Effective platform of every stage in a graph.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResolvedPlatforms(BTreeMap<StageId, PlatformTarget>);

impl ResolvedPlatforms {
  pub fn get(&self, id: &StageId) -> Option<&PlatformTarget> {
    self.0.get(id)
  }

  pub fn iter(&self) -> impl Iterator<Item = (&StageId, &PlatformTarget)> {
    self.0.iter()
  }

  pub fn len(&self) -> usize {
    self.0.len()
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }
}

/// Resolve every stage, collecting all failures rather than stopping at the first.
pub fn resolve_all(
  graph: &StageGraph,
  registry: &ImageRegistry,
  over: Option<&PlatformOverride>,
) -> Result<ResolvedPlatforms, Vec<ResolveError>> {
  let mut resolved = BTreeMap::new();
  let mut errors = Vec::new();

  for stage in graph.stages() {
    match resolve_effective_platform(&stage.id, graph, registry, over) {
      Ok(platform) => {
        resolved.insert(stage.id.clone(), platform);
      }
      Err(e) => errors.push(e),
    }
  }

  if errors.is_empty() {
    Ok(ResolvedPlatforms(resolved))
  } else {
    Err(errors)
  }
}
