//! Build descriptor types.
//!
//! A descriptor is the declarative equivalent of a multi-stage Dockerfile in
//! which platform and artifact provenance are explicit fields.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ledger::ArtifactKind;
use crate::platform::PlatformTarget;
use crate::verify::ExpectedOutcome;

/// Identifier of a stage within one descriptor.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StageId(pub String);

impl StageId {
  pub fn new(id: impl Into<String>) -> Self {
    Self(id.into())
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl fmt::Display for StageId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}

impl From<&str> for StageId {
  fn from(s: &str) -> Self {
    Self(s.to_string())
  }
}

/// The whole build: stages in declaration order plus the terminal stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildDescriptor {
  /// Terminal ("runtime") stage. Defaults to the last declared stage.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub target: Option<StageId>,

  pub stages: Vec<StageSpec>,
}

impl BuildDescriptor {
  pub fn stage(&self, id: &StageId) -> Option<&StageSpec> {
    self.stages.iter().find(|s| &s.id == id)
  }

  /// The declared target, or the last stage.
  pub fn terminal(&self) -> Option<&StageId> {
    self.target.as_ref().or_else(|| self.stages.last().map(|s| &s.id))
  }
}

/// One build stage as declared.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageSpec {
  pub id: StageId,

  pub base_image: String,

  /// Explicit platform; inherited from the base image when absent.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub platform: Option<PlatformTarget>,

  /// Opaque build-executor instructions, run in order.
  #[serde(default)]
  pub commands: Vec<String>,

  /// Outputs this stage exports.
  #[serde(default)]
  pub artifacts: Vec<ArtifactDecl>,

  /// Upstream artifacts copied into this stage before its commands run.
  #[serde(default)]
  pub consumes: Vec<ArtifactRef>,

  /// Verification checks gating promotion of this stage.
  #[serde(default)]
  pub checks: Vec<CheckSpec>,

  /// Per-stage executor timeout in seconds.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub timeout_secs: Option<u64>,
}

impl StageSpec {
  pub fn new(id: impl Into<String>, base_image: impl Into<String>) -> Self {
    Self {
      id: StageId::new(id),
      base_image: base_image.into(),
      platform: None,
      commands: Vec::new(),
      artifacts: Vec::new(),
      consumes: Vec::new(),
      checks: Vec::new(),
      timeout_secs: None,
    }
  }

  pub fn artifact(&self, path: &str) -> Option<&ArtifactDecl> {
    self.artifacts.iter().find(|a| a.path == path)
  }
}

/// An output a stage exports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactDecl {
  pub path: String,

  /// Undeclared kinds are treated as `mixed`: platform-checked on transfer.
  #[serde(default = "default_kind")]
  pub kind: ArtifactKind,
}

fn default_kind() -> ArtifactKind {
  ArtifactKind::Mixed
}

/// A reference to an upstream artifact, with an optional destination path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArtifactRef {
  pub stage: StageId,
  pub path: String,

  /// Where the artifact lands in the consuming stage. Defaults to `path`.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub dest: Option<String>,
}

impl ArtifactRef {
  pub fn new(stage: impl Into<String>, path: impl Into<String>) -> Self {
    Self {
      stage: StageId::new(stage),
      path: path.into(),
      dest: None,
    }
  }

  pub fn destination(&self) -> &str {
    self.dest.as_deref().unwrap_or(&self.path)
  }
}

/// A verification check as declared on a stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckSpec {
  pub name: String,
  pub command: String,
  #[serde(default)]
  pub expect: ExpectedOutcome,
}
