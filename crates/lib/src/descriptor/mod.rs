//! Build descriptor loading.
//!
//! Descriptors are YAML or JSON, chosen by file extension (YAML otherwise,
//! which also accepts JSON).

pub mod types;

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

pub use types::{ArtifactDecl, ArtifactRef, BuildDescriptor, CheckSpec, StageId, StageSpec};

#[derive(Debug, Error)]
pub enum DescriptorError {
  #[error("failed to read descriptor {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("invalid JSON descriptor {path}: {source}")]
  Json {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },

  #[error("invalid YAML descriptor {path}: {source}")]
  Yaml {
    path: PathBuf,
    #[source]
    source: serde_yaml::Error,
  },
}

impl BuildDescriptor {
  /// Load a descriptor from disk.
  pub fn load(path: &Path) -> Result<Self, DescriptorError> {
    let content = fs::read_to_string(path).map_err(|source| DescriptorError::Read {
      path: path.to_path_buf(),
      source,
    })?;

    let is_json = path.extension().and_then(|e| e.to_str()) == Some("json");
    let descriptor: Self = if is_json {
      serde_json::from_str(&content).map_err(|source| DescriptorError::Json {
        path: path.to_path_buf(),
        source,
      })?
    } else {
      Self::from_yaml(&content).map_err(|source| DescriptorError::Yaml {
        path: path.to_path_buf(),
        source,
      })?
    };

    debug!(path = %path.display(), stages = descriptor.stages.len(), "loaded descriptor");
    Ok(descriptor)
  }

  pub fn from_yaml(content: &str) -> Result<Self, serde_yaml::Error> {
    serde_yaml::from_str(content)
  }
}
