//! Base-image registry: the externally supplied mapping from image reference
//! to the platform that image provides.
//!
//! ```toml
//! policy = "minimum"
//!
//! [images]
//! "node:20-alpine" = "linux/amd64/musl-1.2.4/libstdc++-13"
//!
//! [images."debian:bookworm"]
//! os = "linux"
//! arch = "amd64"
//! libc = "glibc"
//! libc_version = "2.36"
//! runtime_lib = "libstdc++"
//! runtime_lib_version = "12"
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::consts::{DEFAULT_REGISTRY_FILENAME, REGISTRY_ENV};

use super::{CompatPolicy, PlatformTarget};

#[derive(Debug, Error)]
pub enum RegistryError {
  #[error("failed to read registry {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to parse registry {path}: {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: toml::de::Error,
  },
}

/// Known platforms of base images, plus the compatibility policy to apply.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageRegistry {
  #[serde(default)]
  pub policy: CompatPolicy,

  #[serde(default)]
  pub images: BTreeMap<String, PlatformTarget>,
}

impl ImageRegistry {
  /// Load a registry from a TOML file.
  pub fn load(path: &Path) -> Result<Self, RegistryError> {
    let content = fs::read_to_string(path).map_err(|source| RegistryError::Read {
      path: path.to_path_buf(),
      source,
    })?;
    Self::from_toml(&content).map_err(|source| RegistryError::Parse {
      path: path.to_path_buf(),
      source,
    })
  }

  pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
    toml::from_str(content)
  }

  /// Locate and load the registry for a descriptor.
  ///
  /// Order: the explicit path, then `STAGEGATE_REGISTRY`, then `images.toml`
  /// next to the descriptor. With none of those present the registry is empty
  /// and every stage must declare its platform.
  pub fn discover(explicit: Option<&Path>, descriptor: &Path) -> Result<Self, RegistryError> {
    if let Some(path) = explicit {
      return Self::load(path);
    }

    if let Ok(env_path) = std::env::var(REGISTRY_ENV)
      && !env_path.is_empty()
    {
      return Self::load(Path::new(&env_path));
    }

    let sibling = descriptor
      .parent()
      .map(|dir| dir.join(DEFAULT_REGISTRY_FILENAME))
      .unwrap_or_else(|| PathBuf::from(DEFAULT_REGISTRY_FILENAME));
    if sibling.is_file() {
      return Self::load(&sibling);
    }

    debug!(descriptor = %descriptor.display(), "no base-image registry found, using an empty one");
    Ok(Self::default())
  }

  pub fn insert(&mut self, image: impl Into<String>, platform: PlatformTarget) {
    self.images.insert(image.into(), platform);
  }

  /// Look up an image's platform.
  ///
  /// A pinned reference (`image@sha256:...`) falls back to the unpinned name.
  pub fn lookup(&self, image: &str) -> Option<&PlatformTarget> {
    self.images.get(image).or_else(|| {
      let (name, _digest) = image.split_once('@')?;
      self.images.get(name)
    })
  }

  pub fn len(&self) -> usize {
    self.images.len()
  }

  pub fn is_empty(&self) -> bool {
    self.images.is_empty()
  }
}
