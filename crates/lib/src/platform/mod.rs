//! Platform model: the fingerprint a stage's outputs are bound to.
//!
//! A [`PlatformTarget`] combines OS, architecture, C library flavour and
//! version, and the compiler runtime library (e.g. `libstdc++`) with its
//! version. Compatibility between two targets is decided by a
//! [`compat::CompatibilityPredicate`].

pub mod arch;
pub mod compat;
pub mod libc;
pub mod os;
pub mod paths;
pub mod registry;
pub mod version;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use arch::Arch;
pub use compat::{CompatPolicy, CompatibilityPredicate};
pub use libc::LibcFlavor;
pub use os::Os;
pub use registry::ImageRegistry;
pub use version::AbiVersion;

/// Errors parsing platform components.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlatformError {
  #[error("unknown operating system: {0}")]
  UnknownOs(String),

  #[error("unknown architecture: {0}")]
  UnknownArch(String),

  #[error("unknown libc flavor: {0}")]
  UnknownLibc(String),

  #[error("invalid version: {0}")]
  InvalidVersion(String),

  #[error("invalid platform '{input}': {reason}")]
  InvalidPlatform { input: String, reason: String },
}

/// The ABI fingerprint a stage is built under.
///
/// String form: `os/arch/libc-version/runtime-version`, for example
/// `linux/amd64/musl-1.2.4/libstdc++-13`. Descriptors and registries may use
/// either that string or the expanded table form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "PlatformRepr")]
pub struct PlatformTarget {
  pub os: Os,
  pub arch: Arch,
  pub libc: LibcFlavor,
  pub libc_version: AbiVersion,
  pub runtime_lib: String,
  pub runtime_lib_version: AbiVersion,
}

impl PlatformTarget {
  pub fn new(
    os: Os,
    arch: Arch,
    libc: LibcFlavor,
    libc_version: AbiVersion,
    runtime_lib: impl Into<String>,
    runtime_lib_version: AbiVersion,
  ) -> Self {
    Self {
      os,
      arch,
      libc,
      libc_version,
      runtime_lib: runtime_lib.into(),
      runtime_lib_version,
    }
  }

  /// The `os/arch` pair, as container tooling spells it.
  pub fn os_arch(&self) -> String {
    format!("{}/{}", self.os, self.arch)
  }

  /// Whether an artifact produced under `self` may run on `runtime`.
  pub fn is_compatible_with(&self, runtime: &PlatformTarget, predicate: &dyn CompatibilityPredicate) -> bool {
    predicate.is_compatible(self, runtime)
  }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PlatformRepr {
  Short(String),
  Full {
    os: Os,
    arch: Arch,
    libc: LibcFlavor,
    libc_version: AbiVersion,
    runtime_lib: String,
    runtime_lib_version: AbiVersion,
  },
}

impl TryFrom<PlatformRepr> for PlatformTarget {
  type Error = PlatformError;

  fn try_from(repr: PlatformRepr) -> Result<Self, Self::Error> {
    match repr {
      PlatformRepr::Short(s) => s.parse(),
      PlatformRepr::Full {
        os,
        arch,
        libc,
        libc_version,
        runtime_lib,
        runtime_lib_version,
      } => Ok(Self::new(os, arch, libc, libc_version, runtime_lib, runtime_lib_version)),
    }
  }
}

impl fmt::Display for PlatformTarget {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "{}/{}/{}-{}/{}-{}",
      self.os, self.arch, self.libc, self.libc_version, self.runtime_lib, self.runtime_lib_version
    )
  }
}

impl FromStr for PlatformTarget {
  type Err = PlatformError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let over: PlatformOverride = s.parse()?;
    over.complete().ok_or_else(|| PlatformError::InvalidPlatform {
      input: s.to_string(),
      reason: "expected os/arch/libc-version/runtime-version".to_string(),
    })
  }
}

/// A run-wide platform override.
///
/// Only `os/arch` are mandatory; the libc and runtime-library parts replace
/// the resolved values when given. A complete override is used verbatim for
/// every stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformOverride {
  pub os: Os,
  pub arch: Arch,
  pub libc: Option<(LibcFlavor, AbiVersion)>,
  pub runtime_lib: Option<(String, AbiVersion)>,
}

impl PlatformOverride {
  /// The override as a full target, if every component was given.
  pub fn complete(&self) -> Option<PlatformTarget> {
    let (libc, libc_version) = self.libc.clone()?;
    let (runtime_lib, runtime_lib_version) = self.runtime_lib.clone()?;
    Some(PlatformTarget {
      os: self.os,
      arch: self.arch,
      libc,
      libc_version,
      runtime_lib,
      runtime_lib_version,
    })
  }

  /// Apply the override on top of an otherwise-resolved platform.
  pub fn apply(&self, base: &PlatformTarget) -> PlatformTarget {
    let mut out = base.clone();
    out.os = self.os;
    out.arch = self.arch;
    if let Some((libc, version)) = &self.libc {
      out.libc = *libc;
      out.libc_version = version.clone();
    }
    if let Some((name, version)) = &self.runtime_lib {
      out.runtime_lib = name.clone();
      out.runtime_lib_version = version.clone();
    }
    out
  }
}

impl fmt::Display for PlatformOverride {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}/{}", self.os, self.arch)?;
    if let Some((libc, version)) = &self.libc {
      write!(f, "/{}-{}", libc, version)?;
    }
    if let Some((name, version)) = &self.runtime_lib {
      write!(f, "/{}-{}", name, version)?;
    }
    Ok(())
  }
}

impl FromStr for PlatformOverride {
  type Err = PlatformError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let invalid = |reason: &str| PlatformError::InvalidPlatform {
      input: s.to_string(),
      reason: reason.to_string(),
    };

    let parts: Vec<&str> = s.trim().split('/').collect();
    if parts.len() < 2 || parts.len() > 4 {
      return Err(invalid("expected os/arch[/libc-version[/runtime-version]]"));
    }

    let os = parts[0].parse()?;
    let arch = parts[1].parse()?;

    let libc = match parts.get(2) {
      Some(part) => {
        let (name, version) = split_name_version(part).ok_or_else(|| invalid("libc must be <flavor>-<version>"))?;
        Some((name.parse()?, AbiVersion::parse(version)?))
      }
      None => None,
    };

    let runtime_lib = match parts.get(3) {
      Some(part) => {
        let (name, version) =
          split_name_version(part).ok_or_else(|| invalid("runtime library must be <name>-<version>"))?;
        Some((name.to_string(), AbiVersion::parse(version)?))
      }
      None => None,
    };

    Ok(Self {
      os,
      arch,
      libc,
      runtime_lib,
    })
  }
}

/// Split `libstdc++-13.2` into `("libstdc++", "13.2")` at the first dash that
/// is followed by a digit.
fn split_name_version(part: &str) -> Option<(&str, &str)> {
  let bytes = part.as_bytes();
  let idx = (0..bytes.len().saturating_sub(1)).find(|&i| bytes[i] == b'-' && bytes[i + 1].is_ascii_digit())?;
  let (name, version) = (&part[..idx], &part[idx + 1..]);
  if name.is_empty() { None } else { Some((name, version)) }
}
