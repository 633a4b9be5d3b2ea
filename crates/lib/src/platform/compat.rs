//! ABI compatibility between a producing platform and a runtime platform.
//!
//! Real-world ABI compatibility depends on the base images involved, so the
//! predicate is pluggable. The built-in [`CompatPolicy`] covers the two
//! common rules: forward-compatible minimum versions, and exact equality.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::PlatformTarget;

/// Decides whether an artifact built under `produced` loads under `runtime`.
pub trait CompatibilityPredicate: Send + Sync + fmt::Debug {
  fn is_compatible(&self, produced: &PlatformTarget, runtime: &PlatformTarget) -> bool;
}

/// Built-in compatibility rules.
///
/// Both require matching OS, architecture, libc flavour and runtime library
/// name. They differ in how versions compare.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompatPolicy {
  /// The runtime's libc and runtime library must be at least as new as the
  /// ones the artifact was built against. Newer libraries keep the older
  /// symbols; older ones lack the newer symbols the artifact references.
  #[default]
  Minimum,
  /// Versions must match exactly.
  Exact,
}

impl CompatibilityPredicate for CompatPolicy {
  fn is_compatible(&self, produced: &PlatformTarget, runtime: &PlatformTarget) -> bool {
    if produced.os != runtime.os
      || produced.arch != runtime.arch
      || produced.libc != runtime.libc
      || produced.runtime_lib != runtime.runtime_lib
    {
      return false;
    }

    match self {
      CompatPolicy::Minimum => {
        runtime.libc_version >= produced.libc_version && runtime.runtime_lib_version >= produced.runtime_lib_version
      }
      CompatPolicy::Exact => {
        runtime.libc_version == produced.libc_version && runtime.runtime_lib_version == produced.runtime_lib_version
      }
    }
  }
}

impl fmt::Display for CompatPolicy {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      CompatPolicy::Minimum => write!(f, "minimum"),
      CompatPolicy::Exact => write!(f, "exact"),
    }
  }
}
