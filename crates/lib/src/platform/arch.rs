use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::PlatformError;

/// CPU architecture variants a stage can target.
///
/// Parsing accepts both the Rust/GNU names (`x86_64`, `aarch64`) and the
/// OCI names (`amd64`, `arm64`) so descriptors can use either convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Arch {
  X86_64,
  Aarch64,
  Armv7,
}

impl Arch {
  /// Detect the current CPU architecture at runtime
  pub fn current() -> Option<Self> {
    match std::env::consts::ARCH {
      "x86_64" => Some(Self::X86_64),
      "aarch64" => Some(Self::Aarch64),
      "arm" => Some(Self::Armv7),
      _ => None,
    }
  }

  /// Returns the OCI identifier for this architecture (`amd64`, `arm64`, `arm`).
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::X86_64 => "amd64",
      Self::Aarch64 => "arm64",
      Self::Armv7 => "arm",
    }
  }
}

impl fmt::Display for Arch {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.as_str())
  }
}

impl FromStr for Arch {
  type Err = PlatformError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().as_str() {
      "amd64" | "x86_64" | "x86-64" => Ok(Self::X86_64),
      "arm64" | "aarch64" | "arm64/v8" => Ok(Self::Aarch64),
      "arm" | "armv7" | "arm/v7" | "armhf" => Ok(Self::Armv7),
      other => Err(PlatformError::UnknownArch(other.to_string())),
    }
  }
}

impl TryFrom<String> for Arch {
  type Error = PlatformError;

  fn try_from(value: String) -> Result<Self, Self::Error> {
    value.parse()
  }
}

impl From<Arch> for String {
  fn from(arch: Arch) -> Self {
    arch.as_str().to_string()
  }
}
