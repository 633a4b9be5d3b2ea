use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::PlatformError;

/// C library flavour a base image ships.
///
/// Binaries linked against one flavour never load under the other, whatever
/// the versions involved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum LibcFlavor {
  Glibc,
  Musl,
  /// No C library in the usual sense (macOS libSystem, Windows CRT).
  System,
}

impl LibcFlavor {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Glibc => "glibc",
      Self::Musl => "musl",
      Self::System => "system",
    }
  }
}

impl fmt::Display for LibcFlavor {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.as_str())
  }
}

impl FromStr for LibcFlavor {
  type Err = PlatformError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().as_str() {
      "glibc" | "gnu" => Ok(Self::Glibc),
      "musl" => Ok(Self::Musl),
      "system" | "msvc" | "libsystem" => Ok(Self::System),
      other => Err(PlatformError::UnknownLibc(other.to_string())),
    }
  }
}

impl TryFrom<String> for LibcFlavor {
  type Error = PlatformError;

  fn try_from(value: String) -> Result<Self, Self::Error> {
    value.parse()
  }
}

impl From<LibcFlavor> for String {
  fn from(libc: LibcFlavor) -> Self {
    libc.as_str().to_string()
  }
}
