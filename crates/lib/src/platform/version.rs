//! Library version numbers as they appear in base images.
//!
//! Distribution versions are rarely full semver (`2.36`, `13`, `1.2.4-r2`),
//! so parsing is lenient: missing minor/patch components default to zero and
//! anything after a `-` or `+` is dropped. Ordering follows semver.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use semver::Version;
use serde::{Deserialize, Serialize};

use super::PlatformError;

/// A comparable library version that keeps its original spelling for display.
///
/// Deserializes from strings and from bare numbers; YAML `2.36` arrives as a
/// float, so write `"1.10"` quoted when a trailing zero matters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "VersionRepr", into = "String")]
pub struct AbiVersion {
  raw: String,
  version: Version,
}

impl AbiVersion {
  pub fn parse(raw: &str) -> Result<Self, PlatformError> {
    let trimmed = raw.trim();
    let core = trimmed.split(['-', '+']).next().unwrap_or_default();

    let mut parts = core.split('.');
    let mut next = || -> Result<u64, PlatformError> {
      match parts.next() {
        None | Some("") => Ok(0),
        Some(p) => p.parse().map_err(|_| PlatformError::InvalidVersion(raw.to_string())),
      }
    };

    if core.is_empty() {
      return Err(PlatformError::InvalidVersion(raw.to_string()));
    }

    let version = Version::new(next()?, next()?, next()?);
    if parts.next().is_some() {
      return Err(PlatformError::InvalidVersion(raw.to_string()));
    }

    Ok(Self {
      raw: trimmed.to_string(),
      version,
    })
  }

  pub fn as_str(&self) -> &str {
    &self.raw
  }

  pub fn semver(&self) -> &Version {
    &self.version
  }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum VersionRepr {
  Text(String),
  Integer(u64),
  Float(f64),
}

impl TryFrom<VersionRepr> for AbiVersion {
  type Error = PlatformError;

  fn try_from(repr: VersionRepr) -> Result<Self, Self::Error> {
    match repr {
      VersionRepr::Text(s) => Self::parse(&s),
      VersionRepr::Integer(n) => Self::parse(&n.to_string()),
      VersionRepr::Float(f) => Self::parse(&f.to_string()),
    }
  }
}

impl PartialEq for AbiVersion {
  fn eq(&self, other: &Self) -> bool {
    self.version == other.version
  }
}

impl Eq for AbiVersion {}

impl std::hash::Hash for AbiVersion {
  fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
    self.version.hash(state);
  }
}

impl PartialOrd for AbiVersion {
  fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
    Some(self.cmp(other))
  }
}

impl Ord for AbiVersion {
  fn cmp(&self, other: &Self) -> Ordering {
    self.version.cmp(&other.version)
  }
}

impl fmt::Display for AbiVersion {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.raw)
  }
}

impl FromStr for AbiVersion {
  type Err = PlatformError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Self::parse(s)
  }
}

impl From<AbiVersion> for String {
  fn from(v: AbiVersion) -> Self {
    v.raw
  }
}
