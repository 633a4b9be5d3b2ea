//! On-disk locations. Run records and the stage cache live in the data
//! directory (see `LedgerStore`), executor work trees under `work/`.
//!
//! Everything lives under the data directory, which is `STAGEGATE_DATA_DIR`
//! when set and the XDG data home otherwise.

use std::path::PathBuf;

use crate::consts::{APP_NAME, DATA_DIR_ENV};

/// Returns the user's home directory
#[cfg(windows)]
pub fn home_dir() -> PathBuf {
  let userprofile = std::env::var("USERPROFILE").unwrap_or_else(|_| ".".to_string());
  PathBuf::from(userprofile)
}

/// Returns the user's home directory
#[cfg(not(windows))]
pub fn home_dir() -> PathBuf {
  let home = std::env::var("HOME").unwrap_or_else(|_| "/".to_string());
  PathBuf::from(home)
}

/// Returns the directory for data files for the application
#[cfg(windows)]
pub fn data_dir() -> PathBuf {
  if let Some(dir) = data_dir_override() {
    return dir;
  }
  let appdata = std::env::var("APPDATA").map(PathBuf::from).unwrap_or_else(|_| home_dir());
  appdata.join(APP_NAME)
}

/// Returns the directory for data files for the application
#[cfg(not(windows))]
pub fn data_dir() -> PathBuf {
  if let Some(dir) = data_dir_override() {
    return dir;
  }
  let data_home = std::env::var("XDG_DATA_HOME")
    .map(PathBuf::from)
    .unwrap_or_else(|_| home_dir().join(".local").join("share"));
  data_home.join(APP_NAME)
}

fn data_dir_override() -> Option<PathBuf> {
  std::env::var(DATA_DIR_ENV)
    .ok()
    .filter(|v| !v.is_empty())
    .map(PathBuf::from)
}

/// Root of the shell executor's per-stage work directories.
pub fn work_dir() -> PathBuf {
  data_dir().join("work")
}
