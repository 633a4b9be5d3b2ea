//! Persisted run records and the stage cache.
//!
//! # Storage Layout
//!
//! ```text
//! {data_dir}/
//! ├── runs/
//! │   ├── index.json      # RunIndex: metadata of every persisted run
//! │   └── <run-id>.json   # RunRecord: full report and ledger of one run
//! └── cache/
//!     └── <key>.json      # CacheEntry: outputs of one successful stage
//! ```
//!
//! All writes go to a temporary file first and are renamed into place.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::descriptor::StageId;
use crate::execute::RunReport;
use crate::platform::paths::data_dir;
use crate::util::hash::ObjectHash;

use super::CacheEntry;

const RUNS_DIR: &str = "runs";
const CACHE_DIR: &str = "cache";
const INDEX_FILENAME: &str = "index.json";

/// Current version of the run index format.
pub const RUN_INDEX_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum StoreError {
  #[error("failed to create directory: {0}")]
  CreateDir(#[source] io::Error),

  #[error("failed to read: {0}")]
  Read(#[source] io::Error),

  #[error("failed to write: {0}")]
  Write(#[source] io::Error),

  #[error("failed to parse: {0}")]
  Parse(#[source] serde_json::Error),

  #[error("failed to serialize: {0}")]
  Serialize(#[source] serde_json::Error),

  #[error("run not found: {0}")]
  NotFound(String),

  #[error("unsupported run index version: {0}")]
  UnsupportedVersion(u32),
}

/// One persisted run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
  pub id: String,
  pub created_at: u64,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub descriptor: Option<PathBuf>,
  pub report: RunReport,
}

impl RunRecord {
  pub fn new(report: RunReport, descriptor: Option<PathBuf>) -> Self {
    Self {
      id: report.run_id.clone(),
      created_at: unix_now(),
      descriptor,
      report,
    }
  }

  pub fn to_metadata(&self) -> RunMetadata {
    RunMetadata {
      id: self.id.clone(),
      created_at: self.created_at,
      target: self.report.target.clone(),
      succeeded: self.report.succeeded,
      stage_count: self.report.stages.len(),
      artifact_count: self.report.artifacts.len(),
    }
  }
}

/// Index entry for a persisted run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunMetadata {
  pub id: String,
  pub created_at: u64,
  pub target: StageId,
  pub succeeded: bool,
  pub stage_count: usize,
  pub artifact_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunIndex {
  pub version: u32,
  pub runs: Vec<RunMetadata>,
}

impl Default for RunIndex {
  fn default() -> Self {
    Self {
      version: RUN_INDEX_VERSION,
      runs: Vec::new(),
    }
  }
}

/// Disk storage for run records and cache entries.
#[derive(Debug, Clone)]
pub struct LedgerStore {
  base_path: PathBuf,
}

impl LedgerStore {
  pub fn new(base_path: PathBuf) -> Self {
    Self { base_path }
  }

  /// Store rooted at the data directory.
  pub fn default_store() -> Self {
    Self::new(data_dir())
  }

  pub fn base_path(&self) -> &Path {
    &self.base_path
  }

  fn runs_dir(&self) -> PathBuf {
    self.base_path.join(RUNS_DIR)
  }

  fn cache_dir(&self) -> PathBuf {
    self.base_path.join(CACHE_DIR)
  }

  fn run_path(&self, id: &str) -> PathBuf {
    self.runs_dir().join(format!("{}.json", id))
  }

  fn cache_path(&self, key: &ObjectHash) -> PathBuf {
    self.cache_dir().join(format!("{}.json", key.0))
  }

  pub fn load_index(&self) -> Result<RunIndex, StoreError> {
    let content = match fs::read_to_string(self.runs_dir().join(INDEX_FILENAME)) {
      Ok(content) => content,
      Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(RunIndex::default()),
      Err(e) => return Err(StoreError::Read(e)),
    };

    let index: RunIndex = serde_json::from_str(&content).map_err(StoreError::Parse)?;
    if index.version != RUN_INDEX_VERSION {
      return Err(StoreError::UnsupportedVersion(index.version));
    }
    Ok(index)
  }

  /// Persist a run and add it to the index.
  pub fn save_run(&self, record: &RunRecord) -> Result<(), StoreError> {
    write_json_atomic(&self.run_path(&record.id), record)?;

    let mut index = self.load_index()?;
    index.runs.retain(|r| r.id != record.id);
    index.runs.push(record.to_metadata());
    write_json_atomic(&self.runs_dir().join(INDEX_FILENAME), &index)?;

    debug!(run = %record.id, "saved run record");
    Ok(())
  }

  pub fn load_run(&self, id: &str) -> Result<RunRecord, StoreError> {
    let content = fs::read_to_string(self.run_path(id)).map_err(|e| {
      if e.kind() == io::ErrorKind::NotFound {
        StoreError::NotFound(id.to_string())
      } else {
        StoreError::Read(e)
      }
    })?;
    serde_json::from_str(&content).map_err(StoreError::Parse)
  }

  /// Persisted runs, oldest first.
  pub fn list_runs(&self) -> Result<Vec<RunMetadata>, StoreError> {
    Ok(self.load_index()?.runs)
  }

  /// The most recently persisted run, if any.
  pub fn latest_run(&self) -> Result<Option<RunMetadata>, StoreError> {
    Ok(self.load_index()?.runs.pop())
  }

  pub fn load_cache(&self, key: &ObjectHash) -> Result<Option<CacheEntry>, StoreError> {
    match fs::read_to_string(self.cache_path(key)) {
      Ok(content) => serde_json::from_str(&content).map(Some).map_err(StoreError::Parse),
      Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
      Err(e) => Err(StoreError::Read(e)),
    }
  }

  pub fn save_cache(&self, entry: &CacheEntry) -> Result<(), StoreError> {
    write_json_atomic(&self.cache_path(&entry.key), entry)
  }
}

fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
  if let Some(dir) = path.parent() {
    fs::create_dir_all(dir).map_err(StoreError::CreateDir)?;
  }
  let content = serde_json::to_string_pretty(value).map_err(StoreError::Serialize)?;
  let temp_path = path.with_extension("json.tmp");
  fs::write(&temp_path, content).map_err(StoreError::Write)?;
  fs::rename(&temp_path, path).map_err(StoreError::Write)
}

pub(crate) fn unix_now() -> u64 {
  SystemTime::now()
    .duration_since(UNIX_EPOCH)
    .map(|d| d.as_secs())
    .unwrap_or(0)
}
