//! Shared test helpers for CLI integration tests.

use std::path::PathBuf;

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use tempfile::TempDir;

/// Get path to a fixture file.
pub fn fixture_path(name: &str) -> PathBuf {
  PathBuf::from(env!("CARGO_MANIFEST_DIR"))
    .join("tests")
    .join("fixtures")
    .join(name)
}

/// Read fixture content.
pub fn fixture_content(name: &str) -> String {
  std::fs::read_to_string(fixture_path(name)).unwrap_or_else(|e| panic!("Failed to load fixture {}: {}", name, e))
}

/// Isolated test environment.
///
/// Each test gets its own temporary directory holding the descriptor, an
/// `images.toml` registry beside it and the data directory.
pub struct TestEnv {
  pub temp: TempDir,
  pub descriptor_path: PathBuf,
}

impl TestEnv {
  /// Create from a descriptor fixture, with the shared registry fixture.
  pub fn from_fixture(name: &str) -> Self {
    let temp = TempDir::new().unwrap();
    let descriptor_path = temp.path().join("build.yaml");
    std::fs::write(&descriptor_path, fixture_content(name)).unwrap();
    std::fs::write(temp.path().join("images.toml"), fixture_content("images.toml")).unwrap();
    Self { temp, descriptor_path }
  }

  /// Replace the descriptor with a different fixture, keeping the data directory.
  pub fn swap_fixture(&self, name: &str) {
    std::fs::write(&self.descriptor_path, fixture_content(name)).unwrap();
  }

  pub fn descriptor(&self) -> &str {
    self.descriptor_path.to_str().unwrap()
  }

  /// Data path for run records, the stage cache and work trees.
  pub fn data_path(&self) -> PathBuf {
    let p = self.temp.path().join("data");
    std::fs::create_dir_all(&p).unwrap();
    dunce::canonicalize(&p).unwrap_or(p)
  }

  /// Get a pre-configured Command for the stagegate binary.
  ///
  /// Sets `STAGEGATE_DATA_DIR` to the isolated data path and clears
  /// variables that would leak host configuration into the test.
  pub fn cmd(&self) -> Command {
    let mut cmd: Command = cargo_bin_cmd!("stagegate");
    cmd.env("STAGEGATE_DATA_DIR", self.data_path());
    cmd.env_remove("STAGEGATE_REGISTRY");
    cmd.env_remove("STAGEGATE_TARGET_PLATFORM");
    cmd.env("NO_COLOR", "1");
    cmd
  }

  /// Run `build` and return the parsed JSON report.
  pub fn build_json(&self) -> (i32, serde_json::Value) {
    let output = self.cmd().args(["-o", "json", "build", self.descriptor()]).output().unwrap();
    let report = serde_json::from_slice(&output.stdout)
      .unwrap_or_else(|e| panic!("invalid JSON ({e}): {}", String::from_utf8_lossy(&output.stdout)));
    (output.status.code().unwrap(), report)
  }
}
