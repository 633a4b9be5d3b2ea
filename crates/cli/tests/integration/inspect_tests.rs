use predicates::prelude::*;

use super::common::TestEnv;

#[test]
fn inspect_without_runs_fails() {
  let env = TestEnv::from_fixture("native.yaml");

  env
    .cmd()
    .arg("inspect-ledger")
    .assert()
    .failure()
    .stderr(predicate::str::contains("No runs recorded"));
}

#[test]
fn inspect_latest_run() {
  let env = TestEnv::from_fixture("native.yaml");
  env.cmd().args(["build", env.descriptor()]).assert().code(0);

  env
    .cmd()
    .arg("inspect-ledger")
    .assert()
    .success()
    .stdout(predicate::str::contains("builder:/out/native.bin"))
    .stdout(predicate::str::contains("compiled_binary"))
    .stdout(predicate::str::contains("linux/amd64/musl-1.2.4/libstdc++-13"));
}

#[test]
fn inspect_json_by_run_id() {
  let env = TestEnv::from_fixture("native.yaml");
  let (_, report) = env.build_json();
  let run_id = report["run_id"].as_str().unwrap().to_string();

  let output = env
    .cmd()
    .args(["-o", "json", "inspect-ledger", &run_id])
    .output()
    .unwrap();
  assert!(output.status.success());

  let artifacts: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
  let artifacts = artifacts.as_array().unwrap();
  assert_eq!(artifacts.len(), 1);
  assert_eq!(artifacts[0]["stage"], "builder");
  assert_eq!(artifacts[0]["content_hash"], report["artifacts"][0]["content_hash"]);
}

#[test]
fn inspect_failed_run_keeps_upstream_artifacts() {
  let env = TestEnv::from_fixture("mismatch.yaml");
  env.cmd().args(["build", env.descriptor()]).assert().code(1);

  env
    .cmd()
    .args(["inspect-ledger", "--stage", "builder"])
    .assert()
    .success()
    .stdout(predicate::str::contains("Succeeded"))
    .stdout(predicate::str::contains("builder:/out/native.bin"));
}

#[test]
fn runs_lists_builds_newest_first() {
  let env = TestEnv::from_fixture("native.yaml");

  env
    .cmd()
    .arg("runs")
    .assert()
    .success()
    .stdout(predicate::str::contains("No runs recorded"));

  env.cmd().args(["build", env.descriptor()]).assert().code(0);
  env.swap_fixture("mismatch.yaml");
  env.cmd().args(["build", env.descriptor()]).assert().code(1);

  let output = env.cmd().args(["-o", "json", "runs"]).output().unwrap();
  let runs: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
  let runs = runs.as_array().unwrap();
  assert_eq!(runs.len(), 2);
  assert_eq!(runs[0]["succeeded"], false);
  assert_eq!(runs[1]["succeeded"], true);
}
