use predicates::prelude::*;

use super::common::TestEnv;

#[test]
fn plan_lists_waves() {
  let env = TestEnv::from_fixture("native.yaml");

  env
    .cmd()
    .args(["plan", env.descriptor()])
    .assert()
    .code(0)
    .stdout(predicate::str::contains("Wave 1:"))
    .stdout(predicate::str::contains("Wave 2:"))
    .stdout(predicate::str::contains("Plan is valid"));
}

#[test]
fn plan_predicts_mismatch_without_executing() {
  let env = TestEnv::from_fixture("mismatch.yaml");

  env
    .cmd()
    .args(["plan", env.descriptor()])
    .assert()
    .code(1)
    .stderr(predicate::str::contains("/out/native.bin"));

  assert!(!env.data_path().join("work").exists());
}

#[test]
fn plan_json_output() {
  let env = TestEnv::from_fixture("native.yaml");

  let output = env.cmd().args(["-o", "json", "plan", env.descriptor()]).output().unwrap();
  assert!(output.status.success());
  let plan: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
  assert_eq!(plan["target"], "runtime");
}

#[test]
fn plan_cycle_exits_two() {
  let env = TestEnv::from_fixture("cycle.yaml");

  env.cmd().args(["plan", env.descriptor()]).assert().code(2);
}

#[test]
fn checks_lists_registered_checks() {
  let env = TestEnv::from_fixture("native.yaml");

  env
    .cmd()
    .args(["checks", env.descriptor()])
    .assert()
    .success()
    .stdout(predicate::str::contains("native addon loads"))
    .stdout(predicate::str::contains("cat app/native.bin"));
}

#[test]
fn checks_unknown_stage_exits_two() {
  let env = TestEnv::from_fixture("native.yaml");

  env
    .cmd()
    .args(["checks", "--stage", "nope", env.descriptor()])
    .assert()
    .code(2)
    .stderr(predicate::str::contains("Unknown stage"));
}
