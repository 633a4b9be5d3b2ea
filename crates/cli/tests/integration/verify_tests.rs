use predicates::prelude::*;

use super::common::TestEnv;

#[test]
fn verify_before_build_fails() {
  let env = TestEnv::from_fixture("native.yaml");

  env
    .cmd()
    .args(["verify", env.descriptor()])
    .assert()
    .code(1)
    .stderr(predicate::str::contains("has not been built"));
}

#[test]
fn verify_after_build_passes() {
  let env = TestEnv::from_fixture("native.yaml");
  env.cmd().args(["build", env.descriptor()]).assert().code(0);

  env
    .cmd()
    .args(["verify", env.descriptor()])
    .assert()
    .code(0)
    .stdout(predicate::str::contains("Stage 'runtime' verified"));
}

#[test]
fn verify_reports_changed_expectations() {
  let env = TestEnv::from_fixture("native.yaml");
  env.cmd().args(["build", env.descriptor()]).assert().code(0);

  env.swap_fixture("failing_check.yaml");
  env
    .cmd()
    .args(["verify", env.descriptor()])
    .assert()
    .code(1)
    .stderr(predicate::str::contains("Verification of stage 'runtime' failed"));
}

#[test]
fn verify_unknown_stage_exits_two() {
  let env = TestEnv::from_fixture("native.yaml");

  env
    .cmd()
    .args(["verify", "--stage", "missing", env.descriptor()])
    .assert()
    .code(2);
}
