use predicates::prelude::*;

use super::common::TestEnv;

#[test]
fn build_compatible_descriptor_succeeds() {
  let env = TestEnv::from_fixture("native.yaml");

  env
    .cmd()
    .args(["build", env.descriptor()])
    .assert()
    .code(0)
    .stdout(predicate::str::contains("Build succeeded"))
    .stdout(predicate::str::contains("native addon loads"));
}

#[test]
fn build_platform_mismatch_exits_one() {
  let env = TestEnv::from_fixture("mismatch.yaml");

  env
    .cmd()
    .args(["build", env.descriptor()])
    .assert()
    .code(1)
    .stdout(predicate::str::contains("platform mismatch"))
    .stdout(predicate::str::contains("linux/arm64/glibc-2.36/libstdc++-12"));
}

#[test]
fn build_mismatch_json_report() {
  let env = TestEnv::from_fixture("mismatch.yaml");

  let (code, report) = env.build_json();
  assert_eq!(code, 1);
  assert_eq!(report["succeeded"], false);

  let runtime = report["stages"]
    .as_array()
    .unwrap()
    .iter()
    .find(|s| s["id"] == "runtime")
    .unwrap();
  assert_eq!(runtime["failure"]["kind"], "platform_mismatch");
  assert_eq!(runtime["failure"]["artifact_path"], "/out/native.bin");
  assert_eq!(runtime["failure"]["source_stage"], "builder");
}

#[test]
fn build_failing_check_exits_one() {
  let env = TestEnv::from_fixture("failing_check.yaml");

  env
    .cmd()
    .args(["build", env.descriptor()])
    .assert()
    .code(1)
    .stdout(predicate::str::contains("verification failed"));
}

#[test]
fn build_cycle_exits_two() {
  let env = TestEnv::from_fixture("cycle.yaml");

  env
    .cmd()
    .args(["build", env.descriptor()])
    .assert()
    .code(2)
    .stderr(predicate::str::contains("cycle"));
}

#[test]
fn build_ambiguous_platform_exits_two_without_executing() {
  let env = TestEnv::from_fixture("ambiguous.yaml");

  env
    .cmd()
    .args(["build", env.descriptor()])
    .assert()
    .code(2)
    .stderr(predicate::str::contains("upstreams disagree"))
    .stderr(predicate::str::contains("amd64-deps"))
    .stderr(predicate::str::contains("arm64-deps"));

  assert!(!env.data_path().join("work").exists());
  assert!(!env.data_path().join("runs").exists());
}

#[test]
fn build_failure_shows_command_stderr() {
  let env = TestEnv::from_fixture("link_error.yaml");

  env
    .cmd()
    .args(["build", env.descriptor()])
    .assert()
    .code(1)
    .stdout(predicate::str::contains("undefined reference to napi_module_register"));
}

#[test]
fn build_unknown_image_exits_two() {
  let env = TestEnv::from_fixture("unknown_image.yaml");

  env
    .cmd()
    .args(["build", env.descriptor()])
    .assert()
    .code(2)
    .stderr(predicate::str::contains("scratch-unknown"));
}

#[test]
fn second_build_hits_cache() {
  let env = TestEnv::from_fixture("native.yaml");

  let (code, first) = env.build_json();
  assert_eq!(code, 0);
  assert!(first["stages"].as_array().unwrap().iter().all(|s| s["cache_hit"] == false));

  let (code, second) = env.build_json();
  assert_eq!(code, 0);
  assert!(second["stages"].as_array().unwrap().iter().all(|s| s["cache_hit"] == true));
}

#[test]
fn no_cache_reexecutes() {
  let env = TestEnv::from_fixture("native.yaml");
  env.cmd().args(["build", env.descriptor()]).assert().code(0);

  let output = env
    .cmd()
    .args(["-o", "json", "build", "--no-cache", env.descriptor()])
    .output()
    .unwrap();
  let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
  assert!(report["stages"].as_array().unwrap().iter().all(|s| s["cache_hit"] == false));
}

#[test]
fn target_platform_override_applies_to_every_stage() {
  let env = TestEnv::from_fixture("mismatch.yaml");

  // One forced platform on both sides makes the transfer compatible.
  env
    .cmd()
    .args(["build", "--target-platform", "linux/arm64/glibc-2.36/libstdc++-12", env.descriptor()])
    .assert()
    .code(0);
}

#[test]
fn invalid_target_platform_exits_two() {
  let env = TestEnv::from_fixture("native.yaml");

  env
    .cmd()
    .args(["build", "--target-platform", "plan9", env.descriptor()])
    .assert()
    .code(2);
}
