use stagegate_lib::descriptor::StageId;
use stagegate_lib::execute::{ExecuteConfig, StageFailure, StageStatus};
use stagegate_lib::ledger::ArtifactKind;
use stagegate_lib::verify::CheckStatus;
use tempfile::TempDir;

use super::common::{native_descriptor, orchestrator, orchestrator_with, plan};

fn id(s: &str) -> StageId {
  StageId::new(s)
}

#[tokio::test]
async fn compatible_pipeline_succeeds() {
  let temp = TempDir::new().unwrap();
  let report = orchestrator(temp.path())
    .run(plan(&native_descriptor("alpine-runtime", "cat app/native.bin")))
    .await;

  assert!(report.succeeded, "{:#?}", report.stages);
  assert_eq!(report.exit_code(), 0);

  let runtime = report.stage(&id("runtime")).unwrap();
  assert_eq!(runtime.status, StageStatus::Succeeded);
  assert_eq!(runtime.transfers.len(), 2);
  assert_eq!(runtime.checks.len(), 1);
  assert_eq!(runtime.checks[0].status, CheckStatus::Pass);

  let copied = temp.path().join("work/runtime/app/native.bin");
  assert_eq!(std::fs::read_to_string(copied).unwrap(), "elf-amd64");
  assert!(temp.path().join("work/runtime/app/src/app.js").exists());

  let native = report
    .artifacts
    .iter()
    .find(|a| a.path == "/out/native.bin")
    .unwrap();
  assert_eq!(native.kind, ArtifactKind::CompiledBinary);
  assert_eq!(native.produced_under.as_ref().unwrap().to_string(), "linux/amd64/musl-1.2.4/libstdc++-13");

  let source = report.artifacts.iter().find(|a| a.path == "/src").unwrap();
  assert!(source.produced_under.is_none());
}

#[tokio::test]
async fn cross_platform_binary_is_rejected_before_copy() {
  let temp = TempDir::new().unwrap();
  let report = orchestrator(temp.path())
    .run(plan(&native_descriptor("debian-arm", "cat app/native.bin")))
    .await;

  assert!(!report.succeeded);
  assert_eq!(report.exit_code(), 1);
  assert_eq!(report.stage(&id("builder")).unwrap().status, StageStatus::Succeeded);

  let runtime = report.stage(&id("runtime")).unwrap();
  assert_eq!(runtime.status, StageStatus::Failed);
  assert!(runtime.checks.is_empty());
  match runtime.failure.as_ref().unwrap() {
    StageFailure::PlatformMismatch {
      artifact_path,
      source_stage,
      destination_stage,
      produced,
      required,
    } => {
      assert_eq!(artifact_path, "/out/native.bin");
      assert_eq!(source_stage, &id("builder"));
      assert_eq!(destination_stage, &id("runtime"));
      assert_eq!(produced.to_string(), "linux/amd64/musl-1.2.4/libstdc++-13");
      assert_eq!(required.to_string(), "linux/arm64/glibc-2.36/libstdc++-12");
    }
    other => panic!("unexpected failure: {other:?}"),
  }

  // Nothing was copied into the runtime stage, not even the portable sources.
  assert!(!temp.path().join("work/runtime/app").exists());
}

#[tokio::test]
async fn source_artifacts_cross_platforms() {
  let descriptor = r#"
stages:
  - id: builder
    base_image: alpine-builder
    commands:
      - mkdir -p src && echo 'print("hi")' > src/main.py
    artifacts:
      - path: /src
        kind: source
  - id: runtime
    base_image: debian-arm
    consumes:
      - stage: builder
        path: /src
    checks:
      - name: sources present
        command: test -f src/main.py
"#;
  let temp = TempDir::new().unwrap();
  let report = orchestrator(temp.path()).run(plan(descriptor)).await;

  assert!(report.succeeded, "{:#?}", report.stages);
  assert_eq!(report.target, id("runtime"));
}

#[tokio::test]
async fn failed_check_fails_the_run() {
  let temp = TempDir::new().unwrap();
  let report = orchestrator(temp.path())
    .run(plan(&native_descriptor("alpine-runtime", "echo 'Error: symbol not found: bcrypt'")))
    .await;

  assert!(!report.succeeded);
  let runtime = report.stage(&id("runtime")).unwrap();
  assert_eq!(runtime.status, StageStatus::Failed);
  assert_eq!(runtime.checks[0].status, CheckStatus::Fail);
  match runtime.failure.as_ref().unwrap() {
    StageFailure::Verification { check, output, .. } => {
      assert_eq!(check, "native addon loads");
      assert!(output.as_ref().unwrap().stdout.contains("symbol not found"));
    }
    other => panic!("unexpected failure: {other:?}"),
  }
}

#[tokio::test]
async fn failing_command_blocks_dependents() {
  let descriptor = r#"
target: runtime
stages:
  - id: deps
    base_image: alpine-builder
    commands:
      - exit 3
    artifacts:
      - path: /deps
  - id: docs
    base_image: alpine-builder
    commands:
      - mkdir -p site && echo ok > site/index.html
    artifacts:
      - path: /site
        kind: source
  - id: runtime
    base_image: alpine-runtime
    consumes:
      - stage: deps
        path: /deps
      - stage: docs
        path: /site
"#;
  let temp = TempDir::new().unwrap();
  let report = orchestrator(temp.path()).run(plan(descriptor)).await;

  assert!(!report.succeeded);
  assert_eq!(report.stage(&id("deps")).unwrap().status, StageStatus::Failed);
  assert_eq!(report.stage(&id("docs")).unwrap().status, StageStatus::Succeeded);
  assert!(matches!(
    report.stage(&id("runtime")).unwrap().status,
    StageStatus::Blocked { .. }
  ));
  assert!(matches!(
    report.stage(&id("deps")).unwrap().failure,
    Some(StageFailure::Executor { .. })
  ));
}

#[tokio::test]
async fn command_stderr_is_kept_in_the_report() {
  let descriptor = r#"
stages:
  - id: link
    base_image: alpine-builder
    commands:
      - "printf 'undefined reference %s\\n' to_napi_module >&2; exit 3"
"#;
  let temp = TempDir::new().unwrap();
  let report = orchestrator(temp.path()).run(plan(descriptor)).await;

  let link = report.stage(&id("link")).unwrap();
  let Some(StageFailure::Executor { stderr, message, .. }) = &link.failure else {
    panic!("unexpected failure: {:?}", link.failure);
  };
  assert!(message.contains("exit code"));
  assert_eq!(stderr.as_deref(), Some("undefined reference to_napi_module"));
}

#[tokio::test]
async fn outputs_left_by_an_earlier_run_are_not_reused() {
  let first = r#"
stages:
  - id: build
    base_image: alpine-builder
    commands:
      - mkdir -p out && echo v1 > out/x
    artifacts:
      - path: /out/x
"#;
  let second = first.replace("mkdir -p out && echo v1 > out/x", "\"true\"");
  let temp = TempDir::new().unwrap();
  let no_cache = || ExecuteConfig {
    use_cache: false,
    ..Default::default()
  };

  assert!(orchestrator_with(temp.path(), no_cache()).run(plan(first)).await.succeeded);
  let report = orchestrator_with(temp.path(), no_cache()).run(plan(&second)).await;

  let build = report.stage(&id("build")).unwrap();
  assert_eq!(build.status, StageStatus::Failed);
  let Some(StageFailure::Executor { message, .. }) = &build.failure else {
    panic!("unexpected failure: {:?}", build.failure);
  };
  assert!(message.contains("did not produce declared artifact '/out/x'"), "{message}");
}

#[tokio::test]
async fn rejected_stage_drops_outputs_of_an_earlier_run() {
  let temp = TempDir::new().unwrap();
  let ok = orchestrator(temp.path())
    .run(plan(&native_descriptor("alpine-runtime", "cat app/native.bin")))
    .await;
  assert!(ok.succeeded);
  assert!(temp.path().join("work/runtime/app/native.bin").exists());

  let rejected = orchestrator(temp.path())
    .run(plan(&native_descriptor("debian-arm", "cat app/native.bin")))
    .await;
  assert!(!rejected.succeeded);
  assert!(!temp.path().join("work/runtime").exists());
}
