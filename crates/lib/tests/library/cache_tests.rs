use stagegate_lib::descriptor::StageId;
use stagegate_lib::execute::{ExecuteConfig, Orchestrator, ShellExecutor, StageFailure, StageStatus};
use stagegate_lib::ledger::LedgerStore;
use std::sync::Arc;
use tempfile::TempDir;

use super::common::{native_descriptor, orchestrator, plan};

#[tokio::test]
async fn second_run_reuses_cached_stages() {
  let temp = TempDir::new().unwrap();
  let descriptor = native_descriptor("alpine-runtime", "cat app/native.bin");

  let first = orchestrator(temp.path()).run(plan(&descriptor)).await;
  assert!(first.succeeded);
  assert!(first.stages.iter().all(|s| !s.cache_hit));

  let second = orchestrator(temp.path()).run(plan(&descriptor)).await;
  assert!(second.succeeded);
  assert!(second.stages.iter().all(|s| s.cache_hit));

  // Checks still gate a cached stage.
  let runtime = second.stage(&StageId::new("runtime")).unwrap();
  assert_eq!(runtime.checks.len(), 1);

  let hashes = |r: &stagegate_lib::execute::RunReport| {
    r.artifacts
      .iter()
      .map(|a| (a.path.clone(), a.content_hash.clone()))
      .collect::<Vec<_>>()
  };
  assert_eq!(hashes(&first), hashes(&second));
}

#[tokio::test]
async fn changed_commands_miss_the_cache() {
  let temp = TempDir::new().unwrap();
  let first = native_descriptor("alpine-runtime", "cat app/native.bin");
  let changed = first.replace("printf 'elf-amd64'", "printf 'elf-amd64 v2'");

  orchestrator(temp.path()).run(plan(&first)).await;
  let report = orchestrator(temp.path()).run(plan(&changed)).await;

  assert!(report.succeeded);
  assert!(report.stages.iter().all(|s| !s.cache_hit));
}

#[tokio::test]
async fn nondeterministic_stage_fails_reproducibility_check() {
  let descriptor = r#"
stages:
  - id: stamp
    base_image: alpine-builder
    commands:
      - mkdir -p out && od -An -N8 -tx8 /dev/urandom > out/stamp
    artifacts:
      - path: /out/stamp
"#;
  let temp = TempDir::new().unwrap();
  orchestrator(temp.path()).run(plan(descriptor)).await;

  let config = ExecuteConfig {
    verify_reproducible: true,
    ..Default::default()
  };
  let report = Orchestrator::new(Arc::new(ShellExecutor::new(temp.path().join("work"))), config)
    .with_store(LedgerStore::new(temp.path().join("data")))
    .run(plan(descriptor))
    .await;

  let stamp = report.stage(&StageId::new("stamp")).unwrap();
  assert_eq!(stamp.status, StageStatus::Failed);
  assert!(matches!(
    stamp.failure,
    Some(StageFailure::ArtifactMutationConflict { .. })
  ));
}
