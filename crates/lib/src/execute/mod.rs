//! Build execution.
//!
//! This module drives a [`BuildPlan`] to completion through a
//! [`BuildExecutor`]. It handles:
//! - Ready-queue scheduling: a stage starts as soon as all of its upstreams succeeded
//! - Bounded parallelism of independent stages
//! - Transfer gating, verification and artifact recording per stage
//! - Failure propagation: dependents of a failed stage are blocked, never run
//! - The stage cache

pub mod executor;
pub mod plan;
pub mod shell;
#[cfg(test)]
pub(crate) mod testing;
pub mod types;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::descriptor::{ArtifactDecl, StageId, StageSpec};
use crate::ledger::storage::unix_now;
use crate::ledger::{ArtifactLedger, CacheEntry, LedgerStore, StageCacheKey};
use crate::transfer::TransferPlanner;
use crate::util::hash::ContentHash;
use crate::verify::first_failure;

pub use executor::{BuildExecutor, ExecutorError, ProducedArtifact, StageInvocation};
pub use plan::BuildPlan;
pub use shell::ShellExecutor;
pub use types::{ExecuteConfig, PlanError, RunReport, StageFailure, StageReport, StageStatus};

/// Runs build plans.
pub struct Orchestrator {
  executor: Arc<dyn BuildExecutor>,
  store: Option<LedgerStore>,
  config: ExecuteConfig,
}

/// Shared by every stage task of one run.
struct RunContext {
  run_id: String,
  plan: Arc<BuildPlan>,
  ledger: ArtifactLedger,
  executor: Arc<dyn BuildExecutor>,
  store: Option<LedgerStore>,
  config: ExecuteConfig,
}

impl Orchestrator {
  pub fn new(executor: Arc<dyn BuildExecutor>, config: ExecuteConfig) -> Self {
    Self {
      executor,
      store: None,
      config,
    }
  }

  /// Use `store` for the stage cache.
  pub fn with_store(mut self, store: LedgerStore) -> Self {
    self.store = Some(store);
    self
  }

  pub fn config(&self) -> &ExecuteConfig {
    &self.config
  }

  /// Execute a plan under a fresh run id.
  pub async fn run(&self, plan: BuildPlan) -> RunReport {
    self.run_with_id(plan, generate_run_id()).await
  }

  /// Execute a plan.
  ///
  /// Never fails as a whole: stage failures are recorded in the report and
  /// the build succeeds iff the terminal stage and everything it depends on
  /// succeeded.
  pub async fn run_with_id(&self, plan: BuildPlan, run_id: String) -> RunReport {
    let plan = Arc::new(plan);
    let graph = plan.graph();
    info!(run = %run_id, stages = graph.len(), parallelism = self.config.parallelism, "starting build");

    let ctx = Arc::new(RunContext {
      run_id: run_id.clone(),
      plan: plan.clone(),
      ledger: ArtifactLedger::new(),
      executor: self.executor.clone(),
      store: self.store.clone(),
      config: self.config.clone(),
    });

    let order: HashMap<StageId, usize> = graph
      .stages()
      .iter()
      .enumerate()
      .map(|(i, s)| (s.id.clone(), i))
      .collect();
    let mut reports: HashMap<StageId, StageReport> = plan
      .platforms()
      .iter()
      .map(|(id, platform)| (id.clone(), StageReport::new(id.clone(), platform.clone())))
      .collect();
    let mut waiting: HashMap<StageId, usize> = graph
      .stages()
      .iter()
      .map(|s| (s.id.clone(), graph.upstream(&s.id).len()))
      .collect();
    let mut ready: Vec<StageId> = graph
      .stages()
      .iter()
      .filter(|s| waiting.get(&s.id) == Some(&0))
      .map(|s| s.id.clone())
      .collect();

    let semaphore = Arc::new(Semaphore::new(self.config.parallelism.max(1)));
    let mut join_set = JoinSet::new();
    let mut in_flight: HashSet<StageId> = HashSet::new();

    loop {
      for id in ready.drain(..) {
        let (Some(stage), Some(report)) = (graph.stage(&id).cloned(), reports.get(&id).cloned()) else {
          continue;
        };
        in_flight.insert(id.clone());
        let ctx = ctx.clone();
        let semaphore = semaphore.clone();

        debug!(stage = %id, "scheduling stage");
        join_set.spawn(async move {
          // The semaphore is never closed.
          let _permit = semaphore.acquire_owned().await.ok();
          execute_stage(&ctx, stage, report).await
        });
      }

      let Some(joined) = join_set.join_next().await else {
        break;
      };

      let report = match joined {
        Ok(report) => report,
        Err(e) => {
          // Panicked stages stay in flight and are settled below.
          error!(error = %e, "stage task panicked");
          continue;
        }
      };

      let id = report.id.clone();
      in_flight.remove(&id);
      let succeeded = report.status == StageStatus::Succeeded;
      reports.insert(id.clone(), report);

      if succeeded {
        let mut unlocked = Vec::new();
        for down in graph.downstream(&id) {
          if let Some(n) = waiting.get_mut(&down) {
            *n = n.saturating_sub(1);
            if *n == 0 && reports.get(&down).is_some_and(|r| r.status == StageStatus::Pending) {
              unlocked.push(down);
            }
          }
        }
        unlocked.sort_by_key(|d| order.get(d).copied().unwrap_or(usize::MAX));
        ready.extend(unlocked);
      } else {
        block_dependents(&plan, &id, &mut reports);
      }
    }

    settle_unfinished(&plan, &in_flight, &mut reports);

    let succeeded = graph
      .required_for_terminal()
      .iter()
      .all(|id| reports.get(id).is_some_and(|r| r.status == StageStatus::Succeeded));

    let mut stages: Vec<StageReport> = reports.into_values().collect();
    stages.sort_by_key(|r| order.get(&r.id).copied().unwrap_or(usize::MAX));

    let report = RunReport {
      run_id,
      target: graph.terminal().clone(),
      succeeded,
      artifacts: ctx.ledger.snapshot(),
      stages,
    };

    info!(
      run = %report.run_id,
      succeeded = report.succeeded,
      failed = report.failed_stages().count(),
      blocked = report.blocked_stages().count(),
      artifacts = report.artifacts.len(),
      "build complete"
    );

    report
  }
}

/// Mark every pending transitive dependent of `failed` as blocked by it.
fn block_dependents(plan: &BuildPlan, failed: &StageId, reports: &mut HashMap<StageId, StageReport>) {
  for dependent in plan.graph().dependents(failed) {
    if let Some(report) = reports.get_mut(&dependent)
      && report.status == StageStatus::Pending
    {
      warn!(stage = %dependent, upstream = %failed, "stage blocked by failed upstream");
      report.status = StageStatus::Blocked {
        upstream: failed.clone(),
      };
    }
  }
}

/// Resolve stages left non-terminal after the scheduler drained.
///
/// Only reachable when a stage task panicked: `crashed` holds the stages
/// whose task never reported back.
fn settle_unfinished(plan: &BuildPlan, crashed: &HashSet<StageId>, reports: &mut HashMap<StageId, StageReport>) {
  for id in crashed {
    if reports.get(id).is_none_or(|r| r.status.is_terminal()) {
      continue;
    }
    if let Some(report) = reports.get_mut(id) {
      report.fail(StageFailure::Executor {
        stage: id.clone(),
        message: "stage task aborted".to_string(),
        stderr: None,
      });
    }
    block_dependents(plan, id, reports);
  }
}

async fn execute_stage(ctx: &RunContext, stage: StageSpec, mut report: StageReport) -> StageReport {
  let started = Instant::now();
  info!(stage = %stage.id, platform = %report.platform, "stage scheduled");

  match drive_stage(ctx, &stage, &mut report).await {
    Ok(()) => {
      report.status = StageStatus::Succeeded;
      info!(stage = %stage.id, cached = report.cache_hit, "stage succeeded");
    }
    Err(failure) => {
      error!(stage = %stage.id, error = %failure, "stage failed");
      report.fail(failure);
    }
  }

  report.duration_ms = started.elapsed().as_millis() as u64;
  report
}

/// Transfers, commands, checks, then recording. Nothing is recorded unless
/// every check passed.
async fn drive_stage(ctx: &RunContext, stage: &StageSpec, report: &mut StageReport) -> Result<(), StageFailure> {
  let planner = TransferPlanner::new(&ctx.ledger, ctx.plan.platforms(), ctx.plan.predicate());
  let transfers = match planner.plan_stage_transfers(stage) {
    Ok(transfers) => transfers,
    Err(e) => {
      // A rejected stage must not keep outputs from an earlier run.
      if let Err(reset) = ctx.executor.reset_stage(&stage.id).await {
        warn!(stage = %stage.id, error = %reset, "failed to clear rejected stage");
      }
      return Err(e.into());
    }
  };
  report.status = StageStatus::Running;
  debug!(stage = %stage.id, transfers = transfers.len(), "transfers planned");

  let invocation = StageInvocation {
    stage: stage.clone(),
    platform: report.platform.clone(),
    timeout: stage
      .timeout_secs
      .map(Duration::from_secs)
      .unwrap_or(ctx.config.default_timeout),
  };

  let cache_key = match &ctx.store {
    Some(_) if ctx.config.use_cache => match StageCacheKey::new(stage, &report.platform, &transfers).key() {
      Ok(key) => Some(key),
      Err(e) => {
        warn!(stage = %stage.id, error = %e, "failed to compute cache key");
        None
      }
    },
    _ => None,
  };
  let cached = match (&ctx.store, &cache_key) {
    (Some(store), Some(key)) => store.load_cache(key).unwrap_or_else(|e| {
      warn!(stage = %stage.id, error = %e, "ignoring unreadable cache entry");
      None
    }),
    _ => None,
  };
  report.cache_key = cache_key.clone();

  let mut produced = None;
  if let Some(entry) = &cached
    && !ctx.config.verify_reproducible
  {
    match ctx.executor.reuse_cached(&invocation, entry).await {
      Ok(true) => {
        info!(stage = %stage.id, key = %entry.key, "cache hit");
        report.cache_hit = true;
        produced = Some(
          entry
            .artifacts
            .iter()
            .map(|a| ProducedArtifact {
              path: a.path.clone(),
              content_hash: a.content_hash.clone(),
            })
            .collect(),
        );
      }
      Ok(false) => debug!(stage = %stage.id, "cached outputs unavailable, executing"),
      Err(e) => warn!(stage = %stage.id, error = %e, "failed to restore cached outputs, executing"),
    }
  }

  let produced = match produced {
    Some(produced) => produced,
    None => {
      ctx
        .executor
        .reset_stage(&stage.id)
        .await
        .map_err(|e| executor_failure(&stage.id, e))?;
      for op in &transfers {
        ctx
          .executor
          .transfer(op)
          .await
          .map_err(|e| executor_failure(&stage.id, e))?;
      }
      report.transfers = transfers;
      ctx
        .executor
        .run_stage(&invocation)
        .await
        .map_err(|e| executor_failure(&stage.id, e))?
    }
  };

  let outputs = match_declared(stage, produced)?;

  if let Some(entry) = &cached
    && !report.cache_hit
  {
    for previous in &entry.artifacts {
      if let Some((_, hash)) = outputs.iter().find(|(decl, _)| decl.path == previous.path)
        && *hash != previous.content_hash
      {
        return Err(StageFailure::ArtifactMutationConflict {
          stage: stage.id.clone(),
          path: previous.path.clone(),
          existing: previous.content_hash.clone(),
          attempted: hash.clone(),
        });
      }
    }
    debug!(stage = %stage.id, "outputs match cached run");
  }

  report.checks = ctx.plan.gate().run_checks(&invocation, ctx.executor.as_ref()).await;
  if let Some(failed) = first_failure(&report.checks) {
    return Err(StageFailure::from_check(failed));
  }

  let mut recorded = Vec::with_capacity(outputs.len());
  for (decl, hash) in outputs {
    recorded.push(
      ctx
        .ledger
        .record_artifact(&stage.id, &decl.path, hash, Some(&report.platform), decl.kind)?,
    );
  }

  if !report.cache_hit
    && let (Some(store), Some(key)) = (&ctx.store, cache_key)
  {
    let entry = CacheEntry {
      key,
      stage: stage.id.clone(),
      run_id: ctx.run_id.clone(),
      created_at: unix_now(),
      artifacts: recorded,
    };
    if let Err(e) = store.save_cache(&entry) {
      warn!(stage = %stage.id, error = %e, "failed to save cache entry");
    }
  }

  Ok(())
}

/// Pair every declared output with its produced hash.
fn match_declared(stage: &StageSpec, produced: Vec<ProducedArtifact>) -> Result<Vec<(ArtifactDecl, ContentHash)>, StageFailure> {
  let mut hashes: HashMap<String, ContentHash> = produced.into_iter().map(|p| (p.path, p.content_hash)).collect();

  stage
    .artifacts
    .iter()
    .map(|decl| match hashes.remove(&decl.path) {
      Some(hash) => Ok((decl.clone(), hash)),
      None => Err(executor_failure(
        &stage.id,
        ExecutorError::MissingArtifact {
          stage: stage.id.clone(),
          path: decl.path.clone(),
        },
      )),
    })
    .collect()
}

fn executor_failure(stage: &StageId, err: ExecutorError) -> StageFailure {
  let stderr = match &err {
    ExecutorError::CommandFailed { stderr, .. } if !stderr.is_empty() => Some(stderr.clone()),
    _ => None,
  };
  StageFailure::Executor {
    stage: stage.clone(),
    message: err.to_string(),
    stderr,
  }
}

/// A new, time-ordered run id.
pub fn generate_run_id() -> String {
  let nanos = SystemTime::now()
    .duration_since(UNIX_EPOCH)
    .map(|d| d.as_nanos())
    .unwrap_or(0);
  format!("{:x}", nanos)
}
