//! stagegate-lib: Core types and logic for stagegate
//!
//! This crate provides the building blocks of a platform-aware multi-stage
//! build engine:
//! - `PlatformTarget`: the OS/architecture/libc/runtime-library fingerprint a stage is bound to
//! - `StageGraph`: the validated DAG of build stages from a descriptor
//! - `ArtifactLedger`: append-only record of what each stage produced and under which platform
//! - `TransferPlanner`: gates inter-stage copies on platform compatibility
//! - `VerificationGate`: declarative post-transfer checks
//! - `Orchestrator`: drives a `BuildPlan` to completion through a `BuildExecutor`

pub mod consts;
pub mod descriptor;
pub mod execute;
pub mod graph;
pub mod ledger;
pub mod platform;
pub mod transfer;
pub mod util;
pub mod verify;
