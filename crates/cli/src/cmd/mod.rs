//! Subcommand implementations.
//!
//! Each command returns the process exit code: `0` on success, `1` when a
//! stage failed (or a check did), `2` when the descriptor is invalid and
//! nothing was executed.

mod build;
mod checks;
mod inspect_ledger;
mod plan;
mod runs;
mod verify;

use std::path::Path;
use std::process::ExitCode;

use anyhow::Context;
use tracing::debug;

use stagegate_lib::descriptor::BuildDescriptor;
use stagegate_lib::execute::{BuildPlan, ShellExecutor};
use stagegate_lib::platform::{ImageRegistry, PlatformOverride};

use crate::PlanArgs;
use crate::output::{OutputFormat, print_error, print_json};

pub use build::{BuildOptions, cmd_build};
pub use checks::cmd_checks;
pub use inspect_ledger::cmd_inspect_ledger;
pub use plan::cmd_plan;
pub use runs::cmd_runs;
pub use verify::cmd_verify;

/// Exit code for a descriptor rejected before execution.
pub const EXIT_INVALID: u8 = 2;

/// A descriptor, registry or override that failed validation.
pub struct Invalid(anyhow::Error);

impl Invalid {
  /// Report the problem and produce the validation exit code.
  pub fn exit(self, format: OutputFormat) -> ExitCode {
    if format.is_json() {
      let _ = print_json(&serde_json::json!({ "error": format!("{:#}", self.0), "kind": "validation" }));
    }
    print_error(&format!("{:#}", self.0));
    ExitCode::from(EXIT_INVALID)
  }
}

impl From<anyhow::Error> for Invalid {
  fn from(err: anyhow::Error) -> Self {
    Self(err)
  }
}

/// A descriptor loaded and turned into a plan.
pub struct Loaded {
  pub plan: BuildPlan,
}

/// The shell executor dedicated to `descriptor`.
pub fn shell_executor(descriptor: &Path, shell: Option<&str>) -> ShellExecutor {
  let executor = ShellExecutor::for_descriptor(descriptor);
  match shell {
    Some(shell) => executor.with_shell(shell),
    None => executor,
  }
}

/// Load the descriptor and registry, apply the override and build the plan.
pub fn load_plan(args: &PlanArgs) -> Result<Loaded, Invalid> {
  let descriptor = BuildDescriptor::load(&args.descriptor)
    .with_context(|| format!("Failed to load descriptor: {}", args.descriptor.display()))?;

  let registry =
    ImageRegistry::discover(args.registry.as_deref(), &args.descriptor).context("Failed to load base-image registry")?;
  debug!(images = registry.len(), policy = %registry.policy, "loaded base-image registry");

  let target_override = args
    .target_platform
    .as_deref()
    .map(str::parse::<PlatformOverride>)
    .transpose()
    .context("Invalid target platform")?;

  let plan = BuildPlan::new(&descriptor, &registry, target_override.as_ref()).context("Invalid build descriptor")?;

  Ok(Loaded { plan })
}
