mod cmd;
mod output;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use output::{OutputFormat, print_error};

/// stagegate - platform-aware multi-stage build orchestrator
#[derive(Parser)]
#[command(name = "stagegate")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Enable verbose output
  #[arg(short, long, global = true)]
  verbose: bool,

  /// Output format
  #[arg(short, long, global = true, value_enum, default_value_t = OutputFormat::Text)]
  output: OutputFormat,

  #[command(subcommand)]
  command: Commands,
}

/// Inputs shared by every command that loads a descriptor.
#[derive(Args, Debug, Clone)]
struct PlanArgs {
  /// Path to the build descriptor (YAML, or JSON by extension)
  descriptor: PathBuf,

  /// Base-image registry (TOML). Defaults to $STAGEGATE_REGISTRY, then images.toml beside the descriptor
  #[arg(long)]
  registry: Option<PathBuf>,

  /// Override the platform of every stage, e.g. `linux/arm64` or `linux/arm64/musl-1.2.4/libstdc++-13`
  #[arg(long, env = "STAGEGATE_TARGET_PLATFORM")]
  target_platform: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
  /// Execute a build descriptor
  Build {
    #[command(flatten)]
    plan: PlanArgs,

    /// Maximum number of stages executing at once
    #[arg(short = 'j', long)]
    parallelism: Option<usize>,

    /// Default stage timeout, e.g. `30m` (stages may declare their own)
    #[arg(long, value_parser = humantime::parse_duration)]
    timeout: Option<Duration>,

    /// Execute every stage even when a cached result exists
    #[arg(long)]
    no_cache: bool,

    /// Re-execute cached stages and fail if any output hash changed
    #[arg(long)]
    verify_reproducible: bool,

    /// Shell running stage commands and checks (default `/bin/sh`)
    #[arg(long, env = "STAGEGATE_SHELL")]
    shell: Option<String>,
  },

  /// Validate a descriptor and predict transfer mismatches without executing
  Plan {
    #[command(flatten)]
    plan: PlanArgs,
  },

  /// Re-run a stage's verification checks against its last build
  Verify {
    #[command(flatten)]
    plan: PlanArgs,

    /// Stage to verify (defaults to the target stage)
    #[arg(long)]
    stage: Option<String>,

    /// Shell running the checks (default `/bin/sh`)
    #[arg(long, env = "STAGEGATE_SHELL")]
    shell: Option<String>,
  },

  /// List registered verification checks
  Checks {
    #[command(flatten)]
    plan: PlanArgs,

    /// Only list checks of this stage
    #[arg(long)]
    stage: Option<String>,
  },

  /// Show the artifact ledger of a persisted run
  InspectLedger {
    /// Run id (defaults to the most recent run)
    run_id: Option<String>,

    /// Only show artifacts of this stage
    #[arg(long)]
    stage: Option<String>,
  },

  /// List persisted runs
  Runs,
}

fn main() -> ExitCode {
  let cli = Cli::parse();
  init_tracing(cli.verbose);

  let result = match cli.command {
    Commands::Build {
      plan,
      parallelism,
      timeout,
      no_cache,
      verify_reproducible,
      shell,
    } => cmd::cmd_build(
      &plan,
      cmd::BuildOptions {
        parallelism,
        timeout,
        no_cache,
        verify_reproducible,
        shell,
      },
      cli.output,
    ),
    Commands::Plan { plan } => cmd::cmd_plan(&plan, cli.output),
    Commands::Verify { plan, stage, shell } => {
      cmd::cmd_verify(&plan, stage.as_deref(), shell.as_deref(), cli.output)
    }
    Commands::Checks { plan, stage } => cmd::cmd_checks(&plan, stage.as_deref(), cli.output),
    Commands::InspectLedger { run_id, stage } => {
      cmd::cmd_inspect_ledger(run_id.as_deref(), stage.as_deref(), cli.verbose, cli.output)
    }
    Commands::Runs => cmd::cmd_runs(cli.output),
  };

  match result {
    Ok(code) => code,
    Err(err) => {
      print_error(&format!("{:#}", err));
      ExitCode::FAILURE
    }
  }
}

fn init_tracing(verbose: bool) {
  let default = if verbose { "debug" } else { "warn" };
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .without_time()
    .init();
}
