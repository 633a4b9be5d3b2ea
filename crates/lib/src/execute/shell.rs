//! Local shell executor.
//!
//! Each stage gets its own directory under the executor root, standing in
//! for the stage's filesystem: an artifact path such as `/out/native.bin`
//! lives at `<root>/<stage>/out/native.bin`. Commands run through `/bin/sh -c`
//! with the stage directory as working directory and these variables set:
//!
//! - `STAGE_ROOT`: the stage directory
//! - `STAGE_ID`: the stage id
//! - `STAGE_PLATFORM`: the effective platform, e.g. `linux/amd64/musl-1.2.4/libstdc++-13`
//! - `TARGETPLATFORM`, `TARGETOS`, `TARGETARCH`: as container builders spell them
//! - `SOURCE_DATE_EPOCH`: fixed, for reproducible timestamps
//!
//! A stage directory is wiped before the stage executes. It survives between
//! runs only so a cache hit can reuse it.

use std::fs;
use std::path::{Component, Path, PathBuf};
use std::process::Output;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::consts::SOURCE_DATE_EPOCH;
use crate::descriptor::StageId;
use crate::ledger::CacheEntry;
use crate::platform::paths::work_dir;
use crate::transfer::TransferOperation;
use crate::util::hash::{ContentHash, hash_bytes, hash_path};
use crate::verify::{CheckOutput, VerificationCheck};

use super::executor::{BuildExecutor, ExecutorError, ProducedArtifact, StageInvocation};

#[derive(Debug, Clone)]
pub struct ShellExecutor {
  root: PathBuf,
  shell: Option<String>,
}

impl ShellExecutor {
  pub fn new(root: PathBuf) -> Self {
    Self { root, shell: None }
  }

  /// Executor with a work directory dedicated to one descriptor file.
  pub fn for_descriptor(descriptor: &Path) -> Self {
    let canonical = dunce::canonicalize(descriptor).unwrap_or_else(|_| descriptor.to_path_buf());
    let digest = hash_bytes(canonical.to_string_lossy().as_bytes());
    let scope = &digest.as_str()[..crate::consts::OBJ_HASH_PREFIX_LEN];
    Self::new(work_dir().join(scope))
  }

  /// Use a different shell than `/bin/sh`.
  pub fn with_shell(mut self, shell: impl Into<String>) -> Self {
    self.shell = Some(shell.into());
    self
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  pub fn stage_root(&self, stage: &StageId) -> PathBuf {
    self.root.join(stage.as_str())
  }

  /// Map an in-stage artifact path onto the stage directory.
  fn resolve(&self, stage: &StageId, artifact_path: &str) -> Result<PathBuf, ExecutorError> {
    let mut resolved = self.stage_root(stage);
    let mut depth = 0;
    for component in Path::new(artifact_path).components() {
      match component {
        Component::RootDir | Component::CurDir => {}
        Component::Normal(part) => {
          resolved.push(part);
          depth += 1;
        }
        Component::ParentDir | Component::Prefix(_) => {
          return Err(ExecutorError::InvalidPath(artifact_path.to_string()));
        }
      }
    }
    if depth == 0 {
      return Err(ExecutorError::InvalidPath(artifact_path.to_string()));
    }
    Ok(resolved)
  }

  fn command(&self, cmd: &str, invocation: &StageInvocation, cwd: &Path) -> Command {
    let (shell_cmd, shell_args) = get_shell(self.shell.as_deref());
    let platform = &invocation.platform;

    let mut command = Command::new(shell_cmd);
    command
      .args(&shell_args)
      .arg(cmd)
      .current_dir(cwd)
      .kill_on_drop(true)
      .env("STAGE_ROOT", cwd)
      .env("STAGE_ID", invocation.stage.id.as_str())
      .env("STAGE_PLATFORM", platform.to_string())
      .env("TARGETPLATFORM", platform.os_arch())
      .env("TARGETOS", platform.os.as_str())
      .env("TARGETARCH", platform.arch.as_str())
      .env("LANG", "C")
      .env("LC_ALL", "C")
      .env("SOURCE_DATE_EPOCH", SOURCE_DATE_EPOCH);
    command
  }

  async fn output(&self, cmd: &str, invocation: &StageInvocation, cwd: &Path) -> Result<Output, ExecutorError> {
    debug!(stage = %invocation.stage.id, cmd = %cmd, "spawning process");
    let child = self.command(cmd, invocation, cwd).output();
    match tokio::time::timeout(invocation.timeout, child).await {
      Ok(result) => result.map_err(|source| ExecutorError::Io {
        path: cwd.to_path_buf(),
        source,
      }),
      Err(_) => Err(ExecutorError::Timeout(invocation.timeout)),
    }
  }

  async fn run_commands(&self, invocation: &StageInvocation, cwd: &Path) -> Result<(), ExecutorError> {
    for cmd in &invocation.stage.commands {
      info!(stage = %invocation.stage.id, cmd = %cmd, "executing command");
      let output = self.output(cmd, invocation, cwd).await?;

      if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if !stderr.is_empty() {
          debug!(stderr = %stderr, "command stderr");
        }
        return Err(ExecutorError::CommandFailed {
          cmd: cmd.clone(),
          code: output.status.code(),
          stderr,
        });
      }

      let stdout = String::from_utf8_lossy(&output.stdout);
      if !stdout.trim().is_empty() {
        debug!(stdout = %stdout.trim(), "command output");
      }
    }
    Ok(())
  }
}

#[async_trait]
impl BuildExecutor for ShellExecutor {
  async fn transfer(&self, op: &TransferOperation) -> Result<(), ExecutorError> {
    let src = self.resolve(&op.source_stage, &op.artifact.path)?;
    let dst = self.resolve(&op.destination_stage, &op.destination_path)?;
    debug!(from = %src.display(), to = %dst.display(), "copying artifact");
    copy_path(&src, &dst)
  }

  async fn reset_stage(&self, stage: &StageId) -> Result<(), ExecutorError> {
    let dir = self.stage_root(stage);
    match fs::remove_dir_all(&dir) {
      Ok(()) => debug!(stage = %stage, "cleared stage directory"),
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
      Err(source) => return Err(ExecutorError::Io { path: dir, source }),
    }
    Ok(())
  }

  async fn run_stage(&self, invocation: &StageInvocation) -> Result<Vec<ProducedArtifact>, ExecutorError> {
    let stage = &invocation.stage;
    let cwd = self.stage_root(&stage.id);
    fs::create_dir_all(&cwd).map_err(|source| ExecutorError::Io {
      path: cwd.clone(),
      source,
    })?;

    // The whole command sequence shares the stage timeout.
    match tokio::time::timeout(invocation.timeout, self.run_commands(invocation, &cwd)).await {
      Ok(result) => result?,
      Err(_) => return Err(ExecutorError::Timeout(invocation.timeout)),
    }

    let mut produced = Vec::with_capacity(stage.artifacts.len());
    for decl in &stage.artifacts {
      let path = self.resolve(&stage.id, &decl.path)?;
      if fs::symlink_metadata(&path).is_err() {
        return Err(ExecutorError::MissingArtifact {
          stage: stage.id.clone(),
          path: decl.path.clone(),
        });
      }
      produced.push(ProducedArtifact {
        path: decl.path.clone(),
        content_hash: hash_path(&path)?,
      });
    }
    Ok(produced)
  }

  async fn run_check(&self, invocation: &StageInvocation, check: &VerificationCheck) -> Result<CheckOutput, ExecutorError> {
    let cwd = self.stage_root(&invocation.stage.id);
    fs::create_dir_all(&cwd).map_err(|source| ExecutorError::Io {
      path: cwd.clone(),
      source,
    })?;

    let output = self.output(&check.command, invocation, &cwd).await?;
    Ok(CheckOutput {
      exit_code: output.status.code(),
      stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
      stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
  }

  async fn reuse_cached(&self, invocation: &StageInvocation, entry: &CacheEntry) -> Result<bool, ExecutorError> {
    for artifact in &entry.artifacts {
      let path = self.resolve(&invocation.stage.id, &artifact.path)?;
      if fs::symlink_metadata(&path).is_err() {
        return Ok(false);
      }
      let current: ContentHash = hash_path(&path)?;
      if current != artifact.content_hash {
        debug!(path = %artifact.path, "cached output changed on disk");
        return Ok(false);
      }
    }
    Ok(true)
  }
}

/// Copy a file or directory tree, replacing whatever is at `dst`.
fn copy_path(src: &Path, dst: &Path) -> Result<(), ExecutorError> {
  let io_err = |path: &Path| {
    let path = path.to_path_buf();
    move |source: std::io::Error| ExecutorError::Io { path, source }
  };

  let meta = fs::symlink_metadata(src).map_err(io_err(src))?;

  if let Ok(existing) = fs::symlink_metadata(dst) {
    if existing.is_dir() {
      fs::remove_dir_all(dst).map_err(io_err(dst))?;
    } else {
      fs::remove_file(dst).map_err(io_err(dst))?;
    }
  }
  if let Some(parent) = dst.parent() {
    fs::create_dir_all(parent).map_err(io_err(parent))?;
  }

  if !meta.is_dir() {
    fs::copy(src, dst).map_err(io_err(dst))?;
    return Ok(());
  }

  for entry in WalkDir::new(src).follow_links(false) {
    let entry = entry.map_err(|e| ExecutorError::Other(e.to_string()))?;
    let relative = entry
      .path()
      .strip_prefix(src)
      .map_err(|e| ExecutorError::Other(e.to_string()))?;
    let target = dst.join(relative);
    let file_type = entry.file_type();

    if file_type.is_dir() {
      fs::create_dir_all(&target).map_err(io_err(&target))?;
    } else if file_type.is_symlink() {
      let link = fs::read_link(entry.path()).map_err(io_err(entry.path()))?;
      symlink(&link, &target).map_err(io_err(&target))?;
    } else {
      fs::copy(entry.path(), &target).map_err(io_err(&target))?;
    }
  }
  Ok(())
}

#[cfg(unix)]
fn symlink(link: &Path, target: &Path) -> std::io::Result<()> {
  std::os::unix::fs::symlink(link, target)
}

#[cfg(windows)]
fn symlink(link: &Path, target: &Path) -> std::io::Result<()> {
  std::os::windows::fs::symlink_file(link, target)
}

/// Get the shell command and argument.
///
/// Defaults to `/bin/sh` rather than `$SHELL`: interactive shells may source
/// profile files that change the environment between runs.
fn get_shell(override_shell: Option<&str>) -> (String, Vec<String>) {
  if let Some(shell) = override_shell {
    let args = if shell.contains("powershell") || shell.contains("pwsh") {
      vec!["-NoProfile".to_string(), "-Command".to_string()]
    } else if shell.contains("cmd") {
      vec!["/C".to_string()]
    } else {
      vec!["-c".to_string()]
    };
    return (shell.to_string(), args);
  }

  #[cfg(unix)]
  {
    ("/bin/sh".to_string(), vec!["-c".to_string()])
  }

  #[cfg(windows)]
  {
    (
      "powershell.exe".to_string(),
      vec![
        "-NoProfile".to_string(),
        "-ExecutionPolicy".to_string(),
        "Bypass".to_string(),
        "-Command".to_string(),
      ],
    )
  }
}
