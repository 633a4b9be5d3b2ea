//! Shared helpers for library integration tests.

use std::path::Path;
use std::sync::Arc;

use stagegate_lib::descriptor::BuildDescriptor;
use stagegate_lib::execute::{BuildPlan, ExecuteConfig, Orchestrator, ShellExecutor};
use stagegate_lib::ledger::LedgerStore;
use stagegate_lib::platform::ImageRegistry;

/// Two amd64/musl images and one arm64/glibc image.
pub const REGISTRY: &str = r#"
policy = "minimum"

[images]
"alpine-builder" = "linux/amd64/musl-1.2.4/libstdc++-13"
"alpine-runtime" = "linux/amd64/musl-1.2.4/libstdc++-13"
"debian-arm" = "linux/arm64/glibc-2.36/libstdc++-12"
"#;

pub fn plan(descriptor: &str) -> BuildPlan {
  let descriptor = BuildDescriptor::from_yaml(descriptor).unwrap();
  let registry = ImageRegistry::from_toml(REGISTRY).unwrap();
  BuildPlan::new(&descriptor, &registry, None).unwrap()
}

/// An orchestrator whose work tree and stage cache live under `dir`.
pub fn orchestrator(dir: &Path) -> Orchestrator {
  orchestrator_with(
    dir,
    ExecuteConfig {
      parallelism: 2,
      ..Default::default()
    },
  )
}

pub fn orchestrator_with(dir: &Path, config: ExecuteConfig) -> Orchestrator {
  let executor = ShellExecutor::new(dir.join("work"));
  Orchestrator::new(Arc::new(executor), config).with_store(LedgerStore::new(dir.join("data")))
}

/// Descriptor whose runtime stage consumes a native binary from `builder`.
pub fn native_descriptor(runtime_image: &str, check: &str) -> String {
  format!(
    r#"
target: runtime
stages:
  - id: builder
    base_image: alpine-builder
    commands:
      - mkdir -p out src
      - printf 'elf-amd64' > out/native.bin
      - echo 'console.log(1)' > src/app.js
    artifacts:
      - path: /out/native.bin
        kind: compiled_binary
      - path: /src
        kind: source
  - id: runtime
    base_image: {runtime_image}
    consumes:
      - stage: builder
        path: /out/native.bin
        dest: /app/native.bin
      - stage: builder
        path: /src
        dest: /app/src
    checks:
      - name: native addon loads
        command: {check}
        expect:
          stdout_contains: elf-amd64
          output_excludes: symbol not found
"#
  )
}
