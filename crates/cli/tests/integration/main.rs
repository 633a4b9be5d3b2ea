//! CLI integration tests for stagegate.

#![cfg(unix)]

mod common;
mod build_tests;
mod inspect_tests;
mod plan_tests;
mod verify_tests;
