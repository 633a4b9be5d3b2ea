//! End-to-end tests driving descriptors through the shell executor.

#![cfg(unix)]

mod common;
mod cache_tests;
mod pipeline_tests;
