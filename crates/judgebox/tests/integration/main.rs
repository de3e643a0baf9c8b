//! Integration tests for judgebox
//!
//! These tests talk to a real Docker daemon and need the execution image
//! built from docker/Dockerfile (`docker build -t judgebox-runtime:1.0 docker/`).
//! Run with: cargo test -p judgebox --features integration-tests
//!
//! Tests that require Docker are marked `#[ignore]`. To include them:
//!    cargo test -p judgebox --features integration-tests -- --include-ignored

#![cfg(feature = "integration-tests")]

use std::fs;
use std::sync::Arc;

use judgebox::{Config, DockerRuntime, Judge};

mod compilation;
mod resource_limits;

const FIXTURES_PATH: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures");

/// Helper to get fixture file content
pub(crate) fn fixture_source(name: &str) -> String {
    let path = format!("{FIXTURES_PATH}/sources/{name}");
    fs::read_to_string(&path).unwrap_or_else(|e| panic!("Failed to read fixture {path}: {e}"))
}

/// Default config with the image overridable through `JUDGEBOX_TEST_IMAGE`
pub(crate) fn test_config() -> Config {
    let mut config = Config::default();
    if let Ok(image) = std::env::var("JUDGEBOX_TEST_IMAGE") {
        config.image = image;
    }
    config
}

pub(crate) fn docker_runtime(config: &Config) -> Arc<DockerRuntime> {
    Arc::new(DockerRuntime::connect(config).expect("Failed to connect to docker"))
}

/// Judge plus a handle on its runtime for leak checks
pub(crate) fn test_judge() -> (Judge, Arc<DockerRuntime>) {
    let config = test_config();
    let runtime = docker_runtime(&config);
    (Judge::new(config, runtime.clone()), runtime)
}
