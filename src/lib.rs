// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
//! Integration health checking for model-provider integrations.
//!
//! This crate re-exports the workspace's public surface and adds
//! [`run_health_check`], which wires configuration, discovery, probing and
//! storage together.

pub use ih_config as config;
pub use ih_core as core;
pub use ih_discovery as discovery;
pub use ih_error as error;
pub use ih_integration as integration;
pub use ih_probe as probe;
pub use ih_runtime as runtime;
pub use ih_score as score;
pub use ih_store as store;

pub use ih_config::{HealthConfig, ProbeConfig, load_config, validate_config};
pub use ih_core::{
    Capability, CapabilityEvidence, CapabilityOutcome, IntegrationIdentity, IntegrationKind,
    IntegrationTestResult,
};
pub use ih_discovery::{Discovery, DiscoveryReport, Namespace, StaticNamespace};
pub use ih_probe::{IntegrationProbe, probe_for_kind};
pub use ih_runtime::{BatchReport, HealthRuntime, RuntimeError};
pub use ih_score::Tier;
pub use ih_store::{InMemoryResultStore, JsonlResultStore, ResultQuery, ResultStore};

use anyhow::Context;
use std::path::Path;
use tracing::warn;

/// Load and validate configuration, scan `discovery`, probe everything found,
/// and append results to the configured store.
pub async fn run_health_check(
    config_path: Option<&Path>,
    discovery: &Discovery,
) -> anyhow::Result<BatchReport> {
    let config = load_config(config_path).context("load configuration")?;
    for warning in validate_config(&config).context("validate configuration")? {
        warn!(target: "ih.runtime", %warning, "configuration warning");
    }
    let runtime = HealthRuntime::new(config);
    let store = runtime.open_store();
    let report = runtime
        .discover_and_run(discovery, store.as_ref())
        .await
        .context("run health check batch")?;
    Ok(report)
}
