// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
//! Batch orchestration.
//!
//! [`HealthRuntime`] takes the output of discovery, builds one
//! [`IntegrationProbe`] per integration from the loaded [`HealthConfig`], runs
//! them on a bounded worker pool, and appends the results to a
//! [`ResultStore`] in discovery order.
//!
//! A batch never aborts because of an integration: bad configuration and
//! crashed probe tasks still produce a row. The only error that escapes
//! [`HealthRuntime::run_batch`] is a store failure.

pub mod telemetry;

pub use telemetry::{BatchMetrics, MetricsSnapshot};

use ih_config::{ConfigError, HealthConfig};
use ih_core::{CapabilityEvidence, IntegrationTestResult};
use ih_discovery::{
    DiscoveredIntegration, Discovery, DiscoveryError, DiscoveryReport, DiscoveryWarning,
};
use ih_error::{Coded, ErrorCode, HealthError};
use ih_probe::{CallError, IntegrationProbe, probe_for_kind};
use ih_score::score;
use ih_store::{InMemoryResultStore, JsonlResultStore, ResultStore, StoreError};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tracing::{Instrument, debug, error, info, warn};
use tracing_subscriber::EnvFilter;

/// Errors that abort a batch.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// Results could not be persisted.
    #[error("result store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),
    /// The configured discovery patterns do not compile.
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),
}

impl Coded for RuntimeError {
    fn code(&self) -> ErrorCode {
        match self {
            Self::StoreUnavailable(e) => e.code(),
            Self::Discovery(e) => e.code(),
        }
    }
}

impl From<RuntimeError> for HealthError {
    fn from(err: RuntimeError) -> Self {
        HealthError::from_coded(err)
    }
}

/// Outcome of one batch.
#[derive(Debug, Clone)]
pub struct BatchReport {
    /// One row per discovered integration, in discovery order.
    pub results: Vec<IntegrationTestResult>,
    pub discovery_warnings: Vec<DiscoveryWarning>,
    pub metrics: MetricsSnapshot,
}

impl BatchReport {
    pub fn result_for(&self, integration: &str) -> Option<&IntegrationTestResult> {
        self.results
            .iter()
            .find(|r| r.integration_name() == integration)
    }
}

/// Install a `fmt` subscriber filtered at the configured log level.
///
/// `RUST_LOG` wins when set. Returns `false` if a global subscriber was
/// already installed.
pub fn init_logging(config: &HealthConfig) -> bool {
    let level = config.log_level.as_deref().unwrap_or("info");
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("ih={level}")));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .is_ok()
}

/// Probes discovered integrations according to a [`HealthConfig`].
pub struct HealthRuntime {
    config: HealthConfig,
    lifetime: Arc<BatchMetrics>,
}

impl HealthRuntime {
    pub fn new(config: HealthConfig) -> Self {
        Self {
            config,
            lifetime: Arc::new(BatchMetrics::new()),
        }
    }

    pub fn config(&self) -> &HealthConfig {
        &self.config
    }

    /// Counters accumulated over every batch this runtime has run.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.lifetime.snapshot()
    }

    /// The store named by `results_path`, or an in-memory one.
    pub fn open_store(&self) -> Box<dyn ResultStore> {
        match &self.config.results_path {
            Some(path) => Box::new(JsonlResultStore::new(path)),
            None => Box::new(InMemoryResultStore::new()),
        }
    }

    /// Build the probe for one discovered integration.
    pub fn probe_for(
        &self,
        integration: &DiscoveredIntegration,
    ) -> Result<IntegrationProbe, ConfigError> {
        let config = self.config.probe_config(&integration.identity.name)?;
        Ok(IntegrationProbe::new(
            Arc::clone(&integration.class),
            probe_for_kind(integration.kind),
            config,
        )
        .with_identity(integration.identity.clone()))
    }

    /// Scan `discovery` (restricted to the configured patterns) and run the batch.
    pub async fn discover_and_run(
        &self,
        discovery: &Discovery,
        store: &dyn ResultStore,
    ) -> Result<BatchReport, RuntimeError> {
        let discovery = discovery
            .clone()
            .with_patterns(&self.config.discovery_patterns)?;
        self.run_batch(discovery.discover_all(), store).await
    }

    /// Probe every integration in `report` and append the results to `store`.
    pub async fn run_batch(
        &self,
        report: impl Into<DiscoveryReport>,
        store: &dyn ResultStore,
    ) -> Result<BatchReport, RuntimeError> {
        let DiscoveryReport {
            integrations,
            warnings,
        } = report.into();
        info!(
            target: "ih.runtime",
            integrations = integrations.len(),
            discovery_warnings = warnings.len(),
            parallel = self.config.parallel_tests,
            "batch started"
        );

        let batch = BatchMetrics::new();
        let mut slots: Vec<Option<IntegrationTestResult>> =
            (0..integrations.len()).map(|_| None).collect();

        let mut pending = Vec::new();
        for (idx, integration) in integrations.iter().enumerate() {
            match self.probe_for(integration) {
                Ok(probe) => pending.push((idx, probe)),
                Err(e) => {
                    let err =
                        HealthError::from_coded(e).for_integration(&integration.identity.name);
                    warn!(
                        target: "ih.runtime",
                        code = %err.code(),
                        error = %err,
                        "configuration error"
                    );
                    let message = format!("configuration error: {}", err.message());
                    let row = failure_row(integration, message);
                    self.record(&batch, &row, 0, true);
                    slots[idx] = Some(row);
                }
            }
        }

        let finished = if self.config.parallel_tests {
            self.run_pool(pending).await
        } else {
            let mut out = Vec::with_capacity(pending.len());
            for (idx, probe) in pending {
                let (outcome, ms) = run_probe(probe).await;
                out.push((idx, outcome, ms));
            }
            out
        };

        for (idx, outcome, ms) in finished {
            let row = match outcome {
                Ok(result) => {
                    self.record(&batch, &result, ms, false);
                    result
                }
                Err(e) => {
                    let integration = &integrations[idx];
                    let message = task_failure_message(e);
                    error!(
                        target: "ih.runtime",
                        integration = %integration.identity.name,
                        error = %message,
                        "probe task failed"
                    );
                    let row = failure_row(integration, message);
                    self.record(&batch, &row, ms, true);
                    row
                }
            };
            slots[idx] = Some(row);
        }

        let mut results = Vec::with_capacity(slots.len());
        for (idx, slot) in slots.into_iter().enumerate() {
            let row = match slot {
                Some(row) => row,
                None => {
                    let message = "probe task failed: task lost".to_string();
                    let row = failure_row(&integrations[idx], message);
                    self.record(&batch, &row, 0, true);
                    row
                }
            };
            results.push(row);
        }

        for result in &results {
            if let Err(e) = store.append(result) {
                error!(
                    target: "ih.runtime",
                    integration = result.integration_name(),
                    error = %e,
                    "store append failed"
                );
                return Err(RuntimeError::StoreUnavailable(e));
            }
        }

        let metrics = batch.snapshot();
        info!(
            target: "ih.runtime",
            results = results.len(),
            average_score = metrics.average_score,
            "batch finished"
        );
        Ok(BatchReport {
            results,
            discovery_warnings: warnings,
            metrics,
        })
    }

    async fn run_pool(
        &self,
        pending: Vec<(usize, IntegrationProbe)>,
    ) -> Vec<(usize, Result<IntegrationTestResult, JoinError>, u64)> {
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrency.max(1)));
        let mut set = JoinSet::new();
        for (idx, probe) in pending {
            let semaphore = Arc::clone(&semaphore);
            set.spawn(
                async move {
                    let _permit = semaphore.acquire_owned().await.ok();
                    let (outcome, ms) = run_probe(probe).await;
                    (idx, outcome, ms)
                }
                .in_current_span(),
            );
        }

        let mut out = Vec::new();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(done) => out.push(done),
                // The slot stays empty and is filled as a lost task.
                Err(e) => error!(target: "ih.runtime", error = %e, "worker task failed"),
            }
        }
        out
    }

    fn record(
        &self,
        batch: &BatchMetrics,
        result: &IntegrationTestResult,
        ms: u64,
        probe_failed: bool,
    ) {
        batch.record(result, ms, probe_failed);
        self.lifetime.record(result, ms, probe_failed);
    }
}

/// Run one probe on its own task so a panic inside it stays contained.
async fn run_probe(probe: IntegrationProbe) -> (Result<IntegrationTestResult, JoinError>, u64) {
    let started = Instant::now();
    debug!(target: "ih.runtime", integration = %probe.identity().name, "probe scheduled");
    let outcome = tokio::spawn(async move { probe.run_all_tests().await }.in_current_span()).await;
    (outcome, started.elapsed().as_millis() as u64)
}

fn task_failure_message(err: JoinError) -> String {
    format!("probe task failed: {}", CallError::from(err))
}

/// A row for an integration whose probe never produced a result.
fn failure_row(integration: &DiscoveredIntegration, message: String) -> IntegrationTestResult {
    let probe = probe_for_kind(integration.kind);
    let mut builder =
        IntegrationTestResult::builder(integration.identity.clone(), integration.kind)
            .error(message);
    for capability in probe.required_capabilities() {
        builder = builder.evidence(CapabilityEvidence::absent(*capability));
    }
    builder.finalize(|evidence| score(probe.weights(), evidence))
}
