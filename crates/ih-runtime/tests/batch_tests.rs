// SPDX-License-Identifier: MIT OR Apache-2.0
//! Batch runs over scripted integrations.

use ih_config::{HealthConfig, IntegrationOverride};
use ih_core::{Capability, IntegrationKind};
use ih_discovery::{DiscoveredIntegration, DiscoveryReport, DiscoveryWarning};
use ih_error::{Coded, ErrorCode};
use ih_integration::{
    ConstructArgs, IntegrationClass, IntegrationError, MethodTable, ModelIntegration,
};
use ih_integration_mock::{Behavior, ScriptedClass};
use ih_runtime::{HealthRuntime, RuntimeError};
use ih_store::{InMemoryResultStore, JsonlResultStore, ResultQuery, ResultStore};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

fn config(parallel: bool) -> HealthConfig {
    HealthConfig {
        mock_mode: true,
        parallel_tests: parallel,
        test_timeout: 5,
        ..HealthConfig::default()
    }
}

fn discovered(class: ScriptedClass) -> DiscoveredIntegration {
    DiscoveredIntegration::new("mock_pkg", class.into_handle())
}

fn mixed_batch() -> Vec<DiscoveredIntegration> {
    vec![
        discovered(ScriptedClass::chat("Alpha")),
        discovered(ScriptedClass::llm("Bravo").only(&[Capability::Invoke])),
        discovered(ScriptedClass::embeddings("Charlie")),
        discovered(
            ScriptedClass::chat("Delta")
                .with_behavior(Capability::Stream, Behavior::Fail("reset".into())),
        ),
    ]
}

fn names(rows: &[ih_core::IntegrationTestResult]) -> Vec<&str> {
    rows.iter().map(|r| r.integration_name()).collect()
}

/// Class whose reflection metadata cannot be produced.
struct ExplodingMethods;

impl IntegrationClass for ExplodingMethods {
    fn name(&self) -> &str {
        "Exploding"
    }

    fn kind(&self) -> IntegrationKind {
        IntegrationKind::Llm
    }

    fn methods(&self) -> MethodTable {
        panic!("methods exploded")
    }

    fn construct(&self, _: &ConstructArgs) -> Result<Arc<dyn ModelIntegration>, IntegrationError> {
        Err(IntegrationError::Construction("unreachable".into()))
    }
}

/// Records how many probes read its metadata at the same time.
struct Gauge {
    inner: ScriptedClass,
    in_flight: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl IntegrationClass for Gauge {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn kind(&self) -> IntegrationKind {
        self.inner.kind()
    }

    fn methods(&self) -> MethodTable {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(30));
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.inner.methods()
    }

    fn construct(
        &self,
        args: &ConstructArgs,
    ) -> Result<Arc<dyn ModelIntegration>, IntegrationError> {
        self.inner.construct(args)
    }
}

// -- 1. Ordering and equivalence --------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn rows_follow_discovery_order() {
    let store = InMemoryResultStore::new();
    let report = HealthRuntime::new(config(true))
        .run_batch(mixed_batch(), &store)
        .await
        .unwrap();

    assert_eq!(names(&report.results), ["Alpha", "Bravo", "Charlie", "Delta"]);
    let stored = store.query(&ResultQuery::all()).unwrap();
    assert_eq!(names(&stored), ["Alpha", "Bravo", "Charlie", "Delta"]);
    assert_eq!(report.result_for("Alpha").unwrap().compatibility_score(), 1.0);
    assert_eq!(report.result_for("Bravo").unwrap().compatibility_score(), 0.4);
    assert_eq!(report.result_for("Delta").unwrap().compatibility_score(), 0.9);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn sequential_matches_parallel() {
    let store = InMemoryResultStore::new();
    let par = HealthRuntime::new(config(true)).run_batch(mixed_batch(), &store).await.unwrap();
    let seq = HealthRuntime::new(config(false)).run_batch(mixed_batch(), &store).await.unwrap();
    let scores = |r: &ih_runtime::BatchReport| {
        r.results.iter().map(|r| r.compatibility_score()).collect::<Vec<_>>()
    };
    assert_eq!(scores(&par), scores(&seq));
    assert_eq!(store.len(), 8);
}

// -- 2. Containment ----------------------------------------------------------

#[tokio::test]
async fn bad_override_only_affects_its_integration() {
    let mut cfg = config(true);
    cfg.integrations.insert(
        "Bravo".into(),
        IntegrationOverride {
            timeout: Some(0),
            ..Default::default()
        },
    );
    let store = InMemoryResultStore::new();
    let report = HealthRuntime::new(cfg).run_batch(mixed_batch(), &store).await.unwrap();

    assert_eq!(report.results.len(), 4);
    let bravo = report.result_for("Bravo").unwrap();
    assert_eq!(bravo.compatibility_score(), 0.0);
    assert_eq!(bravo.evidence().len(), 6);
    assert!(bravo.errors()[0].starts_with("configuration error: "));
    assert_eq!(report.result_for("Alpha").unwrap().compatibility_score(), 1.0);
    assert_eq!(report.metrics.probe_failures, 1);
}

#[tokio::test]
async fn panicking_class_still_yields_a_row() {
    let batch = vec![
        discovered(ScriptedClass::llm("Before")),
        DiscoveredIntegration::new("mock_pkg", Arc::new(ExplodingMethods)),
        discovered(ScriptedClass::llm("After")),
    ];
    let store = InMemoryResultStore::new();
    let report = HealthRuntime::new(config(true)).run_batch(batch, &store).await.unwrap();

    assert_eq!(names(&report.results), ["Before", "Exploding", "After"]);
    let row = report.result_for("Exploding").unwrap();
    assert_eq!(row.compatibility_score(), 0.0);
    assert_eq!(row.errors(), ["construction failed: panicked: methods exploded"]);
    assert_eq!(row.evidence().len(), 6);
    assert_eq!(report.result_for("After").unwrap().compatibility_score(), 1.0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn pool_respects_max_concurrency() {
    let in_flight = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let batch: Vec<_> = (0..4)
        .map(|i| {
            let class = Gauge {
                inner: ScriptedClass::llm(format!("G{i}")),
                in_flight: Arc::clone(&in_flight),
                peak: Arc::clone(&peak),
            };
            DiscoveredIntegration::new("mock_pkg", Arc::new(class))
        })
        .collect();
    let cfg = HealthConfig {
        max_concurrency: 1,
        ..config(true)
    };
    let store = InMemoryResultStore::new();
    let report = HealthRuntime::new(cfg).run_batch(batch, &store).await.unwrap();

    assert_eq!(report.results.len(), 4);
    assert_eq!(peak.load(Ordering::SeqCst), 1);
}

// -- 3. Store and report -----------------------------------------------------

#[tokio::test]
async fn store_failure_escapes_as_store_unavailable() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonlResultStore::new(dir.path());
    let err = HealthRuntime::new(config(false))
        .run_batch(mixed_batch(), &store)
        .await
        .unwrap_err();
    assert!(matches!(err, RuntimeError::StoreUnavailable(_)));
    assert_eq!(err.code(), ErrorCode::StoreUnavailable);
}

#[tokio::test]
async fn discovery_warnings_are_carried_through() {
    let report = DiscoveryReport {
        integrations: vec![discovered(ScriptedClass::chat("Only"))],
        warnings: vec![DiscoveryWarning {
            namespace: "broken_pkg".into(),
            symbol: Some("Gone".into()),
            message: "import failed".into(),
        }],
    };
    let store = InMemoryResultStore::new();
    let out = HealthRuntime::new(config(true)).run_batch(report, &store).await.unwrap();
    assert_eq!(out.results.len(), 1);
    assert_eq!(out.discovery_warnings.len(), 1);
    assert_eq!(out.discovery_warnings[0].namespace, "broken_pkg");
}

#[tokio::test]
async fn metrics_accumulate_across_batches() {
    let rt = HealthRuntime::new(config(true));
    let store = InMemoryResultStore::new();
    let first = rt.run_batch(mixed_batch(), &store).await.unwrap();
    assert_eq!(first.metrics.integrations, 4);
    assert_eq!(first.metrics.fully_compatible, 2);
    rt.run_batch(mixed_batch(), &store).await.unwrap();
    assert_eq!(rt.metrics().integrations, 8);
}

#[tokio::test]
async fn empty_batch_is_fine() {
    let store = InMemoryResultStore::new();
    let report = HealthRuntime::new(config(true))
        .run_batch(Vec::<DiscoveredIntegration>::new(), &store)
        .await
        .unwrap();
    assert!(report.results.is_empty());
    assert!(store.is_empty());
}
