// SPDX-License-Identifier: MIT OR Apache-2.0
//! Batch-level counters.

use ih_core::IntegrationTestResult;
use ih_score::Tier;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering::Relaxed};

/// Atomic counters shared by the tasks of a batch.
#[derive(Debug, Default)]
pub struct BatchMetrics {
    integrations: AtomicU64,
    fully_compatible: AtomicU64,
    high_tier: AtomicU64,
    incompatible: AtomicU64,
    probe_failures: AtomicU64,
    /// Scores summed in basis points so the average stays exact.
    cumulative_score_bp: AtomicU64,
    cumulative_duration_ms: AtomicU64,
}

impl BatchMetrics {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one finished result. `probe_failed` marks rows the runtime
    /// synthesised because the probe itself could not run.
    pub fn record(&self, result: &IntegrationTestResult, duration_ms: u64, probe_failed: bool) {
        let score = result.compatibility_score();
        self.integrations.fetch_add(1, Relaxed);
        if score >= 1.0 {
            self.fully_compatible.fetch_add(1, Relaxed);
        }
        if Tier::from_score(score) == Tier::High {
            self.high_tier.fetch_add(1, Relaxed);
        }
        if score <= 0.0 {
            self.incompatible.fetch_add(1, Relaxed);
        }
        if probe_failed {
            self.probe_failures.fetch_add(1, Relaxed);
        }
        self.cumulative_score_bp
            .fetch_add((score * 10_000.0).round() as u64, Relaxed);
        self.cumulative_duration_ms.fetch_add(duration_ms, Relaxed);
    }

    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        let integrations = self.integrations.load(Relaxed);
        let (average_score, average_duration_ms) = if integrations == 0 {
            (0.0, 0)
        } else {
            (
                self.cumulative_score_bp.load(Relaxed) as f64 / 10_000.0 / integrations as f64,
                self.cumulative_duration_ms.load(Relaxed) / integrations,
            )
        };
        MetricsSnapshot {
            integrations,
            fully_compatible: self.fully_compatible.load(Relaxed),
            high_tier: self.high_tier.load(Relaxed),
            incompatible: self.incompatible.load(Relaxed),
            probe_failures: self.probe_failures.load(Relaxed),
            average_score,
            average_duration_ms,
        }
    }
}

/// Serialisable point-in-time view of [`BatchMetrics`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    /// Result rows recorded.
    pub integrations: u64,
    /// Rows scoring exactly 1.0.
    pub fully_compatible: u64,
    /// Rows in [`Tier::High`].
    pub high_tier: u64,
    /// Rows scoring 0.0.
    pub incompatible: u64,
    /// Rows produced from configuration errors or crashed probe tasks.
    pub probe_failures: u64,
    pub average_score: f64,
    pub average_duration_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use ih_core::{Capability, CapabilityEvidence, IntegrationIdentity, IntegrationKind};

    fn scored(score: f64) -> IntegrationTestResult {
        IntegrationTestResult::builder(
            IntegrationIdentity::new("X", "pkg", None),
            IntegrationKind::Llm,
        )
        .evidence(CapabilityEvidence::absent(Capability::Invoke))
        .finalize(|_| score)
    }

    #[test]
    fn empty_snapshot_is_zeroed() {
        let snap = BatchMetrics::new().snapshot();
        assert_eq!(snap.integrations, 0);
        assert_eq!(snap.average_score, 0.0);
    }

    #[test]
    fn counts_and_averages() {
        let m = BatchMetrics::new();
        m.record(&scored(1.0), 30, false);
        m.record(&scored(0.4), 10, false);
        m.record(&scored(0.0), 20, true);
        let snap = m.snapshot();
        assert_eq!(snap.integrations, 3);
        assert_eq!(snap.fully_compatible, 1);
        assert_eq!(snap.high_tier, 1);
        assert_eq!(snap.incompatible, 1);
        assert_eq!(snap.probe_failures, 1);
        assert!((snap.average_score - 1.4 / 3.0).abs() < 1e-9);
        assert_eq!(snap.average_duration_ms, 20);
    }
}
