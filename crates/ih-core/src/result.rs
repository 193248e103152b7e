// SPDX-License-Identifier: MIT OR Apache-2.0
//! Immutable per-run test results.

use crate::{Capability, CapabilityEvidence, IntegrationKind, SupportFlag};
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Version string embedded in every stored result.
pub const RESULT_SCHEMA_VERSION: &str = "ih/v0.1";

/// Version reported for classes that do not declare one.
pub const UNKNOWN_VERSION: &str = "unknown";

/// Who was tested: class name, the package it came from, and its version.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
pub struct IntegrationIdentity {
    pub name: String,
    pub package: String,
    pub version: String,
}

impl IntegrationIdentity {
    /// Build an identity; a missing version becomes [`UNKNOWN_VERSION`].
    pub fn new(
        name: impl Into<String>,
        package: impl Into<String>,
        version: Option<&str>,
    ) -> Self {
        Self {
            name: name.into(),
            package: package.into(),
            version: version.unwrap_or(UNKNOWN_VERSION).to_string(),
        }
    }
}

/// Boolean support flags derived from evidence.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct SupportFlags {
    pub bind_tools_support: bool,
    pub streaming_support: bool,
    pub structured_output_support: bool,
    pub async_support: bool,
}

impl SupportFlags {
    /// A flag is set iff some capability mapping to it passed.
    pub fn from_evidence(evidence: &[CapabilityEvidence]) -> Self {
        let mut flags = Self::default();
        for ev in evidence.iter().filter(|e| e.is_passed()) {
            match ev.capability().flag() {
                Some(SupportFlag::BindTools) => flags.bind_tools_support = true,
                Some(SupportFlag::Streaming) => flags.streaming_support = true,
                Some(SupportFlag::StructuredOutput) => flags.structured_output_support = true,
                Some(SupportFlag::Async) => flags.async_support = true,
                None => {}
            }
        }
        flags
    }
}

/// The outcome of one probe run against one integration.
///
/// Results are append-only history: a re-test creates a new value with a new
/// `run_id`. There are no mutators; construction goes through [`ResultBuilder`],
/// which derives flags, metrics, and score from the evidence.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct IntegrationTestResult {
    schema_version: String,
    run_id: Uuid,
    identity: IntegrationIdentity,
    kind: IntegrationKind,
    tested_at: DateTime<Utc>,
    evidence: Vec<CapabilityEvidence>,
    #[serde(flatten)]
    flags: SupportFlags,
    errors: Vec<String>,
    warnings: Vec<String>,
    performance_metrics: BTreeMap<String, f64>,
    #[serde(default)]
    robustness: BTreeMap<String, bool>,
    compatibility_score: f64,
}

impl IntegrationTestResult {
    /// Start building a result for `identity`.
    pub fn builder(identity: IntegrationIdentity, kind: IntegrationKind) -> ResultBuilder {
        ResultBuilder {
            identity,
            kind,
            tested_at: Utc::now(),
            evidence: Vec::new(),
            errors: Vec::new(),
            warnings: Vec::new(),
            robustness: BTreeMap::new(),
        }
    }

    pub fn schema_version(&self) -> &str {
        &self.schema_version
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn identity(&self) -> &IntegrationIdentity {
        &self.identity
    }

    /// Shorthand for `identity().name`.
    pub fn integration_name(&self) -> &str {
        &self.identity.name
    }

    /// Shorthand for `identity().version`.
    pub fn integration_version(&self) -> &str {
        &self.identity.version
    }

    pub fn kind(&self) -> IntegrationKind {
        self.kind
    }

    pub fn tested_at(&self) -> DateTime<Utc> {
        self.tested_at
    }

    /// Evidence in the probe's required-capability order.
    pub fn evidence(&self) -> &[CapabilityEvidence] {
        &self.evidence
    }

    /// Evidence for one capability, if it was part of the required set.
    pub fn evidence_for(&self, capability: Capability) -> Option<&CapabilityEvidence> {
        self.evidence.iter().find(|e| e.capability() == capability)
    }

    pub fn flags(&self) -> SupportFlags {
        self.flags
    }

    pub fn bind_tools_support(&self) -> bool {
        self.flags.bind_tools_support
    }

    pub fn streaming_support(&self) -> bool {
        self.flags.streaming_support
    }

    pub fn structured_output_support(&self) -> bool {
        self.flags.structured_output_support
    }

    pub fn async_support(&self) -> bool {
        self.flags.async_support
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Capability name → latency in seconds.
    pub fn performance_metrics(&self) -> &BTreeMap<String, f64> {
        &self.performance_metrics
    }

    /// Robustness scenario name → whether the integration handled it.
    pub fn robustness(&self) -> &BTreeMap<String, bool> {
        &self.robustness
    }

    /// Score in `[0.0, 1.0]`.
    pub fn compatibility_score(&self) -> f64 {
        self.compatibility_score
    }
}

/// Collects the pieces of a result; consumed by [`ResultBuilder::finalize`].
#[derive(Debug)]
pub struct ResultBuilder {
    identity: IntegrationIdentity,
    kind: IntegrationKind,
    tested_at: DateTime<Utc>,
    evidence: Vec<CapabilityEvidence>,
    errors: Vec<String>,
    warnings: Vec<String>,
    robustness: BTreeMap<String, bool>,
}

impl ResultBuilder {
    /// Override the test timestamp (defaults to the builder's creation time).
    pub fn tested_at(mut self, at: DateTime<Utc>) -> Self {
        self.tested_at = at;
        self
    }

    /// Append evidence. Callers append in required-capability order.
    pub fn evidence(mut self, ev: CapabilityEvidence) -> Self {
        self.evidence.push(ev);
        self
    }

    pub fn error(mut self, msg: impl Into<String>) -> Self {
        self.errors.push(msg.into());
        self
    }

    pub fn warning(mut self, msg: impl Into<String>) -> Self {
        self.warnings.push(msg.into());
        self
    }

    pub fn robustness(mut self, scenario: impl Into<String>, handled: bool) -> Self {
        self.robustness.insert(scenario.into(), handled);
        self
    }

    /// Evidence appended so far.
    pub fn evidence_so_far(&self) -> &[CapabilityEvidence] {
        &self.evidence
    }

    /// Seal the result.
    ///
    /// `score` receives the final evidence set and must be a pure function of it;
    /// its output is clamped into `[0.0, 1.0]` (NaN becomes `0.0`).
    pub fn finalize(
        self,
        score: impl FnOnce(&[CapabilityEvidence]) -> f64,
    ) -> IntegrationTestResult {
        let raw = score(&self.evidence);
        let compatibility_score = if raw.is_nan() { 0.0 } else { raw.clamp(0.0, 1.0) };
        let flags = SupportFlags::from_evidence(&self.evidence);
        let performance_metrics = self
            .evidence
            .iter()
            .filter_map(|e| {
                e.latency_secs()
                    .map(|l| (e.capability().as_str().to_string(), l))
            })
            .collect();

        IntegrationTestResult {
            schema_version: RESULT_SCHEMA_VERSION.to_string(),
            run_id: Uuid::new_v4(),
            identity: self.identity,
            kind: self.kind,
            tested_at: self.tested_at,
            evidence: self.evidence,
            flags,
            errors: self.errors,
            warnings: self.warnings,
            performance_metrics,
            robustness: self.robustness,
            compatibility_score,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CapabilityOutcome;

    fn identity() -> IntegrationIdentity {
        IntegrationIdentity::new("FakeChat", "ih_fake", None)
    }

    #[test]
    fn missing_version_is_unknown() {
        assert_eq!(identity().version, UNKNOWN_VERSION);
    }

    #[test]
    fn flags_follow_passed_evidence_only() {
        let result = IntegrationTestResult::builder(identity(), IntegrationKind::ChatModel)
            .evidence(CapabilityEvidence::passed(Capability::Invoke, Some(0.1)))
            .evidence(CapabilityEvidence::failed(Capability::Stream, "boom", None))
            .evidence(CapabilityEvidence::passed(Capability::BindTools, None))
            .evidence(CapabilityEvidence::absent(Capability::Ainvoke))
            .finalize(|_| 0.5);

        assert!(result.bind_tools_support());
        assert!(!result.streaming_support());
        assert!(!result.async_support());
        assert!(!result.structured_output_support());
    }

    #[test]
    fn metrics_come_from_latency_samples() {
        let result = IntegrationTestResult::builder(identity(), IntegrationKind::Llm)
            .evidence(CapabilityEvidence::passed(Capability::Invoke, Some(0.25)))
            .evidence(CapabilityEvidence::absent(Capability::Stream))
            .finalize(|_| 0.4);
        assert_eq!(result.performance_metrics().len(), 1);
        assert_eq!(result.performance_metrics()["invoke"], 0.25);
    }

    #[test]
    fn score_is_clamped() {
        let hi = IntegrationTestResult::builder(identity(), IntegrationKind::Llm).finalize(|_| 3.0);
        assert_eq!(hi.compatibility_score(), 1.0);
        let nan =
            IntegrationTestResult::builder(identity(), IntegrationKind::Llm).finalize(|_| f64::NAN);
        assert_eq!(nan.compatibility_score(), 0.0);
    }

    #[test]
    fn every_finalize_gets_a_fresh_run_id() {
        let a = IntegrationTestResult::builder(identity(), IntegrationKind::Llm).finalize(|_| 0.0);
        let b = IntegrationTestResult::builder(identity(), IntegrationKind::Llm).finalize(|_| 0.0);
        assert_ne!(a.run_id(), b.run_id());
    }

    #[test]
    fn json_roundtrip_preserves_everything() {
        let result = IntegrationTestResult::builder(identity(), IntegrationKind::Embeddings)
            .evidence(CapabilityEvidence::passed(Capability::EmbedQuery, Some(0.01)))
            .evidence(CapabilityEvidence::failed(
                Capability::AembedQuery,
                "timeout: aembed_query exceeded 1s",
                None,
            ))
            .error("aembed_query: timeout: aembed_query exceeded 1s")
            .warning("no async embeddings")
            .robustness("handles_empty_query", true)
            .finalize(|_| 0.35);
        let json = serde_json::to_string(&result).unwrap();
        let back: IntegrationTestResult = serde_json::from_str(&json).unwrap();
        assert_eq!(back, result);
        assert_eq!(
            back.evidence_for(Capability::AembedQuery).unwrap().outcome(),
            CapabilityOutcome::Failed
        );
    }

    #[test]
    fn flags_are_flattened_in_json() {
        let result =
            IntegrationTestResult::builder(identity(), IntegrationKind::Llm).finalize(|_| 0.0);
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["bind_tools_support"], serde_json::json!(false));
        assert_eq!(json["schema_version"], serde_json::json!(RESULT_SCHEMA_VERSION));
    }
}
