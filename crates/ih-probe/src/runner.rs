// SPDX-License-Identifier: MIT OR Apache-2.0
//! Runs one probe against one integration class.

use crate::CheckOutcome;
use crate::call::{CallError, blocking};
use crate::probes::CapabilityProbe;
use crate::shape::{ShapeCheck, probe_shape};
use futures::future::join_all;
use ih_config::ProbeConfig;
use ih_core::{
    Capability, CapabilityEvidence, IntegrationIdentity, IntegrationTestResult, ResultBuilder,
};
use ih_integration::{IntegrationClass, MethodTable, ModelIntegration, panic_message};
use ih_score::score;
use std::collections::BTreeMap;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::{Instant as TokioInstant, timeout_at};
use tracing::{Instrument, debug, info, info_span, warn};

/// Package reported when a probe is built without a discovery identity.
pub const UNKNOWN_PACKAGE: &str = "unknown";

/// Stages of one probe run. Every run ends in [`ProbePhase::Finalized`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ProbePhase {
    Constructed,
    MethodsChecked,
    FunctionallyTested,
    Scored,
    Finalized,
}

impl ProbePhase {
    /// Whether moving from `self` to `next` is allowed.
    ///
    /// Phases only move forward, and any phase may jump straight to
    /// `Finalized` when the run short-circuits.
    pub fn can_advance_to(self, next: ProbePhase) -> bool {
        next > self && (next == ProbePhase::Finalized || next as u8 == self as u8 + 1)
    }
}

impl fmt::Display for ProbePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Constructed => "constructed",
            Self::MethodsChecked => "methods_checked",
            Self::FunctionallyTested => "functionally_tested",
            Self::Scored => "scored",
            Self::Finalized => "finalized",
        })
    }
}

struct PhaseTracker {
    phase: Option<ProbePhase>,
}

impl PhaseTracker {
    fn advance(&mut self, next: ProbePhase) {
        if let Some(current) = self.phase {
            debug_assert!(current.can_advance_to(next), "{current} -> {next}");
        }
        debug!(target: "ih.probe", phase = %next, "phase");
        self.phase = Some(next);
    }
}

/// Why an instance could not be built.
#[derive(Debug, Clone, PartialEq, Eq)]
enum BuildError {
    Call(CallError),
    Timeout(Duration),
}

impl fmt::Display for BuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Call(e) => write!(f, "{e}"),
            Self::Timeout(d) => write!(f, "timeout: constructor exceeded {}", format_duration(*d)),
        }
    }
}

/// Renders `30s`, or `0.25s` for sub-second values.
pub fn format_duration(d: Duration) -> String {
    if d.subsec_nanos() == 0 {
        format!("{}s", d.as_secs())
    } else {
        format!("{}s", d.as_secs_f64())
    }
}

/// Message recorded when a capability check exceeds its bound.
pub fn timeout_message(capability: Capability, limit: Duration) -> String {
    format!("timeout: {capability} exceeded {}", format_duration(limit))
}

/// Message recorded for every present capability when credentials are missing.
pub fn missing_credentials_message(provider: &str) -> String {
    format!("skipped: missing credentials for {provider}")
}

/// One probe run's worth of state: a class, the probe variant, and settings.
pub struct IntegrationProbe {
    class: Arc<dyn IntegrationClass>,
    probe: Arc<dyn CapabilityProbe>,
    config: ProbeConfig,
    identity: IntegrationIdentity,
}

impl IntegrationProbe {
    pub fn new(
        class: Arc<dyn IntegrationClass>,
        probe: Arc<dyn CapabilityProbe>,
        config: ProbeConfig,
    ) -> Self {
        let identity = IntegrationIdentity::new(class.name(), UNKNOWN_PACKAGE, class.version());
        Self {
            class,
            probe,
            config,
            identity,
        }
    }

    /// Report results under `identity` (as assigned by discovery).
    pub fn with_identity(mut self, identity: IntegrationIdentity) -> Self {
        self.identity = identity;
        self
    }

    pub fn identity(&self) -> &IntegrationIdentity {
        &self.identity
    }

    pub fn config(&self) -> &ProbeConfig {
        &self.config
    }

    /// Which required capabilities the class exposes. Makes no calls.
    ///
    /// A class whose reflection metadata cannot be read exposes nothing.
    pub fn check_required_methods(&self) -> BTreeMap<Capability, bool> {
        let table = match self.read_metadata() {
            Ok(meta) => Some(meta.table),
            Err(err) => {
                warn!(target: "ih.probe", error = %err, "reflection failed");
                None
            }
        };
        self.probe
            .required_capabilities()
            .iter()
            .map(|cap| {
                let present = table
                    .as_ref()
                    .is_some_and(|t| probe_shape(t, *cap).is_present());
                (*cap, present)
            })
            .collect()
    }

    /// Functionally test one capability on a fresh instance.
    pub async fn check_capability(&self, capability: Capability) -> CapabilityEvidence {
        let meta = match self.read_metadata() {
            Ok(meta) => meta,
            Err(err) => {
                return CapabilityEvidence::absent_because(
                    capability,
                    format!("construction failed: {err}"),
                );
            }
        };
        let shape = probe_shape(&meta.table, capability);
        if let Some(provider) = self.missing_credentials(&meta) {
            return if shape.is_present() {
                CapabilityEvidence::failed(capability, missing_credentials_message(provider), None)
            } else {
                evidence_without_call(capability, &shape)
            };
        }
        let deadline = Instant::now() + self.config.timeout;
        self.evaluate(capability, &shape, deadline).await
    }

    /// Run every check and produce the sealed result. Never panics or errors.
    ///
    /// The whole run, robustness scenarios included, finishes within
    /// `timeout × required capabilities`.
    pub async fn run_all_tests(&self) -> IntegrationTestResult {
        let span = info_span!(
            target: "ih.probe",
            "probe",
            integration = %self.identity.name,
            kind = self.probe.kind().as_str(),
        );
        self.run_inner().instrument(span).await
    }

    async fn run_inner(&self) -> IntegrationTestResult {
        let started = Instant::now();
        let mut phases = PhaseTracker { phase: None };
        let required = self.probe.required_capabilities();
        let deadline = started + run_budget(self.config.timeout, required.len());
        let mut builder = IntegrationTestResult::builder(self.identity.clone(), self.probe.kind());

        let meta = match self.read_metadata() {
            Ok(meta) => meta,
            Err(err) => {
                warn!(target: "ih.probe", error = %err, "reflection failed");
                phases.advance(ProbePhase::Finalized);
                return self.seal(unconstructed(builder, required, &err), started);
            }
        };
        let shapes: Vec<(Capability, ShapeCheck)> = required
            .iter()
            .map(|cap| (*cap, probe_shape(&meta.table, *cap)))
            .collect();

        if let Some(provider) = self.missing_credentials(&meta) {
            let message = missing_credentials_message(provider);
            warn!(target: "ih.probe", provider, "no api key; skipping functional checks");
            builder = builder.warning(message.clone());
            for (cap, shape) in &shapes {
                let ev = if shape.is_present() {
                    CapabilityEvidence::failed(*cap, message.clone(), None)
                } else {
                    evidence_without_call(*cap, shape)
                };
                builder = record(builder, ev);
            }
            phases.advance(ProbePhase::Finalized);
            return self.seal(builder, started);
        }

        if let Err(err) = self.build_instance(self.slot_deadline(deadline)).await {
            warn!(target: "ih.probe", error = %err, "construction failed");
            phases.advance(ProbePhase::Finalized);
            return self.seal(unconstructed(builder, required, &err), started);
        }
        phases.advance(ProbePhase::Constructed);

        for (cap, shape) in &shapes {
            if *shape == ShapeCheck::Ambiguous {
                builder = builder.warning(format!(
                    "{cap}: only an inherited fallback is available; testing anyway"
                ));
            }
        }
        phases.advance(ProbePhase::MethodsChecked);

        let evidence: Vec<CapabilityEvidence> = if self.config.parallel {
            join_all(
                shapes
                    .iter()
                    .map(|(cap, shape)| self.evaluate(*cap, shape, deadline)),
            )
            .await
        } else {
            let mut out = Vec::with_capacity(shapes.len());
            for (cap, shape) in &shapes {
                out.push(self.evaluate(*cap, shape, deadline).await);
            }
            out
        };
        for ev in evidence {
            builder = record(builder, ev);
        }
        phases.advance(ProbePhase::FunctionallyTested);

        for (name, handled) in self.run_robustness(&meta.table, deadline).await {
            builder = builder.robustness(name, handled);
        }

        let result = self.seal(builder, started);
        phases.advance(ProbePhase::Scored);
        phases.advance(ProbePhase::Finalized);
        result
    }

    fn seal(&self, builder: ResultBuilder, started: Instant) -> IntegrationTestResult {
        let weights = self.probe.weights();
        let result = builder.finalize(|evidence| score(weights, evidence));
        info!(
            target: "ih.probe",
            score = result.compatibility_score(),
            errors = result.errors().len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "probe finished"
        );
        result
    }

    /// Read the class's reflection metadata, containing any panic.
    fn read_metadata(&self) -> Result<ClassMetadata, CallError> {
        catch_unwind(AssertUnwindSafe(|| ClassMetadata {
            table: self.class.methods(),
            credential_provider: self.class.credential_provider().map(str::to_owned),
        }))
        .map_err(|payload| CallError::Panicked(panic_message(payload.as_ref())))
    }

    fn missing_credentials<'m>(&self, meta: &'m ClassMetadata) -> Option<&'m str> {
        if self.config.mock_mode || self.config.api_key.is_some() {
            return None;
        }
        meta.credential_provider.as_deref()
    }

    /// End of one capability's slot: a full timeout, cut short by the run deadline.
    fn slot_deadline(&self, run_deadline: Instant) -> Instant {
        (Instant::now() + self.config.timeout).min(run_deadline)
    }

    async fn construct(&self) -> Result<Arc<dyn ModelIntegration>, CallError> {
        let class = Arc::clone(&self.class);
        let args = self.probe.construction_args(&self.config);
        blocking(move || class.construct(&args)).await
    }

    /// Build a fresh instance that must be ready by `until`.
    async fn build_instance(
        &self,
        until: Instant,
    ) -> Result<Arc<dyn ModelIntegration>, BuildError> {
        match timeout_at(TokioInstant::from_std(until), self.construct()).await {
            Ok(Ok(instance)) => Ok(instance),
            Ok(Err(e)) => Err(BuildError::Call(e)),
            Err(_) => Err(BuildError::Timeout(self.config.timeout)),
        }
    }

    /// Construction and the check share one slot.
    async fn evaluate(
        &self,
        capability: Capability,
        shape: &ShapeCheck,
        run_deadline: Instant,
    ) -> CapabilityEvidence {
        if !shape.is_present() {
            return evidence_without_call(capability, shape);
        }

        let until = self.slot_deadline(run_deadline);
        let attempt = async {
            let instance = self
                .construct()
                .await
                .map_err(|err| format!("construction failed: {err}"))?;
            let started = Instant::now();
            let outcome = self.probe.check(capability, instance).await;
            Ok::<_, String>((outcome, started.elapsed().as_secs_f64()))
        };

        let evidence = match timeout_at(TokioInstant::from_std(until), attempt).await {
            Ok(Ok((CheckOutcome::Passed, latency))) => {
                CapabilityEvidence::passed(capability, Some(latency))
            }
            Ok(Ok((CheckOutcome::Failed(msg), latency))) => {
                CapabilityEvidence::failed(capability, msg, Some(latency))
            }
            Ok(Err(msg)) => CapabilityEvidence::failed(capability, msg, None),
            Err(_) => CapabilityEvidence::failed(
                capability,
                timeout_message(capability, self.config.timeout),
                None,
            ),
        };
        debug!(
            target: "ih.probe",
            capability = capability.as_str(),
            outcome = ?evidence.outcome(),
            "capability checked"
        );
        evidence
    }

    async fn run_robustness(
        &self,
        table: &MethodTable,
        run_deadline: Instant,
    ) -> Vec<(&'static str, bool)> {
        let scenarios: Vec<_> = self
            .probe
            .robustness_scenarios()
            .into_iter()
            .filter(|s| probe_shape(table, s.requires).is_present())
            .collect();
        if scenarios.is_empty() {
            return Vec::new();
        }
        if Instant::now() >= run_deadline {
            debug!(target: "ih.probe", "run budget spent; robustness skipped");
            return Vec::new();
        }

        let instance = match self.build_instance(self.slot_deadline(run_deadline)).await {
            Ok(instance) => instance,
            Err(err) => {
                warn!(target: "ih.probe", error = %err, "skipping robustness scenarios");
                return Vec::new();
            }
        };

        let mut verdicts = Vec::with_capacity(scenarios.len());
        for scenario in scenarios {
            if Instant::now() >= run_deadline {
                debug!(
                    target: "ih.probe",
                    scenario = scenario.name,
                    "run budget spent; scenario skipped"
                );
                break;
            }
            let until = TokioInstant::from_std(self.slot_deadline(run_deadline));
            let run = (scenario.run)(Arc::clone(&instance));
            let handled = matches!(timeout_at(until, run).await, Ok(Ok(())));
            debug!(target: "ih.probe", scenario = scenario.name, handled, "robustness");
            verdicts.push((scenario.name, handled));
        }
        verdicts
    }
}

impl fmt::Debug for IntegrationProbe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IntegrationProbe")
            .field("identity", &self.identity)
            .field("kind", &self.probe.kind())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn evidence_without_call(capability: Capability, shape: &ShapeCheck) -> CapabilityEvidence {
    match shape {
        ShapeCheck::Mismatch { reason } => {
            let reason = format!("implausible signature: {reason}");
            CapabilityEvidence::absent_because(capability, reason)
        }
        _ => CapabilityEvidence::absent(capability),
    }
}

/// Append evidence and mirror its message into the error list.
fn record(builder: ResultBuilder, evidence: CapabilityEvidence) -> ResultBuilder {
    let builder = match evidence.error() {
        Some(msg) => builder.error(format!("{}: {msg}", evidence.capability())),
        None => builder,
    };
    builder.evidence(evidence)
}

/// Reflection data read from the class once per run.
struct ClassMetadata {
    table: MethodTable,
    credential_provider: Option<String>,
}

/// Kept back from the run budget so sealing the result stays inside it.
const SEAL_RESERVE: Duration = Duration::from_millis(20);

/// Time allowed for a whole run: one timeout per required capability.
pub fn run_budget(timeout: Duration, capabilities: usize) -> Duration {
    let count = u32::try_from(capabilities.max(1)).unwrap_or(u32::MAX);
    let budget = timeout.saturating_mul(count);
    budget - (budget / 20).min(SEAL_RESERVE)
}

/// Every capability absent and one construction error.
fn unconstructed(
    builder: ResultBuilder,
    required: &[Capability],
    reason: &dyn fmt::Display,
) -> ResultBuilder {
    let mut builder = builder.error(format!("construction failed: {reason}"));
    for cap in required {
        builder = builder.evidence(CapabilityEvidence::absent(*cap));
    }
    builder
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_budget_scales_with_capabilities() {
        let t = Duration::from_millis(200);
        assert_eq!(run_budget(t, 6), Duration::from_millis(1180));
        assert_eq!(run_budget(t, 0), Duration::from_millis(190));
        assert!(run_budget(Duration::from_secs(30), 4) < Duration::from_secs(120));
    }

    #[test]
    fn phases_only_move_forward() {
        use ProbePhase::*;
        assert!(Constructed.can_advance_to(MethodsChecked));
        assert!(MethodsChecked.can_advance_to(FunctionallyTested));
        assert!(FunctionallyTested.can_advance_to(Scored));
        assert!(Scored.can_advance_to(Finalized));
        assert!(Constructed.can_advance_to(Finalized));
        assert!(!Scored.can_advance_to(Constructed));
        assert!(!Constructed.can_advance_to(Scored));
        assert!(!Finalized.can_advance_to(Finalized));
    }

    #[test]
    fn durations_render_compactly() {
        assert_eq!(format_duration(Duration::from_secs(30)), "30s");
        assert_eq!(format_duration(Duration::from_millis(250)), "0.25s");
    }

    #[test]
    fn timeout_message_names_capability() {
        assert_eq!(
            timeout_message(Capability::Astream, Duration::from_secs(5)),
            "timeout: astream exceeded 5s"
        );
    }
}
