// SPDX-License-Identifier: MIT OR Apache-2.0
//! Per-capability evidence.

use crate::Capability;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Maximum number of characters of an error message kept in evidence.
pub const MAX_ERROR_CHARS: usize = 512;

const TRUNCATION_MARKER: &str = "…[truncated]";

/// Tri-state outcome of testing one capability.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityOutcome {
    /// The integration does not expose the capability.
    Absent,
    /// The capability exists but raised, timed out, or returned malformed data.
    Failed,
    /// The capability exists and its functional check passed.
    Passed,
}

impl CapabilityOutcome {
    /// `true` for [`CapabilityOutcome::Failed`] and [`CapabilityOutcome::Passed`].
    pub fn is_present(&self) -> bool {
        !matches!(self, Self::Absent)
    }
}

/// The recorded outcome of testing one capability once.
///
/// Created through [`CapabilityEvidence::absent`], [`CapabilityEvidence::failed`]
/// or [`CapabilityEvidence::passed`] and never modified afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct CapabilityEvidence {
    capability: Capability,
    outcome: CapabilityOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    latency_secs: Option<f64>,
}

impl CapabilityEvidence {
    /// Evidence that the capability is not exposed.
    pub fn absent(capability: Capability) -> Self {
        Self {
            capability,
            outcome: CapabilityOutcome::Absent,
            error: None,
            latency_secs: None,
        }
    }

    /// Evidence that the capability is not exposed, with the reason it was ruled out.
    pub fn absent_because(capability: Capability, reason: impl Into<String>) -> Self {
        Self {
            error: Some(truncate_message(&reason.into(), MAX_ERROR_CHARS)),
            ..Self::absent(capability)
        }
    }

    /// Evidence that the capability exists but failed. The message is truncated.
    pub fn failed(
        capability: Capability,
        error: impl Into<String>,
        latency_secs: Option<f64>,
    ) -> Self {
        Self {
            capability,
            outcome: CapabilityOutcome::Failed,
            error: Some(truncate_message(&error.into(), MAX_ERROR_CHARS)),
            latency_secs,
        }
    }

    /// Evidence that the capability passed its functional check.
    pub fn passed(capability: Capability, latency_secs: Option<f64>) -> Self {
        Self {
            capability,
            outcome: CapabilityOutcome::Passed,
            error: None,
            latency_secs,
        }
    }

    pub fn capability(&self) -> Capability {
        self.capability
    }

    pub fn outcome(&self) -> CapabilityOutcome {
        self.outcome
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn latency_secs(&self) -> Option<f64> {
        self.latency_secs
    }

    /// Shorthand for `outcome() == Passed`.
    pub fn is_passed(&self) -> bool {
        self.outcome == CapabilityOutcome::Passed
    }

    /// Same evidence without the latency sample.
    ///
    /// Latency is the only field that varies between otherwise identical runs.
    pub fn without_latency(&self) -> Self {
        Self {
            latency_secs: None,
            ..self.clone()
        }
    }
}

/// Truncate `msg` to at most `max_chars` characters, respecting char boundaries.
///
/// Truncated messages end with a visible marker so readers know text was dropped.
pub fn truncate_message(msg: &str, max_chars: usize) -> String {
    if msg.chars().count() <= max_chars {
        return msg.to_string();
    }
    let keep = max_chars.saturating_sub(TRUNCATION_MARKER.chars().count());
    let mut out: String = msg.chars().take(keep).collect();
    out.push_str(TRUNCATION_MARKER);
    out
}
