// SPDX-License-Identifier: MIT OR Apache-2.0
#![warn(missing_docs)]
//! Weighted compatibility scoring.
//!
//! A [`WeightTable`] assigns each required capability a weight in basis points;
//! weights always sum to [`TOTAL_BASIS_POINTS`]. [`score`] sums the weights of
//! passed capabilities, so the result depends on evidence alone and the
//! boundary values (`0.0`, `1.0`, single-capability weights) are exact.

use ih_core::{Capability, CapabilityEvidence};
use ih_error::{Coded, ErrorCode};
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Sum every weight table must reach.
pub const TOTAL_BASIS_POINTS: u32 = 10_000;

/// Reasons a weight table is rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScoreError {
    /// Weights do not add up to [`TOTAL_BASIS_POINTS`].
    #[error("weights sum to {actual} basis points, expected {TOTAL_BASIS_POINTS}")]
    BadTotal {
        /// The sum that was found.
        actual: u32,
    },
    /// The same capability appears twice.
    #[error("capability '{0}' is weighted more than once")]
    Duplicate(Capability),
}

impl Coded for ScoreError {
    fn code(&self) -> ErrorCode {
        ErrorCode::Internal
    }
}

/// Capability → weight, in the probe's required-capability order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeightTable {
    entries: Vec<(Capability, u32)>,
}

impl WeightTable {
    /// Build a table, rejecting duplicates and totals other than 10 000.
    pub fn new(entries: impl IntoIterator<Item = (Capability, u32)>) -> Result<Self, ScoreError> {
        let entries: Vec<(Capability, u32)> = entries.into_iter().collect();
        for (i, (cap, _)) in entries.iter().enumerate() {
            if entries[..i].iter().any(|(c, _)| c == cap) {
                return Err(ScoreError::Duplicate(*cap));
            }
        }
        let actual: u32 = entries.iter().map(|(_, w)| *w).sum();
        if actual != TOTAL_BASIS_POINTS {
            return Err(ScoreError::BadTotal { actual });
        }
        Ok(Self { entries })
    }

    /// Weight of one capability in basis points (`0` if not weighted).
    #[must_use]
    pub fn weight(&self, capability: Capability) -> u32 {
        self.entries
            .iter()
            .find(|(c, _)| *c == capability)
            .map_or(0, |(_, w)| *w)
    }

    /// Weighted capabilities in table order.
    pub fn capabilities(&self) -> impl Iterator<Item = Capability> + '_ {
        self.entries.iter().map(|(c, _)| *c)
    }

    /// `(capability, basis points)` pairs in table order.
    #[must_use]
    pub fn entries(&self) -> &[(Capability, u32)] {
        &self.entries
    }

    /// Default table for text-completion models.
    #[must_use]
    pub fn llm() -> Self {
        Self::from_static(&[
            (Capability::Invoke, 4_000),
            (Capability::Ainvoke, 1_500),
            (Capability::Stream, 1_500),
            (Capability::Astream, 1_000),
            (Capability::BindTools, 1_000),
            (Capability::WithStructuredOutput, 1_000),
        ])
    }

    /// Default table for chat models; tool binding weighs more than for LLMs.
    #[must_use]
    pub fn chat_model() -> Self {
        Self::from_static(&[
            (Capability::Invoke, 4_000),
            (Capability::Ainvoke, 1_000),
            (Capability::Stream, 1_000),
            (Capability::Astream, 1_000),
            (Capability::BindTools, 2_000),
            (Capability::WithStructuredOutput, 1_000),
        ])
    }

    /// Default table for embedding providers.
    #[must_use]
    pub fn embeddings() -> Self {
        Self::from_static(&[
            (Capability::EmbedDocuments, 3_500),
            (Capability::EmbedQuery, 3_500),
            (Capability::AembedDocuments, 1_500),
            (Capability::AembedQuery, 1_500),
        ])
    }

    // Built-in tables are checked by tests; skip validation here.
    fn from_static(entries: &[(Capability, u32)]) -> Self {
        Self {
            entries: entries.to_vec(),
        }
    }
}

// ---------------------------------------------------------------------------
// Scoring
// ---------------------------------------------------------------------------

/// Compatibility score in `[0.0, 1.0]`.
///
/// Each weighted capability contributes its weight at most once, and only if
/// some evidence for it passed. Evidence for unweighted capabilities is ignored.
#[must_use]
pub fn score(weights: &WeightTable, evidence: &[CapabilityEvidence]) -> f64 {
    let passed: u32 = weights
        .entries
        .iter()
        .filter(|(cap, _)| evidence.iter().any(|e| e.capability() == *cap && e.is_passed()))
        .map(|(_, w)| *w)
        .sum();
    f64::from(passed) / f64::from(TOTAL_BASIS_POINTS)
}

/// Coarse band a score falls in. Derived on read, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// Below 0.5.
    Low,
    /// 0.5 up to (not including) 0.8.
    Medium,
    /// 0.8 and above.
    High,
}

impl Tier {
    /// Band for `score`.
    #[must_use]
    pub fn from_score(score: f64) -> Self {
        if score >= 0.8 {
            Self::High
        } else if score >= 0.5 {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use ih_core::{EMBEDDINGS_CONTRACT, MODEL_CONTRACT};

    fn passed(caps: &[Capability]) -> Vec<CapabilityEvidence> {
        caps.iter()
            .map(|c| CapabilityEvidence::passed(*c, None))
            .collect()
    }

    #[test]
    fn builtin_tables_are_valid() {
        for table in [WeightTable::llm(), WeightTable::chat_model(), WeightTable::embeddings()] {
            assert!(WeightTable::new(table.entries().iter().copied()).is_ok());
        }
    }

    #[test]
    fn builtin_tables_cover_their_contract_in_order() {
        let llm: Vec<_> = WeightTable::llm().capabilities().collect();
        assert_eq!(llm, MODEL_CONTRACT);
        let chat: Vec<_> = WeightTable::chat_model().capabilities().collect();
        assert_eq!(chat, MODEL_CONTRACT);
        let emb: Vec<_> = WeightTable::embeddings().capabilities().collect();
        assert_eq!(emb, EMBEDDINGS_CONTRACT);
    }

    #[test]
    fn invoke_only_is_exactly_point_four() {
        assert_eq!(score(&WeightTable::llm(), &passed(&[Capability::Invoke])), 0.4);
        assert_eq!(score(&WeightTable::chat_model(), &passed(&[Capability::Invoke])), 0.4);
    }

    #[test]
    fn all_passing_is_exactly_one() {
        assert_eq!(score(&WeightTable::llm(), &passed(MODEL_CONTRACT)), 1.0);
        assert_eq!(score(&WeightTable::embeddings(), &passed(EMBEDDINGS_CONTRACT)), 1.0);
    }

    #[test]
    fn nothing_passing_is_zero() {
        let evidence = vec![
            CapabilityEvidence::failed(Capability::Invoke, "boom", None),
            CapabilityEvidence::absent(Capability::Stream),
        ];
        assert_eq!(score(&WeightTable::llm(), &evidence), 0.0);
        assert_eq!(score(&WeightTable::llm(), &[]), 0.0);
    }

    #[test]
    fn unweighted_evidence_is_ignored() {
        let evidence = passed(&[Capability::EmbedQuery, Capability::Invoke]);
        assert_eq!(score(&WeightTable::llm(), &evidence), 0.4);
    }

    #[test]
    fn duplicate_evidence_counts_once() {
        let evidence = passed(&[Capability::Invoke, Capability::Invoke]);
        assert_eq!(score(&WeightTable::llm(), &evidence), 0.4);
    }

    #[test]
    fn rejects_bad_totals_and_duplicates() {
        assert_eq!(
            WeightTable::new([(Capability::Invoke, 5_000)]),
            Err(ScoreError::BadTotal { actual: 5_000 })
        );
        assert_eq!(
            WeightTable::new([(Capability::Invoke, 5_000), (Capability::Invoke, 5_000)]),
            Err(ScoreError::Duplicate(Capability::Invoke))
        );
    }

    #[test]
    fn tier_boundaries() {
        assert_eq!(Tier::from_score(0.8), Tier::High);
        assert_eq!(Tier::from_score(0.79), Tier::Medium);
        assert_eq!(Tier::from_score(0.5), Tier::Medium);
        assert_eq!(Tier::from_score(0.4), Tier::Low);
        assert_eq!(Tier::from_score(0.0).to_string(), "low");
    }

    #[test]
    fn tier_serializes_snake_case() {
        assert_eq!(serde_json::to_string(&Tier::High).unwrap(), "\"high\"");
    }
}
