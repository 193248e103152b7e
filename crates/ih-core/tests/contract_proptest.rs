// SPDX-License-Identifier: MIT OR Apache-2.0
//! Property and snapshot tests for the result contract.

use ih_core::{
    Capability, CapabilityEvidence, CapabilityOutcome, EMBEDDINGS_CONTRACT, IntegrationIdentity,
    IntegrationKind, IntegrationTestResult, MODEL_CONTRACT, truncate_message,
};
use proptest::prelude::*;

fn outcome() -> impl Strategy<Value = CapabilityOutcome> {
    prop_oneof![
        Just(CapabilityOutcome::Absent),
        Just(CapabilityOutcome::Failed),
        Just(CapabilityOutcome::Passed),
    ]
}

fn evidence(
    cap: Capability,
    outcome: CapabilityOutcome,
    latency: Option<f64>,
) -> CapabilityEvidence {
    match outcome {
        CapabilityOutcome::Absent => CapabilityEvidence::absent(cap),
        CapabilityOutcome::Failed => CapabilityEvidence::failed(cap, "boom", latency),
        CapabilityOutcome::Passed => CapabilityEvidence::passed(cap, latency),
    }
}

fn sealed(outcomes: &[(CapabilityOutcome, Option<f64>)]) -> IntegrationTestResult {
    let mut builder = IntegrationTestResult::builder(
        IntegrationIdentity::new("Prop", "pkg", None),
        IntegrationKind::ChatModel,
    );
    for (cap, (o, l)) in MODEL_CONTRACT.iter().zip(outcomes) {
        builder = builder.evidence(evidence(*cap, *o, *l));
    }
    builder.finalize(|_| 0.5)
}

proptest! {
    #[test]
    fn truncation_respects_limit_and_prefix(msg in ".{0,700}", max in 12usize..600) {
        let out = truncate_message(&msg, max);
        prop_assert!(out.chars().count() <= max);
        if msg.chars().count() <= max {
            prop_assert_eq!(&out, &msg);
        } else {
            prop_assert!(out.ends_with("[truncated]"));
            let kept: String = out.chars().take_while(|c| *c != '…').collect();
            prop_assert!(msg.starts_with(&kept));
        }
    }

    #[test]
    fn flags_track_passed_evidence(
        rows in prop::collection::vec((outcome(), prop::option::of(0.0f64..5.0)), 6)
    ) {
        let result = sealed(&rows);
        let passed = |cap: Capability| result.evidence_for(cap).is_some_and(|e| e.is_passed());

        prop_assert_eq!(result.evidence().len(), MODEL_CONTRACT.len());
        prop_assert_eq!(result.bind_tools_support(), passed(Capability::BindTools));
        prop_assert_eq!(result.streaming_support(), passed(Capability::Stream));
        prop_assert_eq!(
            result.structured_output_support(),
            passed(Capability::WithStructuredOutput)
        );
        prop_assert_eq!(result.async_support(), passed(Capability::Ainvoke));
    }

    #[test]
    fn metrics_only_for_sampled_latency(
        rows in prop::collection::vec((outcome(), prop::option::of(0.0f64..5.0)), 6)
    ) {
        let result = sealed(&rows);
        for ev in result.evidence() {
            let metric = result.performance_metrics().get(ev.capability().as_str());
            prop_assert_eq!(metric.copied(), ev.latency_secs());
        }
    }

    #[test]
    fn score_is_clamped(raw in prop::num::f64::ANY) {
        let result = IntegrationTestResult::builder(
            IntegrationIdentity::new("Clamp", "pkg", None),
            IntegrationKind::Llm,
        )
        .finalize(|_| raw);
        prop_assert!((0.0..=1.0).contains(&result.compatibility_score()));
    }
}

#[test]
fn json_round_trip_preserves_result() {
    let result = sealed(&[
        (CapabilityOutcome::Passed, Some(0.25)),
        (CapabilityOutcome::Failed, None),
        (CapabilityOutcome::Absent, None),
        (CapabilityOutcome::Passed, Some(1.5)),
        (CapabilityOutcome::Absent, None),
        (CapabilityOutcome::Passed, None),
    ]);
    let json = serde_json::to_string(&result).unwrap();
    let back: IntegrationTestResult = serde_json::from_str(&json).unwrap();
    assert_eq!(back, result);
}

#[test]
fn capability_wire_names() {
    let all: Vec<Capability> = MODEL_CONTRACT
        .iter()
        .chain(EMBEDDINGS_CONTRACT)
        .copied()
        .collect();
    insta::assert_json_snapshot!(all, @r#"
    [
      "invoke",
      "ainvoke",
      "stream",
      "astream",
      "bind_tools",
      "with_structured_output",
      "embed_documents",
      "embed_query",
      "aembed_documents",
      "aembed_query"
    ]
    "#);
}
