// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
//! Capability probing.
//!
//! An [`IntegrationProbe`] pairs one integration class with the
//! [`CapabilityProbe`] variant for its kind and turns a run into an
//! [`ih_core::IntegrationTestResult`]:
//!
//! 1. the method table is classified per capability ([`shape`]);
//! 2. each exposed capability is exercised on a fresh instance, bounded by the
//!    configured timeout, with panics captured ([`call`]);
//! 3. responses are judged by shape rules ([`validate`]);
//! 4. evidence is scored with the probe's weight table.
//!
//! Nothing an integration does (error, panic, hang, garbage output) escapes a
//! run; it is recorded as evidence instead.

pub mod call;
pub mod probes;
pub mod runner;
pub mod shape;
pub mod validate;

pub use call::{CallError, CheckFailure, CheckOutcome};
pub use probes::{
    CALCULATOR_TOOL, CapabilityProbe, ChatModelProbe, EmbeddingsProbe, LlmProbe,
    RobustnessScenario, STREAM_CHUNK_LIMIT, ScenarioFuture, answer_schema, calculator_tool,
    probe_for_kind,
};
pub use runner::{
    IntegrationProbe, ProbePhase, UNKNOWN_PACKAGE, format_duration, missing_credentials_message,
    run_budget, timeout_message,
};
pub use shape::{ShapeCheck, probe_shape};
