// SPDX-License-Identifier: MIT OR Apache-2.0
//! ih-core
//!
//! The stable contract for integration health probing: the capability
//! enumeration, per-capability evidence, and the immutable test result that
//! every probe run produces.

#![deny(unsafe_code)]

pub mod capability;
pub mod evidence;
pub mod result;

pub use capability::{
    Capability, EMBEDDINGS_CONTRACT, IntegrationKind, MODEL_CONTRACT, SupportFlag,
    UnknownCapability,
};
pub use evidence::{CapabilityEvidence, CapabilityOutcome, MAX_ERROR_CHARS, truncate_message};
pub use result::{
    IntegrationIdentity, IntegrationTestResult, RESULT_SCHEMA_VERSION, ResultBuilder,
    SupportFlags, UNKNOWN_VERSION,
};
