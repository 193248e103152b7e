// SPDX-License-Identifier: MIT OR Apache-2.0
//! Existence checks against a class's method table.

use ih_core::Capability;
use ih_integration::{MethodOrigin, MethodTable};

/// What the method table says about one capability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShapeCheck {
    /// No method of that name.
    Absent,
    /// A method exists but its signature cannot be the capability.
    Mismatch { reason: String },
    /// Only an inherited fallback exists; it may or may not work.
    Ambiguous,
    /// The class implements the method with a plausible signature.
    Present,
}

impl ShapeCheck {
    /// `true` when the capability should be exercised.
    pub fn is_present(&self) -> bool {
        matches!(self, Self::Ambiguous | Self::Present)
    }
}

/// Classify `capability` against `table`.
pub fn probe_shape(table: &MethodTable, capability: Capability) -> ShapeCheck {
    let Some(method) = table.get(capability.as_str()) else {
        return ShapeCheck::Absent;
    };

    if method.asynchronous != capability.is_async() {
        let (want, got) = if capability.is_async() {
            ("async", "sync")
        } else {
            ("sync", "async")
        };
        return ShapeCheck::Mismatch {
            reason: format!("expected {want} method, found {got}"),
        };
    }

    let expected = usize::from(capability.expected_params());
    if method.params != expected {
        return ShapeCheck::Mismatch {
            reason: format!("expected {expected} parameter(s), found {}", method.params),
        };
    }

    match method.origin {
        MethodOrigin::Inherited => ShapeCheck::Ambiguous,
        MethodOrigin::Override => ShapeCheck::Present,
    }
}
