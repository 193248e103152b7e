// SPDX-License-Identifier: MIT OR Apache-2.0
//! Stable error codes for integration health probing.
//!
//! Crate-local error enums implement [`Coded`] so that stored results and logs
//! can be grouped by an [`ErrorCode`] instead of free text. [`HealthError`]
//! is the uniform shape used when an error leaves the engine.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Family an [`ErrorCode`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Namespace or class import problems.
    Discovery,
    /// Capability-level outcomes.
    Capability,
    /// Instance construction.
    Construction,
    /// Settings.
    Config,
    /// Result persistence.
    Store,
    /// Bugs in the engine itself.
    Internal,
}

impl ErrorCategory {
    /// Lower-case tag, as serialised.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Discovery => "discovery",
            Self::Capability => "capability",
            Self::Construction => "construction",
            Self::Config => "config",
            Self::Store => "store",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Machine-readable error code. The serialised form never changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// One class in a namespace failed to import.
    DiscoveryImportFailed,
    /// A namespace is not installed or could not be loaded.
    DiscoveryNamespaceMissing,
    /// The capability is not exposed. Expected, not a fault.
    CapabilityAbsent,
    /// The capability raised or returned malformed data.
    CapabilityFailed,
    /// The capability did not finish within its timeout.
    CapabilityTimeout,
    /// No instance could be built.
    ConstructionFailed,
    /// A configuration value is invalid or missing.
    ConfigInvalid,
    /// The result store refused or could not take an append.
    StoreUnavailable,
    /// Unexpected engine failure.
    Internal,
}

impl ErrorCode {
    /// Every code, in declaration order.
    pub const ALL: [ErrorCode; 9] = [
        Self::DiscoveryImportFailed,
        Self::DiscoveryNamespaceMissing,
        Self::CapabilityAbsent,
        Self::CapabilityFailed,
        Self::CapabilityTimeout,
        Self::ConstructionFailed,
        Self::ConfigInvalid,
        Self::StoreUnavailable,
        Self::Internal,
    ];

    /// The family this code belongs to.
    pub fn category(self) -> ErrorCategory {
        use ErrorCode::*;
        match self {
            DiscoveryImportFailed | DiscoveryNamespaceMissing => ErrorCategory::Discovery,
            CapabilityAbsent | CapabilityFailed | CapabilityTimeout => ErrorCategory::Capability,
            ConstructionFailed => ErrorCategory::Construction,
            ConfigInvalid => ErrorCategory::Config,
            StoreUnavailable => ErrorCategory::Store,
            Internal => ErrorCategory::Internal,
        }
    }

    /// Wire tag, e.g. `"CAPABILITY_TIMEOUT"`.
    pub fn as_str(self) -> &'static str {
        use ErrorCode::*;
        match self {
            DiscoveryImportFailed => "DISCOVERY_IMPORT_FAILED",
            DiscoveryNamespaceMissing => "DISCOVERY_NAMESPACE_MISSING",
            CapabilityAbsent => "CAPABILITY_ABSENT",
            CapabilityFailed => "CAPABILITY_FAILED",
            CapabilityTimeout => "CAPABILITY_TIMEOUT",
            ConstructionFailed => "CONSTRUCTION_FAILED",
            ConfigInvalid => "CONFIG_INVALID",
            StoreUnavailable => "STORE_UNAVAILABLE",
            Internal => "INTERNAL",
        }
    }

    /// Codes that abort a batch. Everything else is recorded in a result row.
    pub fn escapes_batch(self) -> bool {
        matches!(self, Self::StoreUnavailable | Self::Internal)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Implemented by every crate-local error enum.
pub trait Coded {
    /// Stable code for this error value.
    fn code(&self) -> ErrorCode;
}

type Cause = Arc<dyn std::error::Error + Send + Sync>;

/// An engine error scoped to an integration and, optionally, one capability.
///
/// ```
/// use ih_error::{ErrorCode, HealthError};
///
/// let err = HealthError::new(ErrorCode::CapabilityTimeout, "exceeded 30s")
///     .for_integration("ChatOpenAI")
///     .for_capability("stream")
///     .with_detail("timeout_secs", 30);
/// assert_eq!(err.to_string(), "[CAPABILITY_TIMEOUT] ChatOpenAI/stream: exceeded 30s");
/// ```
#[derive(Debug, Clone)]
pub struct HealthError {
    code: ErrorCode,
    message: String,
    integration: Option<String>,
    capability: Option<String>,
    details: BTreeMap<String, String>,
    cause: Option<Cause>,
}

impl HealthError {
    /// Error with `code` and a human-readable message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            integration: None,
            capability: None,
            details: BTreeMap::new(),
            cause: None,
        }
    }

    /// Wrap a crate-local error, keeping it as the cause.
    pub fn from_coded<E>(err: E) -> Self
    where
        E: Coded + std::error::Error + Send + Sync + 'static,
    {
        let code = err.code();
        let message = err.to_string();
        Self::new(code, message).caused_by(err)
    }

    /// Scope to one integration.
    pub fn for_integration(mut self, name: impl Into<String>) -> Self {
        self.integration = Some(name.into());
        self
    }

    /// Scope to one capability.
    pub fn for_capability(mut self, capability: impl Into<String>) -> Self {
        self.capability = Some(capability.into());
        self
    }

    /// Attach a diagnostic key/value pair.
    pub fn with_detail(mut self, key: impl Into<String>, value: impl fmt::Display) -> Self {
        self.details.insert(key.into(), value.to_string());
        self
    }

    /// Attach the underlying cause.
    pub fn caused_by(mut self, cause: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.cause = Some(Arc::new(cause));
        self
    }

    /// Stable code.
    pub fn code(&self) -> ErrorCode {
        self.code
    }

    /// Family of [`Self::code`].
    pub fn category(&self) -> ErrorCategory {
        self.code.category()
    }

    /// Human-readable message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Integration the error belongs to, if scoped.
    pub fn integration(&self) -> Option<&str> {
        self.integration.as_deref()
    }

    /// Capability the error belongs to, if scoped.
    pub fn capability(&self) -> Option<&str> {
        self.capability.as_deref()
    }

    /// Diagnostic details.
    pub fn details(&self) -> &BTreeMap<String, String> {
        &self.details
    }

    /// Serialisable snapshot.
    pub fn to_dto(&self) -> HealthErrorDto {
        HealthErrorDto::from(self)
    }
}

impl fmt::Display for HealthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] ", self.code)?;
        match (&self.integration, &self.capability) {
            (Some(i), Some(c)) => write!(f, "{i}/{c}: ")?,
            (Some(i), None) => write!(f, "{i}: ")?,
            (None, Some(c)) => write!(f, "{c}: ")?,
            (None, None) => {}
        }
        f.write_str(&self.message)
    }
}

impl std::error::Error for HealthError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_deref()
            .map(|c| c as &(dyn std::error::Error + 'static))
    }
}

impl Coded for HealthError {
    fn code(&self) -> ErrorCode {
        self.code
    }
}

/// Wire form of a [`HealthError`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthErrorDto {
    /// Stable code.
    pub code: ErrorCode,
    /// Family of `code`.
    pub category: ErrorCategory,
    /// Message.
    pub message: String,
    /// Integration name, if scoped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub integration: Option<String>,
    /// Capability name, if scoped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capability: Option<String>,
    /// Diagnostic details.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub details: BTreeMap<String, String>,
    /// Rendered cause.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
}

impl From<&HealthError> for HealthErrorDto {
    fn from(err: &HealthError) -> Self {
        Self {
            code: err.code,
            category: err.code.category(),
            message: err.message.clone(),
            integration: err.integration.clone(),
            capability: err.capability.clone(),
            details: err.details.clone(),
            cause: err.cause.as_ref().map(|c| c.to_string()),
        }
    }
}
