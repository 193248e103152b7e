// SPDX-License-Identifier: MIT OR Apache-2.0
//! Errors raised by integrations.

use ih_error::{Coded, ErrorCode};
use std::any::Any;

/// An error raised by an integration class or instance.
///
/// The `Display` output is what ends up in evidence, so variants render the
/// integration's own message without extra decoration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IntegrationError {
    /// The method exists only as the trait default.
    #[error("{method} is not implemented")]
    NotImplemented {
        /// Method name.
        method: String,
    },

    /// The integration needs credentials it was not given.
    #[error("missing credentials for {provider}")]
    MissingCredentials {
        /// Provider name.
        provider: String,
    },

    /// The integration rejected its input.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The constructor refused to build an instance.
    #[error("{0}")]
    Construction(String),

    /// Any other failure reported by the provider.
    #[error("{0}")]
    Provider(String),
}

impl IntegrationError {
    /// Shorthand for [`IntegrationError::NotImplemented`].
    pub fn not_implemented(method: impl Into<String>) -> Self {
        Self::NotImplemented {
            method: method.into(),
        }
    }
}

impl Coded for IntegrationError {
    fn code(&self) -> ErrorCode {
        match self {
            Self::NotImplemented { .. } => ErrorCode::CapabilityAbsent,
            Self::Construction(_) => ErrorCode::ConstructionFailed,
            Self::MissingCredentials { .. } | Self::InvalidInput(_) | Self::Provider(_) => {
                ErrorCode::CapabilityFailed
            }
        }
    }
}

/// Text of a panic payload caught from integration code.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
