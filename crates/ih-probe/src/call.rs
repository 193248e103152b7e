// SPDX-License-Identifier: MIT OR Apache-2.0
//! Isolated calls into integration code.
//!
//! Synchronous calls go to the blocking pool and asynchronous calls to their own
//! task, so a panic comes back as a [`CallError::Panicked`] instead of unwinding
//! through the probe.

use ih_integration::{IntegrationError, panic_message};
use std::future::Future;
use tokio::task::{JoinError, JoinSet};

/// Why a call into an integration did not return a value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CallError {
    /// The integration returned an error.
    #[error(transparent)]
    Integration(#[from] IntegrationError),
    /// The integration panicked.
    #[error("panicked: {0}")]
    Panicked(String),
    /// The task was cancelled before it finished.
    #[error("cancelled")]
    Cancelled,
}

impl From<JoinError> for CallError {
    fn from(err: JoinError) -> Self {
        if err.is_panic() {
            Self::Panicked(panic_message(err.into_panic().as_ref()))
        } else {
            Self::Cancelled
        }
    }
}

/// Run a synchronous integration call on the blocking pool.
pub async fn blocking<T, F>(f: F) -> Result<T, CallError>
where
    F: FnOnce() -> Result<T, IntegrationError> + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(result) => result.map_err(CallError::from),
        Err(join) => Err(join.into()),
    }
}

/// Run an asynchronous integration call in its own task.
///
/// Dropping the returned future aborts the task.
pub async fn spawned<T, F>(fut: F) -> Result<T, CallError>
where
    F: Future<Output = Result<T, IntegrationError>> + Send + 'static,
    T: Send + 'static,
{
    let mut set = JoinSet::new();
    set.spawn(fut);
    match set.join_next().await {
        Some(Ok(result)) => result.map_err(CallError::from),
        Some(Err(join)) => Err(join.into()),
        None => Err(CallError::Cancelled),
    }
}

/// Why a functional check did not pass.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CheckFailure {
    #[error(transparent)]
    Call(#[from] CallError),
    /// The call returned, but the value broke a shape rule.
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl From<IntegrationError> for CheckFailure {
    fn from(err: IntegrationError) -> Self {
        Self::Call(CallError::Integration(err))
    }
}

/// Verdict of one functional check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    Passed,
    Failed(String),
}

impl From<Result<(), CheckFailure>> for CheckOutcome {
    fn from(result: Result<(), CheckFailure>) -> Self {
        match result {
            Ok(()) => Self::Passed,
            Err(e) => Self::Failed(e.to_string()),
        }
    }
}

/// Lift a shape rule's verdict into a check result.
pub(crate) fn shape(rule: Result<(), String>) -> Result<(), CheckFailure> {
    rule.map_err(CheckFailure::Malformed)
}
