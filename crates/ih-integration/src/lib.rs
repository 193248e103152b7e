// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
//! The integration surface that health probes exercise.
//!
//! A provider crate contributes [`IntegrationClass`] handles: factories that
//! describe themselves through a [`MethodTable`] and build
//! [`ModelIntegration`] instances. Every capability method on
//! [`ModelIntegration`] has a default body returning
//! [`IntegrationError::NotImplemented`], so a partial adapter only overrides
//! what it supports.

pub mod error;
pub mod message;
pub mod method;

pub use error::{IntegrationError, panic_message};
pub use message::{
    AiMessage, Chunk, Message, ModelInput, ModelOutput, OutputSchema, Role, ToolCall, ToolSpec,
};
pub use method::{MethodDescriptor, MethodOrigin, MethodTable};

use async_trait::async_trait;
use futures::stream::BoxStream;
use ih_core::IntegrationKind;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Blocking chunk iterator returned by [`ModelIntegration::stream`].
pub type ChunkIter = Box<dyn Iterator<Item = Result<Chunk, IntegrationError>> + Send>;

/// Async chunk stream returned by [`ModelIntegration::astream`].
pub type ChunkStream = BoxStream<'static, Result<Chunk, IntegrationError>>;

/// One embedding vector.
pub type Embedding = Vec<f32>;

/// Arguments handed to [`IntegrationClass::construct`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConstructArgs {
    /// Build an instance that never contacts a real provider.
    pub mock_mode: bool,
    pub api_key: Option<String>,
    /// Client-side timeout the instance should apply to its own requests.
    pub timeout_secs: u64,
    /// Per-integration pass-through arguments.
    pub params: BTreeMap<String, Value>,
}

/// A constructible integration type, as seen by discovery and probes.
pub trait IntegrationClass: Send + Sync {
    /// Class name, unique within its namespace.
    fn name(&self) -> &str;

    fn version(&self) -> Option<&str> {
        None
    }

    fn kind(&self) -> IntegrationKind;

    /// Reflection metadata for the methods instances expose.
    fn methods(&self) -> MethodTable;

    /// Provider whose API key construction needs, if any.
    fn credential_provider(&self) -> Option<&str> {
        None
    }

    /// Abstract base classes are never yielded by discovery.
    fn is_abstract(&self) -> bool {
        false
    }

    /// Build a fresh instance. May block.
    fn construct(
        &self,
        args: &ConstructArgs,
    ) -> Result<Arc<dyn ModelIntegration>, IntegrationError>;
}

/// A constructed integration instance.
///
/// Synchronous methods may block; callers run them off the async executor.
#[async_trait]
pub trait ModelIntegration: Send + Sync {
    fn invoke(&self, _input: &ModelInput) -> Result<ModelOutput, IntegrationError> {
        Err(IntegrationError::not_implemented("invoke"))
    }

    fn stream(&self, _input: &ModelInput) -> Result<ChunkIter, IntegrationError> {
        Err(IntegrationError::not_implemented("stream"))
    }

    /// Return a model bound to `tools`.
    fn bind_tools(
        &self,
        _tools: &[ToolSpec],
    ) -> Result<Arc<dyn ModelIntegration>, IntegrationError> {
        Err(IntegrationError::not_implemented("bind_tools"))
    }

    /// Return a runnable whose `invoke` yields [`ModelOutput::Structured`].
    fn with_structured_output(
        &self,
        _schema: &OutputSchema,
    ) -> Result<Arc<dyn ModelIntegration>, IntegrationError> {
        Err(IntegrationError::not_implemented("with_structured_output"))
    }

    fn embed_documents(&self, _documents: &[String]) -> Result<Vec<Embedding>, IntegrationError> {
        Err(IntegrationError::not_implemented("embed_documents"))
    }

    fn embed_query(&self, _text: &str) -> Result<Embedding, IntegrationError> {
        Err(IntegrationError::not_implemented("embed_query"))
    }

    async fn ainvoke(&self, _input: &ModelInput) -> Result<ModelOutput, IntegrationError> {
        Err(IntegrationError::not_implemented("ainvoke"))
    }

    async fn astream(&self, _input: &ModelInput) -> Result<ChunkStream, IntegrationError> {
        Err(IntegrationError::not_implemented("astream"))
    }

    async fn aembed_documents(
        &self,
        _documents: &[String],
    ) -> Result<Vec<Embedding>, IntegrationError> {
        Err(IntegrationError::not_implemented("aembed_documents"))
    }

    async fn aembed_query(&self, _text: &str) -> Result<Embedding, IntegrationError> {
        Err(IntegrationError::not_implemented("aembed_query"))
    }
}
