// SPDX-License-Identifier: MIT OR Apache-2.0
//! The capability probe variants: what to call, with what, and how to judge it.

use crate::call::{CallError, CheckFailure, CheckOutcome, blocking, shape, spawned};
use crate::validate::{
    validate_chunks, validate_documents, validate_reply, validate_structured, validate_tool_reply,
    validate_vectors,
};
use futures::FutureExt;
use futures::StreamExt;
use futures::future::BoxFuture;
use ih_config::ProbeConfig;
use ih_core::{Capability, EMBEDDINGS_CONTRACT, IntegrationKind, MODEL_CONTRACT};
use ih_integration::{
    Chunk, ConstructArgs, IntegrationError, Message, ModelInput, ModelIntegration, OutputSchema,
    ToolSpec,
};
use ih_score::WeightTable;
use serde_json::json;
use std::sync::Arc;

/// Streams are judged on at most this many chunks.
pub const STREAM_CHUNK_LIMIT: usize = 10;

/// Name of the tool bound during the `bind_tools` check.
pub const CALCULATOR_TOOL: &str = "calculator";

const SAMPLE_DOCUMENTS: [&str; 3] = [
    "This is a test document.",
    "Another document for testing.",
    "A third document with different content.",
];

const SAMPLE_QUERIES: [&str; 3] = [
    "test",
    "This is a longer query",
    "This is a much longer query with more words to test dimension consistency",
];

/// Future returned by a robustness scenario.
pub type ScenarioFuture = BoxFuture<'static, Result<(), CallError>>;

/// A named diagnostic run after the functional checks. Never scored.
#[derive(Clone, Copy)]
pub struct RobustnessScenario {
    pub name: &'static str,
    /// Skipped unless this capability is exposed.
    pub requires: Capability,
    pub run: fn(Arc<dyn ModelIntegration>) -> ScenarioFuture,
}

impl std::fmt::Debug for RobustnessScenario {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RobustnessScenario")
            .field("name", &self.name)
            .field("requires", &self.requires)
            .finish_non_exhaustive()
    }
}

/// One probe variant per integration kind.
pub trait CapabilityProbe: Send + Sync {
    fn kind(&self) -> IntegrationKind;

    /// Capabilities to collect evidence for, in result order.
    fn required_capabilities(&self) -> &[Capability];

    fn weights(&self) -> &WeightTable;

    /// How to build an instance under `config`.
    fn construction_args(&self, config: &ProbeConfig) -> ConstructArgs {
        ConstructArgs {
            mock_mode: config.mock_mode,
            api_key: config.api_key.clone(),
            timeout_secs: config.timeout.as_secs().max(1),
            params: config.params.clone(),
        }
    }

    /// Exercise `capability` on a freshly built `instance`.
    fn check(
        &self,
        capability: Capability,
        instance: Arc<dyn ModelIntegration>,
    ) -> BoxFuture<'static, CheckOutcome>;

    fn robustness_scenarios(&self) -> Vec<RobustnessScenario> {
        Vec::new()
    }
}

/// The probe for `kind` with its default weights.
pub fn probe_for_kind(kind: IntegrationKind) -> Arc<dyn CapabilityProbe> {
    match kind {
        IntegrationKind::Llm => Arc::new(LlmProbe::new()),
        IntegrationKind::ChatModel => Arc::new(ChatModelProbe::new()),
        IntegrationKind::Embeddings => Arc::new(EmbeddingsProbe::new()),
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// The tool bound during the `bind_tools` check.
pub fn calculator_tool() -> ToolSpec {
    ToolSpec::new(
        CALCULATOR_TOOL,
        "Evaluate a basic arithmetic expression",
        json!({
            "type": "object",
            "properties": {"expression": {"type": "string"}},
            "required": ["expression"]
        }),
    )
}

/// The schema requested during the `with_structured_output` check.
pub fn answer_schema() -> OutputSchema {
    OutputSchema::new(
        "Answer",
        json!({
            "type": "object",
            "properties": {
                "answer": {"type": "string"},
                "confidence": {"type": "number"}
            },
            "required": ["answer"]
        }),
    )
}

// ---------------------------------------------------------------------------
// Model checks (LLM and chat)
// ---------------------------------------------------------------------------

async fn run_model_check(
    capability: Capability,
    instance: Arc<dyn ModelIntegration>,
    input: ModelInput,
) -> Result<(), CheckFailure> {
    match capability {
        Capability::Invoke => {
            let out = blocking(move || instance.invoke(&input)).await?;
            shape(validate_reply(&out))
        }
        Capability::Ainvoke => {
            let out = spawned(async move { instance.ainvoke(&input).await }).await?;
            shape(validate_reply(&out))
        }
        Capability::Stream => {
            let items = blocking(move || {
                let iter = instance.stream(&input)?;
                Ok(iter.take(STREAM_CHUNK_LIMIT).collect::<Vec<_>>())
            })
            .await?;
            let chunks = items.into_iter().collect::<Result<Vec<Chunk>, _>>()?;
            shape(validate_chunks(&chunks))
        }
        Capability::Astream => {
            let items = spawned(async move {
                let stream = instance.astream(&input).await?;
                Ok::<_, IntegrationError>(stream.take(STREAM_CHUNK_LIMIT).collect::<Vec<_>>().await)
            })
            .await?;
            let chunks = items.into_iter().collect::<Result<Vec<Chunk>, _>>()?;
            shape(validate_chunks(&chunks))
        }
        Capability::BindTools => {
            let out = blocking(move || {
                let bound = instance.bind_tools(&[calculator_tool()])?;
                bound.invoke(&input)
            })
            .await?;
            shape(validate_tool_reply(&out, &[CALCULATOR_TOOL]))
        }
        Capability::WithStructuredOutput => {
            let schema = answer_schema();
            let request = schema.clone();
            let out = blocking(move || instance.with_structured_output(&request)?.invoke(&input))
                .await?;
            shape(validate_structured(&out, &schema))
        }
        other => Err(CheckFailure::Malformed(format!(
            "{other} is not part of the model contract"
        ))),
    }
}

fn model_check(
    capability: Capability,
    instance: Arc<dyn ModelIntegration>,
    input: ModelInput,
) -> BoxFuture<'static, CheckOutcome> {
    async move { CheckOutcome::from(run_model_check(capability, instance, input).await) }.boxed()
}

fn invoke_with(instance: Arc<dyn ModelIntegration>, input: ModelInput) -> ScenarioFuture {
    blocking(move || instance.invoke(&input).map(drop)).boxed()
}

fn empty_text(instance: Arc<dyn ModelIntegration>) -> ScenarioFuture {
    invoke_with(instance, ModelInput::text(""))
}

fn long_text(instance: Arc<dyn ModelIntegration>) -> ScenarioFuture {
    invoke_with(instance, ModelInput::text("test ".repeat(10_000)))
}

fn empty_messages(instance: Arc<dyn ModelIntegration>) -> ScenarioFuture {
    invoke_with(instance, ModelInput::Messages(Vec::new()))
}

fn bare_text_to_chat(instance: Arc<dyn ModelIntegration>) -> ScenarioFuture {
    invoke_with(instance, ModelInput::text("invalid_message_format"))
}

fn long_messages(instance: Arc<dyn ModelIntegration>) -> ScenarioFuture {
    invoke_with(
        instance,
        ModelInput::Messages(vec![Message::human("test ".repeat(10_000))]),
    )
}

fn empty_tools(instance: Arc<dyn ModelIntegration>) -> ScenarioFuture {
    blocking(move || instance.bind_tools(&[]).map(drop)).boxed()
}

// ---------------------------------------------------------------------------
// LlmProbe
// ---------------------------------------------------------------------------

/// Probe for text-completion models, driven with a plain prompt.
#[derive(Debug, Clone)]
pub struct LlmProbe {
    weights: WeightTable,
}

impl LlmProbe {
    pub fn new() -> Self {
        Self {
            weights: WeightTable::llm(),
        }
    }

    pub fn with_weights(weights: WeightTable) -> Self {
        Self { weights }
    }

    fn input() -> ModelInput {
        ModelInput::text("What is 2+2?")
    }
}

impl Default for LlmProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl CapabilityProbe for LlmProbe {
    fn kind(&self) -> IntegrationKind {
        IntegrationKind::Llm
    }

    fn required_capabilities(&self) -> &[Capability] {
        MODEL_CONTRACT
    }

    fn weights(&self) -> &WeightTable {
        &self.weights
    }

    fn check(
        &self,
        capability: Capability,
        instance: Arc<dyn ModelIntegration>,
    ) -> BoxFuture<'static, CheckOutcome> {
        model_check(capability, instance, Self::input())
    }

    fn robustness_scenarios(&self) -> Vec<RobustnessScenario> {
        vec![
            RobustnessScenario {
                name: "handles_empty_input",
                requires: Capability::Invoke,
                run: empty_text,
            },
            RobustnessScenario {
                name: "handles_long_input",
                requires: Capability::Invoke,
                run: long_text,
            },
            RobustnessScenario {
                name: "handles_empty_tools",
                requires: Capability::BindTools,
                run: empty_tools,
            },
        ]
    }
}

// ---------------------------------------------------------------------------
// ChatModelProbe
// ---------------------------------------------------------------------------

/// Probe for chat models, driven with a system + human message pair.
#[derive(Debug, Clone)]
pub struct ChatModelProbe {
    weights: WeightTable,
}

impl ChatModelProbe {
    pub fn new() -> Self {
        Self {
            weights: WeightTable::chat_model(),
        }
    }

    pub fn with_weights(weights: WeightTable) -> Self {
        Self { weights }
    }

    fn input() -> ModelInput {
        ModelInput::Messages(vec![
            Message::system("You are a helpful assistant."),
            Message::human("What is 2+2?"),
        ])
    }
}

impl Default for ChatModelProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl CapabilityProbe for ChatModelProbe {
    fn kind(&self) -> IntegrationKind {
        IntegrationKind::ChatModel
    }

    fn required_capabilities(&self) -> &[Capability] {
        MODEL_CONTRACT
    }

    fn weights(&self) -> &WeightTable {
        &self.weights
    }

    fn check(
        &self,
        capability: Capability,
        instance: Arc<dyn ModelIntegration>,
    ) -> BoxFuture<'static, CheckOutcome> {
        model_check(capability, instance, Self::input())
    }

    fn robustness_scenarios(&self) -> Vec<RobustnessScenario> {
        vec![
            RobustnessScenario {
                name: "handles_empty_messages",
                requires: Capability::Invoke,
                run: empty_messages,
            },
            RobustnessScenario {
                name: "handles_text_input",
                requires: Capability::Invoke,
                run: bare_text_to_chat,
            },
            RobustnessScenario {
                name: "handles_long_input",
                requires: Capability::Invoke,
                run: long_messages,
            },
            RobustnessScenario {
                name: "handles_empty_tools",
                requires: Capability::BindTools,
                run: empty_tools,
            },
        ]
    }
}

// ---------------------------------------------------------------------------
// EmbeddingsProbe
// ---------------------------------------------------------------------------

/// Probe for embedding providers.
#[derive(Debug, Clone)]
pub struct EmbeddingsProbe {
    weights: WeightTable,
}

impl EmbeddingsProbe {
    pub fn new() -> Self {
        Self {
            weights: WeightTable::embeddings(),
        }
    }

    pub fn with_weights(weights: WeightTable) -> Self {
        Self { weights }
    }
}

impl Default for EmbeddingsProbe {
    fn default() -> Self {
        Self::new()
    }
}

fn documents() -> Vec<String> {
    SAMPLE_DOCUMENTS.iter().map(|d| d.to_string()).collect()
}

async fn run_embeddings_check(
    capability: Capability,
    instance: Arc<dyn ModelIntegration>,
) -> Result<(), CheckFailure> {
    match capability {
        Capability::EmbedDocuments => {
            let docs = documents();
            let n = docs.len();
            let vectors = blocking(move || instance.embed_documents(&docs)).await?;
            shape(validate_documents(&vectors, n))
        }
        Capability::AembedDocuments => {
            let docs = documents();
            let n = docs.len();
            let vectors = spawned(async move { instance.aembed_documents(&docs).await }).await?;
            shape(validate_documents(&vectors, n))
        }
        Capability::EmbedQuery => {
            let vectors = blocking(move || {
                SAMPLE_QUERIES
                    .iter()
                    .map(|q| instance.embed_query(q))
                    .collect::<Result<Vec<_>, _>>()
            })
            .await?;
            shape(validate_vectors(&vectors))
        }
        Capability::AembedQuery => {
            let vectors = spawned(async move {
                let mut out = Vec::with_capacity(SAMPLE_QUERIES.len());
                for q in SAMPLE_QUERIES {
                    out.push(instance.aembed_query(q).await?);
                }
                Ok::<_, IntegrationError>(out)
            })
            .await?;
            shape(validate_vectors(&vectors))
        }
        other => Err(CheckFailure::Malformed(format!(
            "{other} is not part of the embeddings contract"
        ))),
    }
}

fn empty_documents(instance: Arc<dyn ModelIntegration>) -> ScenarioFuture {
    blocking(move || instance.embed_documents(&[]).map(drop)).boxed()
}

fn empty_query(instance: Arc<dyn ModelIntegration>) -> ScenarioFuture {
    blocking(move || instance.embed_query("").map(drop)).boxed()
}

fn large_query(instance: Arc<dyn ModelIntegration>) -> ScenarioFuture {
    blocking(move || instance.embed_query(&"word ".repeat(50_000)).map(drop)).boxed()
}

impl CapabilityProbe for EmbeddingsProbe {
    fn kind(&self) -> IntegrationKind {
        IntegrationKind::Embeddings
    }

    fn required_capabilities(&self) -> &[Capability] {
        EMBEDDINGS_CONTRACT
    }

    fn weights(&self) -> &WeightTable {
        &self.weights
    }

    fn check(
        &self,
        capability: Capability,
        instance: Arc<dyn ModelIntegration>,
    ) -> BoxFuture<'static, CheckOutcome> {
        async move { CheckOutcome::from(run_embeddings_check(capability, instance).await) }.boxed()
    }

    fn robustness_scenarios(&self) -> Vec<RobustnessScenario> {
        vec![
            RobustnessScenario {
                name: "handles_empty_documents",
                requires: Capability::EmbedDocuments,
                run: empty_documents,
            },
            RobustnessScenario {
                name: "handles_empty_query",
                requires: Capability::EmbedQuery,
                run: empty_query,
            },
            RobustnessScenario {
                name: "handles_large_input",
                requires: Capability::EmbedQuery,
                run: large_query,
            },
        ]
    }
}
