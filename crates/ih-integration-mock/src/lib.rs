// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
//! Scripted mock integrations.
//!
//! A [`ScriptedClass`] declares, per capability, how its instances behave:
//! pass with well-formed output, fail with an error, panic, hang for a while,
//! or return malformed output. Nothing here contacts a real provider.

use async_trait::async_trait;
use futures::StreamExt;
use ih_core::{Capability, IntegrationKind};
use ih_integration::{
    AiMessage, Chunk, ChunkIter, ChunkStream, ConstructArgs, Embedding, IntegrationClass,
    IntegrationError, MethodTable, ModelInput, ModelIntegration, ModelOutput, OutputSchema,
    ToolCall, ToolSpec,
};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Embedding dimension produced by scripted instances.
pub const MOCK_EMBEDDING_DIM: usize = 8;

/// How one capability behaves when called.
#[derive(Debug, Clone, PartialEq)]
pub enum Behavior {
    /// Return well-formed output.
    Pass,
    /// Return `IntegrationError::Provider` with this message.
    Fail(String),
    /// Panic with this message.
    Panic(String),
    /// Sleep for this long, then return well-formed output.
    Hang(Duration),
    /// Return output that violates the expected shape.
    Malformed,
}

/// How [`IntegrationClass::construct`] behaves.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum ConstructBehavior {
    #[default]
    Succeed,
    Fail(String),
    Panic(String),
    Hang(Duration),
}

/// A mock integration class driven by per-capability [`Behavior`]s.
#[derive(Debug, Clone)]
pub struct ScriptedClass {
    name: String,
    version: Option<String>,
    kind: IntegrationKind,
    credential_provider: Option<String>,
    is_abstract: bool,
    behaviors: BTreeMap<Capability, Behavior>,
    methods: Option<MethodTable>,
    construct: ConstructBehavior,
    rejects_empty_input: bool,
    constructions: Arc<AtomicUsize>,
    last_args: Arc<Mutex<Option<ConstructArgs>>>,
}

impl ScriptedClass {
    /// A class of `kind` that exposes no capabilities yet.
    pub fn new(name: impl Into<String>, kind: IntegrationKind) -> Self {
        Self {
            name: name.into(),
            version: None,
            kind,
            credential_provider: None,
            is_abstract: false,
            behaviors: BTreeMap::new(),
            methods: None,
            construct: ConstructBehavior::Succeed,
            rejects_empty_input: false,
            constructions: Arc::new(AtomicUsize::new(0)),
            last_args: Arc::new(Mutex::new(None)),
        }
    }

    /// A class of `kind` whose whole contract passes.
    pub fn passing(name: impl Into<String>, kind: IntegrationKind) -> Self {
        let mut class = Self::new(name, kind);
        for cap in kind.contract() {
            class.behaviors.insert(*cap, Behavior::Pass);
        }
        class
    }

    pub fn llm(name: impl Into<String>) -> Self {
        Self::passing(name, IntegrationKind::Llm)
    }

    pub fn chat(name: impl Into<String>) -> Self {
        Self::passing(name, IntegrationKind::ChatModel)
    }

    pub fn embeddings(name: impl Into<String>) -> Self {
        Self::passing(name, IntegrationKind::Embeddings)
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Set (or add) the behaviour of one capability.
    pub fn with_behavior(mut self, capability: Capability, behavior: Behavior) -> Self {
        self.behaviors.insert(capability, behavior);
        self
    }

    /// Stop exposing one capability.
    pub fn without(mut self, capability: Capability) -> Self {
        self.behaviors.remove(&capability);
        self
    }

    /// Expose exactly `capabilities`, all passing.
    pub fn only(mut self, capabilities: &[Capability]) -> Self {
        self.behaviors = capabilities.iter().map(|c| (*c, Behavior::Pass)).collect();
        self
    }

    /// Declare a method table instead of deriving one from the behaviours.
    pub fn with_methods(mut self, methods: MethodTable) -> Self {
        self.methods = Some(methods);
        self
    }

    pub fn with_credential_provider(mut self, provider: impl Into<String>) -> Self {
        self.credential_provider = Some(provider.into());
        self
    }

    pub fn abstract_class(mut self) -> Self {
        self.is_abstract = true;
        self
    }

    pub fn construct_with(mut self, behavior: ConstructBehavior) -> Self {
        self.construct = behavior;
        self
    }

    /// Empty prompts, queries and document lists are rejected with `InvalidInput`.
    pub fn rejecting_empty_input(mut self) -> Self {
        self.rejects_empty_input = true;
        self
    }

    /// How many times `construct` has been called on this class or its clones.
    pub fn constructions(&self) -> usize {
        self.constructions.load(Ordering::SeqCst)
    }

    /// Arguments of the most recent `construct` call.
    pub fn last_construct_args(&self) -> Option<ConstructArgs> {
        self.last_args.lock().ok().and_then(|g| g.clone())
    }

    /// Wrap as a shared class handle.
    pub fn into_handle(self) -> Arc<dyn IntegrationClass> {
        Arc::new(self)
    }
}

impl IntegrationClass for ScriptedClass {
    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    fn kind(&self) -> IntegrationKind {
        self.kind
    }

    fn methods(&self) -> MethodTable {
        match &self.methods {
            Some(table) => table.clone(),
            None => MethodTable::for_capabilities(
                &self.behaviors.keys().copied().collect::<Vec<_>>(),
            ),
        }
    }

    fn credential_provider(&self) -> Option<&str> {
        self.credential_provider.as_deref()
    }

    fn is_abstract(&self) -> bool {
        self.is_abstract
    }

    fn construct(
        &self,
        args: &ConstructArgs,
    ) -> Result<Arc<dyn ModelIntegration>, IntegrationError> {
        self.constructions.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut last) = self.last_args.lock() {
            *last = Some(args.clone());
        }

        match &self.construct {
            ConstructBehavior::Succeed => {}
            ConstructBehavior::Fail(msg) => return Err(IntegrationError::Construction(msg.clone())),
            ConstructBehavior::Panic(msg) => panic!("{msg}"),
            ConstructBehavior::Hang(d) => std::thread::sleep(*d),
        }

        if let Some(provider) = &self.credential_provider {
            if !args.mock_mode && args.api_key.is_none() {
                return Err(IntegrationError::MissingCredentials {
                    provider: provider.clone(),
                });
            }
        }

        Ok(Arc::new(ScriptedModel {
            kind: self.kind,
            behaviors: Arc::new(self.behaviors.clone()),
            mode: Mode::Base,
            rejects_empty_input: self.rejects_empty_input,
        }))
    }
}

#[derive(Debug, Clone)]
enum Mode {
    Base,
    Bound(Vec<ToolSpec>),
    Structured(OutputSchema),
}

/// An instance built by [`ScriptedClass`].
#[derive(Debug, Clone)]
struct ScriptedModel {
    kind: IntegrationKind,
    behaviors: Arc<BTreeMap<Capability, Behavior>>,
    mode: Mode,
    rejects_empty_input: bool,
}

impl ScriptedModel {
    fn behavior(&self, capability: Capability) -> Result<&Behavior, IntegrationError> {
        self.behaviors
            .get(&capability)
            .ok_or_else(|| IntegrationError::not_implemented(capability.as_str()))
    }

    fn run_sync<T>(
        &self,
        capability: Capability,
        ok: impl FnOnce() -> T,
        malformed: impl FnOnce() -> T,
    ) -> Result<T, IntegrationError> {
        match self.behavior(capability)? {
            Behavior::Pass => Ok(ok()),
            Behavior::Malformed => Ok(malformed()),
            Behavior::Fail(msg) => Err(IntegrationError::Provider(msg.clone())),
            Behavior::Panic(msg) => panic!("{msg}"),
            Behavior::Hang(d) => {
                std::thread::sleep(*d);
                Ok(ok())
            }
        }
    }

    async fn run_async<T>(
        &self,
        capability: Capability,
        ok: impl FnOnce() -> T + Send,
        malformed: impl FnOnce() -> T + Send,
    ) -> Result<T, IntegrationError> {
        match self.behavior(capability)? {
            Behavior::Pass => Ok(ok()),
            Behavior::Malformed => Ok(malformed()),
            Behavior::Fail(msg) => Err(IntegrationError::Provider(msg.clone())),
            Behavior::Panic(msg) => panic!("{msg}"),
            Behavior::Hang(d) => {
                tokio::time::sleep(*d).await;
                Ok(ok())
            }
        }
    }

    fn check_input(&self, empty: bool) -> Result<(), IntegrationError> {
        if self.rejects_empty_input && empty {
            Err(IntegrationError::InvalidInput("empty input".into()))
        } else {
            Ok(())
        }
    }

    /// Which behaviour drives `invoke` and what it yields, given the mode.
    fn invoke_plan(&self) -> (Capability, ModelOutput, ModelOutput) {
        match &self.mode {
            Mode::Base => {
                let ok = match self.kind {
                    IntegrationKind::Llm => ModelOutput::Text("mock completion".into()),
                    _ => ModelOutput::Message(AiMessage::new("mock reply")),
                };
                let bad = match self.kind {
                    IntegrationKind::Llm => ModelOutput::Text(String::new()),
                    _ => ModelOutput::Message(AiMessage::new("  ")),
                };
                (Capability::Invoke, ok, bad)
            }
            Mode::Bound(tools) => {
                let ok = match tools.first() {
                    Some(tool) => ModelOutput::Message(AiMessage {
                        content: String::new(),
                        tool_calls: vec![ToolCall {
                            name: tool.name.clone(),
                            arguments: json!({}),
                        }],
                    }),
                    None => ModelOutput::Message(AiMessage::new("mock reply without tools")),
                };
                let bad = ModelOutput::Message(AiMessage {
                    content: String::new(),
                    tool_calls: vec![ToolCall {
                        name: "not_a_bound_tool".into(),
                        arguments: Value::Null,
                    }],
                });
                (Capability::BindTools, ok, bad)
            }
            Mode::Structured(schema) => (
                Capability::WithStructuredOutput,
                ModelOutput::Structured(sample_for_schema(&schema.schema)),
                ModelOutput::Structured(json!("not structured")),
            ),
        }
    }

    fn derived(&self, mode: Mode) -> Arc<dyn ModelIntegration> {
        Arc::new(Self {
            mode,
            ..self.clone()
        })
    }
}

fn stream_chunks(ok: bool) -> Vec<Result<Chunk, IntegrationError>> {
    if ok {
        vec![Ok(Chunk::new("mock ")), Ok(Chunk::new("stream"))]
    } else {
        vec![Ok(Chunk::new("")), Ok(Chunk::new(""))]
    }
}

/// Deterministic embedding: the same text always maps to the same vector.
pub fn mock_embedding(text: &str) -> Embedding {
    let seed = (text.chars().count() % 7 + 1) as f32;
    (0..MOCK_EMBEDDING_DIM)
        .map(|i| seed * (i as f32 + 1.0) / 10.0)
        .collect()
}

/// Build a value that satisfies a simple JSON schema.
pub fn sample_for_schema(schema: &Value) -> Value {
    match schema.get("type").and_then(Value::as_str) {
        Some("object") => {
            let props = schema
                .get("properties")
                .and_then(Value::as_object)
                .map(|p| {
                    p.iter()
                        .map(|(k, v)| (k.clone(), sample_for_schema(v)))
                        .collect::<serde_json::Map<_, _>>()
                })
                .unwrap_or_default();
            Value::Object(props)
        }
        Some("string") => json!("mock"),
        Some("integer") => json!(1),
        Some("number") => json!(1.0),
        Some("boolean") => json!(true),
        Some("array") => json!([]),
        _ => Value::Null,
    }
}

#[async_trait]
impl ModelIntegration for ScriptedModel {
    fn invoke(&self, input: &ModelInput) -> Result<ModelOutput, IntegrationError> {
        self.check_input(input.is_empty())?;
        let (capability, ok, bad) = self.invoke_plan();
        self.run_sync(capability, || ok, || bad)
    }

    fn stream(&self, input: &ModelInput) -> Result<ChunkIter, IntegrationError> {
        self.check_input(input.is_empty())?;
        let chunks = self.run_sync(
            Capability::Stream,
            || stream_chunks(true),
            || stream_chunks(false),
        )?;
        Ok(Box::new(chunks.into_iter()))
    }

    fn bind_tools(
        &self,
        tools: &[ToolSpec],
    ) -> Result<Arc<dyn ModelIntegration>, IntegrationError> {
        self.run_sync(Capability::BindTools, || (), || ())?;
        Ok(self.derived(Mode::Bound(tools.to_vec())))
    }

    fn with_structured_output(
        &self,
        schema: &OutputSchema,
    ) -> Result<Arc<dyn ModelIntegration>, IntegrationError> {
        self.run_sync(Capability::WithStructuredOutput, || (), || ())?;
        Ok(self.derived(Mode::Structured(schema.clone())))
    }

    fn embed_documents(&self, documents: &[String]) -> Result<Vec<Embedding>, IntegrationError> {
        self.check_input(documents.is_empty())?;
        self.run_sync(
            Capability::EmbedDocuments,
            || documents.iter().map(|d| mock_embedding(d)).collect(),
            || documents.iter().map(|_| vec![f32::NAN]).collect(),
        )
    }

    fn embed_query(&self, text: &str) -> Result<Embedding, IntegrationError> {
        self.check_input(text.is_empty())?;
        self.run_sync(Capability::EmbedQuery, || mock_embedding(text), Vec::new)
    }

    async fn ainvoke(&self, input: &ModelInput) -> Result<ModelOutput, IntegrationError> {
        self.check_input(input.is_empty())?;
        let (_, ok, bad) = self.invoke_plan();
        self.run_async(Capability::Ainvoke, || ok, || bad).await
    }

    async fn astream(&self, input: &ModelInput) -> Result<ChunkStream, IntegrationError> {
        self.check_input(input.is_empty())?;
        let chunks = self
            .run_async(Capability::Astream, || stream_chunks(true), || stream_chunks(false))
            .await?;
        Ok(futures::stream::iter(chunks).boxed())
    }

    async fn aembed_documents(
        &self,
        documents: &[String],
    ) -> Result<Vec<Embedding>, IntegrationError> {
        self.check_input(documents.is_empty())?;
        self.run_async(
            Capability::AembedDocuments,
            || documents.iter().map(|d| mock_embedding(d)).collect(),
            || documents.iter().map(|_| vec![f32::NAN]).collect(),
        )
        .await
    }

    async fn aembed_query(&self, text: &str) -> Result<Embedding, IntegrationError> {
        self.check_input(text.is_empty())?;
        self.run_async(Capability::AembedQuery, || mock_embedding(text), Vec::new)
            .await
    }
}

/// The canned fakes: one fully passing class per kind.
pub fn canned_classes() -> Vec<Arc<dyn IntegrationClass>> {
    vec![
        ScriptedClass::llm("FakeListLLM").with_version("0.1.0").into_handle(),
        ScriptedClass::chat("FakeListChatModel")
            .with_version("0.1.0")
            .into_handle(),
        ScriptedClass::embeddings("DeterministicFakeEmbedding")
            .with_version("0.1.0")
            .into_handle(),
    ]
}
