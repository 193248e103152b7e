// SPDX-License-Identifier: MIT OR Apache-2.0
//! The fixed capability enumeration and integration kinds.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One named operation whose presence and correctness is evaluated independently.
///
/// The declaration order is the canonical report order: evidence inside a result
/// always follows it, regardless of the order in which checks complete.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Invoke,
    Ainvoke,
    Stream,
    Astream,
    BindTools,
    WithStructuredOutput,

    // Embedding providers.
    EmbedDocuments,
    EmbedQuery,
    AembedDocuments,
    AembedQuery,
}

/// Contract for text-completion and chat models, in report order.
pub const MODEL_CONTRACT: &[Capability] = &[
    Capability::Invoke,
    Capability::Ainvoke,
    Capability::Stream,
    Capability::Astream,
    Capability::BindTools,
    Capability::WithStructuredOutput,
];

/// Contract for embedding providers, in report order.
pub const EMBEDDINGS_CONTRACT: &[Capability] = &[
    Capability::EmbedDocuments,
    Capability::EmbedQuery,
    Capability::AembedDocuments,
    Capability::AembedQuery,
];

impl Capability {
    /// Every capability, in canonical order.
    pub const ALL: [Capability; 10] = [
        Capability::Invoke,
        Capability::Ainvoke,
        Capability::Stream,
        Capability::Astream,
        Capability::BindTools,
        Capability::WithStructuredOutput,
        Capability::EmbedDocuments,
        Capability::EmbedQuery,
        Capability::AembedDocuments,
        Capability::AembedQuery,
    ];

    /// The method name an integration exposes for this capability.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Invoke => "invoke",
            Self::Ainvoke => "ainvoke",
            Self::Stream => "stream",
            Self::Astream => "astream",
            Self::BindTools => "bind_tools",
            Self::WithStructuredOutput => "with_structured_output",
            Self::EmbedDocuments => "embed_documents",
            Self::EmbedQuery => "embed_query",
            Self::AembedDocuments => "aembed_documents",
            Self::AembedQuery => "aembed_query",
        }
    }

    /// Whether the method is expected to be asynchronous.
    pub fn is_async(&self) -> bool {
        matches!(
            self,
            Self::Ainvoke | Self::Astream | Self::AembedDocuments | Self::AembedQuery
        )
    }

    /// Number of parameters (excluding the receiver) a plausible signature takes.
    pub fn expected_params(&self) -> u8 {
        1
    }

    /// The derived support flag this capability drives, if any.
    pub fn flag(&self) -> Option<SupportFlag> {
        match self {
            Self::BindTools => Some(SupportFlag::BindTools),
            Self::Stream => Some(SupportFlag::Streaming),
            Self::WithStructuredOutput => Some(SupportFlag::StructuredOutput),
            Self::Ainvoke | Self::AembedQuery => Some(SupportFlag::Async),
            _ => None,
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a string does not name a known capability.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown capability: {0}")]
pub struct UnknownCapability(pub String);

impl FromStr for Capability {
    type Err = UnknownCapability;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Capability::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| UnknownCapability(s.to_string()))
    }
}

/// Boolean support flags derived from evidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SupportFlag {
    BindTools,
    Streaming,
    StructuredOutput,
    Async,
}

/// Which family an integration belongs to; selects the probe variant.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
#[serde(rename_all = "snake_case")]
pub enum IntegrationKind {
    /// Text-completion model taking a plain prompt.
    Llm,
    /// Chat model taking a message list.
    ChatModel,
    /// Embedding provider.
    Embeddings,
}

impl IntegrationKind {
    /// Capability names that make a class look like this kind during discovery.
    pub fn contract(&self) -> &'static [Capability] {
        match self {
            Self::Llm | Self::ChatModel => MODEL_CONTRACT,
            Self::Embeddings => EMBEDDINGS_CONTRACT,
        }
    }

    /// Stable snake_case name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Llm => "llm",
            Self::ChatModel => "chat_model",
            Self::Embeddings => "embeddings",
        }
    }
}

impl fmt::Display for IntegrationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_is_sorted_in_declaration_order() {
        let mut sorted = Capability::ALL;
        sorted.sort();
        assert_eq!(sorted, Capability::ALL);
    }

    #[test]
    fn parse_roundtrips_every_name() {
        for cap in Capability::ALL {
            assert_eq!(cap.as_str().parse::<Capability>().unwrap(), cap);
        }
        assert!("batch".parse::<Capability>().is_err());
    }

    #[test]
    fn serde_uses_method_names() {
        let json = serde_json::to_string(&Capability::WithStructuredOutput).unwrap();
        assert_eq!(json, r#""with_structured_output""#);
    }

    #[test]
    fn async_capabilities_are_prefixed() {
        for cap in Capability::ALL {
            assert_eq!(cap.is_async(), cap.as_str().starts_with('a'), "{cap}");
        }
    }

    #[test]
    fn contracts_partition_the_enumeration() {
        assert_eq!(MODEL_CONTRACT.len() + EMBEDDINGS_CONTRACT.len(), Capability::ALL.len());
        for cap in MODEL_CONTRACT {
            assert!(!EMBEDDINGS_CONTRACT.contains(cap));
        }
    }
}
