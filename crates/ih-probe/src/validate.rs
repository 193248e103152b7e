// SPDX-License-Identifier: MIT OR Apache-2.0
//! Response-shape rules. Each returns the violated rule as `Err`.

use ih_integration::{Chunk, Embedding, ModelOutput, OutputSchema};

/// `invoke` / `ainvoke`: text or a message with content or a tool call.
pub fn validate_reply(output: &ModelOutput) -> Result<(), String> {
    match output {
        ModelOutput::Text(t) if !t.trim().is_empty() => Ok(()),
        ModelOutput::Message(m) if !m.content.trim().is_empty() || !m.tool_calls.is_empty() => {
            Ok(())
        }
        ModelOutput::Structured(_) => Err("expected text or message, got structured value".into()),
        _ => Err("response content is empty".into()),
    }
}

/// `stream` / `astream`: at least one chunk, and not all of them empty.
pub fn validate_chunks(chunks: &[Chunk]) -> Result<(), String> {
    if chunks.is_empty() {
        return Err("stream yielded no chunks".into());
    }
    if chunks.iter().all(|c| c.text.is_empty()) {
        return Err("every streamed chunk was empty".into());
    }
    Ok(())
}

/// `bind_tools`: the bound model replies with content or calls a bound tool.
pub fn validate_tool_reply(output: &ModelOutput, bound: &[&str]) -> Result<(), String> {
    if let Some(call) = output.tool_calls().iter().find(|c| !bound.contains(&c.name.as_str())) {
        return Err(format!("tool call names unbound tool '{}'", call.name));
    }
    if !output.tool_calls().is_empty() {
        return Ok(());
    }
    match output.text() {
        Some(t) if !t.trim().is_empty() => Ok(()),
        Some(_) => Err("bound model returned neither content nor a tool call".into()),
        None => Err("bound model returned a structured value".into()),
    }
}

/// `with_structured_output`: a structured value that satisfies the schema.
pub fn validate_structured(output: &ModelOutput, schema: &OutputSchema) -> Result<(), String> {
    let ModelOutput::Structured(value) = output else {
        return Err("expected a structured value".into());
    };
    let validator = jsonschema::validator_for(&schema.schema)
        .map_err(|e| format!("output schema '{}' does not compile: {e}", schema.name))?;
    if validator.is_valid(value) {
        Ok(())
    } else {
        Err(format!("structured value does not match schema '{}'", schema.name))
    }
}

/// `embed_documents` / `aembed_documents`: one finite, non-empty vector per
/// document, all of the same dimension.
pub fn validate_documents(vectors: &[Embedding], documents: usize) -> Result<(), String> {
    if vectors.len() != documents {
        return Err(format!(
            "expected {documents} vectors, got {}",
            vectors.len()
        ));
    }
    validate_vectors(vectors)
}

/// `embed_query` / `aembed_query`: finite, non-empty vectors of one dimension.
pub fn validate_vectors(vectors: &[Embedding]) -> Result<(), String> {
    if vectors.iter().any(|v| v.is_empty()) {
        return Err("empty embedding vector".into());
    }
    if vectors.iter().flatten().any(|x| !x.is_finite()) {
        return Err("embedding contains non-finite values".into());
    }
    if let Some(first) = vectors.first() {
        if let Some(other) = vectors.iter().find(|v| v.len() != first.len()) {
            return Err(format!(
                "inconsistent dimensions: {} vs {}",
                first.len(),
                other.len()
            ));
        }
    }
    Ok(())
}
