//! Token-budgeted semantic chunking with sliding overlap.
//!
//! Chunk sizing derives from the embedding model's context window unless the
//! configuration carries an explicit override. Token counting prefers
//! `tiktoken-rs` encodings and falls back to a whitespace counter for models
//! without a published tokenizer (common with Cohere embedding models).

use super::{ChunkRecord, ChunkingError};
use crate::config::LlmBackend;
use semchunk_rs::Chunker;
use serde_json::json;
use std::sync::Arc;
use tiktoken_rs::{CoreBPE, cl100k_base, get_bpe_from_model, model::get_context_size};

type TokenCounter = Arc<dyn Fn(&str) -> usize + Send + Sync>;

const MIN_AUTOMATIC_CHUNK_SIZE: usize = 256;
const MAX_AUTOMATIC_CHUNK_SIZE: usize = 1024;

/// Determine the chunk size for an ingestion, respecting overrides.
///
/// An explicit override wins (clamped at `>= 1`); otherwise a quarter of the
/// embedding model's context window, clamped into `[256, 1024]`.
pub fn determine_chunk_size(
    override_size: Option<usize>,
    backend: LlmBackend,
    model: &str,
) -> usize {
    if let Some(explicit) = override_size {
        return explicit.max(1);
    }

    let window = embedding_context_window(backend, model);
    (window / 4)
        .max(1)
        .clamp(MIN_AUTOMATIC_CHUNK_SIZE, MAX_AUTOMATIC_CHUNK_SIZE)
}

fn embedding_context_window(backend: LlmBackend, model: &str) -> usize {
    match backend {
        LlmBackend::OpenAi => {
            if model.starts_with("text-embedding-3") || model.starts_with("text-embedding-ada-002")
            {
                8192
            } else {
                get_context_size(model)
            }
        }
        LlmBackend::Cohere => {
            // embed-*-v3 models accept 512 tokens per input
            if model.contains("embed") {
                512
            } else {
                tracing::trace!(model, "Using default Cohere context window estimate");
                4096
            }
        }
    }
}

/// Split a document into ordered, overlapping chunk records.
///
/// Orders start at 1 and metadata carries the `source` tag. Whitespace-only
/// input yields an empty vector, the defined outcome for unreadable content.
pub fn chunk_document(
    text: &str,
    chunk_size: usize,
    overlap: usize,
    backend: LlmBackend,
    model: &str,
    source: &str,
) -> Result<Vec<ChunkRecord>, ChunkingError> {
    if chunk_size == 0 {
        return Err(ChunkingError::InvalidChunkSize);
    }
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }

    let token_counter = build_token_counter(backend, model)?;
    let chunks = chunk_with_counter(text, chunk_size, overlap, token_counter);
    Ok(chunks
        .into_iter()
        .enumerate()
        .map(|(index, chunk)| ChunkRecord {
            text: chunk,
            order: index + 1,
            metadata: json!({ "source": source }),
        })
        .collect())
}

fn build_token_counter(backend: LlmBackend, model: &str) -> Result<TokenCounter, ChunkingError> {
    match backend {
        LlmBackend::OpenAi => build_tiktoken_counter(model),
        LlmBackend::Cohere => match build_tiktoken_counter(model) {
            Ok(counter) => Ok(counter),
            Err(error) => {
                tracing::warn!(
                    model,
                    error = %error,
                    "Tokenizer unavailable for Cohere model; falling back to whitespace counter"
                );
                Ok(whitespace_token_counter())
            }
        },
    }
}

fn build_tiktoken_counter(model: &str) -> Result<TokenCounter, ChunkingError> {
    let target = if model.trim().is_empty() {
        "cl100k_base"
    } else {
        model.trim()
    };
    let encoding: CoreBPE = match get_bpe_from_model(target) {
        Ok(encoding) => encoding,
        Err(model_err) => {
            tracing::debug!(
                model = target,
                error = %model_err,
                "Tokenizer model lookup failed; using cl100k_base"
            );
            cl100k_base().map_err(|source| ChunkingError::Tokenizer {
                model: target.to_string(),
                source,
            })?
        }
    };
    let encoding = Arc::new(encoding);
    Ok(Arc::new(move |segment: &str| {
        encoding.encode_ordinary(segment).len()
    }))
}

fn whitespace_token_counter() -> TokenCounter {
    Arc::new(|segment: &str| {
        let tokens = segment.split_whitespace().count();
        if tokens == 0 && !segment.is_empty() {
            1
        } else {
            tokens
        }
    })
}

fn chunk_with_counter(
    text: &str,
    chunk_size: usize,
    overlap: usize,
    token_counter: TokenCounter,
) -> Vec<String> {
    let counter_for_chunker = token_counter.clone();
    let chunker = Chunker::new(
        chunk_size,
        Box::new(move |segment: &str| counter_for_chunker.as_ref()(segment)),
    );
    let chunks = chunker.chunk(text);
    apply_overlap(chunks, chunk_size, overlap, &token_counter)
}

/// Prefix each chunk after the first with the token-limited tail of its
/// predecessor, keeping every result within the chunk budget.
fn apply_overlap(
    chunks: Vec<String>,
    chunk_size: usize,
    overlap: usize,
    token_counter: &TokenCounter,
) -> Vec<String> {
    let effective_overlap = overlap.min(chunk_size.saturating_sub(1));
    if effective_overlap == 0 || chunks.is_empty() {
        return chunks;
    }

    let mut overlapped = Vec::with_capacity(chunks.len());
    let mut previous: Option<String> = None;
    for current in chunks {
        match previous.take() {
            None => overlapped.push(current.clone()),
            Some(prior) => {
                let tail = trim_front_to_budget(&prior, effective_overlap, token_counter);
                let mut combined = String::with_capacity(tail.len() + current.len() + 1);
                if !tail.is_empty() {
                    combined.push_str(tail);
                    if !tail.ends_with(char::is_whitespace)
                        && !current.starts_with(char::is_whitespace)
                    {
                        combined.push(' ');
                    }
                }
                combined.push_str(&current);
                overlapped.push(
                    trim_front_to_budget(&combined, chunk_size, token_counter).to_string(),
                );
            }
        }
        previous = Some(current);
    }
    overlapped
}

/// Drop characters from the front of `text` until the remainder fits within
/// `token_budget` tokens, trimming leading whitespace along the way.
fn trim_front_to_budget<'a>(
    text: &'a str,
    token_budget: usize,
    token_counter: &TokenCounter,
) -> &'a str {
    if token_budget == 0 {
        return "";
    }

    let mut candidate = text.trim_start();
    if token_counter.as_ref()(candidate) <= token_budget {
        return candidate;
    }

    let mut start = 0;
    let len = text.len();
    while start < len {
        start = text[start..]
            .char_indices()
            .nth(1)
            .map(|(offset, _)| start + offset)
            .unwrap_or(len);
        candidate = text[start..].trim_start();
        if token_counter.as_ref()(candidate) <= token_budget {
            return candidate;
        }
    }
    ""
}
