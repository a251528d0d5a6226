//! Generation and embedding provider abstractions.
//!
//! Two hosted-API backends implement both traits: an OpenAI-compatible
//! provider and a Cohere provider. The traits deliberately keep chat history
//! immutable at the call boundary; providers build their own request-local
//! message lists.

mod cohere;
mod factory;
mod openai;

pub use cohere::CohereProvider;
pub use factory::{embedding_client, generation_client};
pub use openai::OpenAiProvider;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by generation and embedding providers.
#[derive(Debug, Error)]
pub enum LlmError {
    /// The provider was used before its model identifier was configured.
    #[error("{0} model was not set")]
    MissingModel(&'static str),
    /// HTTP layer failed before receiving a response.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// The backend responded with an unexpected status code.
    #[error("Unexpected provider response ({status}): {body}")]
    UnexpectedStatus {
        /// HTTP status returned by the backend.
        status: reqwest::StatusCode,
        /// Body payload associated with the failing response.
        body: String,
    },
    /// The backend returned a well-formed but empty or unusable payload.
    #[error("Provider returned an empty or malformed response")]
    EmptyResponse,
}

/// Abstract role of a chat participant, mapped to provider-specific tokens
/// by [`GenerationClient::construct_prompt`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChatRole {
    /// Instruction-bearing system turn; ordered first in a conversation.
    System,
    /// End-user turn.
    User,
    /// Model turn.
    Assistant,
}

/// A single role-tagged chat message.
///
/// The `role` field carries the provider-specific token (`"system"` for
/// OpenAI, `"SYSTEM"` for Cohere, and so on), so a history built against one
/// provider is replayed verbatim against the same provider.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Provider-specific role token.
    pub role: String,
    /// Message text.
    pub content: String,
}

/// Intent tag selecting a backend-specific input-type hint for embeddings.
///
/// Affects embedding quality on backends that distinguish the two, never the
/// vector shape.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EmbedIntent {
    /// Text being indexed for later retrieval.
    Document,
    /// Text used to query the index.
    Query,
}

/// Interface implemented by text-generation backends.
#[async_trait]
pub trait GenerationClient: Send + Sync {
    /// Configure the model identifier used for generation requests.
    fn set_generation_model(&mut self, model_id: &str);

    /// Generate text for `prompt` given an optional prior `chat_history`.
    ///
    /// The prompt is truncated to the provider's configured input budget
    /// before submission. `max_tokens` and `temperature` fall back to the
    /// provider defaults when `None`. The history slice is never mutated.
    async fn generate_text(
        &self,
        prompt: &str,
        chat_history: &[ChatMessage],
        max_tokens: Option<u32>,
        temperature: Option<f32>,
    ) -> Result<String, LlmError>;

    /// Build a role-tagged message using this provider's role tokens.
    fn construct_prompt(&self, text: &str, role: ChatRole) -> ChatMessage;
}

/// Interface implemented by embedding backends.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Configure the model identifier and vector size used for embeddings.
    fn set_embedding_model(&mut self, model_id: &str, embedding_size: usize);

    /// Dimensionality of the vectors this provider is configured to produce.
    fn embedding_size(&self) -> usize;

    /// Produce one vector per input text, in input order.
    ///
    /// The result length equals the input length, or the call fails. Each
    /// item is truncated to the provider's input budget before submission.
    async fn embed_text(
        &self,
        texts: &[String],
        intent: EmbedIntent,
    ) -> Result<Vec<Vec<f32>>, LlmError>;
}

/// Truncate `text` to at most `max_characters` characters and trim whitespace.
///
/// Silent truncation is the provider contract: oversized input is clipped,
/// never rejected.
pub(crate) fn clip_input(text: &str, max_characters: usize) -> String {
    match text.char_indices().nth(max_characters) {
        Some((boundary, _)) => text[..boundary].trim().to_string(),
        None => text.trim().to_string(),
    }
}
