//! Retrieval-augmented generation orchestrator.
//!
//! [`RagService`] composes one generation client, one embedding client, one
//! vector store, a template store, and the chunk repository. It owns no
//! persistent state of its own; every operation is a straight pipeline over
//! those collaborators. The [`RagApi`] trait mirrors the externally visible
//! operations so the HTTP layer can be exercised against a stub.

use crate::config::{Config, LlmBackend};
use crate::llm::{ChatMessage, ChatRole, EmbedIntent, EmbeddingClient, GenerationClient, LlmError};
use crate::processing::{
    ChunkRecord, ChunkRepository, ChunkingError, chunk_document, determine_chunk_size,
};
use crate::templates::{TemplateError, TemplateStore};
use crate::vectordb::{CollectionInfo, RetrievedDocument, VectorStore, VectorStoreError};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

/// Errors surfaced by the orchestration layer.
#[derive(Debug, Error)]
pub enum RagError {
    /// A generation or embedding provider call failed.
    #[error(transparent)]
    Llm(#[from] LlmError),
    /// A vector store call failed.
    #[error(transparent)]
    VectorStore(#[from] VectorStoreError),
    /// Prompt assembly failed.
    #[error(transparent)]
    Template(#[from] TemplateError),
    /// The chunking pipeline rejected the input.
    #[error(transparent)]
    Chunking(#[from] ChunkingError),
    /// The embedding provider produced no vector for the query text.
    #[error("Embedding provider returned no vector for the query")]
    EmptyEmbedding,
    /// The search completed but matched nothing.
    #[error("No documents matched the query")]
    NoMatches,
}

/// The assembled result of an `answer` call.
#[derive(Clone, Debug, Serialize)]
pub struct RagAnswer {
    /// Generated answer text, or `None` when generation failed after a
    /// successful retrieval.
    pub answer: Option<String>,
    /// The full prompt submitted to the generation model.
    pub full_prompt: String,
    /// Chat history submitted alongside the prompt (the system turn).
    pub chat_history: Vec<ChatMessage>,
}

/// Summary returned by `process_and_index`.
#[derive(Clone, Copy, Debug, Serialize)]
pub struct IndexOutcome {
    /// Number of chunks persisted and indexed.
    pub chunks_indexed: usize,
    /// Token budget each chunk was cut to.
    pub chunk_size: usize,
}

/// Externally visible operations, implemented by [`RagService`] and by test
/// stubs behind the HTTP layer.
#[async_trait]
pub trait RagApi: Send + Sync {
    /// Chunk raw text, persist the chunks, and index them.
    async fn process_and_index(
        &self,
        project_id: &str,
        text: &str,
        do_reset: bool,
    ) -> Result<IndexOutcome, RagError>;

    /// Embed pre-chunked records and upsert them keyed by `chunk_ids`.
    async fn index(
        &self,
        project_id: &str,
        chunks: &[ChunkRecord],
        chunk_ids: &[u64],
        do_reset: bool,
    ) -> Result<(), RagError>;

    /// Nearest-neighbor search over a project's collection.
    async fn search(
        &self,
        project_id: &str,
        text: &str,
        limit: Option<usize>,
    ) -> Result<Vec<RetrievedDocument>, RagError>;

    /// Retrieve, assemble a prompt, and generate an answer.
    ///
    /// A retrieval miss is a defined outcome, reported as `Ok(None)`.
    async fn answer(
        &self,
        project_id: &str,
        text: &str,
        limit: Option<usize>,
    ) -> Result<Option<RagAnswer>, RagError>;

    /// Metadata for a project's collection, `None` when absent.
    async fn collection_info(
        &self,
        project_id: &str,
    ) -> Result<Option<CollectionInfo>, RagError>;

    /// Drop a project's collection and its persisted chunk records.
    async fn reset_collection(&self, project_id: &str) -> Result<bool, RagError>;
}

/// The orchestrator: one boxed provider per seam, wired once at startup.
pub struct RagService {
    generation: Box<dyn GenerationClient>,
    embedding: Box<dyn EmbeddingClient>,
    store: Box<dyn VectorStore>,
    templates: TemplateStore,
    chunks: Arc<dyn ChunkRepository>,
    embedding_backend: LlmBackend,
    embedding_model_id: String,
    chunk_size_override: Option<usize>,
    chunk_overlap: usize,
    default_search_limit: usize,
}

impl RagService {
    /// Assemble the service from pre-built collaborators and configuration.
    pub fn new(
        config: &Config,
        generation: Box<dyn GenerationClient>,
        embedding: Box<dyn EmbeddingClient>,
        store: Box<dyn VectorStore>,
        templates: TemplateStore,
        chunks: Arc<dyn ChunkRepository>,
    ) -> Self {
        Self {
            generation,
            embedding,
            store,
            templates,
            chunks,
            embedding_backend: config.embedding_backend,
            embedding_model_id: config.embedding_model_id.clone(),
            chunk_size_override: config.chunk_size,
            chunk_overlap: config.chunk_overlap,
            default_search_limit: config.default_search_limit,
        }
    }

    /// Name of the collection backing a project: `collection_` plus the
    /// trimmed project id.
    pub fn collection_name(project_id: &str) -> String {
        format!("collection_{}", project_id.trim())
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, RagError> {
        let vectors = self
            .embedding
            .embed_text(&[text.to_string()], EmbedIntent::Query)
            .await?;
        vectors.into_iter().next().ok_or(RagError::EmptyEmbedding)
    }
}

#[async_trait]
impl RagApi for RagService {
    async fn process_and_index(
        &self,
        project_id: &str,
        text: &str,
        do_reset: bool,
    ) -> Result<IndexOutcome, RagError> {
        let chunk_size = determine_chunk_size(
            self.chunk_size_override,
            self.embedding_backend,
            &self.embedding_model_id,
        );
        let records = chunk_document(
            text,
            chunk_size,
            self.chunk_overlap,
            self.embedding_backend,
            &self.embedding_model_id,
            project_id,
        )?;
        if records.is_empty() {
            tracing::warn!(project_id, "Input produced no chunks; nothing indexed");
            return Ok(IndexOutcome {
                chunks_indexed: 0,
                chunk_size,
            });
        }

        let chunk_ids = self.chunks.insert_many(project_id, &records).await;
        self.index(project_id, &records, &chunk_ids, do_reset).await?;
        Ok(IndexOutcome {
            chunks_indexed: records.len(),
            chunk_size,
        })
    }

    async fn index(
        &self,
        project_id: &str,
        chunks: &[ChunkRecord],
        chunk_ids: &[u64],
        do_reset: bool,
    ) -> Result<(), RagError> {
        let texts: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();
        let metadata: Vec<Value> = chunks.iter().map(|chunk| chunk.metadata.clone()).collect();
        let vectors = self.embedding.embed_text(&texts, EmbedIntent::Document).await?;

        let collection = Self::collection_name(project_id);
        self.store
            .create_collection(&collection, self.embedding.embedding_size(), do_reset)
            .await?;
        self.store
            .insert_many(&collection, &texts, &vectors, &metadata, chunk_ids)
            .await?;
        tracing::info!(
            project_id,
            collection,
            records = chunks.len(),
            "Indexed chunk batch"
        );
        Ok(())
    }

    async fn search(
        &self,
        project_id: &str,
        text: &str,
        limit: Option<usize>,
    ) -> Result<Vec<RetrievedDocument>, RagError> {
        let limit = limit.unwrap_or(self.default_search_limit);
        let vector = self.embed_query(text).await?;
        let collection = Self::collection_name(project_id);
        let results = self.store.search_by_vector(&collection, &vector, limit).await?;
        if results.is_empty() {
            return Err(RagError::NoMatches);
        }
        Ok(results)
    }

    async fn answer(
        &self,
        project_id: &str,
        text: &str,
        limit: Option<usize>,
    ) -> Result<Option<RagAnswer>, RagError> {
        let documents = match self.search(project_id, text, limit).await {
            Ok(documents) => documents,
            Err(RagError::NoMatches) => return Ok(None),
            Err(RagError::VectorStore(VectorStoreError::CollectionNotFound(collection))) => {
                tracing::debug!(collection, "Answer requested against a missing collection");
                return Ok(None);
            }
            Err(error) => return Err(error),
        };

        let system_prompt = self.templates.render("rag", "system_prompt", &[])?;
        let mut fragments = Vec::with_capacity(documents.len());
        for (index, document) in documents.iter().enumerate() {
            let doc_num = (index + 1).to_string();
            fragments.push(self.templates.render(
                "rag",
                "document_prompt",
                &[("doc_num", doc_num.as_str()), ("chunk_text", &document.text)],
            )?);
        }
        let footer = self.templates.render("rag", "footer_prompt", &[("query", text)])?;
        let full_prompt = format!("{}\n\n{}", fragments.join("\n"), footer);
        let chat_history = vec![
            self.generation
                .construct_prompt(&system_prompt, ChatRole::System),
        ];

        let answer = match self
            .generation
            .generate_text(&full_prompt, &chat_history, None, None)
            .await
        {
            Ok(generated) => Some(generated),
            Err(error) => {
                tracing::error!(project_id, error = %error, "Generation failed after retrieval");
                None
            }
        };

        Ok(Some(RagAnswer {
            answer,
            full_prompt,
            chat_history,
        }))
    }

    async fn collection_info(
        &self,
        project_id: &str,
    ) -> Result<Option<CollectionInfo>, RagError> {
        let collection = Self::collection_name(project_id);
        Ok(self.store.collection_info(&collection).await?)
    }

    async fn reset_collection(&self, project_id: &str) -> Result<bool, RagError> {
        let collection = Self::collection_name(project_id);
        let deleted = self.store.delete_collection(&collection).await?;
        let removed = self.chunks.delete_by_project(project_id).await;
        tracing::info!(project_id, collection, deleted, removed, "Reset project data");
        Ok(deleted)
    }
}
