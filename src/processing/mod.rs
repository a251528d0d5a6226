//! Document processing pipeline: chunk records and their persistence boundary.

mod chunking;

pub use chunking::{chunk_document, determine_chunk_size};

use anyhow::Error as TokenizerError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::Mutex;

/// Errors produced while turning raw text into chunks.
#[derive(Debug, Error)]
pub enum ChunkingError {
    /// Ingestion configured an impossible token budget.
    #[error("chunk size must be greater than zero")]
    InvalidChunkSize,
    /// Tokenizer resources were unavailable for the configured model.
    #[error("failed to initialize tokenizer for model '{model}': {source}")]
    Tokenizer {
        /// Embedding model we attempted to load.
        model: String,
        /// Underlying error raised by the tokenizer library.
        #[source]
        source: TokenizerError,
    },
}

/// A contiguous, possibly overlapping segment of a source document.
///
/// Immutable once persisted; owned by a project and deleted en masse when the
/// project's data is reset.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChunkRecord {
    /// Chunk text.
    pub text: String,
    /// 1-based position of the chunk within its source document.
    pub order: usize,
    /// Arbitrary key-value metadata carried alongside the chunk.
    pub metadata: Value,
}

/// Persistence boundary for chunk records.
///
/// The relational implementation lives outside this crate; the in-memory one
/// below backs single-process deployments and tests.
#[async_trait]
pub trait ChunkRepository: Send + Sync {
    /// Persist the records for a project and return their assigned ids, in
    /// input order.
    async fn insert_many(&self, project_id: &str, records: &[ChunkRecord]) -> Vec<u64>;

    /// Delete every record belonging to a project; returns the removed count.
    async fn delete_by_project(&self, project_id: &str) -> u64;
}

/// In-process chunk repository with monotonically increasing ids.
#[derive(Default)]
pub struct InMemoryChunkRepository {
    state: Mutex<RepositoryState>,
}

#[derive(Default)]
struct RepositoryState {
    next_id: u64,
    by_project: HashMap<String, Vec<(u64, ChunkRecord)>>,
}

impl InMemoryChunkRepository {
    /// Create an empty repository.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ChunkRepository for InMemoryChunkRepository {
    async fn insert_many(&self, project_id: &str, records: &[ChunkRecord]) -> Vec<u64> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        let mut ids = Vec::with_capacity(records.len());
        let entries = state.by_project.entry(project_id.to_string()).or_default();
        for record in records {
            state.next_id += 1;
            entries.push((state.next_id, record.clone()));
            ids.push(state.next_id);
        }
        ids
    }

    async fn delete_by_project(&self, project_id: &str) -> u64 {
        let mut state = self.state.lock().await;
        state
            .by_project
            .remove(project_id)
            .map(|entries| entries.len() as u64)
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(text: &str, order: usize) -> ChunkRecord {
        ChunkRecord {
            text: text.to_string(),
            order,
            metadata: json!({}),
        }
    }

    #[tokio::test]
    async fn ids_are_unique_across_projects() {
        let repo = InMemoryChunkRepository::new();
        let first = repo.insert_many("p1", &[record("a", 1), record("b", 2)]).await;
        let second = repo.insert_many("p2", &[record("c", 1)]).await;
        assert_eq!(first, vec![1, 2]);
        assert_eq!(second, vec![3]);
    }

    #[tokio::test]
    async fn delete_reports_removed_count() {
        let repo = InMemoryChunkRepository::new();
        repo.insert_many("p1", &[record("a", 1), record("b", 2)]).await;
        assert_eq!(repo.delete_by_project("p1").await, 2);
        assert_eq!(repo.delete_by_project("p1").await, 0);
    }
}
