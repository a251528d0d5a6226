//! Vector store abstraction and backends.
//!
//! Two backends implement the [`VectorStore`] trait: a Qdrant REST client and
//! a Postgres store built on the pgvector extension. Both expose the same
//! collection lifecycle and nearest-neighbor contract so the orchestrator can
//! treat them interchangeably.

mod factory;
mod pgvector;
mod qdrant;

pub use factory::vector_store;
pub use pgvector::PgVectorStore;
pub use qdrant::QdrantStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Records are written to the backend in slices of this size so a single call
/// never produces an oversized payload. Not observable in stored state.
pub(crate) const INSERT_BATCH_SIZE: usize = 50;

/// Errors returned by vector store backends.
///
/// Every variant is recoverable by the caller; nothing here is process-fatal.
#[derive(Debug, Error)]
pub enum VectorStoreError {
    /// The store was used before `connect` succeeded.
    #[error("Vector store is not connected")]
    NotConnected,
    /// Backend base URL failed to parse or normalize.
    #[error("Invalid backend URL: {0}")]
    InvalidUrl(String),
    /// The named collection does not exist.
    #[error("Collection does not exist: {0}")]
    CollectionNotFound(String),
    /// A vector's dimensionality does not match the collection.
    #[error("Vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Embedding size fixed at collection creation.
        expected: usize,
        /// Dimensionality of the offending vector.
        actual: usize,
    },
    /// Vector and record-id counts differ; nothing was written.
    #[error("Record count mismatch: {vectors} vectors for {ids} record ids")]
    RecordIdMismatch {
        /// Number of vectors submitted.
        vectors: usize,
        /// Number of record ids submitted.
        ids: usize,
    },
    /// Collection name failed identifier validation.
    #[error("Invalid collection name: {0}")]
    InvalidCollectionName(String),
    /// HTTP layer failed before receiving a response.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// The REST backend responded with an unexpected status code.
    #[error("Unexpected backend response ({status}): {body}")]
    UnexpectedStatus {
        /// HTTP status returned by the backend.
        status: reqwest::StatusCode,
        /// Body payload associated with the failing response.
        body: String,
    },
    /// The SQL backend reported an error.
    #[error("Database request failed: {0}")]
    Sql(#[from] sqlx::Error),
}

/// A search hit: stored text plus its similarity score (`1 - distance`).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RetrievedDocument {
    /// Stored chunk text.
    pub text: String,
    /// Similarity score, higher is closer.
    pub score: f32,
}

/// Snapshot of a collection's state, serializable for API consumers.
#[derive(Clone, Debug, Serialize)]
pub struct CollectionInfo {
    /// Collection name.
    pub name: String,
    /// Number of records currently stored.
    pub record_count: u64,
    /// Embedding size fixed at creation, when the backend reports it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding_size: Option<usize>,
    /// Backend-specific details (distance metric, table owner, and so on).
    #[serde(skip_serializing_if = "Value::is_null")]
    pub extra: Value,
}

/// Uniform contract over vector database backends.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Establish backend connectivity (probe the engine, install extensions).
    async fn connect(&self) -> Result<(), VectorStoreError>;

    /// Release backend resources. Calls after this may return [`VectorStoreError::NotConnected`].
    async fn disconnect(&self) -> Result<(), VectorStoreError>;

    /// Whether the named collection currently exists.
    async fn collection_exists(&self, collection: &str) -> Result<bool, VectorStoreError>;

    /// Names of all collections managed by this store.
    async fn list_collections(&self) -> Result<Vec<String>, VectorStoreError>;

    /// Collection metadata, or `None` when the collection is absent.
    async fn collection_info(
        &self,
        collection: &str,
    ) -> Result<Option<CollectionInfo>, VectorStoreError>;

    /// Create a collection sized for `embedding_size` vectors.
    ///
    /// With `do_reset` any existing collection of that name is deleted first.
    /// Returns `false` without error when the collection already exists and
    /// `do_reset` is off; creation is idempotent, not fatal on conflict.
    async fn create_collection(
        &self,
        collection: &str,
        embedding_size: usize,
        do_reset: bool,
    ) -> Result<bool, VectorStoreError>;

    /// Delete a collection. Returns `false` when there was nothing to delete.
    async fn delete_collection(&self, collection: &str) -> Result<bool, VectorStoreError>;

    /// Insert a single record.
    async fn insert_one(
        &self,
        collection: &str,
        text: &str,
        vector: &[f32],
        metadata: Option<Value>,
        record_id: u64,
    ) -> Result<(), VectorStoreError>;

    /// Insert a batch of records keyed by `record_ids`.
    ///
    /// Fails fast with [`VectorStoreError::RecordIdMismatch`] before touching
    /// the backend when vector and id counts differ. `metadata` may be empty
    /// (no metadata) or must match the batch length.
    async fn insert_many(
        &self,
        collection: &str,
        texts: &[String],
        vectors: &[Vec<f32>],
        metadata: &[Value],
        record_ids: &[u64],
    ) -> Result<(), VectorStoreError>;

    /// Nearest-neighbor search returning up to `limit` documents ordered by
    /// descending score. A `limit` of zero yields an empty list.
    async fn search_by_vector(
        &self,
        collection: &str,
        vector: &[f32],
        limit: usize,
    ) -> Result<Vec<RetrievedDocument>, VectorStoreError>;
}

/// Validate the batch shape shared by every `insert_many` implementation.
pub(crate) fn validate_batch(
    vectors: &[Vec<f32>],
    record_ids: &[u64],
) -> Result<(), VectorStoreError> {
    if vectors.len() != record_ids.len() {
        return Err(VectorStoreError::RecordIdMismatch {
            vectors: vectors.len(),
            ids: record_ids.len(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_batch_rejects_mismatched_lengths() {
        let vectors = vec![vec![0.1_f32], vec![0.2]];
        let ids = vec![1_u64];
        let error = validate_batch(&vectors, &ids).unwrap_err();
        assert!(matches!(
            error,
            VectorStoreError::RecordIdMismatch { vectors: 2, ids: 1 }
        ));
    }

    #[test]
    fn validate_batch_accepts_aligned_lengths() {
        let vectors = vec![vec![0.1_f32]];
        let ids = vec![7_u64];
        assert!(validate_batch(&vectors, &ids).is_ok());
    }
}
