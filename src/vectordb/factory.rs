//! Backend selection for the vector store.

use super::{PgVectorStore, QdrantStore, VectorStore, VectorStoreError};
use crate::config::{Config, ConfigError, VectorBackend};
use thiserror::Error;

/// Errors raised while building and connecting the configured vector store.
#[derive(Debug, Error)]
pub enum VectorStoreBuildError {
    /// Configuration did not carry the settings the selected backend needs.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// The backend rejected the initial connection.
    #[error(transparent)]
    Store(#[from] VectorStoreError),
}

/// Build and connect the vector store selected by `VECTORDB_BACKEND`.
pub async fn vector_store(config: &Config) -> Result<Box<dyn VectorStore>, VectorStoreBuildError> {
    let store: Box<dyn VectorStore> = match config.vector_backend {
        VectorBackend::Qdrant => {
            let url = config
                .qdrant_url
                .as_deref()
                .ok_or_else(|| ConfigError::MissingVariable("QDRANT_URL".to_string()))?;
            Box::new(QdrantStore::new(
                url,
                config.qdrant_api_key.clone(),
                config.distance_method,
            )?)
        }
        VectorBackend::PgVector => {
            let url = config
                .postgres_url
                .as_deref()
                .ok_or_else(|| ConfigError::MissingVariable("POSTGRES_URL".to_string()))?;
            Box::new(PgVectorStore::new(
                url,
                config.distance_method,
                config.index_threshold,
            ))
        }
    };
    store.connect().await?;
    tracing::info!(backend = ?config.vector_backend, "Vector store connected");
    Ok(store)
}
