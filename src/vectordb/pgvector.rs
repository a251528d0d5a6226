//! Postgres + pgvector backend for the vector store contract.
//!
//! Collection names become table names, so they are validated against a
//! strict identifier pattern before being interpolated into any statement.
//! Every value travels as a bound parameter; only the validated identifier
//! and the numeric embedding size are ever spliced into SQL text.

use super::{
    CollectionInfo, INSERT_BATCH_SIZE, RetrievedDocument, VectorStore, VectorStoreError,
    validate_batch,
};
use crate::config::DistanceMethod;
use async_trait::async_trait;
use serde_json::{Value, json};
use sqlx::{
    Row,
    postgres::{PgPool, PgPoolOptions},
};
use tokio::sync::RwLock;

/// Vector store backed by a Postgres instance with the pgvector extension.
pub struct PgVectorStore {
    url: String,
    distance: DistanceMethod,
    index_threshold: usize,
    pool: RwLock<Option<PgPool>>,
}

impl PgVectorStore {
    /// Construct a store for the given Postgres connection string.
    ///
    /// No connection is made until [`VectorStore::connect`] runs.
    pub fn new(url: &str, distance: DistanceMethod, index_threshold: usize) -> Self {
        Self {
            url: url.to_string(),
            distance,
            index_threshold,
            pool: RwLock::new(None),
        }
    }

    async fn pool(&self) -> Result<PgPool, VectorStoreError> {
        self.pool
            .read()
            .await
            .clone()
            .ok_or(VectorStoreError::NotConnected)
    }

    fn distance_operator(&self) -> &'static str {
        match self.distance {
            DistanceMethod::Cosine => "<=>",
            DistanceMethod::Dot => "<#>",
        }
    }

    fn index_operator_class(&self) -> &'static str {
        match self.distance {
            DistanceMethod::Cosine => "vector_cosine_ops",
            DistanceMethod::Dot => "vector_ip_ops",
        }
    }

    async fn table_exists(&self, pool: &PgPool, table: &str) -> Result<bool, VectorStoreError> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM pg_tables WHERE tablename = $1)")
                .bind(table)
                .fetch_one(pool)
                .await?;
        Ok(exists)
    }

    async fn index_exists(&self, pool: &PgPool, table: &str) -> Result<bool, VectorStoreError> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM pg_indexes WHERE tablename = $1 AND indexname = $2)",
        )
        .bind(table)
        .bind(index_name(table))
        .fetch_one(pool)
        .await?;
        Ok(exists)
    }

    /// Create the ANN index for a collection once it holds enough records.
    ///
    /// Returns `false` when the index already exists or the record count is
    /// below the configured threshold. Index presence only affects latency;
    /// exact scans remain correct without it.
    pub async fn create_vector_index(&self, collection: &str) -> Result<bool, VectorStoreError> {
        let table = validate_collection_name(collection)?;
        let pool = self.pool().await?;
        if self.index_exists(&pool, table).await? {
            return Ok(false);
        }

        let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM \"{table}\""))
            .fetch_one(&pool)
            .await?;
        if (count as usize) < self.index_threshold {
            return Ok(false);
        }

        tracing::info!(collection, records = count, "Creating vector index");
        let statement = format!(
            "CREATE INDEX \"{index}\" ON \"{table}\" USING hnsw (vector {ops})",
            index = index_name(table),
            ops = self.index_operator_class(),
        );
        sqlx::query(&statement).execute(&pool).await?;
        Ok(true)
    }

    /// Drop and re-create the collection's ANN index.
    pub async fn reset_vector_index(&self, collection: &str) -> Result<bool, VectorStoreError> {
        let table = validate_collection_name(collection)?;
        let pool = self.pool().await?;
        let statement = format!("DROP INDEX IF EXISTS \"{index}\"", index = index_name(table));
        sqlx::query(&statement).execute(&pool).await?;
        self.create_vector_index(collection).await
    }
}

#[async_trait]
impl VectorStore for PgVectorStore {
    async fn connect(&self) -> Result<(), VectorStoreError> {
        let pool = PgPoolOptions::new().connect(&self.url).await?;
        sqlx::query("CREATE EXTENSION IF NOT EXISTS vector")
            .execute(&pool)
            .await?;
        tracing::debug!("Connected to pgvector backend");
        *self.pool.write().await = Some(pool);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), VectorStoreError> {
        if let Some(pool) = self.pool.write().await.take() {
            pool.close().await;
        }
        Ok(())
    }

    async fn collection_exists(&self, collection: &str) -> Result<bool, VectorStoreError> {
        let pool = self.pool().await?;
        self.table_exists(&pool, collection).await
    }

    async fn list_collections(&self) -> Result<Vec<String>, VectorStoreError> {
        let pool = self.pool().await?;
        let names: Vec<String> =
            sqlx::query_scalar("SELECT tablename FROM pg_tables WHERE tablename LIKE $1")
                .bind("collection_%")
                .fetch_all(&pool)
                .await?;
        Ok(names)
    }

    async fn collection_info(
        &self,
        collection: &str,
    ) -> Result<Option<CollectionInfo>, VectorStoreError> {
        let table = validate_collection_name(collection)?;
        let pool = self.pool().await?;
        if !self.table_exists(&pool, table).await? {
            return Ok(None);
        }

        let row = sqlx::query(
            "SELECT schemaname, tableowner, hasindexes FROM pg_tables WHERE tablename = $1",
        )
        .bind(table)
        .fetch_one(&pool)
        .await?;
        let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM \"{table}\""))
            .fetch_one(&pool)
            .await?;

        Ok(Some(CollectionInfo {
            name: table.to_string(),
            record_count: count.max(0) as u64,
            embedding_size: None,
            extra: json!({
                "schemaname": row.try_get::<String, _>("schemaname").ok(),
                "tableowner": row.try_get::<String, _>("tableowner").ok(),
                "hasindexes": row.try_get::<bool, _>("hasindexes").ok(),
            }),
        }))
    }

    async fn create_collection(
        &self,
        collection: &str,
        embedding_size: usize,
        do_reset: bool,
    ) -> Result<bool, VectorStoreError> {
        let table = validate_collection_name(collection)?;
        if do_reset {
            let _ = self.delete_collection(collection).await?;
        }

        let pool = self.pool().await?;
        if self.table_exists(&pool, table).await? {
            return Ok(false);
        }

        tracing::info!(collection, embedding_size, "Creating pgvector collection");
        let statement = format!(
            "CREATE TABLE \"{table}\" (\
             id bigserial PRIMARY KEY, \
             text text, \
             vector vector({embedding_size}), \
             metadata jsonb DEFAULT '{{}}', \
             chunk_id bigint)"
        );
        sqlx::query(&statement).execute(&pool).await?;
        Ok(true)
    }

    async fn delete_collection(&self, collection: &str) -> Result<bool, VectorStoreError> {
        let table = validate_collection_name(collection)?;
        let pool = self.pool().await?;
        if !self.table_exists(&pool, table).await? {
            return Ok(false);
        }
        tracing::info!(collection, "Deleting pgvector collection");
        sqlx::query(&format!("DROP TABLE IF EXISTS \"{table}\""))
            .execute(&pool)
            .await?;
        Ok(true)
    }

    async fn insert_one(
        &self,
        collection: &str,
        text: &str,
        vector: &[f32],
        metadata: Option<Value>,
        record_id: u64,
    ) -> Result<(), VectorStoreError> {
        let table = validate_collection_name(collection)?;
        let pool = self.pool().await?;
        if !self.table_exists(&pool, table).await? {
            return Err(VectorStoreError::CollectionNotFound(collection.to_string()));
        }

        sqlx::query(&insert_statement(table))
            .bind(text)
            .bind(format_vector_literal(vector))
            .bind(metadata.unwrap_or(Value::Null))
            .bind(record_id as i64)
            .execute(&pool)
            .await?;
        Ok(())
    }

    async fn insert_many(
        &self,
        collection: &str,
        texts: &[String],
        vectors: &[Vec<f32>],
        metadata: &[Value],
        record_ids: &[u64],
    ) -> Result<(), VectorStoreError> {
        validate_batch(vectors, record_ids)?;
        let table = validate_collection_name(collection)?;
        let pool = self.pool().await?;
        if !self.table_exists(&pool, table).await? {
            return Err(VectorStoreError::CollectionNotFound(collection.to_string()));
        }

        let statement = insert_statement(table);
        // One transaction per batch, committed before the call returns.
        for start in (0..texts.len()).step_by(INSERT_BATCH_SIZE) {
            let end = (start + INSERT_BATCH_SIZE).min(texts.len());
            let mut tx = pool.begin().await?;
            for index in start..end {
                sqlx::query(&statement)
                    .bind(&texts[index])
                    .bind(format_vector_literal(&vectors[index]))
                    .bind(metadata.get(index).cloned().unwrap_or(Value::Null))
                    .bind(record_ids[index] as i64)
                    .execute(&mut *tx)
                    .await?;
            }
            tx.commit().await?;
            tracing::debug!(collection, batch = end - start, "Batch committed");
        }

        if let Err(error) = self.create_vector_index(collection).await {
            tracing::warn!(collection, error = %error, "Vector index creation failed");
        }
        Ok(())
    }

    async fn search_by_vector(
        &self,
        collection: &str,
        vector: &[f32],
        limit: usize,
    ) -> Result<Vec<RetrievedDocument>, VectorStoreError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let table = validate_collection_name(collection)?;
        let pool = self.pool().await?;
        if !self.table_exists(&pool, table).await? {
            return Err(VectorStoreError::CollectionNotFound(collection.to_string()));
        }

        let statement = format!(
            "SELECT text, 1 - (vector {op} $1::vector) AS score \
             FROM \"{table}\" ORDER BY score DESC LIMIT $2",
            op = self.distance_operator(),
        );
        let rows = sqlx::query(&statement)
            .bind(format_vector_literal(vector))
            .bind(limit as i64)
            .fetch_all(&pool)
            .await?;

        Ok(rows
            .into_iter()
            .map(|row| RetrievedDocument {
                text: row.try_get::<String, _>("text").unwrap_or_default(),
                score: row.try_get::<f64, _>("score").unwrap_or(0.0) as f32,
            })
            .collect())
    }
}

/// Serialize a vector as the pgvector input literal: `[v1,v2,...]`.
fn format_vector_literal(vector: &[f32]) -> String {
    let mut literal = String::with_capacity(vector.len() * 8 + 2);
    literal.push('[');
    for (index, value) in vector.iter().enumerate() {
        if index > 0 {
            literal.push(',');
        }
        literal.push_str(&value.to_string());
    }
    literal.push(']');
    literal
}

fn insert_statement(table: &str) -> String {
    format!(
        "INSERT INTO \"{table}\" (text, vector, metadata, chunk_id) \
         VALUES ($1, $2::vector, $3, $4)"
    )
}

fn index_name(table: &str) -> String {
    format!("{table}_vector_idx")
}

/// Accept only safe SQL identifiers: leading letter or underscore, then
/// letters, digits, or underscores. Returns the borrowed name on success.
fn validate_collection_name(name: &str) -> Result<&str, VectorStoreError> {
    let mut chars = name.chars();
    let valid_head = chars
        .next()
        .map(|c| c.is_ascii_alphabetic() || c == '_')
        .unwrap_or(false);
    let valid_tail = chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid_head && valid_tail {
        Ok(name)
    } else {
        Err(VectorStoreError::InvalidCollectionName(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vector_literal_is_bracketed_and_comma_joined() {
        assert_eq!(format_vector_literal(&[0.1, 0.2, 0.3]), "[0.1,0.2,0.3]");
        assert_eq!(format_vector_literal(&[]), "[]");
        assert_eq!(format_vector_literal(&[1.0]), "[1]");
    }

    #[test]
    fn collection_names_must_be_strict_identifiers() {
        assert!(validate_collection_name("collection_p1").is_ok());
        assert!(validate_collection_name("_private").is_ok());
        assert!(validate_collection_name("collection_p1; DROP TABLE users").is_err());
        assert!(validate_collection_name("1leading_digit").is_err());
        assert!(validate_collection_name("").is_err());
        assert!(validate_collection_name("collection-p1").is_err());
    }

    #[test]
    fn search_statement_uses_configured_distance_operator() {
        let cosine = PgVectorStore::new("postgres://localhost", DistanceMethod::Cosine, 100);
        let dot = PgVectorStore::new("postgres://localhost", DistanceMethod::Dot, 100);
        assert_eq!(cosine.distance_operator(), "<=>");
        assert_eq!(dot.distance_operator(), "<#>");
        assert_eq!(cosine.index_operator_class(), "vector_cosine_ops");
        assert_eq!(dot.index_operator_class(), "vector_ip_ops");
    }

    #[test]
    fn insert_statement_interpolates_only_the_validated_table() {
        let statement = insert_statement("collection_p1");
        assert!(statement.contains("\"collection_p1\""));
        assert!(statement.contains("$1, $2::vector, $3, $4"));
    }

    #[tokio::test]
    async fn operations_before_connect_report_not_connected() {
        let store = PgVectorStore::new("postgres://localhost", DistanceMethod::Cosine, 100);
        let error = store.collection_exists("collection_p1").await.unwrap_err();
        assert!(matches!(error, VectorStoreError::NotConnected));
    }
}
