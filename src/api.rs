//! HTTP surface for the RAG server.
//!
//! A compact Axum router, one route per external operation:
//!
//! - `POST /projects/:project_id/process` – Chunk raw text, persist the chunks,
//!   and index them. Returns `{ chunks_indexed, chunk_size }`.
//! - `POST /projects/:project_id/index` – Index pre-chunked records keyed by
//!   caller-supplied chunk ids. Returns `{ indexed }`.
//! - `POST /projects/:project_id/search` – Nearest-neighbor search; returns
//!   `[{ text, score }]`, empty on a retrieval miss.
//! - `POST /projects/:project_id/answer` – Retrieve, assemble a prompt, and
//!   generate; all-null body on a retrieval miss.
//! - `GET /projects/:project_id/collection` – Collection metadata or 404.
//! - `DELETE /projects/:project_id/collection` – Drop the project's data.
//!
//! Handlers are thin marshalling shims over [`RagApi`]; all behavior lives in
//! the service.

use crate::llm::ChatMessage;
use crate::processing::ChunkRecord;
use crate::rag::{RagApi, RagError};
use crate::vectordb::CollectionInfo;
use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Build the HTTP router exposing the RAG API surface.
pub fn create_router<S>(service: Arc<S>) -> Router
where
    S: RagApi + 'static,
{
    Router::new()
        .route("/projects/:project_id/process", post(process_document::<S>))
        .route("/projects/:project_id/index", post(index_chunks::<S>))
        .route("/projects/:project_id/search", post(search_project::<S>))
        .route("/projects/:project_id/answer", post(answer_query::<S>))
        .route(
            "/projects/:project_id/collection",
            get(get_collection::<S>).delete(delete_collection::<S>),
        )
        .with_state(service)
}

/// Request body for `POST /projects/:project_id/process`.
#[derive(Deserialize)]
struct ProcessRequest {
    /// Raw document text to chunk and index.
    text: String,
    /// When set, any existing collection is dropped before indexing.
    #[serde(default)]
    do_reset: bool,
}

/// Success response for `POST /projects/:project_id/process`.
#[derive(Serialize)]
struct ProcessResponse {
    /// Number of chunks produced and indexed.
    chunks_indexed: usize,
    /// Effective token budget per chunk.
    chunk_size: usize,
}

async fn process_document<S>(
    State(service): State<Arc<S>>,
    Path(project_id): Path<String>,
    Json(request): Json<ProcessRequest>,
) -> Result<Json<ProcessResponse>, AppError>
where
    S: RagApi,
{
    let outcome = service
        .process_and_index(&project_id, &request.text, request.do_reset)
        .await?;
    tracing::info!(
        project_id,
        chunks = outcome.chunks_indexed,
        chunk_size = outcome.chunk_size,
        "Process request completed"
    );
    Ok(Json(ProcessResponse {
        chunks_indexed: outcome.chunks_indexed,
        chunk_size: outcome.chunk_size,
    }))
}

/// One pre-chunked record in an index request.
#[derive(Deserialize)]
struct ChunkPayload {
    /// Chunk text.
    text: String,
    /// Optional metadata stored alongside the vector.
    #[serde(default)]
    metadata: Option<Value>,
}

/// Request body for `POST /projects/:project_id/index`.
#[derive(Deserialize)]
struct IndexRequest {
    /// Pre-chunked records to embed and upsert.
    chunks: Vec<ChunkPayload>,
    /// Record ids for the chunks, parallel to `chunks`.
    chunk_ids: Vec<u64>,
    /// When set, any existing collection is dropped before indexing.
    #[serde(default)]
    do_reset: bool,
}

#[derive(Serialize)]
struct IndexResponse {
    indexed: bool,
}

async fn index_chunks<S>(
    State(service): State<Arc<S>>,
    Path(project_id): Path<String>,
    Json(request): Json<IndexRequest>,
) -> Result<Json<IndexResponse>, AppError>
where
    S: RagApi,
{
    let records: Vec<ChunkRecord> = request
        .chunks
        .into_iter()
        .enumerate()
        .map(|(index, chunk)| ChunkRecord {
            text: chunk.text,
            order: index + 1,
            metadata: chunk.metadata.unwrap_or(Value::Null),
        })
        .collect();
    service
        .index(&project_id, &records, &request.chunk_ids, request.do_reset)
        .await?;
    Ok(Json(IndexResponse { indexed: true }))
}

/// Request body shared by the search and answer routes.
#[derive(Deserialize)]
struct QueryRequest {
    /// Query text.
    text: String,
    /// Maximum number of documents to retrieve; server default when omitted.
    #[serde(default)]
    limit: Option<usize>,
}

async fn search_project<S>(
    State(service): State<Arc<S>>,
    Path(project_id): Path<String>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<Vec<crate::vectordb::RetrievedDocument>>, AppError>
where
    S: RagApi,
{
    match service
        .search(&project_id, &request.text, request.limit)
        .await
    {
        Ok(documents) => Ok(Json(documents)),
        // a retrieval miss is a defined outcome, not a server error
        Err(RagError::NoMatches) => Ok(Json(Vec::new())),
        Err(error) => Err(error.into()),
    }
}

/// Response body for `POST /projects/:project_id/answer`.
///
/// All three fields are null on a retrieval miss.
#[derive(Serialize)]
struct AnswerResponse {
    answer: Option<String>,
    full_prompt: Option<String>,
    chat_history: Option<Vec<ChatMessage>>,
}

async fn answer_query<S>(
    State(service): State<Arc<S>>,
    Path(project_id): Path<String>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<AnswerResponse>, AppError>
where
    S: RagApi,
{
    let response = match service
        .answer(&project_id, &request.text, request.limit)
        .await?
    {
        Some(result) => AnswerResponse {
            answer: result.answer,
            full_prompt: Some(result.full_prompt),
            chat_history: Some(result.chat_history),
        },
        None => AnswerResponse {
            answer: None,
            full_prompt: None,
            chat_history: None,
        },
    };
    Ok(Json(response))
}

async fn get_collection<S>(
    State(service): State<Arc<S>>,
    Path(project_id): Path<String>,
) -> Result<Response, AppError>
where
    S: RagApi,
{
    match service.collection_info(&project_id).await? {
        Some(info) => Ok(Json::<CollectionInfo>(info).into_response()),
        None => Ok(StatusCode::NOT_FOUND.into_response()),
    }
}

#[derive(Serialize)]
struct DeleteResponse {
    deleted: bool,
}

async fn delete_collection<S>(
    State(service): State<Arc<S>>,
    Path(project_id): Path<String>,
) -> Result<Json<DeleteResponse>, AppError>
where
    S: RagApi,
{
    let deleted = service.reset_collection(&project_id).await?;
    Ok(Json(DeleteResponse { deleted }))
}

struct AppError(RagError);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (StatusCode::INTERNAL_SERVER_ERROR, self.0.to_string()).into_response()
    }
}

impl From<RagError> for AppError {
    fn from(inner: RagError) -> Self {
        Self(inner)
    }
}

#[cfg(test)]
mod tests {
    use super::create_router;
    use crate::llm::ChatMessage;
    use crate::processing::ChunkRecord;
    use crate::rag::{IndexOutcome, RagAnswer, RagApi, RagError};
    use crate::vectordb::{CollectionInfo, RetrievedDocument, VectorStoreError};
    use async_trait::async_trait;
    use axum::{
        body::{Body, to_bytes},
        http::{Method, Request, StatusCode},
    };
    use serde_json::{Value, json};
    use std::sync::Arc;
    use tokio::sync::Mutex;
    use tower::ServiceExt;

    #[derive(Clone, Debug)]
    struct IndexCall {
        project_id: String,
        chunks: Vec<ChunkRecord>,
        chunk_ids: Vec<u64>,
        do_reset: bool,
    }

    #[derive(Default)]
    struct StubRagService {
        index_calls: Arc<Mutex<Vec<IndexCall>>>,
        has_collection: bool,
        search_misses: bool,
    }

    #[async_trait]
    impl RagApi for StubRagService {
        async fn process_and_index(
            &self,
            _project_id: &str,
            _text: &str,
            _do_reset: bool,
        ) -> Result<IndexOutcome, RagError> {
            Ok(IndexOutcome {
                chunks_indexed: 3,
                chunk_size: 512,
            })
        }

        async fn index(
            &self,
            project_id: &str,
            chunks: &[ChunkRecord],
            chunk_ids: &[u64],
            do_reset: bool,
        ) -> Result<(), RagError> {
            if chunks.len() != chunk_ids.len() {
                return Err(RagError::VectorStore(VectorStoreError::RecordIdMismatch {
                    vectors: chunks.len(),
                    ids: chunk_ids.len(),
                }));
            }
            self.index_calls.lock().await.push(IndexCall {
                project_id: project_id.to_string(),
                chunks: chunks.to_vec(),
                chunk_ids: chunk_ids.to_vec(),
                do_reset,
            });
            Ok(())
        }

        async fn search(
            &self,
            _project_id: &str,
            _text: &str,
            _limit: Option<usize>,
        ) -> Result<Vec<RetrievedDocument>, RagError> {
            if self.search_misses {
                return Err(RagError::NoMatches);
            }
            Ok(vec![RetrievedDocument {
                text: "the cat sat".to_string(),
                score: 0.92,
            }])
        }

        async fn answer(
            &self,
            _project_id: &str,
            _text: &str,
            _limit: Option<usize>,
        ) -> Result<Option<RagAnswer>, RagError> {
            if self.search_misses {
                return Ok(None);
            }
            Ok(Some(RagAnswer {
                answer: Some("the cat sat on the mat".to_string()),
                full_prompt: "prompt".to_string(),
                chat_history: vec![ChatMessage {
                    role: "system".to_string(),
                    content: "instructions".to_string(),
                }],
            }))
        }

        async fn collection_info(
            &self,
            project_id: &str,
        ) -> Result<Option<CollectionInfo>, RagError> {
            if !self.has_collection {
                return Ok(None);
            }
            Ok(Some(CollectionInfo {
                name: format!("collection_{project_id}"),
                record_count: 5,
                embedding_size: Some(8),
                extra: Value::Null,
            }))
        }

        async fn reset_collection(&self, _project_id: &str) -> Result<bool, RagError> {
            Ok(self.has_collection)
        }
    }

    async fn send(
        service: Arc<StubRagService>,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let app = create_router(service);
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(payload) => {
                builder = builder.header("content-type", "application/json");
                Body::from(payload.to_string())
            }
            None => Body::empty(),
        };
        let response = app
            .oneshot(builder.body(body).expect("request"))
            .await
            .expect("router response");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body bytes");
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };
        (status, json)
    }

    #[tokio::test]
    async fn process_route_reports_the_outcome() {
        let (status, body) = send(
            Arc::new(StubRagService::default()),
            Method::POST,
            "/projects/p1/process",
            Some(json!({ "text": "document body" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["chunks_indexed"], 3);
        assert_eq!(body["chunk_size"], 512);
    }

    #[tokio::test]
    async fn index_route_orders_chunks_and_forwards_ids() {
        let service = Arc::new(StubRagService::default());
        let (status, body) = send(
            service.clone(),
            Method::POST,
            "/projects/p1/index",
            Some(json!({
                "chunks": [
                    { "text": "first", "metadata": { "source": "a" } },
                    { "text": "second" }
                ],
                "chunk_ids": [10, 11],
                "do_reset": true
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["indexed"], true);

        let calls = service.index_calls.lock().await;
        assert_eq!(calls.len(), 1);
        let call = &calls[0];
        assert_eq!(call.project_id, "p1");
        assert_eq!(call.chunk_ids, vec![10, 11]);
        assert!(call.do_reset);
        assert_eq!(call.chunks[0].order, 1);
        assert_eq!(call.chunks[1].order, 2);
        assert_eq!(call.chunks[0].metadata["source"], "a");
    }

    #[tokio::test]
    async fn index_route_surfaces_mismatched_ids_as_errors() {
        let (status, _) = send(
            Arc::new(StubRagService::default()),
            Method::POST,
            "/projects/p1/index",
            Some(json!({
                "chunks": [{ "text": "only one" }],
                "chunk_ids": [1, 2]
            })),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn search_route_returns_documents() {
        let (status, body) = send(
            Arc::new(StubRagService::default()),
            Method::POST,
            "/projects/p1/search",
            Some(json!({ "text": "a cat sitting", "limit": 1 })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0]["text"], "the cat sat");
    }

    #[tokio::test]
    async fn search_miss_is_an_empty_list_not_an_error() {
        let service = Arc::new(StubRagService {
            search_misses: true,
            ..Default::default()
        });
        let (status, body) = send(
            service,
            Method::POST,
            "/projects/p1/search",
            Some(json!({ "text": "nothing here" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!([]));
    }

    #[tokio::test]
    async fn answer_miss_returns_the_all_null_shape() {
        let service = Arc::new(StubRagService {
            search_misses: true,
            ..Default::default()
        });
        let (status, body) = send(
            service,
            Method::POST,
            "/projects/p1/answer",
            Some(json!({ "text": "anything" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["answer"], Value::Null);
        assert_eq!(body["full_prompt"], Value::Null);
        assert_eq!(body["chat_history"], Value::Null);
    }

    #[tokio::test]
    async fn answer_hit_carries_prompt_and_history() {
        let (status, body) = send(
            Arc::new(StubRagService::default()),
            Method::POST,
            "/projects/p1/answer",
            Some(json!({ "text": "where did the cat sit?" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["answer"], "the cat sat on the mat");
        assert_eq!(body["chat_history"][0]["role"], "system");
    }

    #[tokio::test]
    async fn missing_collection_is_a_404() {
        let (status, _) = send(
            Arc::new(StubRagService::default()),
            Method::GET,
            "/projects/p1/collection",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn collection_info_is_serialized_for_consumers() {
        let service = Arc::new(StubRagService {
            has_collection: true,
            ..Default::default()
        });
        let (status, body) = send(service, Method::GET, "/projects/p1/collection", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["name"], "collection_p1");
        assert_eq!(body["record_count"], 5);
    }

    #[tokio::test]
    async fn delete_route_reports_whether_anything_was_dropped() {
        let service = Arc::new(StubRagService {
            has_collection: true,
            ..Default::default()
        });
        let (status, body) = send(service, Method::DELETE, "/projects/p1/collection", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["deleted"], true);
    }
}
