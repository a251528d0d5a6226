//! Qdrant REST backend for the vector store contract.

use super::{
    CollectionInfo, INSERT_BATCH_SIZE, RetrievedDocument, VectorStore, VectorStoreError,
    validate_batch,
};
use crate::config::DistanceMethod;
use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};

/// Lightweight HTTP client implementing [`VectorStore`] against Qdrant.
pub struct QdrantStore {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    distance: DistanceMethod,
}

impl QdrantStore {
    /// Construct a store for the given Qdrant endpoint.
    pub fn new(
        base_url: &str,
        api_key: Option<String>,
        distance: DistanceMethod,
    ) -> Result<Self, VectorStoreError> {
        let client = Client::builder()
            .user_agent(concat!("ragserve/", env!("CARGO_PKG_VERSION")))
            .build()?;
        let base_url = normalize_base_url(base_url).map_err(VectorStoreError::InvalidUrl)?;
        tracing::debug!(
            url = %base_url,
            has_api_key = api_key.as_deref().map(|key| !key.is_empty()).unwrap_or(false),
            "Initialized Qdrant HTTP client"
        );
        Ok(Self {
            client,
            base_url,
            api_key,
            distance,
        })
    }

    fn distance_token(&self) -> &'static str {
        match self.distance {
            DistanceMethod::Cosine => "Cosine",
            DistanceMethod::Dot => "Dot",
        }
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        let mut req = self.client.request(method, url);
        if let Some(api_key) = &self.api_key
            && !api_key.is_empty()
        {
            req = req.header("api-key", api_key);
        }
        req
    }

    async fn ensure_success(
        &self,
        response: reqwest::Response,
    ) -> Result<reqwest::Response, VectorStoreError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = VectorStoreError::UnexpectedStatus { status, body };
            tracing::error!(error = %error, "Qdrant request failed");
            Err(error)
        }
    }
}

#[async_trait]
impl VectorStore for QdrantStore {
    async fn connect(&self) -> Result<(), VectorStoreError> {
        // REST transport is stateless; a listing doubles as a reachability probe.
        self.list_collections().await.map(|_| ())
    }

    async fn disconnect(&self) -> Result<(), VectorStoreError> {
        Ok(())
    }

    async fn collection_exists(&self, collection: &str) -> Result<bool, VectorStoreError> {
        let response = self
            .request(Method::GET, &format!("collections/{collection}"))
            .send()
            .await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            status if status.is_success() => Ok(true),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(VectorStoreError::UnexpectedStatus { status, body })
            }
        }
    }

    async fn list_collections(&self) -> Result<Vec<String>, VectorStoreError> {
        let response = self.request(Method::GET, "collections").send().await?;
        let response = self.ensure_success(response).await?;
        let payload: ListCollectionsResponse = response.json().await?;
        Ok(payload
            .result
            .collections
            .into_iter()
            .map(|collection| collection.name)
            .collect())
    }

    async fn collection_info(
        &self,
        collection: &str,
    ) -> Result<Option<CollectionInfo>, VectorStoreError> {
        let response = self
            .request(Method::GET, &format!("collections/{collection}"))
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = self.ensure_success(response).await?;
        let payload: CollectionInfoResponse = response.json().await?;
        let result = payload.result;
        Ok(Some(CollectionInfo {
            name: collection.to_string(),
            record_count: result.points_count.unwrap_or(0),
            embedding_size: result
                .config
                .as_ref()
                .map(|config| config.params.vectors.size),
            extra: json!({
                "status": result.status,
                "distance": result
                    .config
                    .as_ref()
                    .and_then(|config| config.params.vectors.distance.clone()),
            }),
        }))
    }

    async fn create_collection(
        &self,
        collection: &str,
        embedding_size: usize,
        do_reset: bool,
    ) -> Result<bool, VectorStoreError> {
        if do_reset {
            let _ = self.delete_collection(collection).await?;
        } else if self.collection_exists(collection).await? {
            return Ok(false);
        }

        tracing::info!(
            collection,
            embedding_size,
            distance = self.distance_token(),
            "Creating Qdrant collection"
        );
        let body = json!({
            "vectors": {
                "size": embedding_size,
                "distance": self.distance_token(),
            }
        });
        let response = self
            .request(Method::PUT, &format!("collections/{collection}"))
            .json(&body)
            .send()
            .await?;
        self.ensure_success(response).await?;
        Ok(true)
    }

    async fn delete_collection(&self, collection: &str) -> Result<bool, VectorStoreError> {
        if !self.collection_exists(collection).await? {
            return Ok(false);
        }
        tracing::info!(collection, "Deleting Qdrant collection");
        let response = self
            .request(Method::DELETE, &format!("collections/{collection}"))
            .send()
            .await?;
        self.ensure_success(response).await?;
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
        let metadata = match metadata {
            Some(value) => vec![value],
            None => Vec::new(),
        };
        self.insert_many(
            collection,
            &[text.to_string()],
            &[vector.to_vec()],
            &metadata,
            &[record_id],
        )
        .await
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
        if !self.collection_exists(collection).await? {
            return Err(VectorStoreError::CollectionNotFound(collection.to_string()));
        }

        for start in (0..texts.len()).step_by(INSERT_BATCH_SIZE) {
            let end = (start + INSERT_BATCH_SIZE).min(texts.len());
            let points: Vec<Value> = (start..end)
                .map(|index| {
                    json!({
                        "id": record_ids[index],
                        "vector": vectors[index],
                        "payload": {
                            "text": texts[index],
                            "metadata": metadata.get(index).cloned().unwrap_or(Value::Null),
                        }
                    })
                })
                .collect();

            let response = self
                .request(Method::PUT, &format!("collections/{collection}/points"))
                .query(&[("wait", true)])
                .json(&json!({ "points": points }))
                .send()
                .await?;
            self.ensure_success(response).await?;
            tracing::debug!(collection, batch = end - start, "Points upserted");
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
        if !self.collection_exists(collection).await? {
            return Err(VectorStoreError::CollectionNotFound(collection.to_string()));
        }

        let body = json!({
            "query": vector,
            "limit": limit,
            "with_payload": true,
        });
        let response = self
            .request(Method::POST, &format!("collections/{collection}/points/query"))
            .json(&body)
            .send()
            .await?;
        let response = self.ensure_success(response).await?;

        let payload: QueryResponse = response.json().await?;
        let points = match payload.result {
            QueryResponseResult::Points(points) => points,
            QueryResponseResult::Object { points } => points,
        };
        Ok(points
            .into_iter()
            .map(|point| RetrievedDocument {
                text: point
                    .payload
                    .as_ref()
                    .and_then(|payload| payload.get("text"))
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                score: point.score,
            })
            .collect())
    }
}

fn normalize_base_url(url: &str) -> Result<String, String> {
    let mut parsed = reqwest::Url::parse(url).map_err(|err| err.to_string())?;
    let path = parsed.path().trim_end_matches('/').to_string();
    parsed.set_path(&path);
    Ok(parsed.to_string())
}

#[derive(Deserialize)]
struct ListCollectionsResponse {
    result: ListCollectionsResult,
}

#[derive(Deserialize)]
struct ListCollectionsResult {
    collections: Vec<CollectionDescription>,
}

#[derive(Deserialize)]
struct CollectionDescription {
    name: String,
}

#[derive(Deserialize)]
struct CollectionInfoResponse {
    result: CollectionInfoResult,
}

#[derive(Deserialize)]
struct CollectionInfoResult {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    points_count: Option<u64>,
    #[serde(default)]
    config: Option<CollectionConfig>,
}

#[derive(Deserialize)]
struct CollectionConfig {
    params: CollectionParams,
}

#[derive(Deserialize)]
struct CollectionParams {
    vectors: VectorParams,
}

#[derive(Deserialize)]
struct VectorParams {
    size: usize,
    #[serde(default)]
    distance: Option<String>,
}

#[derive(Deserialize)]
struct QueryResponse {
    result: QueryResponseResult,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum QueryResponseResult {
    Points(Vec<QueryPoint>),
    Object {
        #[serde(default)]
        points: Vec<QueryPoint>,
    },
}

#[derive(Deserialize)]
struct QueryPoint {
    score: f32,
    #[serde(default)]
    payload: Option<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{
        Method::{DELETE, GET, POST, PUT},
        MockServer,
    };

    fn store(server: &MockServer) -> QdrantStore {
        QdrantStore::new(&server.base_url(), None, DistanceMethod::Cosine).expect("store")
    }

    #[tokio::test]
    async fn create_collection_is_idempotent_without_reset() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/collections/collection_p1");
                then.status(200).json_body(json!({ "result": {} }));
            })
            .await;

        let created = store(&server)
            .create_collection("collection_p1", 4, false)
            .await
            .expect("create call");
        assert!(!created);
    }

    #[tokio::test]
    async fn create_collection_with_reset_deletes_first() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/collections/collection_p1");
                then.status(200).json_body(json!({ "result": {} }));
            })
            .await;
        let delete = server
            .mock_async(|when, then| {
                when.method(DELETE).path("/collections/collection_p1");
                then.status(200).json_body(json!({ "result": true }));
            })
            .await;
        let create = server
            .mock_async(|when, then| {
                when.method(PUT)
                    .path("/collections/collection_p1")
                    .json_body_partial(
                        json!({ "vectors": { "size": 4, "distance": "Cosine" } }).to_string(),
                    );
                then.status(200).json_body(json!({ "result": true }));
            })
            .await;

        let created = store(&server)
            .create_collection("collection_p1", 4, true)
            .await
            .expect("create call");
        assert!(created);
        delete.assert();
        create.assert();
    }

    #[tokio::test]
    async fn insert_many_rejects_mismatched_ids_before_any_request() {
        let server = MockServer::start_async().await;
        let error = store(&server)
            .insert_many(
                "collection_p1",
                &["a".into(), "b".into()],
                &[vec![0.1], vec![0.2]],
                &[],
                &[1],
            )
            .await
            .unwrap_err();
        assert!(matches!(error, VectorStoreError::RecordIdMismatch { .. }));
        // no mock registered: reaching the network would have panicked
    }

    #[tokio::test]
    async fn search_maps_payload_text_and_score() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/collections/collection_p1");
                then.status(200).json_body(json!({ "result": {} }));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/collections/collection_p1/points/query");
                then.status(200).json_body(json!({
                    "result": {
                        "points": [
                            { "id": 1, "score": 0.92, "payload": { "text": "the cat sat" } },
                            { "id": 2, "score": 0.41, "payload": { "text": "the dog ran" } }
                        ]
                    }
                }));
            })
            .await;

        let results = store(&server)
            .search_by_vector("collection_p1", &[0.1, 0.2], 2)
            .await
            .expect("search");
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].text, "the cat sat");
        assert!(results[0].score > results[1].score);
    }

    #[tokio::test]
    async fn search_missing_collection_is_not_found() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/collections/collection_absent");
                then.status(404);
            })
            .await;

        let error = store(&server)
            .search_by_vector("collection_absent", &[0.1], 5)
            .await
            .unwrap_err();
        assert!(matches!(error, VectorStoreError::CollectionNotFound(_)));
    }

    #[tokio::test]
    async fn zero_limit_short_circuits_to_empty() {
        let server = MockServer::start_async().await;
        let results = store(&server)
            .search_by_vector("collection_p1", &[0.1], 0)
            .await
            .expect("search");
        assert!(results.is_empty());
    }
}
