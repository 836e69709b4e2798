//! HTTP client for a Qdrant-style vector similarity service

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use crate::config::VectorSearchConfig;
use crate::error::{Error, Result};
use crate::retry::retry_with_backoff;

use super::vector_store::{VectorSearchHit, VectorSearchProvider};

#[derive(Serialize)]
struct SearchRequest<'a> {
    vector: &'a [f32],
    limit: usize,
    score_threshold: f32,
    with_payload: bool,
}

#[derive(Deserialize)]
struct SearchResponse {
    result: Vec<ScoredPoint>,
}

#[derive(Deserialize)]
struct ScoredPoint {
    id: serde_json::Value,
    score: f32,
}

/// Vector similarity client for Qdrant-style services
pub struct QdrantSearch {
    client: Client,
    config: VectorSearchConfig,
}

impl QdrantSearch {
    /// Create a new search client
    pub fn new(config: &VectorSearchConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Config(format!("failed to build vector search client: {e}")))?;

        Ok(Self { client, config: config.clone() })
    }

    async fn request_search(
        &self,
        collection: &str,
        query_vector: &[f32],
        top_k: usize,
        min_score: f32,
    ) -> Result<Vec<VectorSearchHit>> {
        let url = format!("{}/collections/{}/points/search", self.config.base_url, collection);

        let mut request = self.client.post(&url).json(&SearchRequest {
            vector: query_vector,
            limit: top_k,
            score_threshold: min_score,
            with_payload: false,
        });
        if !self.config.api_key.is_empty() {
            request = request.header("api-key", &self.config.api_key);
        }

        let response = request.send().await.map_err(|e| Error::from_reqwest("vector-search", e))?;
        let status = response.status();
        if status.as_u16() == 404 {
            // A missing collection is a deployment problem, not a blip
            return Err(Error::fatal("vector-search", format!("collection not found: {collection}")));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::from_status("vector-search", status, body));
        }

        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| Error::fatal("vector-search", format!("malformed response: {e}")))?;

        // Preserve the store's native ordering; hits are not re-sorted here.
        parsed
            .result
            .into_iter()
            .map(|point| {
                let chunk_id = parse_point_id(&point.id)?;
                Ok(VectorSearchHit { chunk_id, score: point.score })
            })
            .collect()
    }
}

/// Point ids come back as either UUID strings or JSON numbers; only UUID ids
/// can be joined against chunk storage
fn parse_point_id(id: &serde_json::Value) -> Result<Uuid> {
    match id {
        serde_json::Value::String(s) => Uuid::parse_str(s)
            .map_err(|_| Error::fatal("vector-search", format!("point id is not a UUID: {s}"))),
        other => Err(Error::fatal("vector-search", format!("unsupported point id: {other}"))),
    }
}

#[async_trait]
impl VectorSearchProvider for QdrantSearch {
    async fn search(
        &self,
        collection: &str,
        query_vector: &[f32],
        top_k: usize,
        min_score: f32,
    ) -> Result<Vec<VectorSearchHit>> {
        retry_with_backoff("vector-search", self.config.max_retries, || {
            self.request_search(collection, query_vector, top_k, min_score)
        })
        .await
    }

    fn name(&self) -> &str {
        "qdrant"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_point_id_uuid() {
        let id = serde_json::json!("550e8400-e29b-41d4-a716-446655440000");
        assert!(parse_point_id(&id).is_ok());
    }

    #[test]
    fn test_parse_point_id_rejects_numbers() {
        let id = serde_json::json!(42);
        assert!(parse_point_id(&id).is_err());
    }
}
