//! Milvus client over the v2 REST API.
//!
//! Only `entities/search` is used. The collection is expected to hold a
//! vector field plus `content` and (optionally) `source` scalar fields.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use insight_embeddings::Embedding;
use insight_types::{Document, SimilarityMetric};

use crate::error::VectorError;
use crate::index::{VectorHit, VectorIndex};

/// Milvus connection configuration.
#[derive(Debug, Clone)]
pub struct MilvusConfig {
    /// Server endpoint (e.g., "http://localhost:19530")
    pub endpoint: String,
    pub collection: String,
    pub vector_field: String,
    /// Bearer token ("user:password" or an API key)
    pub token: Option<SecretString>,
    pub metric: SimilarityMetric,
    pub dimension: usize,
    pub timeout: Duration,
}

impl MilvusConfig {
    pub fn new(endpoint: impl Into<String>, collection: impl Into<String>, dimension: usize) -> Self {
        Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            collection: collection.into(),
            vector_field: "vector".to_string(),
            token: None,
            metric: SimilarityMetric::Cosine,
            dimension,
            timeout: Duration::from_secs(5),
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(SecretString::from(token.into()));
        self
    }

    pub fn with_metric(mut self, metric: SimilarityMetric) -> Self {
        self.metric = metric;
        self
    }

    pub fn with_vector_field(mut self, field: impl Into<String>) -> Self {
        self.vector_field = field.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Read-only Milvus search client. reqwest's client is safe for concurrent use.
pub struct MilvusIndex {
    client: Client,
    config: MilvusConfig,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchRequest<'a> {
    collection_name: &'a str,
    data: Vec<&'a [f32]>,
    anns_field: &'a str,
    limit: usize,
    output_fields: Vec<&'a str>,
    search_params: SearchParams,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchParams {
    metric_type: &'static str,
}

#[derive(Deserialize)]
struct SearchResponse {
    code: i64,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    data: Vec<SearchRow>,
}

#[derive(Deserialize)]
struct SearchRow {
    id: Value,
    distance: f32,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    source: Option<String>,
}

fn metric_type(metric: SimilarityMetric) -> &'static str {
    match metric {
        SimilarityMetric::Cosine => "COSINE",
        SimilarityMetric::InnerProduct => "IP",
    }
}

fn id_to_string(id: &Value) -> String {
    match id {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl MilvusIndex {
    pub fn new(config: MilvusConfig) -> Result<Self, VectorError> {
        if config.dimension == 0 {
            return Err(VectorError::Config("dimension must be > 0".to_string()));
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| VectorError::Config(e.to_string()))?;

        Ok(Self { client, config })
    }
}

#[async_trait]
impl VectorIndex for MilvusIndex {
    fn dimension(&self) -> usize {
        self.config.dimension
    }

    fn metric(&self) -> SimilarityMetric {
        self.config.metric
    }

    async fn query(&self, vector: &Embedding, k: usize) -> Result<Vec<VectorHit>, VectorError> {
        if vector.dimension() != self.config.dimension {
            return Err(VectorError::DimensionMismatch {
                expected: self.config.dimension,
                actual: vector.dimension(),
            });
        }

        let request = SearchRequest {
            collection_name: &self.config.collection,
            data: vec![vector.values.as_slice()],
            anns_field: &self.config.vector_field,
            limit: k,
            output_fields: vec!["content", "source"],
            search_params: SearchParams {
                metric_type: metric_type(self.config.metric),
            },
        };

        let url = format!("{}/v2/vectordb/entities/search", self.config.endpoint);
        debug!(collection = %self.config.collection, k, "Querying Milvus");

        let mut builder = self.client.post(&url).json(&request);
        if let Some(token) = &self.config.token {
            builder = builder.bearer_auth(token.expose_secret());
        }

        let response = builder.send().await?;

        let status = response.status();
        if status.is_server_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(VectorError::Unavailable(format!("HTTP {}: {}", status, body)));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(VectorError::Query(format!("HTTP {}: {}", status, body)));
        }

        let body: SearchResponse = response
            .json()
            .await
            .map_err(|e| VectorError::Serialization(e.to_string()))?;

        if body.code != 0 {
            return Err(VectorError::Query(format!(
                "code {}: {}",
                body.code,
                body.message.unwrap_or_default()
            )));
        }

        let hits = body
            .data
            .into_iter()
            .filter_map(|row| {
                let id = id_to_string(&row.id);
                match row.content {
                    Some(content) => {
                        let mut document = Document::new(id, content);
                        document.metadata.source = row.source;
                        Some(VectorHit::new(document, row.distance))
                    }
                    None => {
                        warn!(id = %id, "Milvus row missing content field, skipping");
                        None
                    }
                }
            })
            .collect();

        Ok(hits)
    }
}
