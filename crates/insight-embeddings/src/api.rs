//! Hosted embedding providers (Cohere and OpenAI-compatible endpoints).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::EmbeddingError;
use crate::model::{Embedding, EmbeddingProvider, ModelInfo};

/// Wire protocol spoken by the embedding endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingApi {
    /// `POST {base}/embed`
    Cohere,
    /// `POST {base}/embeddings`
    OpenAi,
}

impl EmbeddingApi {
    /// Map a provider name from configuration.
    pub fn from_provider(provider: &str) -> Result<Self, EmbeddingError> {
        match provider.to_ascii_lowercase().as_str() {
            "cohere" => Ok(EmbeddingApi::Cohere),
            "openai" => Ok(EmbeddingApi::OpenAi),
            other => Err(EmbeddingError::Config(format!(
                "unsupported embedding provider '{}'",
                other
            ))),
        }
    }

    fn default_base_url(&self) -> &'static str {
        match self {
            EmbeddingApi::Cohere => "https://api.cohere.ai/v1",
            EmbeddingApi::OpenAi => "https://api.openai.com/v1",
        }
    }
}

/// Configuration for the hosted embedder.
#[derive(Debug, Clone)]
pub struct ApiEmbedderConfig {
    pub api: EmbeddingApi,

    /// API base URL (e.g., "https://api.cohere.ai/v1")
    pub base_url: String,

    /// Model to use (e.g., "embed-english-v3.0")
    pub model: String,

    /// API key
    pub api_key: SecretString,

    /// Expected vector dimension
    pub dimension: usize,

    /// Request timeout
    pub timeout: Duration,
}

impl ApiEmbedderConfig {
    /// Create config for the Cohere API.
    pub fn cohere(api_key: impl Into<String>, model: impl Into<String>, dimension: usize) -> Self {
        Self::new(EmbeddingApi::Cohere, api_key, model, dimension)
    }

    /// Create config for the OpenAI API.
    pub fn openai(api_key: impl Into<String>, model: impl Into<String>, dimension: usize) -> Self {
        Self::new(EmbeddingApi::OpenAi, api_key, model, dimension)
    }

    pub fn new(
        api: EmbeddingApi,
        api_key: impl Into<String>,
        model: impl Into<String>,
        dimension: usize,
    ) -> Self {
        Self {
            api,
            base_url: api.default_base_url().to_string(),
            model: model.into(),
            api_key: SecretString::from(api_key.into()),
            dimension,
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Embedding provider backed by a hosted API.
///
/// Makes a single request per call; retries are an orchestrator concern.
pub struct ApiEmbedder {
    client: Client,
    config: ApiEmbedderConfig,
    info: ModelInfo,
}

impl ApiEmbedder {
    pub fn new(config: ApiEmbedderConfig) -> Result<Self, EmbeddingError> {
        if config.dimension == 0 {
            return Err(EmbeddingError::Config("dimension must be > 0".to_string()));
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| EmbeddingError::Config(e.to_string()))?;

        let info = ModelInfo {
            name: config.model.clone(),
            dimension: config.dimension,
        };

        Ok(Self {
            client,
            config,
            info,
        })
    }

    async fn request_cohere(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        #[derive(Serialize)]
        struct CohereRequest<'a> {
            model: &'a str,
            texts: Vec<&'a str>,
            input_type: &'a str,
        }

        #[derive(Deserialize)]
        struct CohereResponse {
            embeddings: Vec<Vec<f32>>,
        }

        let request = CohereRequest {
            model: &self.config.model,
            texts: vec![text],
            input_type: "search_query",
        };

        let url = format!("{}/embed", self.config.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(self.config.api_key.expose_secret())
            .json(&request)
            .send()
            .await?;

        let body: CohereResponse = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| EmbeddingError::Parse(e.to_string()))?;

        body.embeddings
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::Parse("No embeddings in response".to_string()))
    }

    async fn request_openai(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        #[derive(Serialize)]
        struct OpenAIRequest<'a> {
            model: &'a str,
            input: &'a str,
        }

        #[derive(Deserialize)]
        struct OpenAIResponse {
            data: Vec<OpenAIEmbedding>,
        }

        #[derive(Deserialize)]
        struct OpenAIEmbedding {
            embedding: Vec<f32>,
        }

        let request = OpenAIRequest {
            model: &self.config.model,
            input: text,
        };

        let url = format!("{}/embeddings", self.config.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(self.config.api_key.expose_secret())
            .json(&request)
            .send()
            .await?;

        let body: OpenAIResponse = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| EmbeddingError::Parse(e.to_string()))?;

        body.data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| EmbeddingError::Parse("No data in response".to_string()))
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, EmbeddingError> {
    if response.status() == 429 {
        return Err(EmbeddingError::RateLimitExceeded);
    }

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(EmbeddingError::Api(format!("HTTP {}: {}", status, body)));
    }

    Ok(response)
}

#[async_trait]
impl EmbeddingProvider for ApiEmbedder {
    fn info(&self) -> &ModelInfo {
        &self.info
    }

    async fn embed(&self, text: &str) -> Result<Embedding, EmbeddingError> {
        if text.trim().is_empty() {
            return Err(EmbeddingError::InvalidInput("empty text".to_string()));
        }

        debug!(model = %self.config.model, chars = text.len(), "Requesting embedding");

        let values = match self.config.api {
            EmbeddingApi::Cohere => self.request_cohere(text).await?,
            EmbeddingApi::OpenAi => self.request_openai(text).await?,
        };

        if values.len() != self.info.dimension {
            return Err(EmbeddingError::DimensionMismatch {
                expected: self.info.dimension,
                actual: values.len(),
            });
        }

        Ok(Embedding::from_normalized(values))
    }
}
