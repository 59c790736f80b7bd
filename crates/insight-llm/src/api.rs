//! API-based language model using OpenAI-compatible, Anthropic or Mistral endpoints.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::LlmError;
use crate::model::LanguageModel;

/// Hosted model API family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiProvider {
    OpenAi,
    Anthropic,
    Mistral,
}

impl ApiProvider {
    /// Map a provider name from configuration.
    pub fn from_provider(provider: &str) -> Result<Self, LlmError> {
        match provider.to_ascii_lowercase().as_str() {
            "openai" => Ok(ApiProvider::OpenAi),
            "anthropic" | "claude" => Ok(ApiProvider::Anthropic),
            "mistral" => Ok(ApiProvider::Mistral),
            other => Err(LlmError::Config(format!("unsupported provider '{}'", other))),
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            ApiProvider::OpenAi => "https://api.openai.com/v1",
            ApiProvider::Anthropic => "https://api.anthropic.com/v1",
            ApiProvider::Mistral => "https://api.mistral.ai/v1",
        }
    }
}

/// Configuration for the API-based language model.
#[derive(Debug, Clone)]
pub struct ApiLanguageModelConfig {
    pub provider: ApiProvider,

    /// API base URL (e.g., "https://api.openai.com/v1")
    pub base_url: String,

    /// Model to use (e.g., "gpt-4o-mini", "claude-3-haiku-20240307")
    pub model: String,

    /// API key
    pub api_key: SecretString,

    /// Request timeout
    pub timeout: Duration,

    /// Sampling temperature; 0 keeps the agent's reasoning deterministic
    pub temperature: f32,

    pub max_tokens: u32,

    /// Stop sequences, so the model halts before inventing tool observations
    pub stop: Vec<String>,
}

impl ApiLanguageModelConfig {
    pub fn new(provider: ApiProvider, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider,
            base_url: provider.default_base_url().to_string(),
            model: model.into(),
            api_key: SecretString::from(api_key.into()),
            timeout: Duration::from_secs(60),
            temperature: 0.0,
            max_tokens: 1024,
            stop: Vec::new(),
        }
    }

    /// Create config for OpenAI API.
    pub fn openai(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self::new(ApiProvider::OpenAi, api_key, model)
    }

    /// Create config for Claude API.
    pub fn claude(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self::new(ApiProvider::Anthropic, api_key, model)
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_stop(mut self, stop: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.stop = stop.into_iter().map(Into::into).collect();
        self
    }
}

/// Language model reached over HTTP.
///
/// One request per `complete` call. Retrying is left to the orchestrator.
pub struct ApiLanguageModel {
    client: Client,
    config: ApiLanguageModelConfig,
}

impl ApiLanguageModel {
    pub fn new(config: ApiLanguageModelConfig) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LlmError::Config(e.to_string()))?;

        Ok(Self { client, config })
    }

    fn stop_sequences(&self) -> Option<&[String]> {
        if self.config.stop.is_empty() {
            None
        } else {
            Some(&self.config.stop)
        }
    }

    /// Make OpenAI-compatible API request (also used for Mistral).
    async fn make_openai_request(&self, prompt: &str) -> Result<String, LlmError> {
        #[derive(Serialize)]
        struct OpenAIRequest<'a> {
            model: &'a str,
            messages: Vec<OpenAIMessage<'a>>,
            temperature: f32,
            max_tokens: u32,
            #[serde(skip_serializing_if = "Option::is_none")]
            stop: Option<&'a [String]>,
        }

        #[derive(Serialize)]
        struct OpenAIMessage<'a> {
            role: &'a str,
            content: &'a str,
        }

        #[derive(Deserialize)]
        struct OpenAIResponse {
            choices: Vec<OpenAIChoice>,
        }

        #[derive(Deserialize)]
        struct OpenAIChoice {
            message: OpenAIMessageResponse,
        }

        #[derive(Deserialize)]
        struct OpenAIMessageResponse {
            content: Option<String>,
        }

        let request = OpenAIRequest {
            model: &self.config.model,
            messages: vec![OpenAIMessage {
                role: "user",
                content: prompt,
            }],
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
            stop: self.stop_sequences(),
        };

        let url = format!("{}/chat/completions", self.config.base_url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(self.config.api_key.expose_secret())
            .json(&request)
            .send()
            .await?;

        let response_body: OpenAIResponse = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| LlmError::Parse(e.to_string()))?;

        response_body
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::Parse("No choices in response".to_string()))?
            .message
            .content
            .ok_or(LlmError::EmptyResponse)
    }

    /// Make Anthropic API request.
    async fn make_anthropic_request(&self, prompt: &str) -> Result<String, LlmError> {
        #[derive(Serialize)]
        struct AnthropicRequest<'a> {
            model: &'a str,
            max_tokens: u32,
            temperature: f32,
            messages: Vec<AnthropicMessage<'a>>,
            #[serde(skip_serializing_if = "Option::is_none")]
            stop_sequences: Option<&'a [String]>,
        }

        #[derive(Serialize)]
        struct AnthropicMessage<'a> {
            role: &'a str,
            content: &'a str,
        }

        #[derive(Deserialize)]
        struct AnthropicResponse {
            content: Vec<AnthropicContent>,
        }

        #[derive(Deserialize)]
        struct AnthropicContent {
            #[serde(default)]
            text: Option<String>,
        }

        let request = AnthropicRequest {
            model: &self.config.model,
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            messages: vec![AnthropicMessage {
                role: "user",
                content: prompt,
            }],
            stop_sequences: self.stop_sequences(),
        };

        let url = format!("{}/messages", self.config.base_url);

        let response = self
            .client
            .post(&url)
            .header("x-api-key", self.config.api_key.expose_secret())
            .header("anthropic-version", "2023-06-01")
            .json(&request)
            .send()
            .await?;

        let response_body: AnthropicResponse = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| LlmError::Parse(e.to_string()))?;

        let text: String = response_body
            .content
            .into_iter()
            .filter_map(|c| c.text)
            .collect();

        if text.is_empty() {
            return Err(LlmError::EmptyResponse);
        }
        Ok(text)
    }
}

/// Map throttling and non-2xx statuses to errors.
pub(crate) async fn check_status(response: Response) -> Result<Response, LlmError> {
    if response.status() == 429 {
        return Err(LlmError::RateLimitExceeded);
    }

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(LlmError::Api(format!("HTTP {}: {}", status, body)));
    }

    Ok(response)
}

#[async_trait]
impl LanguageModel for ApiLanguageModel {
    fn name(&self) -> &str {
        &self.config.model
    }

    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        debug!(
            model = %self.config.model,
            prompt_chars = prompt.len(),
            "Calling language model"
        );

        match self.config.provider {
            ApiProvider::Anthropic => self.make_anthropic_request(prompt).await,
            ApiProvider::OpenAi | ApiProvider::Mistral => self.make_openai_request(prompt).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_openai_config() {
        let config = ApiLanguageModelConfig::openai("test-key", "gpt-4o-mini");
        assert!(config.base_url.contains("openai"));
        assert_eq!(config.model, "gpt-4o-mini");
        assert_eq!(config.temperature, 0.0);
    }

    #[test]
    fn test_claude_config() {
        let config = ApiLanguageModelConfig::claude("test-key", "claude-3-haiku-20240307");
        assert!(config.base_url.contains("anthropic"));
        assert_eq!(config.model, "claude-3-haiku-20240307");
    }

    #[test]
    fn test_provider_names() {
        assert_eq!(ApiProvider::from_provider("Mistral").unwrap(), ApiProvider::Mistral);
        assert_eq!(ApiProvider::from_provider("claude").unwrap(), ApiProvider::Anthropic);
        assert!(ApiProvider::from_provider("llama-local").is_err());
    }

    #[tokio::test]
    async fn test_openai_completion() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(json!({
                "model": "gpt-4o-mini",
                "temperature": 0.0,
                "stop": ["\nObservation:"]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"content": "Final Answer: normal study"}}]
            })))
            .mount(&server)
            .await;

        let model = ApiLanguageModel::new(
            ApiLanguageModelConfig::openai("sk-test", "gpt-4o-mini")
                .with_base_url(server.uri())
                .with_stop(["\nObservation:"]),
        )
        .unwrap();

        let text = model.complete("Question: ?").await.unwrap();
        assert_eq!(text, "Final Answer: normal study");
    }

    #[tokio::test]
    async fn test_anthropic_completion() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/messages"))
            .and(header("x-api-key", "ak"))
            .and(header("anthropic-version", "2023-06-01"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "content": [{"type": "text", "text": "Thought: done"}]
            })))
            .mount(&server)
            .await;

        let model = ApiLanguageModel::new(
            ApiLanguageModelConfig::claude("ak", "claude-3-haiku-20240307")
                .with_base_url(server.uri()),
        )
        .unwrap();

        assert_eq!(model.complete("hi").await.unwrap(), "Thought: done");
    }

    #[tokio::test]
    async fn test_null_content_is_empty_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"content": null}}]
            })))
            .mount(&server)
            .await;

        let model = ApiLanguageModel::new(
            ApiLanguageModelConfig::openai("k", "m").with_base_url(server.uri()),
        )
        .unwrap();
        assert!(matches!(
            model.complete("x").await,
            Err(LlmError::EmptyResponse)
        ));
    }

    #[tokio::test]
    async fn test_http_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;
        let model = ApiLanguageModel::new(
            ApiLanguageModelConfig::openai("k", "m").with_base_url(server.uri()),
        )
        .unwrap();
        assert!(matches!(
            model.complete("x").await,
            Err(LlmError::RateLimitExceeded)
        ));

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
            .mount(&server)
            .await;
        let model = ApiLanguageModel::new(
            ApiLanguageModelConfig::openai("k", "m").with_base_url(server.uri()),
        )
        .unwrap();
        match model.complete("x").await {
            Err(LlmError::Api(msg)) => assert!(msg.contains("401")),
            other => panic!("expected Api error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"choices": []}))
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let model = ApiLanguageModel::new(
            ApiLanguageModelConfig::openai("k", "m")
                .with_base_url(server.uri())
                .with_timeout(Duration::from_millis(50)),
        )
        .unwrap();
        assert!(matches!(model.complete("x").await, Err(LlmError::Timeout)));
    }
}
