//! Image description via a hosted vision model (Pixtral by default).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::api::{check_status, ApiProvider};
use crate::error::LlmError;
use crate::image::ImageFormat;
use crate::model::ImageDescriber;

/// Instruction sent alongside the image.
pub const DEFAULT_DESCRIPTION_PROMPT: &str = "You are assisting a radiologist. \
Describe this MRI image in one detailed paragraph: the anatomical region, the imaging plane \
and sequence if identifiable, and any abnormal signal, mass effect or asymmetry with its location. \
Describe findings only; do not give a diagnosis.";

/// Configuration for the vision describer.
#[derive(Debug, Clone)]
pub struct ApiImageDescriberConfig {
    pub provider: ApiProvider,
    pub base_url: String,
    /// Model to use (e.g., "pixtral-large-latest")
    pub model: String,
    pub api_key: SecretString,
    pub timeout: Duration,
    pub prompt: String,
    pub max_tokens: u32,
}

impl ApiImageDescriberConfig {
    pub fn new(provider: ApiProvider, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider,
            base_url: provider.default_base_url().to_string(),
            model: model.into(),
            api_key: SecretString::from(api_key.into()),
            timeout: Duration::from_secs(60),
            prompt: DEFAULT_DESCRIPTION_PROMPT.to_string(),
            max_tokens: 512,
        }
    }

    /// Create config for Pixtral on the Mistral API.
    pub fn pixtral(api_key: impl Into<String>) -> Self {
        Self::new(ApiProvider::Mistral, api_key, "pixtral-large-latest")
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = prompt.into();
        self
    }
}

/// Image describer backed by a hosted multimodal model.
pub struct ApiImageDescriber {
    client: Client,
    config: ApiImageDescriberConfig,
}

impl ApiImageDescriber {
    pub fn new(config: ApiImageDescriberConfig) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LlmError::Config(e.to_string()))?;

        Ok(Self { client, config })
    }

    /// Chat message content for the configured provider.
    ///
    /// Mistral takes the data URI as a plain string, OpenAI wraps it in an
    /// object, Anthropic wants the raw base64 in a source block.
    fn build_content(&self, format: ImageFormat, image: &[u8]) -> Value {
        let data_uri = format.data_uri(image);
        match self.config.provider {
            ApiProvider::Mistral => json!([
                {"type": "text", "text": self.config.prompt},
                {"type": "image_url", "image_url": data_uri}
            ]),
            ApiProvider::OpenAi => json!([
                {"type": "text", "text": self.config.prompt},
                {"type": "image_url", "image_url": {"url": data_uri}}
            ]),
            ApiProvider::Anthropic => {
                let data = data_uri
                    .split_once(',')
                    .map(|(_, b64)| b64.to_string())
                    .unwrap_or_default();
                json!([
                    {
                        "type": "image",
                        "source": {"type": "base64", "media_type": format.mime_type(), "data": data}
                    },
                    {"type": "text", "text": self.config.prompt}
                ])
            }
        }
    }

    async fn send(&self, content: Value) -> Result<String, LlmError> {
        #[derive(Deserialize)]
        struct ChatResponse {
            choices: Vec<ChatChoice>,
        }

        #[derive(Deserialize)]
        struct ChatChoice {
            message: ChatMessage,
        }

        #[derive(Deserialize)]
        struct ChatMessage {
            content: Option<String>,
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

        let body = json!({
            "model": self.config.model,
            "max_tokens": self.config.max_tokens,
            "temperature": 0.0,
            "messages": [{"role": "user", "content": content}]
        });

        let text = match self.config.provider {
            ApiProvider::Anthropic => {
                let url = format!("{}/messages", self.config.base_url);
                let response = self
                    .client
                    .post(&url)
                    .header("x-api-key", self.config.api_key.expose_secret())
                    .header("anthropic-version", "2023-06-01")
                    .json(&body)
                    .send()
                    .await?;
                let parsed: AnthropicResponse = check_status(response)
                    .await?
                    .json()
                    .await
                    .map_err(|e| LlmError::Parse(e.to_string()))?;
                parsed.content.into_iter().filter_map(|c| c.text).collect()
            }
            ApiProvider::OpenAi | ApiProvider::Mistral => {
                let url = format!("{}/chat/completions", self.config.base_url);
                let response = self
                    .client
                    .post(&url)
                    .bearer_auth(self.config.api_key.expose_secret())
                    .json(&body)
                    .send()
                    .await?;
                let parsed: ChatResponse = check_status(response)
                    .await?
                    .json()
                    .await
                    .map_err(|e| LlmError::Parse(e.to_string()))?;
                parsed
                    .choices
                    .into_iter()
                    .next()
                    .and_then(|c| c.message.content)
                    .unwrap_or_default()
            }
        };

        Ok(text)
    }
}

#[async_trait]
impl ImageDescriber for ApiImageDescriber {
    async fn describe(&self, image: &[u8]) -> Result<String, LlmError> {
        let format = ImageFormat::require(image)?;
        debug!(
            model = %self.config.model,
            bytes = image.len(),
            mime = format.mime_type(),
            "Requesting image description"
        );

        let content = self.build_content(format, image);
        let text = self.send(content).await?;
        let text = text.trim();

        if text.is_empty() {
            return Err(LlmError::EmptyResponse);
        }

        info!(chars = text.len(), "Image description received");
        Ok(text.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const PNG: &[u8] = &[0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1a, b'\n', 0, 0];

    #[tokio::test]
    async fn test_pixtral_request_shape() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_partial_json(json!({"model": "pixtral-large-latest"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"content": "  Axial FLAIR showing hyperintensity in the left temporal lobe.\n"}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let describer =
            ApiImageDescriber::new(ApiImageDescriberConfig::pixtral("key").with_base_url(server.uri()))
                .unwrap();

        let text = describer.describe(PNG).await.unwrap();
        assert_eq!(
            text,
            "Axial FLAIR showing hyperintensity in the left temporal lobe."
        );
    }

    #[test]
    fn test_content_per_provider() {
        let mistral =
            ApiImageDescriber::new(ApiImageDescriberConfig::pixtral("k")).unwrap();
        let content = mistral.build_content(ImageFormat::Png, PNG);
        assert!(content[1]["image_url"]
            .as_str()
            .unwrap()
            .starts_with("data:image/png;base64,"));

        let openai = ApiImageDescriber::new(ApiImageDescriberConfig::new(
            ApiProvider::OpenAi,
            "k",
            "gpt-4o",
        ))
        .unwrap();
        let content = openai.build_content(ImageFormat::Png, PNG);
        assert!(content[1]["image_url"]["url"].is_string());

        let anthropic = ApiImageDescriber::new(ApiImageDescriberConfig::new(
            ApiProvider::Anthropic,
            "k",
            "claude-3-5-sonnet-latest",
        ))
        .unwrap();
        let content = anthropic.build_content(ImageFormat::Png, PNG);
        assert_eq!(content[0]["source"]["media_type"], "image/png");
        assert!(!content[0]["source"]["data"].as_str().unwrap().contains("data:"));
    }

    #[tokio::test]
    async fn test_rejects_unsupported_image_without_request() {
        let describer = ApiImageDescriber::new(
            ApiImageDescriberConfig::pixtral("k").with_base_url("http://127.0.0.1:9"),
        )
        .unwrap();
        assert!(matches!(
            describer.describe(b"not an image").await,
            Err(LlmError::UnsupportedImage(_))
        ));
    }

    #[tokio::test]
    async fn test_blank_description_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"content": "   "}}]
            })))
            .mount(&server)
            .await;

        let describer =
            ApiImageDescriber::new(ApiImageDescriberConfig::pixtral("k").with_base_url(server.uri()))
                .unwrap();
        assert!(matches!(
            describer.describe(PNG).await,
            Err(LlmError::EmptyResponse)
        ));
    }
}
