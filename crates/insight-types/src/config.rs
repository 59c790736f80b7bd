//! Configuration loading for scan-insight.
//!
//! Layered config: defaults -> config file -> `--config` file -> env vars -> CLI flags.
//! The default config file lives at `~/.config/scan-insight/config.toml`.
//! Credentials have no built-in default; they must come from a config file or
//! the environment (`INSIGHT_MODEL__API_KEY`, `INSIGHT_VISION__API_KEY`, ...).

use std::fmt;
use std::path::PathBuf;

use config::{Config, Environment, File};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::error::InsightError;

/// Unit in which `context_limit` is measured.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextUnit {
    /// Unicode scalar values
    Chars,
    /// cl100k BPE tokens
    #[default]
    Tokens,
}

impl ContextUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContextUnit::Chars => "chars",
            ContextUnit::Tokens => "tokens",
        }
    }
}

/// Similarity metric used for nearest-neighbour queries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimilarityMetric {
    #[default]
    Cosine,
    InnerProduct,
}

impl SimilarityMetric {
    pub fn as_str(&self) -> &'static str {
        match self {
            SimilarityMetric::Cosine => "cosine",
            SimilarityMetric::InnerProduct => "inner_product",
        }
    }
}

/// Which vector index implementation to use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VectorBackend {
    /// In-memory exact search over a JSON document file
    Flat,
    /// Milvus server via its REST API
    #[default]
    Milvus,
}

/// Reasoning pipeline limits and timeouts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSettings {
    /// Documents retrieved per query
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Maximum Thinking cycles of the reasoning agent
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    /// Maximum context size, measured in `context_unit`
    #[serde(default = "default_context_limit")]
    pub context_limit: usize,

    #[serde(default)]
    pub context_unit: ContextUnit,

    /// Re-prompts allowed after an unparseable model output
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,

    /// Orchestrator-level retries per stage for transient failures (0 = single attempt)
    #[serde(default)]
    pub stage_retries: u32,

    #[serde(default = "default_embedding_timeout")]
    pub embedding_timeout_ms: u64,

    #[serde(default = "default_vector_timeout")]
    pub vector_timeout_ms: u64,

    #[serde(default = "default_model_timeout")]
    pub model_timeout_ms: u64,

    #[serde(default = "default_description_timeout")]
    pub description_timeout_ms: u64,
}

fn default_top_k() -> usize {
    5
}

fn default_max_iterations() -> usize {
    15
}

fn default_context_limit() -> usize {
    3000
}

fn default_retry_count() -> u32 {
    3
}

fn default_embedding_timeout() -> u64 {
    10_000
}

fn default_vector_timeout() -> u64 {
    5_000
}

fn default_model_timeout() -> u64 {
    60_000
}

fn default_description_timeout() -> u64 {
    60_000
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            max_iterations: default_max_iterations(),
            context_limit: default_context_limit(),
            context_unit: ContextUnit::default(),
            retry_count: default_retry_count(),
            stage_retries: 0,
            embedding_timeout_ms: default_embedding_timeout(),
            vector_timeout_ms: default_vector_timeout(),
            model_timeout_ms: default_model_timeout(),
            description_timeout_ms: default_description_timeout(),
        }
    }
}

impl PipelineSettings {
    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.top_k == 0 {
            return Err("top_k must be > 0".to_string());
        }
        if self.max_iterations == 0 {
            return Err("max_iterations must be > 0".to_string());
        }
        if self.context_limit == 0 {
            return Err("context_limit must be > 0".to_string());
        }
        for (name, value) in [
            ("embedding_timeout_ms", self.embedding_timeout_ms),
            ("vector_timeout_ms", self.vector_timeout_ms),
            ("model_timeout_ms", self.model_timeout_ms),
            ("description_timeout_ms", self.description_timeout_ms),
        ] {
            if value == 0 {
                return Err(format!("{} must be > 0", name));
            }
        }
        Ok(())
    }
}

/// Settings for one hosted model endpoint (language, vision or embedding).
#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderSettings {
    /// Provider name (e.g., "openai", "anthropic", "mistral", "cohere")
    pub provider: String,

    /// Model name (e.g., "gpt-4o-mini", "pixtral-large-latest")
    pub model: String,

    /// API key (loaded from config file or env var, never serialized back out)
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,

    /// API base URL (for custom endpoints)
    #[serde(default)]
    pub api_base_url: Option<String>,
}

impl ProviderSettings {
    pub fn new(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
            api_key: None,
            api_base_url: None,
        }
    }

    /// Returns the configured API key or a config error naming the env var to set.
    pub fn require_api_key(&self, section: &str) -> Result<&str, InsightError> {
        match self.api_key.as_deref() {
            Some(key) if !key.trim().is_empty() => Ok(key),
            _ => Err(InsightError::Config(format!(
                "missing API key for {} provider '{}'; set INSIGHT_{}__API_KEY",
                section,
                self.provider,
                section.to_uppercase()
            ))),
        }
    }
}

impl fmt::Debug for ProviderSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderSettings")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("api_base_url", &self.api_base_url)
            .finish()
    }
}

fn default_model_settings() -> ProviderSettings {
    ProviderSettings::new("openai", "gpt-4o-mini")
}

fn default_vision_settings() -> ProviderSettings {
    ProviderSettings::new("mistral", "pixtral-large-latest")
}

fn default_embedding_settings() -> ProviderSettings {
    ProviderSettings::new("cohere", "embed-english-v3.0")
}

/// Vector index connection settings.
#[derive(Clone, Serialize, Deserialize)]
pub struct VectorSettings {
    #[serde(default)]
    pub backend: VectorBackend,

    /// Milvus endpoint
    #[serde(default = "default_vector_endpoint")]
    pub endpoint: String,

    /// Milvus collection holding the reference documents
    #[serde(default = "default_collection")]
    pub collection: String,

    /// Name of the vector field in the collection
    #[serde(default = "default_vector_field")]
    pub vector_field: String,

    /// Milvus token (user:password or API key)
    #[serde(default, skip_serializing)]
    pub token: Option<String>,

    /// JSON document file for the flat backend
    #[serde(default)]
    pub documents_path: Option<String>,

    #[serde(default)]
    pub metric: SimilarityMetric,

    /// Embedding dimension expected by the index
    #[serde(default = "default_dimension")]
    pub dimension: usize,
}

fn default_vector_endpoint() -> String {
    "http://localhost:19530".to_string()
}

fn default_collection() -> String {
    "medical_documents".to_string()
}

fn default_vector_field() -> String {
    "vector".to_string()
}

fn default_dimension() -> usize {
    1024 // embed-english-v3.0
}

impl Default for VectorSettings {
    fn default() -> Self {
        Self {
            backend: VectorBackend::default(),
            endpoint: default_vector_endpoint(),
            collection: default_collection(),
            vector_field: default_vector_field(),
            token: None,
            documents_path: None,
            metric: SimilarityMetric::default(),
            dimension: default_dimension(),
        }
    }
}

impl fmt::Debug for VectorSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VectorSettings")
            .field("backend", &self.backend)
            .field("endpoint", &self.endpoint)
            .field("collection", &self.collection)
            .field("vector_field", &self.vector_field)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("documents_path", &self.documents_path)
            .field("metric", &self.metric)
            .field("dimension", &self.dimension)
            .finish()
    }
}

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub pipeline: PipelineSettings,

    /// Reasoning language model
    #[serde(default = "default_model_settings")]
    pub model: ProviderSettings,

    /// Image description model
    #[serde(default = "default_vision_settings")]
    pub vision: ProviderSettings,

    /// Query embedding model
    #[serde(default = "default_embedding_settings")]
    pub embedding: ProviderSettings,

    #[serde(default)]
    pub vector: VectorSettings,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            pipeline: PipelineSettings::default(),
            model: default_model_settings(),
            vision: default_vision_settings(),
            embedding: default_embedding_settings(),
            vector: VectorSettings::default(),
            log_level: default_log_level(),
        }
    }
}

impl Settings {
    /// Load settings with layered precedence:
    /// 1. Built-in defaults
    /// 2. Config file (~/.config/scan-insight/config.toml)
    /// 3. CLI-specified config file (optional)
    /// 4. Environment variables (INSIGHT_*, nested keys joined by `__`)
    ///
    /// CLI flags should be applied by the caller after this returns.
    pub fn load(cli_config_path: Option<&str>) -> Result<Self, InsightError> {
        let config_dir = ProjectDirs::from("", "", "scan-insight")
            .map(|p| p.config_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));

        let default_config_path = config_dir.join("config");

        let defaults = Settings::default();
        let cfg_err = |e: config::ConfigError| InsightError::Config(e.to_string());

        let mut builder = Config::builder()
            // 1. Built-in defaults for the provider sections, so a file that
            //    only overrides `model.model` still deserializes.
            .set_default("model.provider", defaults.model.provider.clone())
            .map_err(cfg_err)?
            .set_default("model.model", defaults.model.model.clone())
            .map_err(cfg_err)?
            .set_default("vision.provider", defaults.vision.provider.clone())
            .map_err(cfg_err)?
            .set_default("vision.model", defaults.vision.model.clone())
            .map_err(cfg_err)?
            .set_default("embedding.provider", defaults.embedding.provider.clone())
            .map_err(cfg_err)?
            .set_default("embedding.model", defaults.embedding.model.clone())
            .map_err(cfg_err)?
            .set_default("log_level", defaults.log_level.clone())
            .map_err(cfg_err)?
            // 2. Default config file
            .add_source(File::with_name(&default_config_path.to_string_lossy()).required(false));

        // 3. CLI-specified config file (higher precedence than default)
        if let Some(path) = cli_config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // 4. Environment variables, e.g. INSIGHT_PIPELINE__TOP_K, INSIGHT_MODEL__API_KEY
        builder = builder.add_source(
            Environment::with_prefix("INSIGHT")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let settings: Settings = builder
            .build()
            .map_err(cfg_err)?
            .try_deserialize()
            .map_err(cfg_err)?;

        settings.validate()?;
        Ok(settings)
    }

    /// Validate all sections.
    pub fn validate(&self) -> Result<(), InsightError> {
        self.pipeline.validate().map_err(InsightError::Config)?;
        if self.vector.dimension == 0 {
            return Err(InsightError::Config("vector.dimension must be > 0".to_string()));
        }
        if self.vector.backend == VectorBackend::Flat && self.vector.documents_path.is_none() {
            return Err(InsightError::Config(
                "vector.documents_path is required for the flat backend".to_string(),
            ));
        }
        Ok(())
    }
}
