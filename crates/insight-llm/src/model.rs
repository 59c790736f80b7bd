//! Model traits consumed by the pipeline.

use async_trait::async_trait;

use crate::error::LlmError;

/// Text completion model.
///
/// Treated as a black box: callers must cope with any output format.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Model identifier, for logs.
    fn name(&self) -> &str;

    /// Complete `prompt`, returning the raw model text.
    async fn complete(&self, prompt: &str) -> Result<String, LlmError>;
}

/// Derives a textual description from image bytes.
#[async_trait]
pub trait ImageDescriber: Send + Sync {
    async fn describe(&self, image: &[u8]) -> Result<String, LlmError>;
}
