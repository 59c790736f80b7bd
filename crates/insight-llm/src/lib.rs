//! Language model and image description clients.
//!
//! Provides:
//! - [`LanguageModel`]: `complete(prompt) -> text`, the reasoning agent's model
//! - [`ImageDescriber`]: `describe(image) -> text`, the vision step
//! - HTTP implementations for OpenAI, Anthropic and Mistral endpoints
//! - Scripted mocks for tests

pub mod api;
pub mod error;
pub mod image;
pub mod mock;
pub mod model;
pub mod vision;

pub use api::{ApiLanguageModel, ApiLanguageModelConfig, ApiProvider};
pub use error::LlmError;
pub use image::ImageFormat;
pub use mock::{MockDescriber, ScriptedModel};
pub use model::{ImageDescriber, LanguageModel};
pub use vision::{ApiImageDescriber, ApiImageDescriberConfig, DEFAULT_DESCRIPTION_PROMPT};
