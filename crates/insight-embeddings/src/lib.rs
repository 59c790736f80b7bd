//! # insight-embeddings
//!
//! Query embedding for scan-insight.
//!
//! The pipeline treats the embedding model as an external collaborator:
//! anything implementing [`EmbeddingProvider`] can turn a query into a
//! fixed-dimension vector. Two implementations ship here:
//! - [`ApiEmbedder`]: hosted embeddings (Cohere or OpenAI-compatible)
//! - [`MockEmbedder`]: deterministic hashed bag-of-words, for tests and offline runs

pub mod api;
pub mod error;
pub mod mock;
pub mod model;

pub use api::{ApiEmbedder, ApiEmbedderConfig, EmbeddingApi};
pub use error::EmbeddingError;
pub use mock::MockEmbedder;
pub use model::{Embedding, EmbeddingProvider, ModelInfo};
