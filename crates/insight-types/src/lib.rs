//! # insight-types
//!
//! Shared domain types for the scan-insight pipeline.
//!
//! This crate defines the data structures passed between pipeline stages:
//! - Query: the image description used as a retrieval query
//! - Document: a reference document snapshot returned by the vector index
//! - RetrievalResult: ranked, de-duplicated documents for one query
//! - Settings: layered configuration
//!
//! ## Usage
//!
//! ```rust
//! use insight_types::{Document, Query, RetrievalResult};
//!
//! let query = Query::new("abnormal signal in left temporal lobe").unwrap();
//! let result = RetrievalResult::from_candidates(
//!     vec![(Document::new("doc-1", "Focal cortical dysplasia"), 0.9)],
//!     5,
//! );
//! assert_eq!(result.len(), 1);
//! assert_eq!(query.as_str(), "abnormal signal in left temporal lobe");
//! ```

pub mod config;
pub mod document;
pub mod error;
pub mod query;

pub use config::{
    ContextUnit, PipelineSettings, ProviderSettings, Settings, SimilarityMetric, VectorBackend,
    VectorSettings,
};
pub use document::{Document, DocumentMetadata, RetrievalResult};
pub use error::InsightError;
pub use query::Query;
