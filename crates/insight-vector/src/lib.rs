//! # insight-vector
//!
//! Read-only vector index access for scan-insight.
//!
//! The pipeline consumes nearest-neighbour search as a capability; it never
//! builds or mutates the index. This crate provides:
//! - [`VectorIndex`]: the query contract shared by every backend
//! - [`FlatIndex`]: exact in-memory search over a JSON document file
//! - [`MilvusIndex`]: client for a Milvus server's REST search endpoint
//! - [`MockIndex`]: scripted hits, delays and failures for tests

pub mod error;
pub mod flat;
pub mod index;
pub mod milvus;
pub mod mock;

pub use error::VectorError;
pub use flat::{DocumentRecord, FlatIndex};
pub use index::{VectorHit, VectorIndex};
pub use milvus::{MilvusConfig, MilvusIndex};
pub use mock::MockIndex;

pub use insight_types::SimilarityMetric;
