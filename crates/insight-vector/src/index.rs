//! Vector index trait and types.
//!
//! Defines the read path for vector similarity search.

use async_trait::async_trait;

use insight_embeddings::Embedding;
use insight_types::{Document, SimilarityMetric};

use crate::error::VectorError;

/// One nearest-neighbour match.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorHit {
    /// Snapshot of the stored document
    pub document: Document,
    /// Similarity (higher = more similar for both cosine and inner product)
    pub score: f32,
}

impl VectorHit {
    pub fn new(document: Document, score: f32) -> Self {
        Self { document, score }
    }
}

/// Trait for vector indexes.
///
/// Only the query path is exposed; nothing in the pipeline writes to an index.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Get the embedding dimension
    fn dimension(&self) -> usize;

    /// Metric used to score matches
    fn metric(&self) -> SimilarityMetric;

    /// Whether `query` may be called concurrently from several requests.
    ///
    /// Callers must serialize queries against indexes returning false.
    fn supports_concurrent_queries(&self) -> bool {
        true
    }

    /// Search for the k nearest neighbours of `vector`.
    /// Returns results sorted by similarity (best first).
    async fn query(&self, vector: &Embedding, k: usize) -> Result<Vec<VectorHit>, VectorError>;
}

/// Score two vectors under `metric`.
pub fn similarity(metric: SimilarityMetric, a: &Embedding, b: &Embedding) -> f32 {
    match metric {
        SimilarityMetric::Cosine => a.cosine_similarity(b),
        SimilarityMetric::InnerProduct => a.dot(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_similarity_by_metric() {
        let a = Embedding::from_normalized(vec![2.0, 0.0]);
        let b = Embedding::from_normalized(vec![3.0, 0.0]);
        assert!((similarity(SimilarityMetric::Cosine, &a, &b) - 1.0).abs() < 1e-6);
        assert!((similarity(SimilarityMetric::InnerProduct, &a, &b) - 6.0).abs() < 1e-6);
    }
}
