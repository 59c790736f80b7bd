//! Exact in-memory index over a fixed document set.
//!
//! Built once (from records or a JSON file) and never mutated afterwards,
//! so it is shared across requests without locking.

use std::collections::HashSet;
use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use insight_embeddings::{Embedding, EmbeddingProvider};
use insight_types::{Document, SimilarityMetric};

use crate::error::VectorError;
use crate::index::{similarity, VectorHit, VectorIndex};

/// One document as stored on disk.
///
/// `vector` is optional; missing vectors are computed with the configured
/// embedding provider when the file is loaded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector: Option<Vec<f32>>,
}

struct FlatEntry {
    document: Document,
    embedding: Embedding,
}

/// Brute-force exact nearest-neighbour index.
pub struct FlatIndex {
    entries: Vec<FlatEntry>,
    dimension: usize,
    metric: SimilarityMetric,
}

impl FlatIndex {
    /// Build from documents with precomputed embeddings.
    pub fn new(
        dimension: usize,
        metric: SimilarityMetric,
        documents: Vec<(Document, Embedding)>,
    ) -> Result<Self, VectorError> {
        if dimension == 0 {
            return Err(VectorError::Config("dimension must be > 0".to_string()));
        }

        let mut seen = HashSet::new();
        let mut entries = Vec::with_capacity(documents.len());
        for (document, embedding) in documents {
            if embedding.dimension() != dimension {
                return Err(VectorError::DimensionMismatch {
                    expected: dimension,
                    actual: embedding.dimension(),
                });
            }
            if !seen.insert(document.id.clone()) {
                return Err(VectorError::DuplicateId(document.id));
            }
            entries.push(FlatEntry {
                document,
                embedding,
            });
        }

        Ok(Self {
            entries,
            dimension,
            metric,
        })
    }

    /// Build from records, embedding any record that lacks a vector.
    pub async fn from_records(
        records: Vec<DocumentRecord>,
        metric: SimilarityMetric,
        embedder: &dyn EmbeddingProvider,
    ) -> Result<Self, VectorError> {
        let dimension = embedder.info().dimension;
        let mut documents = Vec::with_capacity(records.len());
        let mut embedded = 0usize;

        for record in records {
            let embedding = match record.vector {
                Some(values) => Embedding::from_normalized(values),
                None => {
                    embedded += 1;
                    embedder.embed(&record.content).await?
                }
            };

            let mut document = Document::new(record.id, record.content);
            document.metadata.source = record.source;
            documents.push((document, embedding));
        }

        debug!(embedded, total = documents.len(), "Prepared flat index entries");
        Self::new(dimension, metric, documents)
    }

    /// Load a JSON array of [`DocumentRecord`]s from disk.
    pub async fn load_json(
        path: impl AsRef<Path>,
        metric: SimilarityMetric,
        embedder: &dyn EmbeddingProvider,
    ) -> Result<Self, VectorError> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path).await?;
        let records: Vec<DocumentRecord> =
            serde_json::from_str(&raw).map_err(|e| VectorError::Serialization(e.to_string()))?;

        info!(path = ?path, documents = records.len(), metric = metric.as_str(), "Loading flat index");
        Self::from_records(records, metric, embedder).await
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl VectorIndex for FlatIndex {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn metric(&self) -> SimilarityMetric {
        self.metric
    }

    async fn query(&self, vector: &Embedding, k: usize) -> Result<Vec<VectorHit>, VectorError> {
        if vector.dimension() != self.dimension {
            return Err(VectorError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.dimension(),
            });
        }

        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, e)| (i, similarity(self.metric, vector, &e.embedding)))
            .collect();

        scored.sort_by(|(ai, a), (bi, b)| {
            b.total_cmp(a)
                .then_with(|| self.entries[*ai].document.id.cmp(&self.entries[*bi].document.id))
        });

        Ok(scored
            .into_iter()
            .take(k)
            .map(|(i, score)| VectorHit::new(self.entries[i].document.clone(), score))
            .collect())
    }
}
