//! Query embedding plus nearest-neighbour lookup.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use insight_embeddings::{EmbeddingError, EmbeddingProvider};
use insight_types::{PipelineSettings, RetrievalResult};
use insight_vector::{VectorError, VectorIndex};

use crate::error::RetrievalError;

/// Retriever configuration.
#[derive(Debug, Clone)]
pub struct RetrieverConfig {
    pub embed_timeout: Duration,
    pub query_timeout: Duration,
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self {
            embed_timeout: Duration::from_secs(10),
            query_timeout: Duration::from_secs(5),
        }
    }
}

impl RetrieverConfig {
    pub fn from_settings(settings: &PipelineSettings) -> Self {
        Self {
            embed_timeout: Duration::from_millis(settings.embedding_timeout_ms),
            query_timeout: Duration::from_millis(settings.vector_timeout_ms),
        }
    }
}

/// Embeds a query and returns the top-k most similar documents.
///
/// Shared by reference across concurrent requests. When the index reports
/// it cannot serve concurrent queries, index calls (and only those) are
/// serialized behind a lock.
pub struct Retriever {
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
    config: RetrieverConfig,
    index_lock: Option<Mutex<()>>,
}

impl Retriever {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn VectorIndex>,
        config: RetrieverConfig,
    ) -> Result<Self, RetrievalError> {
        let embed_dim = embedder.info().dimension;
        if embed_dim != index.dimension() {
            return Err(RetrievalError::Config(format!(
                "embedding model '{}' produces {} dimensions, index expects {}",
                embedder.info().name,
                embed_dim,
                index.dimension()
            )));
        }

        let index_lock = if index.supports_concurrent_queries() {
            None
        } else {
            debug!("Index does not support concurrent queries, serializing access");
            Some(Mutex::new(()))
        };

        Ok(Self {
            embedder,
            index,
            config,
            index_lock,
        })
    }

    /// Return at most `k` documents ordered by descending similarity.
    ///
    /// Ties are broken by ascending document id and duplicate ids are
    /// collapsed, so the result is deterministic for a fixed index.
    pub async fn retrieve(&self, query: &str, k: usize) -> Result<RetrievalResult, RetrievalError> {
        if query.trim().is_empty() {
            return Err(RetrievalError::InvalidInput("query is empty".to_string()));
        }
        if k == 0 {
            return Err(RetrievalError::InvalidInput("k must be positive".to_string()));
        }

        let start = Instant::now();

        let embedding = tokio::time::timeout(self.config.embed_timeout, self.embedder.embed(query))
            .await
            .map_err(|_| {
                RetrievalError::EmbeddingFailure(format!(
                    "embedding timed out after {}ms",
                    self.config.embed_timeout.as_millis()
                ))
            })?
            .map_err(embedding_failure)?;

        if embedding.dimension() != self.index.dimension() {
            return Err(embedding_failure(EmbeddingError::DimensionMismatch {
                expected: self.index.dimension(),
                actual: embedding.dimension(),
            }));
        }

        // Waiting for the lock is not part of the index call's time budget.
        let _guard = match &self.index_lock {
            Some(lock) => Some(lock.lock().await),
            None => None,
        };

        let hits = tokio::time::timeout(
            self.config.query_timeout,
            self.index.query(&embedding, k),
        )
        .await
        .map_err(|_| {
            RetrievalError::RetrievalUnavailable(format!(
                "index query timed out after {}ms",
                self.config.query_timeout.as_millis()
            ))
        })?
        .map_err(index_failure)?;

        let candidates = hits.into_iter().map(|h| (h.document, h.score)).collect();
        let result = RetrievalResult::from_candidates(candidates, k);

        info!(
            k,
            returned = result.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Retrieval complete"
        );

        Ok(result)
    }
}

fn embedding_failure(e: EmbeddingError) -> RetrievalError {
    warn!(error = %e, "Query embedding failed");
    RetrievalError::EmbeddingFailure(e.to_string())
}

fn index_failure(e: VectorError) -> RetrievalError {
    warn!(error = %e, "Index query failed");
    RetrievalError::RetrievalUnavailable(e.to_string())
}
