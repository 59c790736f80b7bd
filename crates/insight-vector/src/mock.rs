//! Mock vector index for testing.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use insight_embeddings::Embedding;
use insight_types::{Document, SimilarityMetric};

use crate::error::VectorError;
use crate::index::{VectorHit, VectorIndex};

/// Mock index returning a fixed set of hits regardless of the query vector.
///
/// Hits are returned in the order given (callers are expected to rank them),
/// truncated to `k`. Delay, failure and concurrency behaviour are configurable.
pub struct MockIndex {
    hits: Vec<VectorHit>,
    dimension: usize,
    delay: Option<Duration>,
    unavailable: bool,
    concurrent: bool,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockIndex {
    pub fn new(dimension: usize) -> Self {
        Self {
            hits: Vec::new(),
            dimension,
            delay: None,
            unavailable: false,
            concurrent: true,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Add a document with the score it should be returned with.
    pub fn with_hit(mut self, document: Document, score: f32) -> Self {
        self.hits.push(VectorHit::new(document, score));
        self
    }

    /// Add `(id, content, score)` triples.
    pub fn with_documents<'a>(
        mut self,
        documents: impl IntoIterator<Item = (&'a str, &'a str, f32)>,
    ) -> Self {
        for (id, content, score) in documents {
            self.hits.push(VectorHit::new(Document::new(id, content), score));
        }
        self
    }

    /// Sleep before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Fail every query as if the server were down.
    pub fn unavailable(mut self) -> Self {
        self.unavailable = true;
        self
    }

    /// Declare the index unsafe for concurrent queries.
    pub fn single_threaded(mut self) -> Self {
        self.concurrent = false;
        self
    }

    /// Number of queries served so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of queries observed running at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl VectorIndex for MockIndex {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn metric(&self) -> SimilarityMetric {
        SimilarityMetric::Cosine
    }

    fn supports_concurrent_queries(&self) -> bool {
        self.concurrent
    }

    async fn query(&self, vector: &Embedding, k: usize) -> Result<Vec<VectorHit>, VectorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = InFlight(&self.in_flight);
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if self.unavailable {
            return Err(VectorError::Unavailable("mock index is down".to_string()));
        }

        if vector.dimension() != self.dimension {
            return Err(VectorError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.dimension(),
            });
        }

        Ok(self.hits.iter().take(k).cloned().collect())
    }
}
