//! Mock embedder for testing.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::EmbeddingError;
use crate::model::{Embedding, EmbeddingProvider, ModelInfo};

/// Mock embedder that produces deterministic vectors.
///
/// Each lowercase word is hashed (FNV-1a) into one of `dimension` buckets, so
/// texts sharing vocabulary land close together. Individual texts can be pinned
/// to exact vectors with [`MockEmbedder::with_vector`].
pub struct MockEmbedder {
    info: ModelInfo,
    pinned: HashMap<String, Vec<f32>>,
    delay: Option<Duration>,
    fail: bool,
    calls: AtomicUsize,
}

impl MockEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            info: ModelInfo {
                name: "mock-embedder".to_string(),
                dimension,
            },
            pinned: HashMap::new(),
            delay: None,
            fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    /// Return exactly `values` when asked to embed `text`.
    pub fn with_vector(mut self, text: impl Into<String>, values: Vec<f32>) -> Self {
        self.pinned.insert(text.into(), values);
        self
    }

    /// Sleep before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Fail every call.
    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    /// Number of embed calls served so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn hashed(&self, text: &str) -> Vec<f32> {
        let mut values = vec![0.0f32; self.info.dimension];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let bucket = fnv1a(&word.to_lowercase()) as usize % self.info.dimension;
            values[bucket] += 1.0;
        }
        values
    }
}

fn fnv1a(text: &str) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in text.bytes() {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

#[async_trait]
impl EmbeddingProvider for MockEmbedder {
    fn info(&self) -> &ModelInfo {
        &self.info
    }

    async fn embed(&self, text: &str) -> Result<Embedding, EmbeddingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if self.fail {
            return Err(EmbeddingError::Api("mock embedder failure".to_string()));
        }

        if let Some(values) = self.pinned.get(text) {
            return Ok(Embedding::from_normalized(values.clone()));
        }

        if text.trim().is_empty() {
            return Err(EmbeddingError::InvalidInput("empty text".to_string()));
        }

        Ok(Embedding::new(self.hashed(text)))
    }
}
