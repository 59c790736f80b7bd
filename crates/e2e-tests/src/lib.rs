//! End-to-end test infrastructure for scan-insight.
//!
//! Provides a shared TestHarness and helpers for tests covering the full
//! image-to-answer pipeline with in-process collaborators.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use insight_embeddings::MockEmbedder;
use insight_llm::{ImageDescriber, LanguageModel, LlmError};
use insight_rag::{Orchestrator, PipelineConfig, Retriever, RetrieverConfig};
use insight_types::SimilarityMetric;
use insight_vector::{DocumentRecord, FlatIndex, VectorIndex};

/// Embedding dimension used throughout the harness.
pub const DIM: usize = 8;

/// Description the harness embedder maps to [`query_vector`].
pub const SCAN_DESCRIPTION: &str =
    "Axial T1 post-contrast MRI showing an extra-axial enhancing mass along the left convexity.";

/// Smallest byte string accepted as a PNG.
pub fn png_bytes() -> Vec<u8> {
    vec![0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1a, b'\n', 0, 0, 0, 13]
}

/// A PNG whose final byte tags the scan, for [`TaggedDescriber`].
pub fn tagged_png(tag: u8) -> Vec<u8> {
    let mut bytes = png_bytes();
    bytes.push(tag);
    bytes
}

/// Unit basis vector `e_i`.
pub fn basis(i: usize) -> Vec<f32> {
    let mut v = vec![0.0; DIM];
    v[i % DIM] = 1.0;
    v
}

/// Reference corpus with fixed vectors.
///
/// Relative to [`query_vector`] the cosine scores are strictly ordered:
/// men-1 > men-2 > gbm-1 > ms-1 > abs-1.
pub fn reference_corpus() -> Vec<DocumentRecord> {
    let doc = |id: &str, content: &str, source: &str, vector: Vec<f32>| DocumentRecord {
        id: id.to_string(),
        content: content.to_string(),
        source: Some(source.to_string()),
        vector: Some(vector),
    };

    vec![
        doc(
            "abs-1",
            "Cerebral abscess: ring enhancement with restricted diffusion centrally.",
            "neuro-atlas",
            vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0],
        ),
        doc(
            "gbm-1",
            "Glioblastoma: intra-axial heterogeneous mass with necrosis and thick irregular enhancement.",
            "neuro-atlas",
            vec![0.5, 0.5, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
        ),
        doc(
            "men-1",
            "Meningioma: extra-axial dural-based mass, homogeneous enhancement, dural tail sign.",
            "neuro-atlas",
            vec![1.0, 0.05, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
        ),
        doc(
            "men-2",
            "Atypical meningioma: extra-axial mass with brain invasion and peritumoral edema.",
            "case-reports",
            vec![0.9, 0.3, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
        ),
        doc(
            "ms-1",
            "Multiple sclerosis: ovoid periventricular lesions perpendicular to the ventricles.",
            "neuro-atlas",
            vec![0.2, 0.0, 0.9, 0.0, 0.0, 0.0, 0.0, 0.0],
        ),
    ]
}

/// Query vector pinned to [`SCAN_DESCRIPTION`].
pub fn query_vector() -> Vec<f32> {
    basis(0)
}

/// Random corpus with seeded vectors, for ranking checks against brute force.
pub fn random_corpus(seed: u64, count: usize) -> Vec<DocumentRecord> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|i| DocumentRecord {
            id: format!("doc-{i:03}"),
            content: format!("Reference document {i}"),
            source: None,
            vector: Some((0..DIM).map(|_| rng.random_range(-1.0f32..1.0)).collect()),
        })
        .collect()
}

/// Shared test harness for E2E tests.
///
/// Holds a temp dir with a JSON corpus and builds retrievers and
/// orchestrators over a flat index loaded from it.
pub struct TestHarness {
    /// Keeps temp dir alive for the lifetime of the harness
    pub _temp_dir: tempfile::TempDir,
    /// JSON corpus file
    pub corpus_path: PathBuf,
    pub embedder: Arc<MockEmbedder>,
}

impl TestHarness {
    /// Harness over [`reference_corpus`], with the scan description pinned
    /// to [`query_vector`].
    pub fn new() -> Self {
        Self::with_corpus(
            reference_corpus(),
            MockEmbedder::new(DIM).with_vector(SCAN_DESCRIPTION, query_vector()),
        )
    }

    pub fn with_corpus(records: Vec<DocumentRecord>, embedder: MockEmbedder) -> Self {
        let temp_dir = tempfile::TempDir::new().expect("Failed to create temp dir");
        let corpus_path = temp_dir.path().join("documents.json");
        let json = serde_json::to_vec_pretty(&records).expect("Failed to serialize corpus");
        std::fs::write(&corpus_path, json).expect("Failed to write corpus");

        Self {
            _temp_dir: temp_dir,
            corpus_path,
            embedder: Arc::new(embedder),
        }
    }

    /// Load the corpus into a flat cosine index.
    pub async fn index(&self) -> Arc<FlatIndex> {
        Arc::new(
            FlatIndex::load_json(&self.corpus_path, SimilarityMetric::Cosine, self.embedder.as_ref())
                .await
                .expect("Failed to load flat index"),
        )
    }

    /// Retriever over an arbitrary index, using the harness embedder.
    pub fn retriever_over(&self, index: Arc<dyn VectorIndex>) -> Arc<Retriever> {
        Arc::new(
            Retriever::new(self.embedder.clone(), index, RetrieverConfig::default())
                .expect("Failed to build retriever"),
        )
    }

    /// Retriever over the flat corpus index.
    pub async fn retriever(&self) -> Arc<Retriever> {
        let index = self.index().await;
        self.retriever_over(index)
    }

    /// Orchestrator over the flat corpus index.
    pub async fn orchestrator(
        &self,
        describer: Arc<dyn ImageDescriber>,
        model: Arc<dyn LanguageModel>,
        config: PipelineConfig,
    ) -> Orchestrator {
        let retriever = self.retriever().await;
        Orchestrator::new(describer, retriever, model, config)
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Describer that derives the description from the image's last byte.
pub struct TaggedDescriber;

impl TaggedDescriber {
    pub fn description_for(tag: u8) -> String {
        format!("Scan {tag}: focal lesion under review.")
    }
}

#[async_trait]
impl ImageDescriber for TaggedDescriber {
    async fn describe(&self, image: &[u8]) -> Result<String, LlmError> {
        let tag = image
            .last()
            .copied()
            .ok_or_else(|| LlmError::UnsupportedImage("image is empty".to_string()))?;
        tokio::task::yield_now().await;
        Ok(Self::description_for(tag))
    }
}

/// Model that calls the retrieval tool once, then answers by quoting the
/// first line of its question. Stateless, so concurrent runs cannot share
/// progress except through their own prompts.
pub struct EchoModel;

impl EchoModel {
    pub fn answer_for(description: &str) -> String {
        format!("Assessment for: {description}")
    }
}

#[async_trait]
impl LanguageModel for EchoModel {
    fn name(&self) -> &str {
        "echo"
    }

    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        tokio::task::yield_now().await;

        let tail = prompt.split("Question: ").nth(1).unwrap_or_default();
        let question = tail.lines().next().unwrap_or_default().to_string();

        if tail.contains("\nObservation: ") {
            Ok(format!(
                "Thought: I now know the final answer\nFinal Answer: {}",
                Self::answer_for(&question)
            ))
        } else {
            Ok(format!(
                "Thought: I should compare with reference cases.\nAction: MRI Diagnosis Retrieval\nAction Input: {question}"
            ))
        }
    }
}
