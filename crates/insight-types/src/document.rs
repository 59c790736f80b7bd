//! Reference documents and ranked retrieval results.

use std::cmp::Ordering;
use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// Optional metadata attached to a document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    /// Where the document came from (journal, guideline, case report)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,

    /// Similarity score assigned by the retrieval that produced this copy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,
}

/// A reference document.
///
/// Documents are owned by the vector index. Values handed out by retrieval
/// are snapshots; nothing in the pipeline mutates them after ranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Unique document identifier
    pub id: String,

    /// Textual content
    pub content: String,

    #[serde(default)]
    pub metadata: DocumentMetadata,
}

impl Document {
    pub fn new(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            metadata: DocumentMetadata::default(),
        }
    }

    /// Attach a source label.
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.metadata.source = Some(source.into());
        self
    }

    /// Score recorded by retrieval, if any.
    pub fn score(&self) -> Option<f32> {
        self.metadata.score
    }
}

/// Documents for one query, ranked by descending similarity.
///
/// Invariants upheld by [`RetrievalResult::from_candidates`]:
/// - scores are non-increasing
/// - equal scores are ordered by ascending document id
/// - no document id appears twice
/// - length never exceeds the requested top-k
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RetrievalResult {
    documents: Vec<Document>,
}

impl RetrievalResult {
    /// An empty result.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Rank raw `(document, score)` candidates and keep the best `k`.
    ///
    /// Candidates with non-finite scores are discarded. When the same id
    /// appears more than once only its highest-ranked copy is kept.
    pub fn from_candidates(candidates: Vec<(Document, f32)>, k: usize) -> Self {
        let mut ranked: Vec<(Document, f32)> = candidates
            .into_iter()
            .filter(|(_, score)| score.is_finite())
            .collect();

        ranked.sort_by(|(a_doc, a_score), (b_doc, b_score)| {
            match b_score.partial_cmp(a_score).unwrap_or(Ordering::Equal) {
                Ordering::Equal => a_doc.id.cmp(&b_doc.id),
                other => other,
            }
        });

        let mut seen = HashSet::new();
        let documents = ranked
            .into_iter()
            .filter(|(doc, _)| seen.insert(doc.id.clone()))
            .take(k)
            .map(|(mut doc, score)| {
                doc.metadata.score = Some(score);
                doc
            })
            .collect();

        Self { documents }
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Document> {
        self.documents.iter()
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Document ids in rank order.
    pub fn ids(&self) -> Vec<&str> {
        self.documents.iter().map(|d| d.id.as_str()).collect()
    }

    /// Scores in rank order.
    pub fn scores(&self) -> Vec<f32> {
        self.documents
            .iter()
            .map(|d| d.metadata.score.unwrap_or(0.0))
            .collect()
    }
}

impl<'a> IntoIterator for &'a RetrievalResult {
    type Item = &'a Document;
    type IntoIter = std::slice::Iter<'a, Document>;

    fn into_iter(self) -> Self::IntoIter {
        self.documents.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(id: &str, score: f32) -> (Document, f32) {
        (Document::new(id, format!("content of {}", id)), score)
    }

    #[test]
    fn test_ranks_descending_and_truncates() {
        let result = RetrievalResult::from_candidates(
            vec![
                candidate("d4", 0.60),
                candidate("d1", 0.91),
                candidate("d5", 0.40),
                candidate("d3", 0.75),
                candidate("d2", 0.88),
            ],
            3,
        );

        assert_eq!(result.ids(), vec!["d1", "d2", "d3"]);
        assert_eq!(result.scores(), vec![0.91, 0.88, 0.75]);
    }

    #[test]
    fn test_equal_scores_break_ties_by_id() {
        let result = RetrievalResult::from_candidates(
            vec![
                candidate("c", 0.5),
                candidate("a", 0.5),
                candidate("b", 0.5),
            ],
            5,
        );
        assert_eq!(result.ids(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_duplicates_keep_best_copy() {
        let result = RetrievalResult::from_candidates(
            vec![
                candidate("a", 0.2),
                candidate("b", 0.7),
                candidate("a", 0.9),
            ],
            5,
        );
        assert_eq!(result.ids(), vec!["a", "b"]);
        assert_eq!(result.documents()[0].score(), Some(0.9));
    }

    #[test]
    fn test_non_finite_scores_dropped() {
        let result = RetrievalResult::from_candidates(
            vec![candidate("a", f32::NAN), candidate("b", 0.1)],
            5,
        );
        assert_eq!(result.ids(), vec!["b"]);
    }

    #[test]
    fn test_document_metadata_defaults_on_deserialize() {
        let doc: Document =
            serde_json::from_str(r#"{"id": "x", "content": "Gliosis"}"#).unwrap();
        assert_eq!(doc.metadata, DocumentMetadata::default());
    }
}
