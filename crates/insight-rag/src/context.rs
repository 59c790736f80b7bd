//! Context assembly: the query plus as many retrieved documents as fit.

use std::fmt;
use std::sync::Arc;

use tiktoken_rs::CoreBPE;
use tracing::{debug, warn};

use insight_types::{ContextUnit, Document, RetrievalResult};

use crate::error::ContextError;

/// Separator between the query segment and each document segment.
pub const SEGMENT_DELIMITER: &str = "\n\n---\n\n";

/// Measures text in the configured unit.
#[derive(Clone)]
pub struct SizeMeter {
    unit: ContextUnit,
    bpe: Option<Arc<CoreBPE>>,
}

impl SizeMeter {
    pub fn new(unit: ContextUnit) -> Self {
        let bpe = match unit {
            ContextUnit::Chars => None,
            ContextUnit::Tokens => match tiktoken_rs::cl100k_base() {
                Ok(bpe) => Some(Arc::new(bpe)),
                Err(e) => {
                    warn!(error = %e, "Tokenizer unavailable, estimating 4 chars per token");
                    None
                }
            },
        };
        Self { unit, bpe }
    }

    pub fn unit(&self) -> ContextUnit {
        self.unit
    }

    pub fn unit_name(&self) -> &'static str {
        match self.unit {
            ContextUnit::Chars => "chars",
            ContextUnit::Tokens => "tokens",
        }
    }

    pub fn measure(&self, text: &str) -> usize {
        if text.is_empty() {
            return 0;
        }
        match (self.unit, &self.bpe) {
            (ContextUnit::Chars, _) => text.chars().count(),
            (ContextUnit::Tokens, Some(bpe)) => bpe.encode_with_special_tokens(text).len(),
            (ContextUnit::Tokens, None) => (text.len() / 4).max(1),
        }
    }
}

impl fmt::Debug for SizeMeter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SizeMeter")
            .field("unit", &self.unit)
            .field("tokenizer", &self.bpe.is_some())
            .finish()
    }
}

/// Model input built from a query and retrieved documents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Context {
    text: String,
    document_ids: Vec<String>,
    dropped: usize,
    size: usize,
    limit: usize,
}

impl Context {
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Ids of included documents in rank order.
    pub fn document_ids(&self) -> &[String] {
        &self.document_ids
    }

    /// Documents dropped to respect the limit.
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    /// Size in the assembler's unit.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn limit(&self) -> usize {
        self.limit
    }
}

impl fmt::Display for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Combines a query with ranked documents under a size limit.
///
/// Pure: the same inputs always produce the same context.
#[derive(Debug, Clone)]
pub struct ContextAssembler {
    limit: usize,
    meter: SizeMeter,
}

impl ContextAssembler {
    pub fn new(limit: usize, unit: ContextUnit) -> Self {
        Self {
            limit,
            meter: SizeMeter::new(unit),
        }
    }

    pub fn meter(&self) -> &SizeMeter {
        &self.meter
    }

    /// Assemble using the configured limit.
    pub fn assemble(
        &self,
        query: &str,
        documents: &RetrievalResult,
    ) -> Result<Context, ContextError> {
        self.assemble_with_limit(query, documents, self.limit)
    }

    /// Assemble within `limit`.
    ///
    /// The query is always included verbatim and first. Documents follow in
    /// rank order; once one does not fit, it and every lower-ranked document
    /// are dropped. Fails only when the query alone exceeds the limit.
    pub fn assemble_with_limit(
        &self,
        query: &str,
        documents: &RetrievalResult,
        limit: usize,
    ) -> Result<Context, ContextError> {
        let query_size = self.meter.measure(query);
        if query_size > limit {
            return Err(ContextError::ContextOverflow {
                size: query_size,
                limit,
                unit: self.meter.unit_name(),
            });
        }

        let mut text = query.to_string();
        let mut size = query_size;
        let mut document_ids = Vec::new();

        for (i, doc) in documents.iter().enumerate() {
            let candidate = format!("{text}{SEGMENT_DELIMITER}{}", render_document(i + 1, doc));
            let candidate_size = self.meter.measure(&candidate);
            if candidate_size > limit {
                break;
            }
            text = candidate;
            size = candidate_size;
            document_ids.push(doc.id.clone());
        }

        let dropped = documents.len() - document_ids.len();
        if dropped > 0 {
            debug!(
                included = document_ids.len(),
                dropped,
                limit,
                unit = self.meter.unit_name(),
                "Dropped lowest-ranked documents to fit context"
            );
        }

        Ok(Context {
            text,
            document_ids,
            dropped,
            size,
            limit,
        })
    }

    /// Render documents alone (no query) as a tool observation within `limit`.
    pub fn render_observation(&self, documents: &RetrievalResult, limit: usize) -> String {
        if documents.is_empty() {
            return "No relevant documents found.".to_string();
        }

        let mut text = String::new();
        for (i, doc) in documents.iter().enumerate() {
            let segment = render_document(i + 1, doc);
            let candidate = if text.is_empty() {
                segment
            } else {
                format!("{text}{SEGMENT_DELIMITER}{segment}")
            };
            if self.meter.measure(&candidate) > limit {
                break;
            }
            text = candidate;
        }

        if text.is_empty() {
            "Relevant documents were found but are too long to show.".to_string()
        } else {
            text
        }
    }
}

fn render_document(rank: usize, doc: &Document) -> String {
    match &doc.metadata.source {
        Some(source) => format!("[{rank}] ({source}) {}", doc.content),
        None => format!("[{rank}] {}", doc.content),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ranked(contents: &[(&str, &str, f32)]) -> RetrievalResult {
        let candidates = contents
            .iter()
            .map(|(id, content, score)| (Document::new(*id, *content), *score))
            .collect();
        RetrievalResult::from_candidates(candidates, contents.len())
    }

    fn docs() -> RetrievalResult {
        ranked(&[
            ("a", "Glioblastoma: ring-enhancing mass with central necrosis.", 0.9),
            ("b", "Meningioma: extra-axial, dural tail sign.", 0.8),
            ("c", "Multiple sclerosis: periventricular white matter lesions.", 0.7),
        ])
    }

    #[test]
    fn test_query_first_then_rank_order() {
        let assembler = ContextAssembler::new(10_000, ContextUnit::Chars);
        let ctx = assembler.assemble("Axial T1 post-contrast.", &docs()).unwrap();

        assert!(ctx.as_str().starts_with("Axial T1 post-contrast."));
        assert_eq!(ctx.document_ids(), ["a", "b", "c"]);
        let a = ctx.as_str().find("[1] Glioblastoma").unwrap();
        let c = ctx.as_str().find("[3] Multiple").unwrap();
        assert!(a < c);
        assert_eq!(ctx.dropped(), 0);
        assert_eq!(ctx.size(), ctx.as_str().chars().count());
    }

    #[test]
    fn test_idempotent() {
        let assembler = ContextAssembler::new(200, ContextUnit::Tokens);
        let first = assembler.assemble("query", &docs()).unwrap();
        let second = assembler.assemble("query", &docs()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_truncation_drops_lowest_rank() {
        let query = "Sagittal FLAIR.";
        let assembler = ContextAssembler::new(0, ContextUnit::Chars);
        let full = assembler
            .assemble_with_limit(query, &docs(), usize::MAX)
            .unwrap();

        // Budget that fits exactly the first two documents.
        let two = ranked(&[
            ("a", "Glioblastoma: ring-enhancing mass with central necrosis.", 0.9),
            ("b", "Meningioma: extra-axial, dural tail sign.", 0.8),
        ]);
        let limit = assembler
            .assemble_with_limit(query, &two, usize::MAX)
            .unwrap()
            .size();

        let ctx = assembler.assemble_with_limit(query, &docs(), limit).unwrap();
        assert_eq!(ctx.document_ids(), ["a", "b"]);
        assert_eq!(ctx.dropped(), 1);
        assert!(ctx.size() <= limit);
        assert!(ctx.size() < full.size());
        assert!(ctx.as_str().starts_with(query));
    }

    #[test]
    fn test_no_room_for_documents() {
        let query = "Coronal T2.";
        let assembler = ContextAssembler::new(query.len(), ContextUnit::Chars);
        let ctx = assembler.assemble(query, &docs()).unwrap();
        assert_eq!(ctx.as_str(), query);
        assert!(ctx.document_ids().is_empty());
        assert_eq!(ctx.dropped(), 3);
    }

    #[test]
    fn test_query_over_limit_overflows() {
        let assembler = ContextAssembler::new(5, ContextUnit::Chars);
        let err = assembler
            .assemble("a very long description", &RetrievalResult::empty())
            .unwrap_err();
        assert!(matches!(
            err,
            ContextError::ContextOverflow { size: 23, limit: 5, unit: "chars" }
        ));
    }

    #[test]
    fn test_empty_documents() {
        let assembler = ContextAssembler::new(100, ContextUnit::Tokens);
        let ctx = assembler.assemble("query", &RetrievalResult::empty()).unwrap();
        assert_eq!(ctx.as_str(), "query");
        assert!(ctx.size() <= 100);
    }

    #[test]
    fn test_observation_rendering() {
        let assembler = ContextAssembler::new(100, ContextUnit::Chars);
        assert_eq!(
            assembler.render_observation(&RetrievalResult::empty(), 100),
            "No relevant documents found."
        );
        let obs = assembler.render_observation(&docs(), 60);
        assert!(obs.starts_with("[1] Glioblastoma"));
        assert!(!obs.contains("[2]"));
    }

    #[test]
    fn test_token_meter_counts() {
        let meter = SizeMeter::new(ContextUnit::Tokens);
        assert_eq!(meter.measure(""), 0);
        assert!(meter.measure("hello world") >= 1);
        assert!(meter.measure("hello world") < "hello world".len());
    }
}
