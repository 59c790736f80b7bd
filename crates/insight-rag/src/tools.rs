//! Tools the reasoning agent may invoke.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::context::ContextAssembler;
use crate::error::ToolError;
use crate::retriever::Retriever;

/// Result of a tool invocation, fed back to the model as an observation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    pub text: String,
    /// Documents surfaced by this call, if any
    pub document_ids: Vec<String>,
}

/// A named capability exposed to the agent.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    /// One-line description shown to the model.
    fn description(&self) -> &str;

    /// Run the tool. `budget` is the largest observation, in the agent's
    /// size unit, that still fits the next prompt.
    async fn invoke(&self, input: &str, budget: usize) -> Result<ToolOutput, ToolError>;
}

/// The tools available to one agent.
#[derive(Clone, Default)]
pub struct ToolSet {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, tool: Arc<dyn Tool>) -> Self {
        self.tools.push(tool);
        self
    }

    /// Look up a tool by name, ignoring case and surrounding whitespace.
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        let name = name.trim();
        self.tools
            .iter()
            .find(|t| t.name().eq_ignore_ascii_case(name))
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    /// `name: description` lines for the prompt.
    pub fn describe(&self) -> String {
        self.tools
            .iter()
            .map(|t| format!("{}: {}", t.name(), t.description()))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

pub const RETRIEVAL_TOOL_NAME: &str = "MRI Diagnosis Retrieval";
pub const RETRIEVAL_TOOL_DESCRIPTION: &str =
    "Retrieve relevant medical documents and diagnoses based on the MRI description";

/// Searches the document index with agent-supplied text.
pub struct RetrievalTool {
    retriever: Arc<Retriever>,
    assembler: ContextAssembler,
    top_k: usize,
}

impl RetrievalTool {
    pub fn new(retriever: Arc<Retriever>, assembler: ContextAssembler, top_k: usize) -> Self {
        Self {
            retriever,
            assembler,
            top_k,
        }
    }
}

#[async_trait]
impl Tool for RetrievalTool {
    fn name(&self) -> &str {
        RETRIEVAL_TOOL_NAME
    }

    fn description(&self) -> &str {
        RETRIEVAL_TOOL_DESCRIPTION
    }

    async fn invoke(&self, input: &str, budget: usize) -> Result<ToolOutput, ToolError> {
        let result = self.retriever.retrieve(input, self.top_k).await?;
        debug!(returned = result.len(), budget, "Retrieval tool answered");

        Ok(ToolOutput {
            text: self.assembler.render_observation(&result, budget),
            document_ids: result.ids().into_iter().map(str::to_string).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retriever::RetrieverConfig;
    use insight_embeddings::MockEmbedder;
    use insight_types::ContextUnit;
    use insight_vector::MockIndex;

    fn retrieval_tool(index: MockIndex) -> RetrievalTool {
        let retriever = Retriever::new(
            Arc::new(MockEmbedder::new(8)),
            Arc::new(index),
            RetrieverConfig::default(),
        )
        .unwrap();
        RetrievalTool::new(
            Arc::new(retriever),
            ContextAssembler::new(1000, ContextUnit::Chars),
            2,
        )
    }

    #[tokio::test]
    async fn test_retrieval_tool_observation() {
        let tool = retrieval_tool(MockIndex::new(8).with_documents([
            ("a", "Glioma", 0.9),
            ("b", "Meningioma", 0.8),
            ("c", "Abscess", 0.7),
        ]));

        let out = tool.invoke("enhancing lesion", 1000).await.unwrap();
        assert_eq!(out.document_ids, vec!["a", "b"]);
        assert!(out.text.contains("[1] Glioma"));
        assert!(!out.text.contains("Abscess"));
    }

    #[tokio::test]
    async fn test_retrieval_tool_respects_budget() {
        let tool = retrieval_tool(MockIndex::new(8).with_documents([
            ("a", "Glioma", 0.9),
            ("b", "Meningioma", 0.8),
        ]));

        let out = tool.invoke("enhancing lesion", 12).await.unwrap();
        assert_eq!(out.text, "[1] Glioma");
    }

    #[tokio::test]
    async fn test_retrieval_tool_error_kind() {
        let tool = retrieval_tool(MockIndex::new(8).unavailable());
        let err = tool.invoke("lesion", 1000).await.unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::RetrievalUnavailable);
    }

    #[test]
    fn test_toolset_lookup() {
        let tool: Arc<dyn Tool> = Arc::new(retrieval_tool(MockIndex::new(8)));
        let tools = ToolSet::new().with(tool);

        assert!(tools.get("mri diagnosis retrieval").is_some());
        assert!(tools.get("  MRI Diagnosis Retrieval ").is_some());
        assert!(tools.get("web search").is_none());
        assert_eq!(tools.names(), vec![RETRIEVAL_TOOL_NAME]);
        assert!(tools.describe().starts_with("MRI Diagnosis Retrieval: Retrieve"));
    }
}
