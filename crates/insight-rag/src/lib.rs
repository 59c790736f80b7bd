//! # insight-rag
//!
//! Retrieval-augmented reasoning over MRI image descriptions.
//!
//! Stages, in order:
//! 1. An [`ImageDescriber`](insight_llm::ImageDescriber) turns the image into text
//! 2. The [`Retriever`] embeds that text and fetches the top-k reference documents
//! 3. The [`ContextAssembler`] builds a size-bounded context
//! 4. The [`ReasoningAgent`] reasons over it, optionally calling the retrieval tool again
//!
//! The [`Orchestrator`] runs the stages, maps every failure to an
//! [`ErrorKind`] tagged with its [`Stage`], and is safe to share between
//! concurrent requests.

pub mod agent;
pub mod builder;
pub mod context;
pub mod error;
pub mod orchestrator;
pub mod parser;
pub mod prompt;
pub mod retriever;
pub mod retry;
pub mod tools;
pub mod transcript;

pub use agent::{AgentConfig, AgentOutcome, AgentState, ReasoningAgent};
pub use context::{Context, ContextAssembler, SizeMeter, SEGMENT_DELIMITER};
pub use error::{AgentError, ContextError, ErrorKind, PipelineError, RetrievalError, Stage, ToolError};
pub use orchestrator::{Analysis, Orchestrator, PipelineConfig};
pub use parser::{parse_output, ModelOutput};
pub use retriever::{Retriever, RetrieverConfig};
pub use retry::RetryPolicy;
pub use tools::{RetrievalTool, Tool, ToolOutput, ToolSet, RETRIEVAL_TOOL_NAME};
pub use transcript::{AgentStep, StepAction, Transcript};
