//! Failure taxonomy for the analysis pipeline.
//!
//! Every internal error is mapped to an [`ErrorKind`] before it leaves the
//! stage that produced it. The orchestrator tags it with the [`Stage`] and
//! renders a user-facing message; raw error text stays in `detail` for logs.

use std::fmt;

use thiserror::Error;

use crate::transcript::Transcript;

/// Pipeline stage in which a failure occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Setup,
    Description,
    Retrieval,
    ContextAssembly,
    Reasoning,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Setup => "setup",
            Stage::Description => "image description",
            Stage::Retrieval => "retrieval",
            Stage::ContextAssembly => "context assembly",
            Stage::Reasoning => "reasoning",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidInput,
    DescriptionFailure,
    EmbeddingFailure,
    RetrievalUnavailable,
    ContextOverflow,
    ModelInvocationError,
    MaxIterationsExceeded,
    ParseFailure,
    Cancelled,
    Config,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidInput => "InvalidInput",
            ErrorKind::DescriptionFailure => "DescriptionFailure",
            ErrorKind::EmbeddingFailure => "EmbeddingFailure",
            ErrorKind::RetrievalUnavailable => "RetrievalUnavailable",
            ErrorKind::ContextOverflow => "ContextOverflow",
            ErrorKind::ModelInvocationError => "ModelInvocationError",
            ErrorKind::MaxIterationsExceeded => "MaxIterationsExceeded",
            ErrorKind::ParseFailure => "ParseFailure",
            ErrorKind::Cancelled => "Cancelled",
            ErrorKind::Config => "Config",
        }
    }

    /// Whether an orchestrator retry could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ErrorKind::DescriptionFailure
                | ErrorKind::EmbeddingFailure
                | ErrorKind::RetrievalUnavailable
                | ErrorKind::ModelInvocationError
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Retriever failures.
#[derive(Debug, Clone, Error)]
pub enum RetrievalError {
    #[error("Invalid retrieval input: {0}")]
    InvalidInput(String),

    #[error("Embedding failed: {0}")]
    EmbeddingFailure(String),

    #[error("Retrieval unavailable: {0}")]
    RetrievalUnavailable(String),

    #[error("Retriever misconfigured: {0}")]
    Config(String),
}

impl RetrievalError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RetrievalError::InvalidInput(_) => ErrorKind::InvalidInput,
            RetrievalError::EmbeddingFailure(_) => ErrorKind::EmbeddingFailure,
            RetrievalError::RetrievalUnavailable(_) => ErrorKind::RetrievalUnavailable,
            RetrievalError::Config(_) => ErrorKind::Config,
        }
    }
}

/// Context assembly failures.
#[derive(Debug, Clone, Error)]
pub enum ContextError {
    #[error("Query alone needs {size} {unit}, over the limit of {limit}")]
    ContextOverflow {
        size: usize,
        limit: usize,
        unit: &'static str,
    },
}

/// Failure of a tool invoked by the agent.
#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct ToolError {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<RetrievalError> for ToolError {
    fn from(e: RetrievalError) -> Self {
        Self {
            kind: e.kind(),
            message: e.to_string(),
        }
    }
}

/// Terminal failure of the reasoning agent.
///
/// Carries the transcript up to the failure for diagnostics.
#[derive(Debug, Clone, Error)]
#[error("{kind} after {cycles} cycle(s): {detail}")]
pub struct AgentError {
    pub kind: ErrorKind,
    pub detail: String,
    pub cycles: usize,
    pub transcript: Transcript,
}

/// A stage failure as seen at the orchestrator boundary.
#[derive(Debug, Clone, Error)]
#[error("{kind} during {stage}: {detail}")]
pub struct PipelineError {
    pub stage: Stage,
    pub kind: ErrorKind,
    /// Internal detail for logs; never shown to users verbatim
    pub detail: String,
    /// Agent transcript, when the reasoning stage failed
    pub transcript: Option<Transcript>,
}

impl PipelineError {
    pub fn new(stage: Stage, kind: ErrorKind, detail: impl Into<String>) -> Self {
        Self {
            stage,
            kind,
            detail: detail.into(),
            transcript: None,
        }
    }

    /// Human-readable message naming the failed stage and the reason.
    pub fn user_message(&self) -> String {
        match self.kind {
            ErrorKind::InvalidInput => match self.stage {
                Stage::Description => format!("Error: invalid image ({})", self.detail),
                _ => format!("Error: invalid input to {}", self.stage),
            },
            ErrorKind::DescriptionFailure => "Error: image description failed".to_string(),
            ErrorKind::EmbeddingFailure => "Error: embedding service failed".to_string(),
            ErrorKind::RetrievalUnavailable => "Error: retrieval service unavailable".to_string(),
            ErrorKind::ContextOverflow => match self.stage {
                Stage::ContextAssembly => {
                    "Error: image description exceeds the model input limit".to_string()
                }
                _ => "Error: reasoning exceeded the model input limit".to_string(),
            },
            ErrorKind::ModelInvocationError => {
                "Error: language model invocation failed".to_string()
            }
            ErrorKind::MaxIterationsExceeded => {
                "Error: analysis did not converge within the reasoning step limit".to_string()
            }
            ErrorKind::ParseFailure => {
                "Error: could not interpret the language model output".to_string()
            }
            ErrorKind::Cancelled => "Error: analysis cancelled".to_string(),
            ErrorKind::Config => format!("Error: {} is misconfigured", self.stage),
        }
    }

    pub fn from_retrieval(stage: Stage, e: RetrievalError) -> Self {
        Self::new(stage, e.kind(), e.to_string())
    }

    pub fn from_agent(e: AgentError) -> Self {
        Self {
            stage: Stage::Reasoning,
            kind: e.kind,
            detail: e.detail,
            transcript: Some(e.transcript),
        }
    }
}

impl From<ContextError> for PipelineError {
    fn from(e: ContextError) -> Self {
        PipelineError::new(Stage::ContextAssembly, ErrorKind::ContextOverflow, e.to_string())
    }
}
