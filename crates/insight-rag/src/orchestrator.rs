//! End-to-end analysis of one image: describe, retrieve, assemble, reason.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, Instrument};
use ulid::Ulid;

use insight_llm::{ImageDescriber, ImageFormat, LanguageModel, LlmError};
use insight_types::{ContextUnit, PipelineSettings, Query, RetrievalResult};

use crate::agent::{AgentConfig, ReasoningAgent};
use crate::context::{Context, ContextAssembler};
use crate::error::{ErrorKind, PipelineError, Stage};
use crate::prompt;
use crate::retriever::Retriever;
use crate::retry::RetryPolicy;
use crate::tools::{RetrievalTool, ToolSet};
use crate::transcript::Transcript;

/// Orchestrator settings.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Documents retrieved for the initial context and per tool call
    pub top_k: usize,
    /// Largest prompt the model accepts, in `context_unit`
    pub context_limit: usize,
    pub context_unit: ContextUnit,
    pub description_timeout: Duration,
    pub retry: RetryPolicy,
    pub agent: AgentConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            context_limit: 3000,
            context_unit: ContextUnit::Tokens,
            description_timeout: Duration::from_secs(60),
            retry: RetryPolicy::none(),
            agent: AgentConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn from_settings(settings: &PipelineSettings) -> Self {
        Self {
            top_k: settings.top_k,
            context_limit: settings.context_limit,
            context_unit: settings.context_unit,
            description_timeout: Duration::from_millis(settings.description_timeout_ms),
            retry: RetryPolicy::with_retries(settings.stage_retries),
            agent: AgentConfig::from_settings(settings),
        }
    }
}

/// Result of a successful analysis.
#[derive(Debug, Clone)]
pub struct Analysis {
    pub request_id: String,
    /// Image description used as the retrieval query
    pub description: Query,
    /// Documents retrieved for the initial context
    pub documents: RetrievalResult,
    pub context: Context,
    pub answer: String,
    pub cycles: usize,
    pub tool_calls: usize,
}

/// Composes the pipeline stages.
///
/// Holds only shared, read-only collaborators, so one instance serves any
/// number of concurrent analyses. Each call owns its own transcript.
pub struct Orchestrator {
    describer: Arc<dyn ImageDescriber>,
    retriever: Arc<Retriever>,
    assembler: ContextAssembler,
    /// Room for the context once the prompt template is accounted for
    context_budget: usize,
    agent: ReasoningAgent,
    tools: ToolSet,
    config: PipelineConfig,
}

impl Orchestrator {
    pub fn new(
        describer: Arc<dyn ImageDescriber>,
        retriever: Arc<Retriever>,
        model: Arc<dyn LanguageModel>,
        config: PipelineConfig,
    ) -> Self {
        let assembler = ContextAssembler::new(config.context_limit, config.context_unit);
        let tools = ToolSet::new().with(Arc::new(RetrievalTool::new(
            retriever.clone(),
            assembler.clone(),
            config.top_k,
        )));
        let template = assembler
            .meter()
            .measure(&prompt::render(&tools, &Transcript::new("")));
        let context_budget = config.context_limit.saturating_sub(template);
        let agent = ReasoningAgent::new(
            model,
            config.agent.clone(),
            assembler.meter().clone(),
            config.context_limit,
        );

        Self {
            describer,
            retriever,
            assembler,
            context_budget,
            agent,
            tools,
            config,
        }
    }

    /// Analyze an image and return the answer or a user-facing error message.
    pub async fn analyze(&self, image: &[u8]) -> String {
        self.analyze_with_cancel(image, &CancellationToken::new())
            .await
    }

    /// Like [`analyze`](Self::analyze), abandoning work when `cancel` fires.
    pub async fn analyze_with_cancel(&self, image: &[u8], cancel: &CancellationToken) -> String {
        match self.try_analyze(image, cancel).await {
            Ok(analysis) => analysis.answer,
            Err(e) => e.user_message(),
        }
    }

    /// Run every stage, stopping at the first failure.
    pub async fn try_analyze(
        &self,
        image: &[u8],
        cancel: &CancellationToken,
    ) -> Result<Analysis, PipelineError> {
        let request_id = Ulid::new().to_string();
        let span = info_span!("analyze", request_id = %request_id);

        async {
            let start = Instant::now();
            let result = self.run_stages(request_id.clone(), image, cancel).await;
            match &result {
                Ok(analysis) => info!(
                    cycles = analysis.cycles,
                    tool_calls = analysis.tool_calls,
                    documents = analysis.documents.len(),
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Analysis complete"
                ),
                Err(e) => error!(
                    stage = %e.stage,
                    kind = %e.kind,
                    detail = %e.detail,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Analysis failed"
                ),
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn run_stages(
        &self,
        request_id: String,
        image: &[u8],
        cancel: &CancellationToken,
    ) -> Result<Analysis, PipelineError> {
        ImageFormat::require(image).map_err(|e| {
            PipelineError::new(Stage::Description, ErrorKind::InvalidInput, image_error(e))
        })?;

        let description = self
            .config
            .retry
            .run(Stage::Description, cancel, move || self.describe(image, cancel))
            .await?;
        info!(chars = description.len(), "Image described");

        let query = description.as_str();
        let documents = self
            .config
            .retry
            .run(Stage::Retrieval, cancel, move || async move {
                cancellable(Stage::Retrieval, cancel, self.retrieve(query)).await
            })
            .await?;

        let context = self
            .assembler
            .assemble_with_limit(description.as_str(), &documents, self.context_budget)?;
        info!(
            included = context.document_ids().len(),
            dropped = context.dropped(),
            size = context.size(),
            limit = context.limit(),
            "Context assembled"
        );

        let assembled = &context;
        let outcome = self
            .config
            .retry
            .run(Stage::Reasoning, cancel, move || async move {
                self.agent
                    .run(assembled, &self.tools, cancel)
                    .await
                    .map_err(PipelineError::from_agent)
            })
            .await?;

        Ok(Analysis {
            request_id,
            description,
            documents,
            context,
            tool_calls: outcome.transcript.tool_calls(),
            answer: outcome.answer,
            cycles: outcome.cycles,
        })
    }

    async fn retrieve(&self, query: &str) -> Result<RetrievalResult, PipelineError> {
        self.retriever
            .retrieve(query, self.config.top_k)
            .await
            .map_err(|e| PipelineError::from_retrieval(Stage::Retrieval, e))
    }

    async fn describe(&self, image: &[u8], cancel: &CancellationToken) -> Result<Query, PipelineError> {
        let text = cancellable(Stage::Description, cancel, async {
            tokio::time::timeout(self.config.description_timeout, self.describer.describe(image))
                .await
                .map_err(|_| {
                    PipelineError::new(
                        Stage::Description,
                        ErrorKind::DescriptionFailure,
                        format!(
                            "description timed out after {}ms",
                            self.config.description_timeout.as_millis()
                        ),
                    )
                })?
                .map_err(|e| match e {
                    LlmError::UnsupportedImage(_) => PipelineError::new(
                        Stage::Description,
                        ErrorKind::InvalidInput,
                        image_error(e),
                    ),
                    other => PipelineError::new(
                        Stage::Description,
                        ErrorKind::DescriptionFailure,
                        other.to_string(),
                    ),
                })
        })
        .await?;

        Query::new(text).map_err(|e| {
            PipelineError::new(Stage::Description, ErrorKind::DescriptionFailure, e.to_string())
        })
    }
}

fn image_error(e: LlmError) -> String {
    match e {
        LlmError::UnsupportedImage(reason) => reason,
        other => other.to_string(),
    }
}

/// Race `fut` against cancellation.
async fn cancellable<T>(
    stage: Stage,
    cancel: &CancellationToken,
    fut: impl Future<Output = Result<T, PipelineError>>,
) -> Result<T, PipelineError> {
    tokio::select! {
        biased;

        _ = cancel.cancelled() => Err(PipelineError::new(stage, ErrorKind::Cancelled, "cancelled")),
        result = fut => result,
    }
}
