//! Error path E2E tests.
//!
//! Every stage failure must surface as a readable "Error: ..." message that
//! names what went wrong, and no later stage may run after a failure.

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use tokio_util::sync::CancellationToken;

use e2e_tests::{png_bytes, TestHarness, DIM, SCAN_DESCRIPTION};
use insight_embeddings::MockEmbedder;
use insight_llm::{LlmError, MockDescriber, ScriptedModel};
use insight_rag::{
    AgentConfig, ErrorKind, Orchestrator, PipelineConfig, Retriever, RetrieverConfig, RetryPolicy,
    Stage,
};
use insight_types::{ContextUnit, Settings};
use insight_vector::MockIndex;

const FINAL: &str = "Final Answer: Unremarkable study.";

#[tokio::test(start_paused = true)]
async fn test_index_timeout_reports_retrieval_unavailable() {
    let harness = TestHarness::new();
    let index = MockIndex::new(DIM)
        .with_documents([("men-1", "Meningioma", 0.9)])
        .with_delay(Duration::from_secs(120));
    let retriever = harness.retriever_over(Arc::new(index));
    let model = Arc::new(ScriptedModel::new([FINAL]));

    let orchestrator = Orchestrator::new(
        Arc::new(MockDescriber::new(SCAN_DESCRIPTION)),
        retriever,
        model.clone(),
        PipelineConfig::default(),
    );

    let message = orchestrator.analyze(&png_bytes()).await;

    assert_eq!(message, "Error: retrieval service unavailable");
    assert_eq!(model.calls(), 0, "agent must not run after a retrieval failure");
}

#[tokio::test]
async fn test_index_down_reports_retrieval_unavailable() {
    let harness = TestHarness::new();
    let retriever = harness.retriever_over(Arc::new(MockIndex::new(DIM).unavailable()));
    let orchestrator = Orchestrator::new(
        Arc::new(MockDescriber::new(SCAN_DESCRIPTION)),
        retriever,
        Arc::new(ScriptedModel::new([FINAL])),
        PipelineConfig::default(),
    );

    let err = orchestrator
        .try_analyze(&png_bytes(), &CancellationToken::new())
        .await
        .unwrap_err();
    assert_eq!(err.stage, Stage::Retrieval);
    assert_eq!(err.kind, ErrorKind::RetrievalUnavailable);
}

#[tokio::test]
async fn test_embedding_failure() {
    let index = Arc::new(MockIndex::new(DIM));
    let retriever = Retriever::new(
        Arc::new(MockEmbedder::new(DIM).failing()),
        index.clone(),
        RetrieverConfig::default(),
    )
    .unwrap();
    let orchestrator = Orchestrator::new(
        Arc::new(MockDescriber::new(SCAN_DESCRIPTION)),
        Arc::new(retriever),
        Arc::new(ScriptedModel::new([FINAL])),
        PipelineConfig::default(),
    );

    let message = orchestrator.analyze(&png_bytes()).await;
    assert_eq!(message, "Error: embedding service failed");
    assert_eq!(index.calls(), 0);
}

#[tokio::test]
async fn test_endless_tool_loop_hits_iteration_limit() {
    let harness = TestHarness::new();
    let model = Arc::new(ScriptedModel::repeating(
        "Action: MRI Diagnosis Retrieval\nAction Input: dural tail",
    ));
    let config = PipelineConfig {
        context_limit: 50_000,
        agent: AgentConfig {
            max_iterations: 15,
            ..Default::default()
        },
        ..Default::default()
    };
    let orchestrator = harness
        .orchestrator(Arc::new(MockDescriber::new(SCAN_DESCRIPTION)), model.clone(), config)
        .await;

    let err = orchestrator
        .try_analyze(&png_bytes(), &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err.kind, ErrorKind::MaxIterationsExceeded);
    assert_eq!(model.calls(), 15);
    let transcript = err.transcript.as_ref().unwrap();
    assert_eq!(transcript.tool_calls(), 15);
    assert!(err.user_message().starts_with("Error: "));
}

#[tokio::test]
async fn test_unparseable_model_output() {
    let harness = TestHarness::new();
    let model = Arc::new(ScriptedModel::repeating("The scan looks fine to me."));
    let orchestrator = harness
        .orchestrator(
            Arc::new(MockDescriber::new(SCAN_DESCRIPTION)),
            model.clone(),
            PipelineConfig::default(),
        )
        .await;

    let err = orchestrator
        .try_analyze(&png_bytes(), &CancellationToken::new())
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::ParseFailure);
    // One initial attempt plus the default three re-prompts.
    assert_eq!(model.calls(), 4);
}

#[tokio::test]
async fn test_model_error_without_retry() {
    let harness = TestHarness::new();
    let model = Arc::new(
        ScriptedModel::new(Vec::<String>::new()).then_error(|| LlmError::Api("HTTP 500".to_string())),
    );
    let orchestrator = harness
        .orchestrator(
            Arc::new(MockDescriber::new(SCAN_DESCRIPTION)),
            model,
            PipelineConfig::default(),
        )
        .await;

    let message = orchestrator.analyze(&png_bytes()).await;
    assert_eq!(message, "Error: language model invocation failed");
    assert!(!message.contains("HTTP 500"));
}

#[tokio::test(start_paused = true)]
async fn test_transient_model_error_retried_by_orchestrator() {
    let harness = TestHarness::new();
    let model = Arc::new(
        ScriptedModel::new(Vec::<String>::new())
            .then_error(|| LlmError::RateLimitExceeded)
            .then(FINAL),
    );
    let config = PipelineConfig {
        retry: RetryPolicy::with_retries(2),
        ..Default::default()
    };
    let orchestrator = harness
        .orchestrator(Arc::new(MockDescriber::new(SCAN_DESCRIPTION)), model.clone(), config)
        .await;

    let answer = orchestrator.analyze(&png_bytes()).await;
    assert_eq!(answer, "Unremarkable study.");
    assert_eq!(model.calls(), 2);
}

#[tokio::test]
async fn test_description_too_long_for_context() {
    let harness = TestHarness::new();
    let model = Arc::new(ScriptedModel::new([FINAL]));
    let config = PipelineConfig {
        context_limit: 20,
        context_unit: ContextUnit::Chars,
        ..Default::default()
    };
    let orchestrator = harness
        .orchestrator(Arc::new(MockDescriber::new(SCAN_DESCRIPTION)), model.clone(), config)
        .await;

    let err = orchestrator
        .try_analyze(&png_bytes(), &CancellationToken::new())
        .await
        .unwrap_err();
    assert_eq!(err.stage, Stage::ContextAssembly);
    assert_eq!(err.kind, ErrorKind::ContextOverflow);
    assert_eq!(model.calls(), 0);
}

#[tokio::test]
async fn test_unsupported_and_empty_images() {
    let harness = TestHarness::new();
    let describer = Arc::new(MockDescriber::new(SCAN_DESCRIPTION));
    let orchestrator = harness
        .orchestrator(
            describer.clone(),
            Arc::new(ScriptedModel::repeating(FINAL)),
            PipelineConfig::default(),
        )
        .await;

    let gif = orchestrator.analyze(b"GIF89a\x01\x00").await;
    assert_eq!(
        gif,
        "Error: invalid image (only JPEG and PNG images are supported)"
    );

    let empty = orchestrator.analyze(&[]).await;
    assert_eq!(empty, "Error: invalid image (image is empty)");
    assert_eq!(describer.calls(), 0);
}

#[tokio::test]
async fn test_description_failure() {
    let harness = TestHarness::new();
    let orchestrator = harness
        .orchestrator(
            Arc::new(MockDescriber::failing()),
            Arc::new(ScriptedModel::new([FINAL])),
            PipelineConfig::default(),
        )
        .await;

    assert_eq!(
        orchestrator.analyze(&png_bytes()).await,
        "Error: image description failed"
    );
}

#[tokio::test]
async fn test_missing_credentials_fail_at_setup() {
    let settings = Settings::default();
    let err = match Orchestrator::from_settings(&settings).await {
        Ok(_) => panic!("expected a configuration error"),
        Err(e) => e,
    };
    assert_eq!(err.kind, ErrorKind::Config);
    assert_eq!(err.user_message(), "Error: setup is misconfigured");
}
