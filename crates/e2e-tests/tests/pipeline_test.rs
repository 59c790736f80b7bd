//! Full pipeline E2E tests: image -> description -> retrieval -> context -> answer.

use std::sync::Arc;

use pretty_assertions::assert_eq;
use tokio_util::sync::CancellationToken;

use e2e_tests::{png_bytes, random_corpus, TestHarness, DIM, SCAN_DESCRIPTION};
use insight_embeddings::{Embedding, MockEmbedder};
use insight_llm::{MockDescriber, ScriptedModel};
use insight_rag::{
    ContextAssembler, ErrorKind, PipelineConfig, SizeMeter, Stage, SEGMENT_DELIMITER,
};
use insight_types::{ContextUnit, Document, RetrievalResult};

const TOOL_CALL: &str = "Thought: I should compare against similar cases.\n\
Action: MRI Diagnosis Retrieval\n\
Action Input: extra-axial enhancing mass with dural tail";

const FINAL: &str = "Thought: I now know the final answer\n\
Final Answer: Findings favour a convexity meningioma. Differential includes dural metastasis.";

#[tokio::test]
async fn test_retriever_returns_top_three_of_five() {
    let harness = TestHarness::new();
    let retriever = harness.retriever().await;

    let result = retriever.retrieve(SCAN_DESCRIPTION, 3).await.unwrap();

    assert_eq!(result.ids(), vec!["men-1", "men-2", "gbm-1"]);
    let scores = result.scores();
    assert!(scores.windows(2).all(|w| w[0] > w[1]));
}

#[tokio::test]
async fn test_ranking_matches_brute_force() {
    let records = random_corpus(42, 40);
    let query: Vec<f32> = vec![0.3, -0.2, 0.9, 0.1, -0.5, 0.4, 0.0, 0.7];
    let harness = TestHarness::with_corpus(
        records.clone(),
        MockEmbedder::new(DIM).with_vector("probe", query.clone()),
    );
    let retriever = harness.retriever().await;

    let result = retriever.retrieve("probe", 7).await.unwrap();

    let q = Embedding::from_normalized(query);
    let mut expected: Vec<(String, f32)> = records
        .iter()
        .map(|r| {
            let v = Embedding::from_normalized(r.vector.clone().unwrap());
            (r.id.clone(), q.cosine_similarity(&v))
        })
        .collect();
    expected.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    let expected_ids: Vec<&str> = expected.iter().take(7).map(|(id, _)| id.as_str()).collect();

    assert_eq!(result.ids(), expected_ids);
}

#[tokio::test]
async fn test_tool_call_then_final_answer() {
    let harness = TestHarness::new();
    let model = Arc::new(ScriptedModel::new([TOOL_CALL, FINAL]));
    let orchestrator = harness
        .orchestrator(
            Arc::new(MockDescriber::new(SCAN_DESCRIPTION)),
            model.clone(),
            PipelineConfig::default(),
        )
        .await;

    let embeds_before = harness.embedder.calls();
    let analysis = orchestrator
        .try_analyze(&png_bytes(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(
        analysis.answer,
        "Findings favour a convexity meningioma. Differential includes dural metastasis."
    );
    assert_eq!(analysis.cycles, 2);
    assert_eq!(analysis.tool_calls, 1);
    assert_eq!(model.calls(), 2);
    // Initial retrieval plus the agent's tool call.
    assert_eq!(harness.embedder.calls() - embeds_before, 2);

    let prompts = model.prompts();
    assert!(prompts[0].contains(SCAN_DESCRIPTION));
    assert!(prompts[0].contains("Meningioma: extra-axial dural-based mass"));
    assert!(prompts[1].contains("\nObservation: [1]"));
}

#[tokio::test]
async fn test_context_places_query_first_in_rank_order() {
    let harness = TestHarness::new();
    let model = Arc::new(ScriptedModel::new([FINAL]));
    let orchestrator = harness
        .orchestrator(
            Arc::new(MockDescriber::new(SCAN_DESCRIPTION)),
            model,
            PipelineConfig::default(),
        )
        .await;

    let analysis = orchestrator
        .try_analyze(&png_bytes(), &CancellationToken::new())
        .await
        .unwrap();

    let context = analysis.context.as_str();
    assert!(context.starts_with(SCAN_DESCRIPTION));
    assert_eq!(
        analysis.context.document_ids(),
        ["men-1", "men-2", "gbm-1", "ms-1", "abs-1"]
    );
    let first = context.find("[1] (neuro-atlas) Meningioma").unwrap();
    let second = context.find("[2] (case-reports) Atypical").unwrap();
    assert!(first < second);
    assert_eq!(analysis.cycles, 1);
}

#[tokio::test]
async fn test_context_assembly_is_idempotent_across_runs() {
    let harness = TestHarness::new();
    let orchestrator = harness
        .orchestrator(
            Arc::new(MockDescriber::new(SCAN_DESCRIPTION)),
            Arc::new(ScriptedModel::repeating(FINAL)),
            PipelineConfig::default(),
        )
        .await;

    let first = orchestrator
        .try_analyze(&png_bytes(), &CancellationToken::new())
        .await
        .unwrap();
    let second = orchestrator
        .try_analyze(&png_bytes(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(first.context, second.context);
    assert_eq!(first.documents, second.documents);
    assert_ne!(first.request_id, second.request_id);
}

#[tokio::test]
async fn test_truncation_keeps_query_and_drops_lowest_ranked() {
    let query = "Coronal FLAIR with periventricular hyperintensities.";
    let docs = RetrievalResult::from_candidates(
        vec![
            (Document::new("a", "A".repeat(100)), 0.9),
            (Document::new("b", "B".repeat(100)), 0.8),
            (Document::new("c", "C".repeat(100)), 0.7),
        ],
        3,
    );

    // Room for the query and exactly one document segment.
    let limit = query.len() + SEGMENT_DELIMITER.len() + "[1] ".len() + 100;
    let assembler = ContextAssembler::new(limit, ContextUnit::Chars);
    let context = assembler.assemble(query, &docs).unwrap();

    assert!(context.as_str().starts_with(query));
    assert_eq!(context.document_ids(), ["a"]);
    assert_eq!(context.dropped(), 2);
    assert!(context.size() <= limit);
}

#[tokio::test]
async fn test_analyze_returns_plain_answer() {
    let harness = TestHarness::new();
    let orchestrator = harness
        .orchestrator(
            Arc::new(MockDescriber::new(SCAN_DESCRIPTION)),
            Arc::new(ScriptedModel::new([FINAL])),
            PipelineConfig::default(),
        )
        .await;

    let answer = orchestrator.analyze(&png_bytes()).await;
    assert!(answer.starts_with("Findings favour a convexity meningioma."));
}

#[tokio::test]
async fn test_prompts_stay_within_context_limit() {
    let harness = TestHarness::new();
    let model = Arc::new(ScriptedModel::new([TOOL_CALL, FINAL]));
    let config = PipelineConfig {
        context_limit: 2000,
        context_unit: ContextUnit::Chars,
        ..Default::default()
    };
    let orchestrator = harness
        .orchestrator(Arc::new(MockDescriber::new(SCAN_DESCRIPTION)), model.clone(), config)
        .await;

    let analysis = orchestrator
        .try_analyze(&png_bytes(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(analysis.cycles, 2);
    let meter = SizeMeter::new(ContextUnit::Chars);
    let sizes: Vec<usize> = model.prompts().iter().map(|p| meter.measure(p)).collect();
    assert_eq!(sizes.len(), 2);
    assert!(sizes.iter().all(|&size| size <= 2000), "prompt sizes {sizes:?}");
}

#[tokio::test]
async fn test_reasoning_stops_when_prompt_cannot_fit() {
    let harness = TestHarness::new();
    let model = Arc::new(ScriptedModel::repeating(TOOL_CALL));
    let config = PipelineConfig {
        context_limit: 1800,
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

    assert_eq!(err.stage, Stage::Reasoning);
    assert_eq!(err.kind, ErrorKind::ContextOverflow);
    assert_eq!(err.user_message(), "Error: reasoning exceeded the model input limit");
    assert_eq!(model.calls(), 2);

    let meter = SizeMeter::new(ContextUnit::Chars);
    assert!(model.prompts().iter().all(|p| meter.measure(p) <= 1800));
}
