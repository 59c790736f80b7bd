//! Construction of a production orchestrator from layered settings.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use insight_embeddings::{ApiEmbedder, ApiEmbedderConfig, EmbeddingApi, EmbeddingProvider};
use insight_llm::{
    ApiImageDescriber, ApiImageDescriberConfig, ApiLanguageModel, ApiLanguageModelConfig,
    ApiProvider,
};
use insight_types::{Settings, VectorBackend};
use insight_vector::{FlatIndex, MilvusConfig, MilvusIndex, VectorIndex};

use crate::error::{ErrorKind, PipelineError, Stage};
use crate::orchestrator::{Orchestrator, PipelineConfig};
use crate::prompt::OBSERVATION_STOP;
use crate::retriever::{Retriever, RetrieverConfig};

fn setup_error(e: impl ToString) -> PipelineError {
    PipelineError::new(Stage::Setup, ErrorKind::Config, e.to_string())
}

impl Orchestrator {
    /// Build HTTP clients for every collaborator named in `settings`.
    ///
    /// Fails with a `Config` error when a required API key is missing. A flat
    /// index is loaded (and embedded where needed) before returning.
    pub async fn from_settings(settings: &Settings) -> Result<Self, PipelineError> {
        settings.validate().map_err(setup_error)?;
        let pipeline = &settings.pipeline;

        let embedder = build_embedder(settings)?;
        let index = build_index(settings, embedder.as_ref()).await?;

        let retriever = Retriever::new(
            embedder,
            index,
            RetrieverConfig::from_settings(pipeline),
        )
        .map_err(|e| PipelineError::from_retrieval(Stage::Setup, e))?;

        let model_key = settings.model.require_api_key("model").map_err(setup_error)?;
        let provider = ApiProvider::from_provider(&settings.model.provider).map_err(setup_error)?;
        let mut model_config = ApiLanguageModelConfig::new(provider, model_key, &settings.model.model)
            .with_timeout(Duration::from_millis(pipeline.model_timeout_ms))
            .with_stop([OBSERVATION_STOP]);
        if let Some(url) = &settings.model.api_base_url {
            model_config = model_config.with_base_url(url);
        }
        let model = ApiLanguageModel::new(model_config).map_err(setup_error)?;

        let vision_key = settings.vision.require_api_key("vision").map_err(setup_error)?;
        let vision_provider =
            ApiProvider::from_provider(&settings.vision.provider).map_err(setup_error)?;
        let mut vision_config =
            ApiImageDescriberConfig::new(vision_provider, vision_key, &settings.vision.model)
                .with_timeout(Duration::from_millis(pipeline.description_timeout_ms));
        if let Some(url) = &settings.vision.api_base_url {
            vision_config = vision_config.with_base_url(url);
        }
        let describer = ApiImageDescriber::new(vision_config).map_err(setup_error)?;

        info!(
            model = %settings.model.model,
            vision = %settings.vision.model,
            embedding = %settings.embedding.model,
            backend = ?settings.vector.backend,
            "Pipeline ready"
        );

        Ok(Orchestrator::new(
            Arc::new(describer),
            Arc::new(retriever),
            Arc::new(model),
            PipelineConfig::from_settings(pipeline),
        ))
    }
}

fn build_embedder(settings: &Settings) -> Result<Arc<dyn EmbeddingProvider>, PipelineError> {
    let section = &settings.embedding;
    let key = section.require_api_key("embedding").map_err(setup_error)?;
    let api = EmbeddingApi::from_provider(&section.provider).map_err(setup_error)?;

    let mut config = ApiEmbedderConfig::new(api, key, &section.model, settings.vector.dimension)
        .with_timeout(Duration::from_millis(settings.pipeline.embedding_timeout_ms));
    if let Some(url) = &section.api_base_url {
        config = config.with_base_url(url);
    }

    Ok(Arc::new(ApiEmbedder::new(config).map_err(setup_error)?))
}

async fn build_index(
    settings: &Settings,
    embedder: &dyn EmbeddingProvider,
) -> Result<Arc<dyn VectorIndex>, PipelineError> {
    let vector = &settings.vector;
    match vector.backend {
        VectorBackend::Milvus => {
            let mut config = MilvusConfig::new(&vector.endpoint, &vector.collection, vector.dimension)
                .with_metric(vector.metric)
                .with_vector_field(&vector.vector_field)
                .with_timeout(Duration::from_millis(settings.pipeline.vector_timeout_ms));
            if let Some(token) = &vector.token {
                config = config.with_token(token);
            }
            Ok(Arc::new(MilvusIndex::new(config).map_err(setup_error)?))
        }
        VectorBackend::Flat => {
            let path = vector
                .documents_path
                .as_deref()
                .ok_or_else(|| setup_error("vector.documents_path is required for the flat backend"))?;
            let index = FlatIndex::load_json(path, vector.metric, embedder)
                .await
                .map_err(setup_error)?;
            Ok(Arc::new(index))
        }
    }
}
