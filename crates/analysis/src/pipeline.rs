//! The analysis pipeline.
//!
//! `AnalysisPipeline` owns shared, read-only handles to the embedding,
//! search and generation backends. Each call to [`AnalysisPipeline::analyse`]
//! builds its own retrieval configuration and holds no state across
//! requests, so one pipeline can serve concurrent requests.

use crate::envelope::build_envelope;
use crate::generate::{generate_structured, GenerationOptions};
use crate::types::{AnalysisRequest, AnalysisResult, HealthStatus};
use crate::validator::ExpectedShape;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::Instrument;
use velosight_core::config::RetrievalSettings;
use velosight_core::{AppConfig, AppError, AppResult};
use velosight_knowledge::rag::MAX_CITATION_KEYS;
use velosight_knowledge::{
    create_provider, gather_context, EmbeddingProvider, RetrievalConfig, RpcSearchBackend,
    SearchBackend,
};
use velosight_llm::{create_client, LlmClient};
use velosight_prompt::{
    load_definition, render_task, AnalysisDefinition, PromptBuilder, TaskVariables,
    DEFAULT_SYSTEM_INSTRUCTIONS, DEFAULT_TASK_TEMPLATE,
};

/// Retrieval, assembly, generation and validation for one question.
pub struct AnalysisPipeline {
    embedder: Arc<dyn EmbeddingProvider>,
    backend: Arc<dyn SearchBackend>,
    llm: Arc<dyn LlmClient>,
    retrieval: RetrievalSettings,
    generation: GenerationOptions,
    dimensions: usize,
    workspace: PathBuf,
}

impl AnalysisPipeline {
    /// Build a pipeline from explicit service handles.
    pub fn new(
        config: &AppConfig,
        embedder: Arc<dyn EmbeddingProvider>,
        backend: Arc<dyn SearchBackend>,
        llm: Arc<dyn LlmClient>,
    ) -> Self {
        Self {
            embedder,
            backend,
            llm,
            retrieval: config.retrieval.clone(),
            generation: GenerationOptions::from_settings(&config.generation),
            dimensions: config.embedding.dimensions,
            workspace: config.workspace.clone(),
        }
    }

    /// Build a pipeline with the configured providers and the RPC search
    /// backend.
    pub fn from_config(config: &AppConfig) -> AppResult<Self> {
        let backend = RpcSearchBackend::new(&config.search, config.resolve_search_key())?;
        Self::with_backend(config, Arc::new(backend))
    }

    /// Build a pipeline with the configured providers and a given search
    /// backend.
    pub fn with_backend(config: &AppConfig, backend: Arc<dyn SearchBackend>) -> AppResult<Self> {
        config.validate()?;

        let embedder = create_provider(&config.embedding)?;
        let api_key = config.resolve_generation_key();
        let llm = create_client(
            &config.generation.provider,
            config.generation.endpoint.as_deref(),
            api_key.as_deref(),
        )
        .map_err(AppError::Config)?;

        tracing::debug!(
            embedder = embedder.provider_name(),
            search = backend.backend_name(),
            llm = llm.provider_name(),
            "Analysis pipeline ready"
        );

        Ok(Self::new(config, embedder, backend, llm))
    }

    /// Liveness only; no dependency checks.
    pub fn health(&self) -> HealthStatus {
        HealthStatus::ok()
    }

    /// Run one analysis request end to end.
    pub async fn analyse(&self, request: &AnalysisRequest) -> AppResult<AnalysisResult> {
        let request_id = uuid::Uuid::new_v4().to_string();
        let span = tracing::info_span!("analyse", request_id = %request_id);

        async {
            let result = self.run(request, &request_id).await;
            match &result {
                Ok(r) => tracing::info!(
                    used = r.used_chunks.len(),
                    repaired = r.meta.repaired,
                    "Analysis complete"
                ),
                Err(e) => tracing::error!(kind = e.kind(), "Analysis failed: {}", e),
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn run(&self, request: &AnalysisRequest, request_id: &str) -> AppResult<AnalysisResult> {
        request.validate()?;

        let definition = request
            .definition
            .as_deref()
            .map(|key| load_definition(&self.workspace, key))
            .transpose()?;
        if let Some(definition) = &definition {
            definition.check_subtype(request.subtype.as_deref())?;
        }

        let query = match &definition {
            Some(definition) => definition.resolve_query(Some(&request.query)),
            None => request.query.trim().to_string(),
        };

        let config = RetrievalConfig::from_settings(&self.retrieval)
            .with_overrides(&request.overrides())?;

        let gathered = gather_context(
            self.embedder.as_ref(),
            self.backend.as_ref(),
            &config,
            self.dimensions,
            &query,
            request.source_identifier.as_deref(),
        )
        .await?;

        if gathered.retrieval.all_failed() {
            tracing::warn!("Every source failed, generating without evidence");
        }

        let task = render_task(
            definition
                .as_ref()
                .map(|d| d.user_prompt_template.as_str())
                .unwrap_or(DEFAULT_TASK_TEMPLATE),
            &task_variables(request, definition.as_ref(), &query),
        )?;

        let system = request
            .system
            .as_deref()
            .or(definition.as_ref().map(|d| d.system_prompt.as_str()))
            .unwrap_or(DEFAULT_SYSTEM_INSTRUCTIONS);

        let schema = definition.as_ref().and_then(|d| d.output_schema.as_ref());
        let shape = schema.map(ExpectedShape::from_schema).unwrap_or_default();

        let citation_keys = gathered.pack.citation_keys(MAX_CITATION_KEYS);
        let prompt = PromptBuilder::new(system, &task)
            .question(&query)
            .citation_keys(&citation_keys)
            .output_schema(schema)
            .build(&gathered.pack);

        tracing::debug!(
            context_chars = prompt.metadata.context_chars,
            citations = prompt.metadata.citation_keys.len(),
            "Prompt built"
        );

        let output = generate_structured(
            self.llm.as_ref(),
            &self.generation,
            &prompt.system,
            &prompt.user,
            &shape,
        )
        .await?;

        Ok(build_envelope(
            request.meta.clone(),
            request_id,
            chrono::Utc::now(),
            &gathered.retrieval,
            &gathered.pack,
            output,
        ))
    }
}

fn task_variables(
    request: &AnalysisRequest,
    definition: Option<&AnalysisDefinition>,
    query: &str,
) -> TaskVariables {
    TaskVariables {
        query: query.to_string(),
        subtype: request.subtype.clone().unwrap_or_default(),
        project: request
            .source_identifier
            .clone()
            .or_else(|| request.meta.project_id.clone())
            .unwrap_or_else(|| "unspecified".to_string()),
        analysis: definition
            .map(|d| d.name.clone())
            .or_else(|| request.meta.analysis_type.clone())
            .unwrap_or_default(),
    }
}
