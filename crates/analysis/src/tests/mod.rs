//! Cross-stage tests with in-process fakes for every collaborator.

mod fan_out;

use crate::AnalysisPipeline;
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use velosight_core::{AppConfig, AppError, AppResult};
use velosight_knowledge::{Chunk, EmbeddingProvider, SearchBackend, SearchFilters};
use velosight_llm::{LlmClient, LlmRequest, LlmResponse, LlmUsage};

pub(crate) const DIMS: usize = 8;

/// Returns the same unit vector for every text.
#[derive(Debug)]
pub(crate) struct FixedEmbedder {
    dims: usize,
}

impl FixedEmbedder {
    pub(crate) fn new(dims: usize) -> Self {
        Self { dims }
    }
}

#[async_trait::async_trait]
impl EmbeddingProvider for FixedEmbedder {
    fn provider_name(&self) -> &str {
        "fixed"
    }

    fn model_name(&self) -> &str {
        "fixed"
    }

    fn dimensions(&self) -> usize {
        self.dims
    }

    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        let value = 1.0 / (self.dims as f32).sqrt();
        Ok(texts.iter().map(|_| vec![value; self.dims]).collect())
    }
}

/// How a fake source answers.
#[derive(Debug, Clone)]
pub(crate) enum Answer {
    Chunks(Vec<Chunk>),
    Fail(String),
    Hang,
}

/// Search backend with a scripted answer per source.
#[derive(Default)]
pub(crate) struct FakeBackend {
    answers: BTreeMap<String, Answer>,
    calls: AtomicUsize,
    filters: Mutex<Vec<(String, SearchFilters)>>,
}

impl FakeBackend {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn answer(mut self, source: &str, answer: Answer) -> Self {
        self.answers.insert(source.to_string(), answer);
        self
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn filters_for(&self, source: &str) -> Option<SearchFilters> {
        self.filters
            .lock()
            .unwrap()
            .iter()
            .find(|(name, _)| name == source)
            .map(|(_, filters)| filters.clone())
    }
}

#[async_trait::async_trait]
impl SearchBackend for FakeBackend {
    fn backend_name(&self) -> &str {
        "fake"
    }

    async fn search(
        &self,
        source: &str,
        _vector: &[f32],
        k: usize,
        filters: &SearchFilters,
    ) -> AppResult<Vec<Chunk>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.filters
            .lock()
            .unwrap()
            .push((source.to_string(), filters.clone()));

        match self.answers.get(source) {
            Some(Answer::Chunks(chunks)) => Ok(chunks.iter().take(k).cloned().collect()),
            Some(Answer::Fail(message)) => Err(AppError::retrieval(source, message.clone())),
            Some(Answer::Hang) => std::future::pending().await,
            None => Ok(Vec::new()),
        }
    }
}

/// Generation client replaying scripted replies.
///
/// Once the script runs out it answers with a small valid object.
#[derive(Default)]
pub(crate) struct ScriptedLlm {
    replies: Mutex<VecDeque<String>>,
    prompts: Mutex<Vec<LlmRequest>>,
}

impl ScriptedLlm {
    pub(crate) fn new(replies: &[&str]) -> Self {
        Self {
            replies: Mutex::new(replies.iter().map(|r| r.to_string()).collect()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub(crate) fn requests(&self) -> Vec<LlmRequest> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl LlmClient for ScriptedLlm {
    fn provider_name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse> {
        self.prompts.lock().unwrap().push(request.clone());
        let content = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| r#"{"summary": "ok", "citations": []}"#.to_string());

        Ok(LlmResponse {
            content,
            model: request.model.clone(),
            usage: LlmUsage::new(100, 20),
            done: true,
        })
    }
}

/// One chunk per score, with distinct content of at least `content_chars`.
pub(crate) fn ranked(source: &str, scores: &[f32], content_chars: usize) -> Vec<Chunk> {
    scores
        .iter()
        .enumerate()
        .map(|(i, score)| {
            let body = format!("{} evidence item {} ", source, i);
            let content: String = body
                .chars()
                .cycle()
                .take(content_chars.max(body.len()))
                .collect();
            Chunk::new(source, format!("{}{}", &source[..1], i + 1), content, *score)
        })
        .collect()
}

pub(crate) fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.embedding.dimensions = DIMS;
    config.retrieval.deadline_ms = 200;
    config
}

pub(crate) fn pipeline_with(
    config: &AppConfig,
    backend: Arc<FakeBackend>,
    llm: Arc<ScriptedLlm>,
) -> AnalysisPipeline {
    AnalysisPipeline::new(config, Arc::new(FixedEmbedder::new(DIMS)), backend, llm)
}
