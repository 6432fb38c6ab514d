//! In-memory search backend over a pre-embedded corpus.
//!
//! The corpus is JSONL, one record per line:
//! `{"source": "project", "id": "p1", "content": "...", "metadata": {...}, "embedding": [...]}`.
//! Records without an embedding are embedded at load time.

use super::{SearchBackend, SearchFilters};
use crate::chunk::Chunk;
use crate::embeddings::EmbeddingProvider;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::path::Path;
use velosight_core::{AppError, AppResult};

#[derive(Debug, Clone, Deserialize)]
struct CorpusRecord {
    source: String,
    id: Value,
    content: String,
    #[serde(default)]
    metadata: Map<String, Value>,
    #[serde(default)]
    embedding: Option<Vec<f32>>,
}

#[derive(Debug, Clone)]
struct IndexedChunk {
    source: String,
    id: String,
    content: String,
    metadata: Map<String, Value>,
    embedding: Vec<f32>,
}

/// Brute-force cosine similarity index held in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryIndex {
    entries: Vec<IndexedChunk>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one pre-embedded chunk.
    pub fn insert(
        &mut self,
        source: impl Into<String>,
        id: impl Into<String>,
        content: impl Into<String>,
        metadata: Map<String, Value>,
        embedding: Vec<f32>,
    ) {
        self.entries.push(IndexedChunk {
            source: source.into(),
            id: id.into(),
            content: content.into(),
            metadata,
            embedding,
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Load a JSONL corpus file, embedding records that carry no vector.
    pub async fn load_jsonl(path: &Path, embedder: &dyn EmbeddingProvider) -> AppResult<Self> {
        let text = tokio::fs::read_to_string(path).await.map_err(|e| {
            AppError::Config(format!("Failed to read corpus {:?}: {}", path, e))
        })?;
        let index = Self::from_jsonl_str(&text, embedder).await?;

        tracing::info!(path = ?path, chunks = index.len(), "Loaded in-memory corpus");
        Ok(index)
    }

    /// Parse JSONL corpus text, embedding records that carry no vector.
    pub async fn from_jsonl_str(text: &str, embedder: &dyn EmbeddingProvider) -> AppResult<Self> {
        let mut records = Vec::new();
        for (line_num, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let record: CorpusRecord = serde_json::from_str(line).map_err(|e| {
                AppError::Serialization(format!(
                    "Failed to parse corpus line {}: {}",
                    line_num + 1,
                    e
                ))
            })?;
            records.push(record);
        }

        let missing: Vec<String> = records
            .iter()
            .filter(|r| r.embedding.is_none())
            .map(|r| r.content.clone())
            .collect();
        let mut computed = embedder.embed_batch(&missing).await?.into_iter();

        let mut index = Self::new();
        for record in records {
            let embedding = match record.embedding {
                Some(embedding) => embedding,
                None => computed.next().ok_or_else(|| {
                    AppError::Embedding("Embedding provider returned too few vectors".to_string())
                })?,
            };
            let id = match record.id {
                Value::String(s) => s,
                other => other.to_string(),
            };
            index.insert(record.source, id, record.content, record.metadata, embedding);
        }

        Ok(index)
    }
}

#[async_trait::async_trait]
impl SearchBackend for InMemoryIndex {
    fn backend_name(&self) -> &str {
        "memory"
    }

    async fn search(
        &self,
        source: &str,
        vector: &[f32],
        k: usize,
        filters: &SearchFilters,
    ) -> AppResult<Vec<Chunk>> {
        let mut scored: Vec<(&IndexedChunk, f32)> = self
            .entries
            .iter()
            .filter(|entry| entry.source == source && filters.matches(&entry.metadata))
            .map(|entry| (entry, cosine_similarity(vector, &entry.embedding)))
            .collect();

        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(entry, similarity)| Chunk {
                id: entry.id.clone(),
                content: entry.content.clone(),
                metadata: entry.metadata.clone(),
                similarity,
                source: entry.source.clone(),
            })
            .collect())
    }
}

/// Calculate cosine similarity between two vectors.
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}
