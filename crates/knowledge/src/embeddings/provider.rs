//! Embedding provider trait and factory.

use super::providers::{OllamaEmbedder, TrigramProvider};
use std::sync::Arc;
use velosight_core::config::EmbeddingSettings;
use velosight_core::{AppError, AppResult};

/// Trait for embedding providers.
#[async_trait::async_trait]
pub trait EmbeddingProvider: Send + Sync + std::fmt::Debug {
    /// Get provider name (e.g., "trigram", "ollama")
    fn provider_name(&self) -> &str;

    /// Get model identifier
    fn model_name(&self) -> &str;

    /// Get embedding dimensions
    fn dimensions(&self) -> usize;

    /// Generate embeddings for multiple texts in a batch.
    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>>;

    /// Generate embedding for a single text (convenience method).
    async fn embed(&self, text: &str) -> AppResult<Vec<f32>> {
        let mut results = self.embed_batch(&[text.to_string()]).await?;
        results
            .pop()
            .ok_or_else(|| AppError::Embedding("No embedding returned".to_string()))
    }
}

/// Create an embedding provider from settings.
pub fn create_provider(settings: &EmbeddingSettings) -> AppResult<Arc<dyn EmbeddingProvider>> {
    match settings.provider.to_lowercase().as_str() {
        "trigram" => Ok(Arc::new(TrigramProvider::new(settings.dimensions))),

        "ollama" => {
            let provider = match &settings.endpoint {
                Some(endpoint) => OllamaEmbedder::with_base_url(
                    endpoint,
                    &settings.model,
                    settings.dimensions,
                )?,
                None => OllamaEmbedder::new(&settings.model, settings.dimensions)?,
            };
            Ok(Arc::new(provider))
        }

        _ => Err(AppError::Config(format!(
            "Unknown embedding provider: '{}'. Supported providers: trigram, ollama",
            settings.provider
        ))),
    }
}

/// Embed a query and verify it has the expected dimension.
///
/// Fails with `AppError::Embedding` on a dimension mismatch.
pub async fn embed_query(
    provider: &dyn EmbeddingProvider,
    text: &str,
    expected_dimensions: usize,
) -> AppResult<Vec<f32>> {
    let vector = provider.embed(text).await?;

    if vector.len() != expected_dimensions {
        return Err(AppError::Embedding(format!(
            "Embedding dimension mismatch: {} returned {}, expected {}",
            provider.provider_name(),
            vector.len(),
            expected_dimensions
        )));
    }

    Ok(vector)
}
