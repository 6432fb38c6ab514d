//! Evidence retrieval for VeloSight.
//!
//! Embeds the question, fans out to every configured source, ranks and
//! deduplicates each source's chunks, and assembles a budgeted context with
//! traceable citations.

pub mod chunk;
pub mod config;
pub mod embeddings;
pub mod rag;
pub mod search;

#[cfg(test)]
mod tests;

// Re-export commonly used types
pub use chunk::{Chunk, CitationRef};
pub use config::{RetrievalConfig, RetrievalOverrides, SourceConfig};
pub use embeddings::{create_provider, embed_query, EmbeddingProvider};
pub use rag::{assemble, retrieve, ContextPack, RetrievalOutcome, SourceSpec, SourceStatus};
pub use search::{InMemoryIndex, RpcSearchBackend, SearchBackend, SearchFilters};

use std::time::Instant;
use velosight_core::AppResult;

/// Interpret a caller's source identifier as a project scope.
///
/// Only UUID-shaped identifiers scope a search; anything else is treated as
/// unscoped and logged.
pub fn project_scope(identifier: Option<&str>) -> Option<uuid::Uuid> {
    let raw = identifier.map(str::trim).filter(|s| !s.is_empty())?;
    match uuid::Uuid::parse_str(raw) {
        Ok(id) => Some(id),
        Err(_) => {
            tracing::debug!(
                identifier = raw,
                "Source identifier is not a UUID, searching unscoped"
            );
            None
        }
    }
}

/// Build one `SourceSpec` per configured source, in priority order.
pub fn source_specs(config: &RetrievalConfig, project: Option<uuid::Uuid>) -> Vec<SourceSpec> {
    config
        .sources()
        .iter()
        .map(|source| {
            let filters = if source.scoped() {
                SearchFilters::new().with_project(project)
            } else {
                SearchFilters::new()
            };
            SourceSpec::new(source.name(), source.k()).with_filters(filters)
        })
        .collect()
}

/// Retrieved evidence for one question.
#[derive(Debug, Clone)]
pub struct GatheredContext {
    pub retrieval: RetrievalOutcome,
    pub pack: ContextPack,
}

/// Embed `query`, retrieve from every source, and assemble the context.
///
/// Fails only when the query cannot be embedded. Source failures degrade the
/// context instead.
pub async fn gather_context(
    embedder: &dyn EmbeddingProvider,
    backend: &dyn SearchBackend,
    config: &RetrievalConfig,
    expected_dimensions: usize,
    query: &str,
    source_identifier: Option<&str>,
) -> AppResult<GatheredContext> {
    let start = Instant::now();

    let vector = embed_query(embedder, query, expected_dimensions).await?;
    let specs = source_specs(config, project_scope(source_identifier));
    let retrieval = retrieve(backend, &vector, &specs, config.deadline()).await;
    let pack = assemble(config, &retrieval);

    tracing::info!(
        sources = specs.len(),
        retrieved = retrieval.total_chunks(),
        used = pack.used.len(),
        chars = pack.context_text.chars().count(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Context gathered"
    );

    Ok(GatheredContext { retrieval, pack })
}
