//! Retrieval fan-out across named sources.
//!
//! All source queries run concurrently under one shared deadline. A source
//! that fails or misses the deadline contributes nothing; it never aborts
//! its siblings.

use crate::chunk::Chunk;
use crate::search::{SearchBackend, SearchFilters};
use futures::future::join_all;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Stand-in deadline when `now + deadline` is not representable.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// One source query.
#[derive(Debug, Clone)]
pub struct SourceSpec {
    /// Source name, also the citation prefix
    pub name: String,

    /// Result count to request
    pub k: usize,

    /// Source-specific filters
    pub filters: SearchFilters,
}

impl SourceSpec {
    pub fn new(name: impl Into<String>, k: usize) -> Self {
        Self {
            name: name.into(),
            k,
            filters: SearchFilters::new(),
        }
    }

    pub fn with_filters(mut self, filters: SearchFilters) -> Self {
        self.filters = filters;
        self
    }
}

/// How a source call ended.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceStatus {
    Ok,
    Failed(String),
    TimedOut,
}

impl SourceStatus {
    /// Report name: "ok", "failed" or "timedOut".
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceStatus::Ok => "ok",
            SourceStatus::Failed(_) => "failed",
            SourceStatus::TimedOut => "timedOut",
        }
    }
}

/// Result of one source call.
#[derive(Debug, Clone)]
pub struct SourceOutcome {
    pub name: String,
    pub status: SourceStatus,
    /// Chunks as ranked by the backend; empty on failure
    pub chunks: Vec<Chunk>,
    pub elapsed: Duration,
}

impl SourceOutcome {
    /// Whether the source answered in time without error.
    pub fn succeeded(&self) -> bool {
        self.status == SourceStatus::Ok
    }
}

/// Per-source results in the order the sources were requested.
#[derive(Debug, Clone, Default)]
pub struct RetrievalOutcome {
    sources: Vec<SourceOutcome>,
}

impl RetrievalOutcome {
    pub fn from_sources(sources: Vec<SourceOutcome>) -> Self {
        Self { sources }
    }

    pub fn sources(&self) -> &[SourceOutcome] {
        &self.sources
    }

    pub fn get(&self, name: &str) -> Option<&SourceOutcome> {
        self.sources.iter().find(|s| s.name == name)
    }

    /// Chunks returned by a source, empty if it failed or was not queried.
    pub fn chunks_for(&self, name: &str) -> &[Chunk] {
        self.get(name).map(|s| s.chunks.as_slice()).unwrap_or(&[])
    }

    pub fn total_chunks(&self) -> usize {
        self.sources.iter().map(|s| s.chunks.len()).sum()
    }

    /// True when at least one source was queried and none succeeded.
    pub fn all_failed(&self) -> bool {
        !self.sources.is_empty() && self.sources.iter().all(|s| !s.succeeded())
    }
}

/// Query every source concurrently and collect results.
///
/// Never fails: failed and timed-out sources are recorded with an empty
/// chunk list. Output order follows `specs`, not completion order. Chunks
/// are re-tagged with the requested source name.
pub async fn retrieve(
    backend: &dyn SearchBackend,
    vector: &[f32],
    specs: &[SourceSpec],
    deadline: Duration,
) -> RetrievalOutcome {
    let now = tokio::time::Instant::now();
    let deadline_at = now
        .checked_add(deadline)
        .unwrap_or_else(|| now + FAR_FUTURE);

    let calls = specs.iter().map(|spec| async move {
        let started = Instant::now();

        if spec.k == 0 {
            return SourceOutcome {
                name: spec.name.clone(),
                status: SourceStatus::Ok,
                chunks: Vec::new(),
                elapsed: started.elapsed(),
            };
        }

        let result = tokio::time::timeout_at(
            deadline_at,
            backend.search(&spec.name, vector, spec.k, &spec.filters),
        )
        .await;

        let (status, chunks) = match result {
            Ok(Ok(mut chunks)) => {
                for chunk in &mut chunks {
                    chunk.source.clone_from(&spec.name);
                }
                debug!(source = %spec.name, returned = chunks.len(), "Source answered");
                (SourceStatus::Ok, chunks)
            }
            Ok(Err(e)) => {
                warn!(source = %spec.name, error = %e, "Source failed, continuing without it");
                (SourceStatus::Failed(e.to_string()), Vec::new())
            }
            Err(_) => {
                warn!(
                    source = %spec.name,
                    deadline_ms = deadline.as_millis() as u64,
                    "Source missed the retrieval deadline"
                );
                (SourceStatus::TimedOut, Vec::new())
            }
        };

        SourceOutcome {
            name: spec.name.clone(),
            status,
            chunks,
            elapsed: started.elapsed(),
        }
    });

    let outcome = RetrievalOutcome::from_sources(join_all(calls).await);

    if outcome.all_failed() {
        warn!(
            backend = backend.backend_name(),
            "All retrieval sources failed, proceeding without evidence"
        );
    }

    outcome
}
