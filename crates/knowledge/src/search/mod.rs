//! Vector search backends.
//!
//! A backend answers `search(source, vector, k, filters)` with chunks ranked
//! by similarity. Failures are per source and surface as
//! `AppError::Retrieval`; the coordinator decides what to do with them.

pub mod memory;
pub mod rpc;

pub use memory::InMemoryIndex;
pub use rpc::RpcSearchBackend;

use crate::chunk::Chunk;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use velosight_core::AppResult;

/// Filter key carrying the project scope.
pub const PROJECT_FILTER: &str = "project_id";

/// Source-specific search filters.
///
/// Keys map to backend parameters. A `null` value means "unscoped" and never
/// excludes anything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchFilters(BTreeMap<String, Value>);

impl SearchFilters {
    /// Create a new empty filter set
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one filter
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Scope to a project, or explicitly unscoped when `None`
    pub fn with_project(self, project_id: Option<uuid::Uuid>) -> Self {
        let value = project_id
            .map(|id| Value::String(id.to_string()))
            .unwrap_or(Value::Null);
        self.with(PROJECT_FILTER, value)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Check whether chunk metadata satisfies every non-null filter.
    pub fn matches(&self, metadata: &Map<String, Value>) -> bool {
        self.0
            .iter()
            .filter(|(_, expected)| !expected.is_null())
            .all(|(key, expected)| metadata.get(key) == Some(expected))
    }
}

/// Trait for vector search backends.
#[async_trait::async_trait]
pub trait SearchBackend: Send + Sync {
    /// Backend name for logs (e.g., "rpc", "memory")
    fn backend_name(&self) -> &str;

    /// Return up to `k` chunks from `source`, most similar first.
    async fn search(
        &self,
        source: &str,
        vector: &[f32],
        k: usize,
        filters: &SearchFilters,
    ) -> AppResult<Vec<Chunk>>;
}
