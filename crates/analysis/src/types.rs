//! Request and response types for the analysis pipeline.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use velosight_core::config::AssemblyMode;
use velosight_core::{AppError, AppResult};
use velosight_knowledge::{Chunk, RetrievalOverrides};

/// Caller-supplied identifiers echoed back in the result, never interpreted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis_type: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway_type: Option<String>,

    #[serde(rename = "project_id", skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
}

/// A request to analyse one question.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRequest {
    /// Question text; may be empty only when a definition is named
    #[serde(default)]
    pub query: String,

    /// Scopes project-bound sources when it is a UUID
    #[serde(default)]
    pub source_identifier: Option<String>,

    /// Per-source result count overrides
    #[serde(default)]
    pub k: BTreeMap<String, usize>,

    #[serde(default)]
    pub max_context_chars: Option<usize>,

    #[serde(default)]
    pub min_score: Option<f32>,

    #[serde(default)]
    pub assembly: Option<AssemblyMode>,

    /// Replaces the system instructions
    #[serde(default)]
    pub system: Option<String>,

    /// Analysis definition key
    #[serde(default)]
    pub definition: Option<String>,

    #[serde(default)]
    pub subtype: Option<String>,

    #[serde(default)]
    pub meta: RequestMeta,
}

impl AnalysisRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Self::default()
        }
    }

    pub fn with_source_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.source_identifier = Some(identifier.into());
        self
    }

    pub fn with_k(mut self, source: impl Into<String>, k: usize) -> Self {
        self.k.insert(source.into(), k);
        self
    }

    pub fn with_max_context_chars(mut self, max_chars: usize) -> Self {
        self.max_context_chars = Some(max_chars);
        self
    }

    pub fn with_min_score(mut self, min_score: f32) -> Self {
        self.min_score = Some(min_score);
        self
    }

    pub fn with_assembly(mut self, assembly: AssemblyMode) -> Self {
        self.assembly = Some(assembly);
        self
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_definition(mut self, key: impl Into<String>) -> Self {
        self.definition = Some(key.into());
        self
    }

    pub fn with_subtype(mut self, subtype: impl Into<String>) -> Self {
        self.subtype = Some(subtype.into());
        self
    }

    pub fn with_meta(mut self, meta: RequestMeta) -> Self {
        self.meta = meta;
        self
    }

    /// Reject requests the pipeline cannot run.
    pub fn validate(&self) -> AppResult<()> {
        if self.query.trim().is_empty() && self.definition.is_none() {
            return Err(AppError::InvalidRequest(
                "Query text is required".to_string(),
            ));
        }

        if let Some(system) = &self.system {
            if system.trim().is_empty() {
                return Err(AppError::InvalidRequest(
                    "System instruction override cannot be empty".to_string(),
                ));
            }
        }

        Ok(())
    }

    /// Retrieval overrides carried by this request.
    pub fn overrides(&self) -> RetrievalOverrides {
        let mut overrides = RetrievalOverrides::new();
        for (source, k) in &self.k {
            overrides = overrides.with_k(source.clone(), *k);
        }
        if let Some(max_chars) = self.max_context_chars {
            overrides = overrides.with_max_context_chars(max_chars);
        }
        if let Some(min_score) = self.min_score {
            overrides = overrides.with_min_score(min_score);
        }
        if let Some(assembly) = self.assembly {
            overrides = overrides.with_assembly(assembly);
        }
        overrides
    }
}

/// Per-source summary in the result metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceReport {
    pub name: String,
    /// "ok", "failed" or "timedOut"
    pub status: String,
    pub returned: usize,
    pub used: usize,
}

/// Ratings lifted from well-known output paths.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Highlights {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub overall_rating: Option<String>,
}

/// Result metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultMeta {
    #[serde(flatten)]
    pub request: RequestMeta,

    pub request_id: String,

    pub generated_at: chrono::DateTime<chrono::Utc>,

    pub model: String,

    pub sources: Vec<SourceReport>,

    /// Whether the context was cut to fit the budget
    pub context_truncated: bool,

    /// Whether the repair attempt was needed
    pub repaired: bool,

    pub highlights: Highlights,
}

/// The response to one analysis request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub meta: ResultMeta,

    /// Validated structured payload
    pub output: Value,

    /// Chunks whose text formed the context, in context order
    pub used_chunks: Vec<Chunk>,

    /// Exact JSON substring accepted from the model
    pub raw_text: String,
}

/// Serializable view of a fatal error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorReport {
    pub kind: String,
    pub detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_text: Option<String>,
}

impl From<&AppError> for ErrorReport {
    fn from(err: &AppError) -> Self {
        Self {
            kind: err.kind().to_string(),
            detail: err.to_string(),
            raw_text: err.raw_text().map(str::to_string),
        }
    }
}

/// Liveness answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
}

impl HealthStatus {
    pub fn ok() -> Self {
        Self {
            status: "ok".to_string(),
        }
    }
}
