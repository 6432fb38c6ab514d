//! Per-request retrieval configuration.
//!
//! A `RetrievalConfig` is built once per request from the process-wide
//! `RetrievalSettings` with the request's overrides layered on top, and is
//! read-only afterwards.

use std::collections::BTreeMap;
use std::time::Duration;
use velosight_core::config::{AssemblyMode, RetrievalSettings, SourceSettings};
use velosight_core::{AppError, AppResult};

/// Resolved settings for one source.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceConfig {
    name: String,
    k: usize,
    weight: f32,
    budget_share: f32,
    scoped: bool,
}

impl SourceConfig {
    /// Source name, also the citation prefix.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Result count requested from the source and inclusion limit.
    pub fn k(&self) -> usize {
        self.k
    }

    /// Relevance multiplier for weighted assembly.
    pub fn weight(&self) -> f32 {
        self.weight
    }

    /// Fraction of the global budget reserved in weighted assembly.
    pub fn budget_share(&self) -> f32 {
        self.budget_share
    }

    /// Whether the request's source identifier narrows this source.
    pub fn scoped(&self) -> bool {
        self.scoped
    }

    /// Character sub-budget for this source given the global budget.
    pub fn sub_budget(&self, max_chars: usize) -> usize {
        (max_chars as f64 * self.budget_share as f64).floor() as usize
    }
}

impl From<&SourceSettings> for SourceConfig {
    fn from(settings: &SourceSettings) -> Self {
        Self {
            name: settings.name.clone(),
            k: settings.k,
            weight: settings.weight,
            budget_share: settings.budget_share,
            scoped: settings.scoped,
        }
    }
}

/// Request-level overrides.
#[derive(Debug, Clone, Default)]
pub struct RetrievalOverrides {
    /// Per-source result counts
    pub k: BTreeMap<String, usize>,

    /// Global character budget
    pub max_context_chars: Option<usize>,

    /// Weighted score floor
    pub min_score: Option<f32>,

    /// Assembly policy
    pub assembly: Option<AssemblyMode>,
}

impl RetrievalOverrides {
    /// Create an empty override set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Override one source's result count.
    pub fn with_k(mut self, source: impl Into<String>, k: usize) -> Self {
        self.k.insert(source.into(), k);
        self
    }

    /// Override the global character budget.
    pub fn with_max_context_chars(mut self, max_chars: usize) -> Self {
        self.max_context_chars = Some(max_chars);
        self
    }

    /// Override the score floor.
    pub fn with_min_score(mut self, min_score: f32) -> Self {
        self.min_score = Some(min_score);
        self
    }

    /// Override the assembly policy.
    pub fn with_assembly(mut self, assembly: AssemblyMode) -> Self {
        self.assembly = Some(assembly);
        self
    }
}

/// Immutable retrieval configuration for one request.
#[derive(Debug, Clone)]
pub struct RetrievalConfig {
    sources: Vec<SourceConfig>,
    min_score: f32,
    max_context_chars: usize,
    assembly: AssemblyMode,
    deadline: Duration,
}

impl RetrievalConfig {
    /// Build from process-wide settings.
    pub fn from_settings(settings: &RetrievalSettings) -> Self {
        Self {
            sources: settings.sources.iter().map(SourceConfig::from).collect(),
            min_score: settings.min_score,
            max_context_chars: settings.max_context_chars,
            assembly: settings.assembly,
            deadline: Duration::from_millis(settings.deadline_ms),
        }
    }

    /// Layer request overrides on top.
    ///
    /// Overrides naming an unknown source are ignored with a warning.
    pub fn with_overrides(mut self, overrides: &RetrievalOverrides) -> AppResult<Self> {
        for (name, k) in &overrides.k {
            match self.sources.iter_mut().find(|s| &s.name == name) {
                Some(source) => source.k = *k,
                None => tracing::warn!(source = %name, "Ignoring k override for unknown source"),
            }
        }

        if let Some(max_chars) = overrides.max_context_chars {
            if max_chars == 0 {
                return Err(AppError::InvalidRequest(
                    "max context characters must be greater than zero".to_string(),
                ));
            }
            self.max_context_chars = max_chars;
        }

        if let Some(min_score) = overrides.min_score {
            if !min_score.is_finite() {
                return Err(AppError::InvalidRequest(format!(
                    "min score must be a finite number, got {}",
                    min_score
                )));
            }
            self.min_score = min_score;
        }

        if let Some(assembly) = overrides.assembly {
            self.assembly = assembly;
        }

        Ok(self)
    }

    /// Sources in priority order.
    pub fn sources(&self) -> &[SourceConfig] {
        &self.sources
    }

    /// Look up one source by name.
    pub fn source(&self, name: &str) -> Option<&SourceConfig> {
        self.sources.iter().find(|s| s.name == name)
    }

    /// Weighted score floor.
    pub fn min_score(&self) -> f32 {
        self.min_score
    }

    /// Global character budget.
    pub fn max_context_chars(&self) -> usize {
        self.max_context_chars
    }

    /// Assembly policy.
    pub fn assembly(&self) -> AssemblyMode {
        self.assembly
    }

    /// Shared deadline for the retrieval fan-out.
    pub fn deadline(&self) -> Duration {
        self.deadline
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self::from_settings(&RetrievalSettings::default())
    }
}
