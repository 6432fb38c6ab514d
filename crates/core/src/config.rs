//! Configuration management for VeloSight.
//!
//! This module handles loading and merging configuration from multiple sources:
//! - Built-in defaults
//! - Config files (.velosight/config.yaml)
//! - Environment variables
//! - Command-line flags
//!
//! Later sources win. The result is process-wide and read-only; per-request
//! retrieval settings are layered on top of it by the knowledge crate.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{AppError, AppResult};

/// Generation providers this build can talk to.
pub const KNOWN_GENERATION_PROVIDERS: [&str; 2] = ["ollama", "openai"];

/// Embedding providers this build can talk to.
pub const KNOWN_EMBEDDING_PROVIDERS: [&str; 2] = ["trigram", "ollama"];

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to the workspace root (contains .velosight/)
    pub workspace: PathBuf,

    /// Optional config file path
    pub config_file: Option<PathBuf>,

    /// Log level override
    pub log_level: Option<String>,

    /// Verbose mode (enables debug logging)
    pub verbose: bool,

    /// Disable colored output
    pub no_color: bool,

    /// Emit logs as JSON lines
    pub log_json: bool,

    /// Generative model backend
    pub generation: GenerationSettings,

    /// Query embedding backend
    pub embedding: EmbeddingSettings,

    /// Vector search backend
    pub search: SearchSettings,

    /// Process-wide retrieval defaults
    pub retrieval: RetrievalSettings,
}

/// Generative backend settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GenerationSettings {
    /// "ollama" or "openai" (any OpenAI-compatible chat endpoint)
    pub provider: String,

    /// Base URL override
    pub endpoint: Option<String>,

    /// Model identifier
    pub model: String,

    /// Environment variable holding the API key
    pub api_key_env: Option<String>,

    /// Sampling temperature for free-text generation
    pub temperature: f32,

    /// Sampling temperature when structured output is requested
    pub json_temperature: f32,

    /// Maximum tokens to generate
    pub max_tokens: Option<u32>,

    /// Timeout for a single generation call
    pub timeout_secs: u64,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            endpoint: None,
            model: "llama3".to_string(),
            api_key_env: None,
            temperature: 0.2,
            json_temperature: 0.0,
            max_tokens: Some(1200),
            timeout_secs: 120,
        }
    }
}

/// Embedding backend settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EmbeddingSettings {
    /// "trigram" (offline) or "ollama"
    pub provider: String,

    /// Embedding model identifier
    pub model: String,

    /// Base URL override
    pub endpoint: Option<String>,

    /// Expected vector dimension
    pub dimensions: usize,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: "trigram".to_string(),
            model: "trigram-v1".to_string(),
            endpoint: None,
            dimensions: 384,
        }
    }
}

/// One RPC route used by the search backend for a source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcRoute {
    /// RPC function name
    pub function: String,

    /// Fixed parameters merged into every call
    #[serde(default)]
    pub params: Map<String, Value>,
}

impl RpcRoute {
    fn new(function: &str, params: &[(&str, Value)]) -> Self {
        Self {
            function: function.to_string(),
            params: params
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        }
    }
}

/// Vector search backend settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SearchSettings {
    /// Base URL of the RPC endpoint
    pub endpoint: String,

    /// Environment variable holding the service key
    pub api_key_env: String,

    /// Per-call HTTP timeout
    pub timeout_secs: u64,

    /// Source name to RPC route
    pub routes: BTreeMap<String, RpcRoute>,
}

impl Default for SearchSettings {
    fn default() -> Self {
        let mut routes = BTreeMap::new();
        for category in ["project", "context", "sentiment"] {
            routes.insert(
                category.to_string(),
                RpcRoute::new(
                    "match_project_chunks",
                    &[("category_filter", Value::String(category.to_string()))],
                ),
            );
        }
        routes.insert(
            "framework".to_string(),
            RpcRoute::new("match_framework_chunks", &[("material_filter", Value::Null)]),
        );

        Self {
            endpoint: "http://localhost:54321/rest/v1/rpc".to_string(),
            api_key_env: "SUPABASE_SERVICE_ROLE_KEY".to_string(),
            timeout_secs: 20,
            routes,
        }
    }
}

/// How the context assembler spends the character budget.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssemblyMode {
    /// Concatenate every source in priority order, then hard-truncate.
    #[default]
    Greedy,
    /// Weighted scores, a score floor, and a fixed sub-budget per source.
    Weighted,
}

impl AssemblyMode {
    /// Parse an assembly mode from its name.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "greedy" => Some(Self::Greedy),
            "weighted" => Some(Self::Weighted),
            _ => None,
        }
    }

    /// Canonical name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Greedy => "greedy",
            Self::Weighted => "weighted",
        }
    }
}

fn default_budget_share() -> f32 {
    0.25
}

fn default_scoped() -> bool {
    true
}

/// Per-source retrieval defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceSettings {
    /// Source name, also the citation prefix
    pub name: String,

    /// Result count requested from the source
    pub k: usize,

    /// Relevance multiplier used by weighted assembly
    #[serde(default = "default_weight")]
    pub weight: f32,

    /// Fraction of the character budget reserved in weighted assembly
    #[serde(default = "default_budget_share")]
    pub budget_share: f32,

    /// Whether the request's source identifier narrows this source
    #[serde(default = "default_scoped")]
    pub scoped: bool,
}

fn default_weight() -> f32 {
    1.0
}

impl SourceSettings {
    fn new(name: &str, k: usize, weight: f32, budget_share: f32, scoped: bool) -> Self {
        Self {
            name: name.to_string(),
            k,
            weight,
            budget_share,
            scoped,
        }
    }
}

/// Process-wide retrieval defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RetrievalSettings {
    /// Sources in priority order
    pub sources: Vec<SourceSettings>,

    /// Weighted score floor
    pub min_score: f32,

    /// Global character budget for the context text
    pub max_context_chars: usize,

    /// Assembly policy
    pub assembly: AssemblyMode,

    /// Shared deadline for the whole retrieval fan-out
    pub deadline_ms: u64,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            sources: vec![
                SourceSettings::new("project", 5, 1.0, 0.25, true),
                SourceSettings::new("context", 3, 0.9, 0.25, true),
                SourceSettings::new("sentiment", 2, 0.6, 0.25, true),
                SourceSettings::new("framework", 5, 0.85, 1.0 / 3.0, false),
            ],
            min_score: 0.20,
            max_context_chars: 10_000,
            assembly: AssemblyMode::Greedy,
            deadline_ms: 8_000,
        }
    }
}

/// Full configuration file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ConfigFile {
    workspace: Option<WorkspaceConfig>,
    logging: Option<LoggingConfig>,
    generation: Option<GenerationSettings>,
    embedding: Option<EmbeddingSettings>,
    search: Option<SearchSettings>,
    retrieval: Option<RetrievalSettings>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WorkspaceConfig {
    path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LoggingConfig {
    level: Option<String>,
    color: Option<bool>,
    json: Option<bool>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            workspace: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            config_file: None,
            log_level: None,
            verbose: false,
            no_color: false,
            log_json: false,
            generation: GenerationSettings::default(),
            embedding: EmbeddingSettings::default(),
            search: SearchSettings::default(),
            retrieval: RetrievalSettings::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from defaults, the YAML file, and environment variables.
    ///
    /// Environment variables:
    /// - `VELOSIGHT_WORKSPACE`: Override workspace path
    /// - `VELOSIGHT_CONFIG`: Path to config file
    /// - `VELOSIGHT_PROVIDER`: Generation provider
    /// - `VELOSIGHT_MODEL`: Generation model
    /// - `VELOSIGHT_SEARCH_URL`: Search RPC base URL
    /// - `RUST_LOG`: Log level
    /// - `NO_COLOR`: Disable colored output
    ///
    /// # Example
    /// ```no_run
    /// use velosight_core::config::AppConfig;
    ///
    /// let config = AppConfig::load().expect("Failed to load config");
    /// println!("Workspace: {:?}", config.workspace);
    /// ```
    pub fn load() -> AppResult<Self> {
        Self::load_with(None, None)
    }

    /// Load configuration with an explicit workspace and config file.
    ///
    /// Explicit paths win over `VELOSIGHT_WORKSPACE` and `VELOSIGHT_CONFIG`.
    pub fn load_with(workspace: Option<PathBuf>, config_file: Option<PathBuf>) -> AppResult<Self> {
        let mut config = Self::default();

        let env_path = |var: &str| std::env::var(var).ok().map(PathBuf::from);

        if let Some(workspace) = workspace.or_else(|| env_path("VELOSIGHT_WORKSPACE")) {
            config.workspace = workspace;
        }

        config.config_file = config_file.or_else(|| env_path("VELOSIGHT_CONFIG"));

        if !config.workspace.exists() {
            return Err(AppError::Config(format!(
                "Workspace directory does not exist: {:?}",
                config.workspace
            )));
        }

        let config_path = config
            .config_file
            .clone()
            .unwrap_or_else(|| config.velosight_dir().join("config.yaml"));

        if config_path.exists() {
            config = config.merge_yaml(&config_path)?;
        }

        // Environment variables override YAML config
        if let Ok(provider) = std::env::var("VELOSIGHT_PROVIDER") {
            config.generation.provider = provider;
        }

        if let Ok(model) = std::env::var("VELOSIGHT_MODEL") {
            config.generation.model = model;
        }

        if let Ok(url) = std::env::var("VELOSIGHT_SEARCH_URL") {
            config.search.endpoint = url;
        }

        if let Ok(level) = std::env::var("RUST_LOG") {
            config.log_level = Some(level);
        }

        if std::env::var("NO_COLOR").is_ok() {
            config.no_color = true;
        }

        Ok(config)
    }

    /// Merge a YAML configuration file into this config.
    fn merge_yaml(&self, path: &Path) -> AppResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        self.merge_yaml_str(&contents)
            .map_err(|e| AppError::Config(format!("Failed to parse config file {:?}: {}", path, e)))
    }

    fn merge_yaml_str(&self, contents: &str) -> AppResult<Self> {
        let config_file: ConfigFile = serde_yaml::from_str(contents)?;
        let mut result = self.clone();

        if let Some(path) = config_file.workspace.and_then(|ws| ws.path) {
            result.workspace = PathBuf::from(path);
        }

        if let Some(logging) = config_file.logging {
            if let Some(level) = logging.level {
                result.log_level = Some(level);
            }
            if let Some(color) = logging.color {
                result.no_color = !color;
            }
            if let Some(json) = logging.json {
                result.log_json = json;
            }
        }

        if let Some(generation) = config_file.generation {
            result.generation = generation;
        }
        if let Some(embedding) = config_file.embedding {
            result.embedding = embedding;
        }
        if let Some(search) = config_file.search {
            result.search = search;
        }
        if let Some(retrieval) = config_file.retrieval {
            result.retrieval = retrieval;
        }

        Ok(result)
    }

    /// Apply CLI overrides to the configuration.
    ///
    /// Command-line flags take precedence over environment variables and YAML.
    #[allow(clippy::too_many_arguments)]
    pub fn with_overrides(
        mut self,
        workspace: Option<PathBuf>,
        config_file: Option<PathBuf>,
        provider: Option<String>,
        model: Option<String>,
        log_level: Option<String>,
        verbose: bool,
        no_color: bool,
        log_json: bool,
    ) -> Self {
        if let Some(workspace) = workspace {
            self.workspace = workspace;
        }

        if let Some(config_file) = config_file {
            self.config_file = Some(config_file);
        }

        if let Some(provider) = provider {
            self.generation.provider = provider;
        }

        if let Some(model) = model {
            self.generation.model = model;
        }

        if let Some(log_level) = log_level {
            self.log_level = Some(log_level);
        }

        if verbose {
            self.verbose = true;
            if self.log_level.is_none() {
                self.log_level = Some("debug".to_string());
            }
        }

        if no_color {
            self.no_color = true;
        }

        if log_json {
            self.log_json = true;
        }

        self
    }

    /// Get the path to the .velosight directory.
    pub fn velosight_dir(&self) -> PathBuf {
        self.workspace.join(".velosight")
    }

    /// Ensure the .velosight directory exists.
    pub fn ensure_velosight_dir(&self) -> AppResult<()> {
        let dir = self.velosight_dir();
        if !dir.exists() {
            std::fs::create_dir_all(&dir).map_err(|e| {
                AppError::Config(format!("Failed to create .velosight directory: {}", e))
            })?;
        }
        Ok(())
    }

    /// Resolve the generation API key from its configured environment variable.
    pub fn resolve_generation_key(&self) -> Option<String> {
        self.generation
            .api_key_env
            .as_ref()
            .and_then(|var| std::env::var(var).ok())
    }

    /// Resolve the search service key from its configured environment variable.
    pub fn resolve_search_key(&self) -> Option<String> {
        std::env::var(&self.search.api_key_env).ok()
    }

    /// Validate configuration before any backend is built.
    pub fn validate(&self) -> AppResult<()> {
        let provider = self.generation.provider.to_lowercase();
        if !KNOWN_GENERATION_PROVIDERS.contains(&provider.as_str()) {
            return Err(AppError::Config(format!(
                "Unknown generation provider: {}. Supported: {}",
                self.generation.provider,
                KNOWN_GENERATION_PROVIDERS.join(", ")
            )));
        }

        if provider == "openai" && self.resolve_generation_key().is_none() {
            return Err(AppError::Config(format!(
                "API key not found in environment variable: {}",
                self.generation
                    .api_key_env
                    .as_deref()
                    .unwrap_or("<generation.apiKeyEnv unset>")
            )));
        }

        let embedder = self.embedding.provider.to_lowercase();
        if !KNOWN_EMBEDDING_PROVIDERS.contains(&embedder.as_str()) {
            return Err(AppError::Config(format!(
                "Unknown embedding provider: {}. Supported: {}",
                self.embedding.provider,
                KNOWN_EMBEDDING_PROVIDERS.join(", ")
            )));
        }

        if self.embedding.dimensions == 0 {
            return Err(AppError::Config(
                "Embedding dimensions must be greater than zero".to_string(),
            ));
        }

        let retrieval = &self.retrieval;
        if retrieval.sources.is_empty() {
            return Err(AppError::Config(
                "At least one retrieval source must be configured".to_string(),
            ));
        }
        if retrieval.max_context_chars == 0 {
            return Err(AppError::Config(
                "retrieval.maxContextChars must be greater than zero".to_string(),
            ));
        }
        if retrieval.deadline_ms == 0 {
            return Err(AppError::Config(
                "retrieval.deadlineMs must be greater than zero".to_string(),
            ));
        }
        for source in &retrieval.sources {
            if source.name.trim().is_empty() {
                return Err(AppError::Config("Source name cannot be empty".to_string()));
            }
            if !(source.budget_share > 0.0 && source.budget_share <= 1.0) {
                return Err(AppError::Config(format!(
                    "Source '{}' budgetShare must be in (0, 1], got {}",
                    source.name, source.budget_share
                )));
            }
            if retrieval
                .sources
                .iter()
                .filter(|other| other.name == source.name)
                .count()
                > 1
            {
                return Err(AppError::Config(format!(
                    "Source '{}' is configured more than once",
                    source.name
                )));
            }
        }

        if self.generation.timeout_secs == 0 {
            return Err(AppError::Config(
                "generation.timeoutSecs must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}
