//! Analyse command handler.
//!
//! Runs one question through the analysis pipeline and prints the result
//! envelope as JSON on stdout.

use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;
use velosight_analysis::{AnalysisPipeline, AnalysisRequest, ErrorReport, RequestMeta};
use velosight_core::config::{AppConfig, AssemblyMode};
use velosight_core::{AppError, AppResult};
use velosight_knowledge::{create_provider, InMemoryIndex};

/// Analyse a question against the configured sources
#[derive(Args, Debug)]
pub struct AnalyseCommand {
    /// Question text (optional when --definition is given)
    pub query: Option<String>,

    /// Project identifier; scopes project sources when it is a UUID
    #[arg(long)]
    pub project_id: Option<String>,

    /// Analysis type label echoed in the result
    #[arg(long)]
    pub analysis_type: Option<String>,

    /// Gateway type label echoed in the result
    #[arg(long)]
    pub gateway_type: Option<String>,

    /// Session identifier echoed in the result
    #[arg(long)]
    pub session: Option<String>,

    /// Analysis definition key (.velosight/analysis/<KEY>.yml)
    #[arg(short, long)]
    pub definition: Option<String>,

    /// Subtype for definitions that require one
    #[arg(long)]
    pub subtype: Option<String>,

    /// Per-source result count, e.g. --k project=3 (repeatable)
    #[arg(long = "k", value_name = "SOURCE=N", value_parser = parse_source_k)]
    pub k: Vec<(String, usize)>,

    /// Maximum context characters
    #[arg(long)]
    pub max_chars: Option<usize>,

    /// Weighted score floor
    #[arg(long)]
    pub min_score: Option<f32>,

    /// System instruction override
    #[arg(long)]
    pub system: Option<String>,

    /// Assembly policy (greedy, weighted)
    #[arg(long, value_parser = parse_assembly)]
    pub assembly: Option<AssemblyMode>,

    /// Search a local JSONL corpus instead of the RPC backend
    #[arg(long)]
    pub corpus: Option<PathBuf>,

    /// Compact JSON output; errors are printed as JSON reports
    #[arg(long)]
    pub json: bool,
}

impl AnalyseCommand {
    /// Execute the analyse command.
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing analyse command");
        tracing::debug!("Analyse options: {:?}", self);

        let outcome = self.run(config).await;

        match outcome {
            Ok(json) => {
                println!("{}", json);
                Ok(())
            }
            Err(e) => {
                if self.json {
                    let report = serde_json::to_string(&ErrorReport::from(&e))?;
                    println!("{}", report);
                }
                Err(e)
            }
        }
    }

    async fn run(&self, config: &AppConfig) -> AppResult<String> {
        let request = self.request();
        let pipeline = self.pipeline(config).await?;
        let result = pipeline.analyse(&request).await?;

        let json = if self.json {
            serde_json::to_string(&result)?
        } else {
            serde_json::to_string_pretty(&result)?
        };
        Ok(json)
    }

    async fn pipeline(&self, config: &AppConfig) -> AppResult<AnalysisPipeline> {
        match &self.corpus {
            Some(path) => {
                let embedder = create_provider(&config.embedding)?;
                let index = InMemoryIndex::load_jsonl(path, embedder.as_ref()).await?;
                if index.is_empty() {
                    return Err(AppError::Config(format!("Corpus {:?} is empty", path)));
                }
                AnalysisPipeline::with_backend(config, Arc::new(index))
            }
            None => AnalysisPipeline::from_config(config),
        }
    }

    fn request(&self) -> AnalysisRequest {
        let mut request = AnalysisRequest::new(self.query.clone().unwrap_or_default()).with_meta(
            RequestMeta {
                session: self.session.clone(),
                analysis_type: self.analysis_type.clone(),
                gateway_type: self.gateway_type.clone(),
                project_id: self.project_id.clone(),
            },
        );

        request.source_identifier = self.project_id.clone();
        request.k = self.k.iter().cloned().collect();
        request.max_context_chars = self.max_chars;
        request.min_score = self.min_score;
        request.assembly = self.assembly;
        request.system = self.system.clone();
        request.definition = self.definition.clone();
        request.subtype = self.subtype.clone();
        request
    }
}

fn parse_source_k(s: &str) -> Result<(String, usize), String> {
    let (source, k) = s
        .split_once('=')
        .ok_or_else(|| format!("expected SOURCE=N, got '{}'", s))?;
    let source = source.trim();
    if source.is_empty() {
        return Err(format!("missing source name in '{}'", s));
    }
    let k = k
        .trim()
        .parse::<usize>()
        .map_err(|e| format!("invalid count in '{}': {}", s, e))?;
    Ok((source.to_string(), k))
}

fn parse_assembly(s: &str) -> Result<AssemblyMode, String> {
    AssemblyMode::parse(s)
        .ok_or_else(|| format!("unknown assembly mode '{}' (greedy, weighted)", s))
}
