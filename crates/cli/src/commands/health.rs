//! Health command handler.

use clap::Args;
use velosight_analysis::AnalysisPipeline;
use velosight_core::{config::AppConfig, AppResult};

/// Liveness check
#[derive(Args, Debug)]
pub struct HealthCommand {}

impl HealthCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing health command");

        // Building the pipeline validates configuration; no backend is contacted.
        let status = AnalysisPipeline::from_config(config)?.health();
        println!("{}", serde_json::to_string(&status)?);
        Ok(())
    }
}
