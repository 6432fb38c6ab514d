//! Types command handler.
//!
//! Lists the enabled analysis definitions in the workspace.

use clap::Args;
use velosight_core::{config::AppConfig, AppResult};
use velosight_prompt::{list_definitions, AnalysisDefinition};

/// List available analysis types
#[derive(Args, Debug)]
pub struct TypesCommand {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl TypesCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing types command");
        println!("{}", self.render(config)?);
        Ok(())
    }

    fn render(&self, config: &AppConfig) -> AppResult<String> {
        let definitions = list_definitions(&config.workspace)?;

        if self.json {
            return Ok(serde_json::to_string_pretty(&definitions)?);
        }

        if definitions.is_empty() {
            return Ok(format!(
                "No analysis types found in {:?}",
                config.velosight_dir().join("analysis")
            ));
        }

        Ok(table(&definitions))
    }
}

fn table(definitions: &[AnalysisDefinition]) -> String {
    let mut lines = Vec::new();
    for def in definitions {
        let subtypes = if def.requires_subtype {
            format!(" [subtype: {}]", def.subtypes.join(" | "))
        } else {
            String::new()
        };
        lines.push(format!("{:<24} {}{}", def.key, def.name, subtypes));
        if let Some(description) = &def.description {
            lines.push(format!("{:<24} {}", "", description));
        }
    }
    lines.join("\n")
}
