//! VeloSight CLI
//!
//! Main entry point for the velosight command-line tool.
//! A thin caller over the analysis pipeline: evidence retrieval, budgeted
//! context assembly, generation, and structured-output validation.

mod commands;

use clap::{Parser, Subcommand};
use commands::{AnalyseCommand, HealthCommand, TypesCommand};
use std::path::PathBuf;
use velosight_core::{config::AppConfig, logging, AppResult};

/// VeloSight - evidence-grounded structured analysis
#[derive(Parser, Debug)]
#[command(name = "velosight")]
#[command(about = "Evidence-grounded structured analysis", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to workspace directory (default: current directory)
    #[arg(short, long, global = true, env = "VELOSIGHT_WORKSPACE")]
    workspace: Option<PathBuf>,

    /// Path to config file
    #[arg(short, long, global = true, env = "VELOSIGHT_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, env = "RUST_LOG")]
    log_level: Option<String>,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    no_color: bool,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    log_json: bool,

    /// Generation provider (ollama, openai)
    #[arg(short, long, global = true, env = "VELOSIGHT_PROVIDER")]
    provider: Option<String>,

    /// Model identifier
    #[arg(short, long, global = true, env = "VELOSIGHT_MODEL")]
    model: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Analyse a question against the configured sources
    Analyse(AnalyseCommand),

    /// Liveness check
    Health(HealthCommand),

    /// List available analysis types
    Types(TypesCommand),
}

#[tokio::main]
async fn main() -> AppResult<()> {
    // Parse command-line arguments first (needed for logging config)
    let cli = Cli::parse();

    // Defaults, then YAML, then environment
    let config = AppConfig::load_with(cli.workspace.clone(), cli.config.clone())?;

    // Apply CLI overrides
    let config = config.with_overrides(
        cli.workspace,
        cli.config,
        cli.provider,
        cli.model,
        cli.log_level,
        cli.verbose,
        cli.no_color,
        cli.log_json,
    );

    logging::init_logging(config.log_level.as_deref(), config.no_color, config.log_json)?;

    tracing::info!("VeloSight CLI starting");
    tracing::debug!("Workspace: {:?}", config.workspace);
    tracing::debug!(
        "Generation: {} / {}",
        config.generation.provider,
        config.generation.model
    );

    let command_name = match &cli.command {
        Commands::Analyse(_) => "analyse",
        Commands::Health(_) => "health",
        Commands::Types(_) => "types",
    };
    let _span = tracing::info_span!("command", name = command_name).entered();

    let result = match cli.command {
        Commands::Analyse(cmd) => cmd.execute(&config).await,
        Commands::Health(cmd) => cmd.execute(&config).await,
        Commands::Types(cmd) => cmd.execute(&config).await,
    };

    match &result {
        Ok(_) => tracing::info!("Command completed successfully"),
        Err(e) => tracing::error!(kind = e.kind(), "Command failed: {}", e),
    }

    result
}
