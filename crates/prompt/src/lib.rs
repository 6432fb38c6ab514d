//! Prompt system for VeloSight.
//!
//! This crate turns a question and its assembled evidence into the final
//! generation request:
//! - YAML analysis definitions (system prompt, task template, output schema)
//! - Handlebars rendering of task templates
//! - Delimited context embedding with citation rules

pub mod builder;
pub mod loader;
pub mod types;

// Re-export main types
pub use builder::{
    build_repair_prompt, render_task, PromptBuilder, DEFAULT_SYSTEM_INSTRUCTIONS,
    DEFAULT_TASK_TEMPLATE, REPAIR_INSTRUCTION,
};
pub use loader::{list_definitions, load_definition};
pub use types::{AnalysisDefinition, BuiltPrompt, BuiltPromptMetadata, TaskVariables};
