//! Loader for YAML analysis definitions.
//!
//! Definitions live in `.velosight/analysis/<key>.yml`.

use crate::types::AnalysisDefinition;
use handlebars::Handlebars;
use std::path::{Path, PathBuf};
use velosight_core::{AppError, AppResult};

fn definitions_dir(workspace_path: &Path) -> PathBuf {
    workspace_path.join(".velosight").join("analysis")
}

/// Load an analysis definition by key from the workspace.
///
/// # Example
/// ```no_run
/// use velosight_prompt::load_definition;
/// use std::path::Path;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let definition = load_definition(Path::new("."), "gateway-review")?;
/// println!("Loaded: {}", definition.name);
/// # Ok(())
/// # }
/// ```
pub fn load_definition(workspace_path: &Path, key: &str) -> AppResult<AnalysisDefinition> {
    if key.is_empty() || key.contains(['/', '\\']) || key.starts_with('.') {
        return Err(AppError::InvalidRequest(format!(
            "Invalid analysis type key: {:?}",
            key
        )));
    }

    let file = definitions_dir(workspace_path).join(format!("{}.yml", key));
    tracing::debug!("Loading analysis definition from: {:?}", file);

    if !file.exists() {
        return Err(AppError::Prompt(format!(
            "Analysis definition not found: {:?}",
            file
        )));
    }

    let definition = read_definition(&file)?;

    if definition.key != key {
        return Err(AppError::Prompt(format!(
            "Definition key '{}' does not match file name '{}'",
            definition.key, key
        )));
    }

    if !definition.enabled {
        return Err(AppError::InvalidRequest(format!(
            "Analysis type '{}' is disabled",
            key
        )));
    }

    tracing::debug!("Loaded analysis definition: {} ({})", definition.key, definition.name);
    Ok(definition)
}

/// List enabled definitions, ordered by `sortOrder` then key.
///
/// Files that fail to parse or validate are skipped with a warning.
pub fn list_definitions(workspace_path: &Path) -> AppResult<Vec<AnalysisDefinition>> {
    let dir = definitions_dir(workspace_path);

    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut definitions = Vec::new();

    for entry in walkdir::WalkDir::new(&dir)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if !path.is_file() || path.extension().and_then(|s| s.to_str()) != Some("yml") {
            continue;
        }

        match read_definition(path) {
            Ok(definition) if definition.enabled => definitions.push(definition),
            Ok(_) => {}
            Err(e) => tracing::warn!("Skipping analysis definition {:?}: {}", path, e),
        }
    }

    definitions.sort_by(|a, b| a.sort_order.cmp(&b.sort_order).then_with(|| a.key.cmp(&b.key)));
    Ok(definitions)
}

fn read_definition(file: &Path) -> AppResult<AnalysisDefinition> {
    let contents = std::fs::read_to_string(file).map_err(|e| {
        AppError::Prompt(format!("Failed to read analysis definition {:?}: {}", file, e))
    })?;

    let definition: AnalysisDefinition = serde_yaml::from_str(&contents).map_err(|e| {
        AppError::Prompt(format!("Failed to parse analysis definition {:?}: {}", file, e))
    })?;

    validate_definition(&definition)?;
    Ok(definition)
}

/// Validate an analysis definition.
fn validate_definition(def: &AnalysisDefinition) -> AppResult<()> {
    if def.key.trim().is_empty() {
        return Err(AppError::Prompt("Definition key cannot be empty".to_string()));
    }

    if def.name.trim().is_empty() {
        return Err(AppError::Prompt("Definition name cannot be empty".to_string()));
    }

    if def.system_prompt.trim().is_empty() {
        return Err(AppError::Prompt(format!(
            "Definition '{}' has an empty systemPrompt",
            def.key
        )));
    }

    if def.user_prompt_template.trim().is_empty() {
        return Err(AppError::Prompt(format!(
            "Definition '{}' has an empty userPromptTemplate",
            def.key
        )));
    }

    Handlebars::new()
        .register_template_string("check", &def.user_prompt_template)
        .map_err(|e| {
            AppError::Prompt(format!(
                "Definition '{}' has an invalid userPromptTemplate: {}",
                def.key, e
            ))
        })?;

    if let Some(schema) = &def.output_schema {
        if !schema.is_object() {
            return Err(AppError::Prompt(format!(
                "Definition '{}' outputSchema must be a mapping",
                def.key
            )));
        }
    }

    Ok(())
}
