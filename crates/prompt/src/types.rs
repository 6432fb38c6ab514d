//! Prompt types for VeloSight.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use velosight_core::{AppError, AppResult};

fn default_enabled() -> bool {
    true
}

/// An analysis definition loaded from YAML.
///
/// ```yaml
/// key: gateway-review
/// name: Gateway Review
/// description: Assess readiness for the next gateway
/// systemPrompt: You are a gateway reviewer...
/// userPromptTemplate: "Review {{project}} for {{subtype}}: {{query}}"
/// requiresSubtype: true
/// subtypes: [Gate 0, Gate 1, Gate 2]
/// outputSchema:
///   type: object
///   required: [overallRating]
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisDefinition {
    /// Unique key, matches the file stem
    pub key: String,

    /// Human-readable name
    pub name: String,

    #[serde(default)]
    pub description: Option<String>,

    /// System instructions for the model
    pub system_prompt: String,

    /// Task template with Handlebars syntax
    pub user_prompt_template: String,

    #[serde(default = "default_enabled")]
    pub enabled: bool,

    #[serde(default)]
    pub sort_order: i32,

    /// Whether a request must name a subtype
    #[serde(default)]
    pub requires_subtype: bool,

    /// Allowed subtypes; empty means any
    #[serde(default)]
    pub subtypes: Vec<String>,

    /// JSON-schema-like description of the expected output
    #[serde(default)]
    pub output_schema: Option<Value>,
}

impl AnalysisDefinition {
    /// Question used for retrieval when the caller supplied none.
    pub fn resolve_query(&self, query: Option<&str>) -> String {
        query
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .map(str::to_string)
            .or_else(|| {
                self.description
                    .as_deref()
                    .map(str::trim)
                    .filter(|d| !d.is_empty())
                    .map(str::to_string)
            })
            .unwrap_or_else(|| format!("Perform {}", self.name))
    }

    /// Check a request's subtype against this definition.
    pub fn check_subtype(&self, subtype: Option<&str>) -> AppResult<()> {
        match subtype.map(str::trim).filter(|s| !s.is_empty()) {
            None if self.requires_subtype => Err(AppError::InvalidRequest(format!(
                "Analysis type '{}' requires a subtype",
                self.name
            ))),
            Some(s) if !self.subtypes.is_empty() && !self.subtypes.iter().any(|t| t == s) => {
                Err(AppError::InvalidRequest(format!(
                    "Unknown subtype '{}' for analysis type '{}'. Expected one of: {}",
                    s,
                    self.name,
                    self.subtypes.join(", ")
                )))
            }
            _ => Ok(()),
        }
    }
}

/// Variables available to task templates.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TaskVariables {
    pub query: String,
    pub subtype: String,
    pub project: String,
    pub analysis: String,
}

/// A fully built prompt ready for generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuiltPrompt {
    /// System message
    pub system: String,

    /// User message
    pub user: String,

    /// Metadata about the built prompt
    pub metadata: BuiltPromptMetadata,
}

/// Metadata about a built prompt.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuiltPromptMetadata {
    /// Citation keys the model may use
    pub citation_keys: Vec<String>,

    /// Characters of embedded context
    pub context_chars: usize,

    /// Whether an output schema was included
    pub schema_included: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn definition(yaml: &str) -> AnalysisDefinition {
        serde_yaml::from_str(yaml).unwrap()
    }

    const MINIMAL: &str = r#"
key: risk
name: Risk Analysis
systemPrompt: You assess risk.
userPromptTemplate: "Analyse {{query}}"
"#;

    #[test]
    fn test_definition_defaults() {
        let def = definition(MINIMAL);
        assert!(def.enabled);
        assert_eq!(def.sort_order, 0);
        assert!(!def.requires_subtype);
        assert!(def.subtypes.is_empty());
        assert!(def.output_schema.is_none());
    }

    #[test]
    fn test_definition_deserialization() {
        let def = definition(
            r#"
key: gateway-review
name: Gateway Review
description: Assess gateway readiness
systemPrompt: You are a gateway reviewer.
userPromptTemplate: "{{subtype}}: {{query}}"
sortOrder: 3
requiresSubtype: true
subtypes: [Gate 0, Gate 1]
outputSchema:
  type: object
  required: [overallRating]
"#,
        );
        assert_eq!(def.sort_order, 3);
        assert!(def.requires_subtype);
        assert_eq!(def.subtypes, ["Gate 0", "Gate 1"]);
        assert_eq!(def.output_schema.unwrap()["type"], "object");
    }

    #[test]
    fn test_resolve_query_fallbacks() {
        let mut def = definition(MINIMAL);
        assert_eq!(def.resolve_query(Some(" what slipped? ")), "what slipped?");
        assert_eq!(def.resolve_query(None), "Perform Risk Analysis");

        def.description = Some("Identify delivery risks".to_string());
        assert_eq!(def.resolve_query(Some("  ")), "Identify delivery risks");
    }

    #[test]
    fn test_check_subtype() {
        let mut def = definition(MINIMAL);
        assert!(def.check_subtype(None).is_ok());

        def.requires_subtype = true;
        assert_eq!(def.check_subtype(None).unwrap_err().kind(), "InvalidRequest");
        assert!(def.check_subtype(Some("Gate 2")).is_ok());

        def.subtypes = vec!["Gate 0".to_string()];
        assert!(def.check_subtype(Some("Gate 2")).is_err());
        assert!(def.check_subtype(Some("Gate 0")).is_ok());
    }
}
