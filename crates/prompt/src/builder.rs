//! Prompt builder for analysis requests.
//!
//! The user message has two delimited sections:
//!
//! ```text
//! [CONTEXT]
//! <assembled evidence, verbatim>
//! [END CONTEXT]
//!
//! [INSTRUCTIONS]
//! Task: ...
//! Question: ...
//! <citation rule>
//! <JSON-only rule>
//! ```
//!
//! Building is pure: no I/O, no network. Evidence text is never passed
//! through the template engine.

use crate::types::{BuiltPrompt, BuiltPromptMetadata, TaskVariables};
use handlebars::Handlebars;
use serde_json::Value;
use velosight_core::{AppError, AppResult};
use velosight_knowledge::ContextPack;

/// System instructions used when neither the request nor a definition
/// supplies any.
pub const DEFAULT_SYSTEM_INSTRUCTIONS: &str = "You are an assurance analyst for Australian Government digital programs. \
Follow DTA DCA and DoF Gateway principles. \
Return JSON only matching the schema. Use [#source:id] in 'citations'. \
No extra fields.";

/// Task template used when no analysis definition is selected.
pub const DEFAULT_TASK_TEMPLATE: &str = "Analyse risks for project '{{project}}'.";

/// Instruction sent with the single repair attempt.
pub const REPAIR_INSTRUCTION: &str =
    "Return VALID JSON ONLY. No explanations or text outside JSON. Output must be a single JSON object.";

const NO_EVIDENCE_NOTE: &str = "(no evidence was retrieved for this question)";

/// Render a task template with Handlebars.
///
/// Missing variables render as empty strings.
pub fn render_task(template: &str, variables: &TaskVariables) -> AppResult<String> {
    let mut handlebars = Handlebars::new();

    // Plain text, not HTML
    handlebars.register_escape_fn(handlebars::no_escape);

    handlebars
        .register_template_string("task", template)
        .map_err(|e| AppError::Prompt(format!("Failed to register task template: {}", e)))?;

    handlebars
        .render("task", variables)
        .map_err(|e| AppError::Prompt(format!("Failed to render task template: {}", e)))
}

/// Builds the final system and user messages.
#[derive(Debug, Clone)]
pub struct PromptBuilder<'a> {
    system: &'a str,
    task: &'a str,
    question: &'a str,
    citation_keys: &'a [String],
    output_schema: Option<&'a Value>,
}

impl<'a> PromptBuilder<'a> {
    /// Start a prompt from system instructions and a rendered task.
    pub fn new(system: &'a str, task: &'a str) -> Self {
        Self {
            system,
            task,
            question: "",
            citation_keys: &[],
            output_schema: None,
        }
    }

    pub fn question(mut self, question: &'a str) -> Self {
        self.question = question;
        self
    }

    /// Keys the model may cite.
    pub fn citation_keys(mut self, keys: &'a [String]) -> Self {
        self.citation_keys = keys;
        self
    }

    /// Expected output shape, included verbatim.
    pub fn output_schema(mut self, schema: Option<&'a Value>) -> Self {
        self.output_schema = schema;
        self
    }

    pub fn build(&self, context: &ContextPack) -> BuiltPrompt {
        let mut user = String::with_capacity(context.context_text.len() + 512);

        user.push_str("[CONTEXT]\n");
        if context.context_text.is_empty() {
            user.push_str(NO_EVIDENCE_NOTE);
        } else {
            user.push_str(&context.context_text);
        }
        user.push_str("\n[END CONTEXT]\n\n[INSTRUCTIONS]\n");

        user.push_str(&format!("Task: {}\n", self.task.trim()));
        if !self.question.trim().is_empty() {
            user.push_str(&format!("Question: {}\n", self.question.trim()));
        }

        if self.citation_keys.is_empty() {
            user.push_str("No citable context is available. Leave 'citations' empty.\n");
        } else {
            user.push_str(&format!(
                "Use only the context and cite using these refs: {}\n",
                self.citation_keys.join(", ")
            ));
        }

        let schema_text = self
            .output_schema
            .and_then(|schema| serde_json::to_string_pretty(schema).ok());
        if let Some(schema_text) = &schema_text {
            user.push_str("Output schema:\n");
            user.push_str(schema_text);
            user.push('\n');
        }

        user.push_str("Return strictly JSON as per the schema. No text outside JSON.");

        BuiltPrompt {
            system: self.system.to_string(),
            user,
            metadata: BuiltPromptMetadata {
                citation_keys: self.citation_keys.to_vec(),
                context_chars: context.context_text.chars().count(),
                schema_included: schema_text.is_some(),
            },
        }
    }
}

/// User message for the single repair attempt.
pub fn build_repair_prompt(raw_output: &str) -> String {
    format!("{}\n\n{}", REPAIR_INSTRUCTION, raw_output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use velosight_knowledge::{Chunk, CitationRef};

    fn pack() -> ContextPack {
        let chunk = Chunk::new("project", "7", "Budget is {{overrun}} by 20%", 0.9);
        let mut pack = ContextPack {
            context_text: "[#project:7 | score=0.900]\nBudget is {{overrun}} by 20%".to_string(),
            ..Default::default()
        };
        pack.citations.insert(
            chunk.citation_key(),
            CitationRef {
                score: 0.9,
                metadata: Default::default(),
            },
        );
        pack.used.push(chunk);
        pack
    }

    #[test]
    fn test_render_task() {
        let vars = TaskVariables {
            query: "What slipped?".to_string(),
            subtype: "Gate 2".to_string(),
            project: "Payments".to_string(),
            analysis: "gateway-review".to_string(),
        };
        let rendered = render_task("{{analysis}} for {{project}} ({{subtype}}): {{query}}", &vars);
        assert_eq!(
            rendered.unwrap(),
            "gateway-review for Payments (Gate 2): What slipped?"
        );
    }

    #[test]
    fn test_render_task_does_not_escape() {
        let vars = TaskVariables {
            project: "R&D <core>".to_string(),
            ..Default::default()
        };
        assert_eq!(
            render_task(DEFAULT_TASK_TEMPLATE, &vars).unwrap(),
            "Analyse risks for project 'R&D <core>'."
        );
    }

    #[test]
    fn test_render_task_invalid_template() {
        let err = render_task("{{#if}}", &TaskVariables::default()).unwrap_err();
        assert_eq!(err.kind(), "PromptError");
    }

    #[test]
    fn test_context_is_embedded_verbatim() {
        let pack = pack();
        let keys = pack.citation_keys(50);
        let built = PromptBuilder::new("sys", "Assess budget")
            .question("Is the budget at risk?")
            .citation_keys(&keys)
            .build(&pack);

        assert!(built.user.starts_with(
            "[CONTEXT]\n[#project:7 | score=0.900]\nBudget is {{overrun}} by 20%\n[END CONTEXT]"
        ));
        assert!(built.user.contains("Task: Assess budget\n"));
        assert!(built.user.contains("Question: Is the budget at risk?\n"));
        assert!(built.user.contains("cite using these refs: #project:7\n"));
        assert!(built.user.ends_with("No text outside JSON."));
        assert_eq!(built.system, "sys");
        assert_eq!(built.metadata.citation_keys, ["#project:7"]);
        assert!(!built.metadata.schema_included);
    }

    #[test]
    fn test_empty_context_notes_missing_evidence() {
        let built = PromptBuilder::new(DEFAULT_SYSTEM_INSTRUCTIONS, "Assess")
            .build(&ContextPack::default());

        assert!(built.user.contains(NO_EVIDENCE_NOTE));
        assert!(built.user.contains("Leave 'citations' empty"));
        assert_eq!(built.metadata.context_chars, 0);
    }

    #[test]
    fn test_schema_is_included() {
        let schema = json!({"type": "object", "required": ["overallRating"]});
        let built = PromptBuilder::new("sys", "Assess")
            .output_schema(Some(&schema))
            .build(&pack());

        assert!(built.user.contains("Output schema:\n{"));
        assert!(built.user.contains("\"overallRating\""));
        assert!(built.metadata.schema_included);
    }

    #[test]
    fn test_build_is_pure() {
        let pack = pack();
        let keys = pack.citation_keys(50);
        let builder = PromptBuilder::new("sys", "Assess").citation_keys(&keys);
        assert_eq!(builder.build(&pack).user, builder.build(&pack).user);
    }

    #[test]
    fn test_repair_prompt() {
        let prompt = build_repair_prompt("Sure! {\"a\": 1,}");
        assert!(prompt.starts_with(REPAIR_INSTRUCTION));
        assert!(prompt.ends_with("\n\nSure! {\"a\": 1,}"));
    }
}
