//! Generation with a single bounded repair attempt.
//!
//! `generate_structured` makes at most two calls: the initial generation and,
//! only if its output fails validation, one repair call. Failure after the
//! repair is `AppError::GenerationFormat` carrying the last raw text.

use crate::validator::{validate, ExpectedShape, Extracted};
use std::time::Duration;
use velosight_core::config::GenerationSettings;
use velosight_core::{AppError, AppResult};
use velosight_llm::{LlmClient, LlmRequest, LlmResponse, LlmUsage};
use velosight_prompt::build_repair_prompt;

/// Per-deployment generation options.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationOptions {
    pub model: String,
    pub temperature: f32,
    /// Used whenever structured output is requested
    pub json_temperature: f32,
    pub max_tokens: Option<u32>,
    pub timeout: Duration,
}

impl GenerationOptions {
    pub fn from_settings(settings: &GenerationSettings) -> Self {
        Self {
            model: settings.model.clone(),
            temperature: settings.temperature,
            json_temperature: settings.json_temperature,
            max_tokens: settings.max_tokens,
            timeout: Duration::from_secs(settings.timeout_secs),
        }
    }

    fn request(&self, system: &str, prompt: &str, json_mode: bool) -> LlmRequest {
        let mut request = LlmRequest::new(prompt, &self.model).with_system(system);

        request = if json_mode {
            request
                .with_json_mode()
                .with_temperature(self.json_temperature)
        } else {
            request.with_temperature(self.temperature)
        };

        if let Some(max_tokens) = self.max_tokens {
            request = request.with_max_tokens(max_tokens);
        }

        request
    }
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self::from_settings(&GenerationSettings::default())
    }
}

/// Validated output of a generation.
#[derive(Debug, Clone)]
pub struct StructuredOutput {
    pub extracted: Extracted,
    pub model: String,
    /// Whether the repair call was needed
    pub repaired: bool,
    /// Generation calls made, 1 or 2
    pub calls: u32,
    pub usage: LlmUsage,
}

/// One generation call under its own timeout.
///
/// A timeout is a hard `AppError::Generation` failure.
pub async fn generate_text(
    client: &dyn LlmClient,
    options: &GenerationOptions,
    system: &str,
    prompt: &str,
    json_mode: bool,
) -> AppResult<LlmResponse> {
    let request = options.request(system, prompt, json_mode);

    let response = tokio::time::timeout(options.timeout, client.complete(&request))
        .await
        .map_err(|_| {
            AppError::Generation(format!(
                "{} did not respond within {}s",
                client.provider_name(),
                options.timeout.as_secs_f32()
            ))
        })??;

    if !response.done {
        tracing::warn!(
            provider = client.provider_name(),
            "Generation stopped before completion, output may be truncated"
        );
    }

    Ok(response)
}

/// Generate, validate, and repair at most once.
pub async fn generate_structured(
    client: &dyn LlmClient,
    options: &GenerationOptions,
    system: &str,
    prompt: &str,
    shape: &ExpectedShape,
) -> AppResult<StructuredOutput> {
    let first = generate_text(client, options, system, prompt, true).await?;

    let detail = match validate(&first.content, shape) {
        Ok(extracted) => {
            return Ok(StructuredOutput {
                extracted,
                model: first.model,
                repaired: false,
                calls: 1,
                usage: first.usage,
            })
        }
        Err(detail) => detail,
    };

    tracing::warn!(detail = %detail, "Generated output invalid, attempting one repair");

    let second = generate_text(
        client,
        options,
        system,
        &build_repair_prompt(&first.content),
        true,
    )
    .await?;
    let usage = LlmUsage::new(
        first.usage.prompt_tokens + second.usage.prompt_tokens,
        first.usage.completion_tokens + second.usage.completion_tokens,
    );

    match validate(&second.content, shape) {
        Ok(extracted) => {
            tracing::info!("Repair attempt produced valid output");
            Ok(StructuredOutput {
                extracted,
                model: second.model,
                repaired: true,
                calls: 2,
                usage,
            })
        }
        Err(repair_detail) => Err(AppError::GenerationFormat {
            detail: format!(
                "{} (after one repair attempt; initial: {})",
                repair_detail, detail
            ),
            raw_text: second.content,
        }),
    }
}
