//! Result envelope assembly.

use crate::generate::StructuredOutput;
use crate::types::{AnalysisResult, Highlights, RequestMeta, ResultMeta, SourceReport};
use chrono::{DateTime, Utc};
use serde_json::Value;
use velosight_knowledge::{ContextPack, RetrievalOutcome};

const CONFIDENCE_PATHS: &[&[&str]] = &[&["SelfAwareness", "ConfidenceLevelRating", "rating"]];

const OVERALL_RATING_PATHS: &[&[&str]] = &[
    &["OverallRating", "riskRating"],
    &["DeliveryConfidenceAssessment", "overallDeliveryConfidenceRating"],
    &["overallRating"],
    &["GatewayReviewAssessment", "overallRating"],
    &["hypotheses", "0", "potentialImpact"],
];

/// Package a validated output with its evidence and request metadata.
pub fn build_envelope(
    request: RequestMeta,
    request_id: &str,
    generated_at: DateTime<Utc>,
    retrieval: &RetrievalOutcome,
    pack: &ContextPack,
    output: StructuredOutput,
) -> AnalysisResult {
    let sources = retrieval
        .sources()
        .iter()
        .map(|source| SourceReport {
            name: source.name.clone(),
            status: source.status.as_str().to_string(),
            returned: source.chunks.len(),
            used: pack.used_from(&source.name),
        })
        .collect();

    let highlights = highlights(&output.extracted.value);

    AnalysisResult {
        meta: ResultMeta {
            request,
            request_id: request_id.to_string(),
            generated_at,
            model: output.model,
            sources,
            context_truncated: pack.truncated,
            repaired: output.repaired,
            highlights,
        },
        output: output.extracted.value,
        used_chunks: pack.used.clone(),
        raw_text: output.extracted.raw,
    }
}

/// Pull confidence and overall rating from the first matching path.
pub fn highlights(output: &Value) -> Highlights {
    Highlights {
        confidence: first_text(output, CONFIDENCE_PATHS),
        overall_rating: first_text(output, OVERALL_RATING_PATHS),
    }
}

fn first_text(output: &Value, paths: &[&[&str]]) -> Option<String> {
    paths.iter().find_map(|path| {
        let value = path.iter().try_fold(output, |node, segment| match node {
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => node.get(*segment),
        })?;

        match value {
            Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    })
}
