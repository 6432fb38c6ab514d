//! Structured analysis for VeloSight.
//!
//! Runs the question through retrieval and assembly, prompts the generative
//! backend, and guarantees a valid structured result (one repair at most).

pub mod envelope;
pub mod generate;
pub mod pipeline;
pub mod types;
pub mod validator;

#[cfg(test)]
mod tests;

pub use envelope::{build_envelope, highlights};
pub use generate::{generate_structured, generate_text, GenerationOptions, StructuredOutput};
pub use pipeline::AnalysisPipeline;
pub use types::{
    AnalysisRequest, AnalysisResult, ErrorReport, HealthStatus, Highlights, RequestMeta,
    ResultMeta, SourceReport,
};
pub use validator::{extract_json, validate, ExpectedShape, Extracted, ValueKind};
