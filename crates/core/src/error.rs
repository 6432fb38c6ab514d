//! Error types for VeloSight.
//!
//! This module defines a unified error enum covering configuration, embedding,
//! retrieval, generation, prompt, and serialization failures.

use thiserror::Error;

/// Unified error type for VeloSight.
///
/// All fallible functions return `Result<T, AppError>`.
/// We never panic; errors must be represented and propagated.
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O and filesystem errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The caller supplied a request the pipeline cannot run
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Query embedding failed or has the wrong dimensionality
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// A single retrieval source failed
    #[error("Retrieval error ({source_name}): {message}")]
    Retrieval {
        source_name: String,
        message: String,
    },

    /// Transport or timeout failure talking to the generative backend
    #[error("Generation error: {0}")]
    Generation(String),

    /// Generated text could not be turned into valid structured output
    #[error("Generation format error: {detail}")]
    GenerationFormat { detail: String, raw_text: String },

    /// Prompt system errors
    #[error("Prompt error: {0}")]
    Prompt(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors
    #[error("{0}")]
    Other(String),
}

impl AppError {
    /// Build a retrieval error for a named source.
    pub fn retrieval(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        AppError::Retrieval {
            source_name: source_name.into(),
            message: message.into(),
        }
    }

    /// Caller-visible error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Config(_) => "ConfigError",
            AppError::Io(_) => "IoError",
            AppError::InvalidRequest(_) => "InvalidRequest",
            AppError::Embedding(_) => "EmbeddingError",
            AppError::Retrieval { .. } => "RetrievalError",
            AppError::Generation(_) => "GenerationError",
            AppError::GenerationFormat { .. } => "GenerationFormatError",
            AppError::Prompt(_) => "PromptError",
            AppError::Serialization(_) => "SerializationError",
            AppError::Other(_) => "Error",
        }
    }

    /// Raw model output attached to the error, if any.
    pub fn raw_text(&self) -> Option<&str> {
        match self {
            AppError::GenerationFormat { raw_text, .. } => Some(raw_text),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(err: serde_yaml::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;
