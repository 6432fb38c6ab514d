//! Query embedding.
//!
//! Provider-agnostic embedding generation. The pipeline embeds exactly one
//! text per request (the question) and checks its dimensionality.

pub mod provider;
pub mod providers;

pub use provider::{create_provider, embed_query, EmbeddingProvider};
pub use providers::{OllamaEmbedder, TrigramProvider};
