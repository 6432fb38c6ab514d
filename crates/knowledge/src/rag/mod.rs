//! Retrieval-augmented context building.
//!
//! Fan out to sources, rank and deduplicate per source, then assemble one
//! budgeted, citation-tagged context.

pub mod assemble;
pub mod coordinator;
pub mod rank;

pub use assemble::{assemble, ContextPack, MAX_CITATION_KEYS};
pub use coordinator::{retrieve, RetrievalOutcome, SourceOutcome, SourceSpec, SourceStatus};
pub use rank::{pick_top_unique, pick_top_weighted};
