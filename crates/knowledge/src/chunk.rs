//! Chunk model shared by every retrieval stage.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A unit of retrieved evidence.
///
/// Chunks are produced by a search backend and never mutated afterwards.
/// `(source, id)` is unique within one retrieval pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Identifier, unique within its source
    pub id: String,

    /// Raw text
    pub content: String,

    /// Open metadata (title, category, project association, ...)
    #[serde(default)]
    pub metadata: Map<String, Value>,

    /// Source-defined relevance, higher is better
    pub similarity: f32,

    /// Name of the source that produced this chunk
    pub source: String,
}

impl Chunk {
    /// Create a chunk with empty metadata.
    pub fn new(
        source: impl Into<String>,
        id: impl Into<String>,
        content: impl Into<String>,
        similarity: f32,
    ) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            metadata: Map::new(),
            similarity,
            source: source.into(),
        }
    }

    /// Attach a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Citation key `#{source}:{id}`.
    pub fn citation_key(&self) -> String {
        format!("#{}:{}", self.source, self.id)
    }

    /// Display title from metadata `title`, falling back to `name`.
    pub fn title(&self) -> Option<&str> {
        ["title", "name"]
            .iter()
            .filter_map(|key| self.metadata.get(*key))
            .filter_map(Value::as_str)
            .map(str::trim)
            .find(|title| !title.is_empty())
    }
}

/// Citation entry derived from a used chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CitationRef {
    /// Score the chunk was selected with
    pub score: f32,

    /// The chunk's metadata
    pub metadata: Map<String, Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_citation_key() {
        let chunk = Chunk::new("project", "42", "text", 0.9);
        assert_eq!(chunk.citation_key(), "#project:42");
    }

    #[test]
    fn test_title_prefers_title_over_name() {
        let chunk = Chunk::new("framework", "a", "text", 0.5)
            .with_metadata("name", "Gateway Guide")
            .with_metadata("title", "Gate 3 Checklist");
        assert_eq!(chunk.title(), Some("Gate 3 Checklist"));

        let chunk =
            Chunk::new("framework", "b", "text", 0.5).with_metadata("name", "Gateway Guide");
        assert_eq!(chunk.title(), Some("Gateway Guide"));
    }

    #[test]
    fn test_title_ignores_blank_and_non_string() {
        let chunk = Chunk::new("context", "c", "text", 0.5)
            .with_metadata("title", "  ")
            .with_metadata("name", 7);
        assert_eq!(chunk.title(), None);
    }

    #[test]
    fn test_chunk_deserializes_without_metadata() {
        let chunk: Chunk = serde_json::from_str(
            r#"{"id":"1","content":"x","similarity":0.4,"source":"sentiment"}"#,
        )
        .unwrap();
        assert!(chunk.metadata.is_empty());
    }
}
