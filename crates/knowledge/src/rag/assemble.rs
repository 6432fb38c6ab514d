//! Context assembly under a character budget.
//!
//! Two policies:
//! - **Greedy**: every source's top-k chunks in priority order, joined, then
//!   hard-truncated at the budget. Citations cover every chosen chunk, so a
//!   cut may leave keys whose text was dropped.
//! - **Weighted**: weighted scores with a floor, content clipped per chunk,
//!   and a fixed sub-budget per source. Chunks that do not fit are left out
//!   whole, so the text never ends mid-chunk.
//!
//! Budgets count `char`s. Both policies guarantee
//! `context_text.chars().count() <= max_context_chars`.

use super::coordinator::RetrievalOutcome;
use super::rank::{pick_top_unique, pick_top_weighted};
use crate::chunk::{Chunk, CitationRef};
use crate::config::RetrievalConfig;
use serde::Serialize;
use std::collections::BTreeMap;
use velosight_core::config::AssemblyMode;

/// Separator between rendered chunks.
pub const CHUNK_SEPARATOR: &str = "\n\n---\n\n";

/// Per-chunk content limit in weighted mode.
pub const WEIGHTED_SNIPPET_CHARS: usize = 1500;

/// Citation keys handed to the prompt are capped at this many.
pub const MAX_CITATION_KEYS: usize = 50;

/// Budgeted, citation-tagged evidence for one request.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextPack {
    /// Text embedded in the prompt
    pub context_text: String,

    /// Chunks that contributed, in the order they appear in the text
    pub used: Vec<Chunk>,

    /// `#{source}:{id}` to score and metadata, one entry per used chunk
    pub citations: BTreeMap<String, CitationRef>,

    /// Whether the budget cut or left out evidence
    pub truncated: bool,
}

impl ContextPack {
    pub fn is_empty(&self) -> bool {
        self.used.is_empty()
    }

    /// Citation keys in `used` order, at most `limit`.
    pub fn citation_keys(&self, limit: usize) -> Vec<String> {
        self.used
            .iter()
            .take(limit)
            .map(Chunk::citation_key)
            .collect()
    }

    /// Number of used chunks from one source.
    pub fn used_from(&self, source: &str) -> usize {
        self.used.iter().filter(|c| c.source == source).count()
    }
}

/// Assemble with the policy selected in `config`.
pub fn assemble(config: &RetrievalConfig, retrieved: &RetrievalOutcome) -> ContextPack {
    let pack = match config.assembly() {
        AssemblyMode::Greedy => assemble_greedy(config, retrieved),
        AssemblyMode::Weighted => assemble_weighted(config, retrieved),
    };

    tracing::debug!(
        mode = config.assembly().as_str(),
        chunks = pack.used.len(),
        chars = pack.context_text.chars().count(),
        truncated = pack.truncated,
        "Assembled context"
    );

    pack
}

/// Greedy concatenation followed by a hard cut.
pub fn assemble_greedy(config: &RetrievalConfig, retrieved: &RetrievalOutcome) -> ContextPack {
    let mut rendered = Vec::new();
    let mut pack = ContextPack::default();

    for source in config.sources() {
        for chunk in pick_top_unique(retrieved.chunks_for(source.name()), source.k()) {
            rendered.push(format!(
                "[{} | score={:.3}]\n{}",
                chunk.citation_key(),
                chunk.similarity,
                chunk.content
            ));
            pack.citations.insert(
                chunk.citation_key(),
                CitationRef {
                    score: chunk.similarity,
                    metadata: chunk.metadata.clone(),
                },
            );
            pack.used.push(chunk);
        }
    }

    let joined = rendered.join(CHUNK_SEPARATOR);
    let (text, truncated) = truncate_chars(&joined, config.max_context_chars());
    pack.context_text = text.to_string();
    pack.truncated = truncated;
    pack
}

/// Weighted selection with per-source sub-budgets.
pub fn assemble_weighted(config: &RetrievalConfig, retrieved: &RetrievalOutcome) -> ContextPack {
    let max_chars = config.max_context_chars();
    let separator_len = CHUNK_SEPARATOR.chars().count();

    let mut parts: Vec<String> = Vec::new();
    let mut total = 0usize;
    let mut pack = ContextPack::default();

    for source in config.sources() {
        let sub_budget = source.sub_budget(max_chars);
        let mut section = 0usize;

        let picked = pick_top_weighted(
            retrieved.chunks_for(source.name()),
            source.weight(),
            config.min_score(),
            source.k(),
        );

        for (chunk, score) in picked {
            let block = render_weighted(&chunk, score);
            let block_len = block.chars().count();

            if section + block_len > sub_budget {
                pack.truncated = true;
                break;
            }

            let joined_len = if parts.is_empty() {
                block_len
            } else {
                separator_len + block_len
            };
            if total + joined_len > max_chars {
                pack.truncated = true;
                continue;
            }

            section += block_len;
            total += joined_len;
            parts.push(block);
            pack.citations.insert(
                chunk.citation_key(),
                CitationRef {
                    score,
                    metadata: chunk.metadata.clone(),
                },
            );
            pack.used.push(chunk);
        }
    }

    pack.context_text = parts.join(CHUNK_SEPARATOR);
    pack
}

fn render_weighted(chunk: &Chunk, score: f32) -> String {
    let content = truncate_chars(&chunk.content, WEIGHTED_SNIPPET_CHARS).0;
    match chunk.title() {
        Some(title) => format!(
            "[{} | score={:.3} | title=\"{}\"]\n{}",
            chunk.citation_key(),
            score,
            title.replace('"', "'"),
            content
        ),
        None => format!("[{} | score={:.3}]\n{}", chunk.citation_key(), score, content),
    }
}

/// Cut `text` to at most `max_chars` characters on a char boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> (&str, bool) {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => (&text[..byte_idx], true),
        None => (text, false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetrievalOverrides;
    use crate::rag::coordinator::{SourceOutcome, SourceStatus};
    use std::time::Duration;

    fn outcome(sources: Vec<(&str, Vec<Chunk>)>) -> RetrievalOutcome {
        RetrievalOutcome::from_sources(
            sources
                .into_iter()
                .map(|(name, chunks)| SourceOutcome {
                    name: name.to_string(),
                    status: SourceStatus::Ok,
                    chunks,
                    elapsed: Duration::ZERO,
                })
                .collect(),
        )
    }

    fn chunks(source: &str, scores: &[f32], len: usize) -> Vec<Chunk> {
        scores
            .iter()
            .enumerate()
            .map(|(i, s)| {
                let body: String = format!("{} evidence {} ", source, i)
                    .chars()
                    .cycle()
                    .take(len)
                    .collect();
                Chunk::new(source, format!("{}{}", &source[..1], i), body, *s)
            })
            .collect()
    }

    fn config(mode: AssemblyMode, max_chars: usize, k: usize) -> RetrievalConfig {
        let overrides = RetrievalOverrides::new()
            .with_k("project", k)
            .with_k("context", k)
            .with_k("sentiment", k)
            .with_k("framework", k)
            .with_max_context_chars(max_chars)
            .with_assembly(mode);
        RetrievalConfig::default().with_overrides(&overrides).unwrap()
    }

    fn sample() -> RetrievalOutcome {
        outcome(vec![
            ("framework", chunks("framework", &[0.95, 0.7, 0.3], 300)),
            ("project", chunks("project", &[0.9, 0.8, 0.5], 300)),
            ("context", chunks("context", &[0.8, 0.4], 300)),
        ])
    }

    #[test]
    fn test_greedy_follows_priority_order() {
        let pack = assemble_greedy(&config(AssemblyMode::Greedy, 100_000, 2), &sample());

        let sources: Vec<_> = pack.used.iter().map(|c| c.source.as_str()).collect();
        assert_eq!(sources, ["project", "project", "context", "context", "framework", "framework"]);
        assert!(pack.context_text.starts_with("[#project:p0 | score=0.900]\n"));
        assert_eq!(pack.context_text.matches(CHUNK_SEPARATOR).count(), 5);
        assert!(!pack.truncated);
    }

    #[test]
    fn test_greedy_hard_truncates_but_keeps_citations() {
        let pack = assemble_greedy(&config(AssemblyMode::Greedy, 500, 2), &sample());

        assert_eq!(pack.context_text.chars().count(), 500);
        assert!(pack.truncated);
        assert_eq!(pack.used.len(), 6);
        assert_eq!(pack.citations.len(), 6);
        assert!(pack.citations.contains_key("#framework:f1"));
    }

    #[test]
    fn test_greedy_truncation_is_char_safe() {
        let retrieved = outcome(vec![(
            "project",
            vec![Chunk::new("project", "u", "é🚦".repeat(200), 0.9)],
        )]);
        let pack = assemble_greedy(&config(AssemblyMode::Greedy, 101, 1), &retrieved);
        assert_eq!(pack.context_text.chars().count(), 101);
    }

    #[test]
    fn test_weighted_header_score_and_title() {
        let retrieved = outcome(vec![(
            "sentiment",
            vec![Chunk::new("sentiment", "s1", "Team morale is low", 0.9)
                .with_metadata("title", "Pulse \"Q3\"")],
        )]);
        let pack = assemble_weighted(&config(AssemblyMode::Weighted, 10_000, 2), &retrieved);

        // sentiment weight is 0.6
        assert_eq!(
            pack.context_text,
            "[#sentiment:s1 | score=0.540 | title=\"Pulse 'Q3'\"]\nTeam morale is low"
        );
        assert!((pack.citations["#sentiment:s1"].score - 0.54).abs() < 1e-6);
    }

    #[test]
    fn test_weighted_clips_long_content() {
        let retrieved = outcome(vec![(
            "project",
            vec![Chunk::new("project", "big", "z".repeat(5000), 0.9)],
        )]);
        let pack = assemble_weighted(&config(AssemblyMode::Weighted, 100_000, 1), &retrieved);
        assert_eq!(pack.context_text.matches('z').count(), WEIGHTED_SNIPPET_CHARS);
    }

    #[test]
    fn test_weighted_sub_budget_stops_source() {
        // 4000 * 1/4 = 1000 chars for project, each block is ~330 chars
        let retrieved = outcome(vec![(
            "project",
            chunks("project", &[0.9, 0.89, 0.88, 0.87, 0.86], 300),
        )]);
        let pack = assemble_weighted(&config(AssemblyMode::Weighted, 4000, 5), &retrieved);

        assert_eq!(pack.used_from("project"), 3);
        assert!(pack.truncated);
        assert!(pack.context_text.chars().count() <= 4000);
    }

    #[test]
    fn test_weighted_floor_drops_low_scores() {
        let retrieved = outcome(vec![("sentiment", chunks("sentiment", &[0.5, 0.3], 50))]);
        let pack = assemble_weighted(&config(AssemblyMode::Weighted, 10_000, 5), &retrieved);

        // 0.3 * 0.6 = 0.18 < 0.20
        assert_eq!(pack.used.len(), 1);
    }

    #[test]
    fn test_budget_holds_for_tiny_budgets() {
        for mode in [AssemblyMode::Greedy, AssemblyMode::Weighted] {
            for max_chars in [1, 7, 64, 333, 1000] {
                let pack = assemble(&config(mode, max_chars, 3), &sample());
                assert!(
                    pack.context_text.chars().count() <= max_chars,
                    "{:?} exceeded {}",
                    mode,
                    max_chars
                );
            }
        }
    }

    #[test]
    fn test_citations_match_used() {
        for mode in [AssemblyMode::Greedy, AssemblyMode::Weighted] {
            let pack = assemble(&config(mode, 3000, 2), &sample());
            assert_eq!(pack.citations.len(), pack.used.len());
            for chunk in &pack.used {
                assert!(pack.citations.contains_key(&chunk.citation_key()));
            }
        }
    }

    #[test]
    fn test_weighted_used_chunks_appear_in_text_order() {
        let pack = assemble_weighted(&config(AssemblyMode::Weighted, 10_000, 2), &sample());
        let mut last = 0;
        for chunk in &pack.used {
            let pos = pack
                .context_text
                .find(&format!("[{} |", chunk.citation_key()))
                .unwrap();
            assert!(pos >= last);
            last = pos;
        }
    }

    #[test]
    fn test_assembly_is_deterministic() {
        for mode in [AssemblyMode::Greedy, AssemblyMode::Weighted] {
            let first = assemble(&config(mode, 1500, 2), &sample());
            let second = assemble(&config(mode, 1500, 2), &sample());
            assert_eq!(first, second);
            assert_eq!(
                serde_json::to_string(&first).unwrap(),
                serde_json::to_string(&second).unwrap()
            );
        }
    }

    #[test]
    fn test_empty_retrieval_gives_empty_pack() {
        let pack = assemble(&RetrievalConfig::default(), &RetrievalOutcome::default());
        assert!(pack.is_empty());
        assert!(pack.context_text.is_empty());
        assert!(pack.citations.is_empty());
    }

    #[test]
    fn test_citation_keys_are_capped() {
        let many: Vec<Chunk> = (0..80)
            .map(|i| Chunk::new("project", format!("{}", i), format!("distinct body {}", i), 0.5))
            .collect();
        let pack = assemble_greedy(
            &config(AssemblyMode::Greedy, 1_000_000, 80),
            &outcome(vec![("project", many)]),
        );

        let keys = pack.citation_keys(MAX_CITATION_KEYS);
        assert_eq!(keys.len(), MAX_CITATION_KEYS);
        assert_eq!(keys[0], "#project:0");
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("héllo", 2), ("hé", true));
        assert_eq!(truncate_chars("héllo", 5), ("héllo", false));
        assert_eq!(truncate_chars("", 0), ("", false));
    }
}
