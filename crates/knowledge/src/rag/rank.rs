//! Per-source ranking and deduplication.
//!
//! Both rankers are pure: the same input list and limit always produce the
//! same output.

use crate::chunk::Chunk;
use std::cmp::Ordering;
use std::collections::HashSet;

/// Number of leading characters compared for near-duplicate detection.
pub const DEDUP_PREFIX_CHARS: usize = 200;

/// Near-duplicate key: first 200 chars of the trimmed, lowercased content.
pub fn content_key(content: &str) -> String {
    content
        .trim()
        .to_lowercase()
        .chars()
        .take(DEDUP_PREFIX_CHARS)
        .collect()
}

/// Descending score order. NaN sorts last; ties keep input order.
fn by_score_desc(a: f32, b: f32) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => b.partial_cmp(&a).unwrap_or(Ordering::Equal),
    }
}

/// Sort `scored` by score, drop duplicates, keep at most `limit`.
fn select_unique<'a>(mut scored: Vec<(&'a Chunk, f32)>, limit: usize) -> Vec<(&'a Chunk, f32)> {
    // sort_by is stable, so equal scores keep first-appearance order
    scored.sort_by(|a, b| by_score_desc(a.1, b.1));

    let mut seen_ids = HashSet::new();
    let mut seen_content = HashSet::new();
    let mut picked = Vec::with_capacity(limit.min(scored.len()));

    for (chunk, score) in scored {
        if picked.len() >= limit {
            break;
        }
        let id_dup = seen_ids.contains(chunk.id.as_str());
        let key = content_key(&chunk.content);
        if id_dup || seen_content.contains(&key) {
            tracing::trace!(id = %chunk.id, "Dropping duplicate chunk");
            continue;
        }
        seen_ids.insert(chunk.id.as_str());
        seen_content.insert(key);
        picked.push((chunk, score));
    }

    picked
}

/// Top `limit` chunks by similarity with duplicates removed.
///
/// Two chunks are duplicates when they share an `id` or the same
/// [`content_key`]. The higher-ranked one wins.
pub fn pick_top_unique(chunks: &[Chunk], limit: usize) -> Vec<Chunk> {
    let scored = chunks.iter().map(|c| (c, c.similarity)).collect();
    select_unique(scored, limit)
        .into_iter()
        .map(|(chunk, _)| chunk.clone())
        .collect()
}

/// Weighted variant: score is `similarity * weight`, and chunks scoring
/// below `min_score` are dropped before selection.
///
/// Returns each kept chunk with its weighted score.
pub fn pick_top_weighted(
    chunks: &[Chunk],
    weight: f32,
    min_score: f32,
    limit: usize,
) -> Vec<(Chunk, f32)> {
    let scored = chunks
        .iter()
        .map(|c| (c, c.similarity * weight))
        .filter(|(_, score)| *score >= min_score)
        .collect();

    select_unique(scored, limit)
        .into_iter()
        .map(|(chunk, score)| (chunk.clone(), score))
        .collect()
}
