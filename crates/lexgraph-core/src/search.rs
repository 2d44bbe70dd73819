//! Keyword retrieval over the vector index.
//!
//! Semantic search is out of scope: the index is filtered by metadata
//! through [`VectorIndex::list_chunks`] and the surviving chunks are ranked
//! by how many distinct query terms their text contains.
//!
//! # Ranking
//!
//! 1. Tokenize the query into distinct lower-cased terms.
//! 2. Count the terms each filtered chunk contains (substring match).
//! 3. Drop chunks with no match.
//! 4. Normalize counts to `[0, 1]` with min-max normalization.
//! 5. Sort by score (desc), jurisdiction rank (desc), authority rank
//!    (desc), document id, chunk index.
//! 6. Truncate to `limit`.

use anyhow::Result;
use serde::Serialize;

use crate::models::{AuthorityLevel, Jurisdiction};
use crate::store::{ChunkFilter, VectorIndex};

const SNIPPET_CHARS: usize = 240;

/// One ranked chunk.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    pub chunk_id: String,
    pub document_id: String,
    pub citation: String,
    pub heading: String,
    pub jurisdiction: Jurisdiction,
    pub authority_level: AuthorityLevel,
    pub chunk_index: usize,
    /// Relevance in `[0.0, 1.0]`.
    pub score: f64,
    /// Distinct query terms found in the chunk.
    pub matched_terms: usize,
    pub snippet: String,
}

/// Split a query into distinct lower-cased terms, stripping punctuation
/// at term edges.
pub fn query_terms(query: &str) -> Vec<String> {
    let mut terms: Vec<String> = Vec::new();
    for raw in query.split_whitespace() {
        let term = raw
            .trim_matches(|c: char| !c.is_alphanumeric() && c != '§')
            .to_lowercase();
        if !term.is_empty() && !terms.contains(&term) {
            terms.push(term);
        }
    }
    terms
}

/// Rank chunks matching `filter` by query-term coverage.
pub async fn search_chunks<S>(
    store: &S,
    query: &str,
    filter: &ChunkFilter,
    limit: usize,
) -> Result<Vec<SearchHit>>
where
    S: VectorIndex + ?Sized,
{
    let terms = query_terms(query);
    if terms.is_empty() || limit == 0 {
        return Ok(Vec::new());
    }

    let candidates = store
        .list_chunks(&ChunkFilter {
            limit: None,
            ..filter.clone()
        })
        .await?;

    let mut hits: Vec<SearchHit> = candidates
        .into_iter()
        .filter_map(|chunk| {
            let lowered = chunk.text.to_lowercase();
            let matched = terms.iter().filter(|t| lowered.contains(t.as_str())).count();
            if matched == 0 {
                return None;
            }
            Some(SearchHit {
                snippet: snippet(&chunk.text, &lowered, &terms),
                chunk_id: chunk.id,
                document_id: chunk.metadata.document_id,
                citation: chunk.metadata.citation,
                heading: chunk.metadata.heading,
                jurisdiction: chunk.metadata.jurisdiction,
                authority_level: chunk.metadata.authority_level,
                chunk_index: chunk.chunk_index,
                score: 0.0,
                matched_terms: matched,
            })
        })
        .collect();

    let raw: Vec<f64> = hits.iter().map(|h| h.matched_terms as f64).collect();
    for (hit, norm) in hits.iter_mut().zip(normalize_scores(&raw)) {
        hit.score = norm;
    }

    hits.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(b.jurisdiction.rank().cmp(&a.jurisdiction.rank()))
            .then(b.authority_level.rank().cmp(&a.authority_level.rank()))
            .then(a.document_id.cmp(&b.document_id))
            .then(a.chunk_index.cmp(&b.chunk_index))
    });
    hits.truncate(filter.limit.map_or(limit, |l| l.min(limit)));
    Ok(hits)
}

/// Min-max normalize raw scores to `[0.0, 1.0]`.
///
/// If all scores are equal, they are normalized to `1.0`.
pub fn normalize_scores(raw: &[f64]) -> Vec<f64> {
    if raw.is_empty() {
        return Vec::new();
    }
    let s_min = raw.iter().copied().fold(f64::INFINITY, f64::min);
    let s_max = raw.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    raw.iter()
        .map(|s| {
            if (s_max - s_min).abs() < f64::EPSILON {
                1.0
            } else {
                (s - s_min) / (s_max - s_min)
            }
        })
        .collect()
}

/// Excerpt starting a little before the first matching term.
fn snippet(text: &str, lowered: &str, terms: &[String]) -> String {
    // Lower-casing can change byte lengths; only trust offsets when it didn't.
    let first = if lowered.len() == text.len() {
        terms.iter().filter_map(|t| lowered.find(t.as_str())).min()
    } else {
        None
    };
    let mut start = first.map_or(0, |pos| pos.saturating_sub(40));
    while !text.is_char_boundary(start) {
        start -= 1;
    }
    let excerpt: String = text[start..].chars().take(SNIPPET_CHARS).collect();
    if start > 0 {
        format!("…{}", excerpt.trim_start())
    } else {
        excerpt
    }
}
