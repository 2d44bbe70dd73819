//! Token-aware sentence chunker with overlap.
//!
//! Splits section text into [`TextChunk`]s bounded by a token budget. Token
//! counts come from a word/punctuation heuristic ([`estimate_token_count`])
//! rather than a real tokenizer, so results are reproducible everywhere.
//!
//! # Algorithm
//!
//! 1. Normalize whitespace (trim, collapse runs to a single space).
//! 2. If the whole text fits in `max_tokens`, return it as one chunk.
//! 3. Split on sentence boundaries (`.`, `!` or `?` followed by a space).
//! 4. Accumulate sentences until the next one would exceed `max_tokens`,
//!    then close the chunk and seed the next one with the last
//!    `ceil(overlap_tokens / 1.3)` words of the closed chunk. A chunk still
//!    below `min_tokens` is not closed; it takes the sentence anyway.
//! 5. A sentence that alone exceeds `max_tokens` is hard-split at word
//!    boundaries into pieces of about `target_tokens × 4` bytes.
//! 6. A trailing chunk below `min_tokens` is merged into its predecessor.
//!
//! Every chunk is a contiguous slice of the normalized text, so offsets are
//! byte positions into that string and overlapping chunks simply share a
//! range.
//!
//! # Example
//!
//! ```rust
//! use lexgraph_core::chunk::{chunk_text, estimate_token_count, ChunkConfig};
//!
//! assert_eq!(estimate_token_count("hello world."), 3);
//! let chunks = chunk_text("  Short   text. ", &ChunkConfig::default());
//! assert_eq!(chunks.len(), 1);
//! assert_eq!(chunks[0].text, "Short text.");
//! ```

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// Approximate characters-per-token ratio used by the hard splitter.
const CHARS_PER_TOKEN: usize = 4;

const TOKENS_PER_WORD: f64 = 1.3;
const TOKENS_PER_PUNCTUATION: f64 = 0.3;

const PUNCTUATION: [char; 14] = [
    '.', ',', '!', '?', ';', ':', '(', ')', '[', ']', '{', '}', '\'', '"',
];

const SENTENCE_END: [char; 3] = ['.', '!', '?'];

/// Token budget for the chunker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkConfig {
    pub target_tokens: usize,
    pub min_tokens: usize,
    pub max_tokens: usize,
    pub overlap_tokens: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            target_tokens: 300,
            min_tokens: 100,
            max_tokens: 600,
            overlap_tokens: 50,
        }
    }
}

impl ChunkConfig {
    /// Budget used by the ingestion pipeline for legal sections.
    pub fn pipeline_default() -> Self {
        Self {
            target_tokens: 200,
            min_tokens: 80,
            max_tokens: 400,
            overlap_tokens: 30,
        }
    }

    /// Requires positive values with `min < target < max`.
    pub fn validate(&self) -> Result<()> {
        if self.min_tokens == 0 || self.overlap_tokens == 0 {
            bail!("chunking.min_tokens and chunking.overlap_tokens must be > 0");
        }
        if !(self.min_tokens < self.target_tokens && self.target_tokens < self.max_tokens) {
            bail!(
                "chunking requires min_tokens < target_tokens < max_tokens (got {} / {} / {})",
                self.min_tokens,
                self.target_tokens,
                self.max_tokens
            );
        }
        Ok(())
    }
}

/// One chunk of normalized text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextChunk {
    pub text: String,
    pub token_count: usize,
    /// Byte offset into the normalized text (inclusive).
    pub start_offset: usize,
    /// Byte offset into the normalized text (exclusive).
    pub end_offset: usize,
    pub chunk_index: usize,
}

/// Estimate the token count of `text`.
///
/// `ceil(words × 1.3 + punctuation × 0.3)`, where words are
/// whitespace-separated runs and punctuation counts characters in
/// `. , ! ? ; : ( ) [ ] { } ' "`. Blank text is 0 tokens.
pub fn estimate_token_count(text: &str) -> usize {
    let words = text.split_whitespace().count();
    if words == 0 {
        return 0;
    }
    let punctuation = text.chars().filter(|c| PUNCTUATION.contains(c)).count();
    (words as f64 * TOKENS_PER_WORD + punctuation as f64 * TOKENS_PER_PUNCTUATION).ceil() as usize
}

/// Trim and collapse every whitespace run to a single space.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Split `text` into chunks that respect `config`.
///
/// Blank input yields an empty vector. Indices are contiguous from 0 and
/// offsets never decrease.
pub fn chunk_text(text: &str, config: &ChunkConfig) -> Vec<TextChunk> {
    let normalized = normalize_whitespace(text);
    if normalized.is_empty() {
        return Vec::new();
    }

    let total = estimate_token_count(&normalized);
    if total <= config.max_tokens {
        return vec![TextChunk {
            token_count: total,
            start_offset: 0,
            end_offset: normalized.len(),
            chunk_index: 0,
            text: normalized,
        }];
    }

    chunk_spans(&normalized, config)
        .into_iter()
        .enumerate()
        .map(|(index, span)| make_chunk(&normalized, span, index))
        .collect()
}

/// Half-open byte range into the normalized text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Span {
    start: usize,
    end: usize,
}

impl Span {
    fn tokens(self, text: &str) -> usize {
        estimate_token_count(&text[self.start..self.end])
    }
}

fn chunk_spans(text: &str, config: &ChunkConfig) -> Vec<Span> {
    let mut spans: Vec<Span> = Vec::new();
    let mut current: Option<Span> = None;

    for segment in sentence_segments(text) {
        if segment.tokens(text) > config.max_tokens {
            if let Some(open) = current.take() {
                spans.push(open);
            }
            spans.extend(force_split(text, segment, config));
            continue;
        }

        let next = match current {
            None => segment,
            Some(open) => {
                let combined = Span {
                    start: open.start,
                    end: segment.end,
                };
                // An undersized chunk takes the segment even past max_tokens.
                if combined.tokens(text) <= config.max_tokens
                    || open.tokens(text) < config.min_tokens
                {
                    combined
                } else {
                    spans.push(open);
                    match overlap_start(text, open, config.overlap_tokens) {
                        Some(start) => {
                            let seeded = Span {
                                start,
                                end: segment.end,
                            };
                            if seeded.tokens(text) <= config.max_tokens {
                                seeded
                            } else {
                                segment
                            }
                        }
                        None => segment,
                    }
                }
            }
        };
        current = Some(next);
    }

    if let Some(open) = current {
        if open.tokens(text) >= config.min_tokens || spans.is_empty() {
            spans.push(open);
        } else if let Some(last) = spans.last_mut() {
            last.end = open.end;
        }
    }

    spans
}

/// Sentence-like segments: a boundary is `.`, `!` or `?` followed by a space.
fn sentence_segments(text: &str) -> Vec<Span> {
    let bytes = text.as_bytes();
    let mut segments = Vec::new();
    let mut start = 0;

    for (i, c) in text.char_indices() {
        if !SENTENCE_END.contains(&c) {
            continue;
        }
        let end = i + c.len_utf8();
        if end < bytes.len() && bytes[end] == b' ' {
            if end > start {
                segments.push(Span { start, end });
            }
            start = end + 1;
        }
    }
    if start < text.len() {
        segments.push(Span {
            start,
            end: text.len(),
        });
    }
    segments
}

/// Start of the last `ceil(overlap_tokens / 1.3)` words of `span`.
///
/// Returns `None` when no overlap should be carried.
fn overlap_start(text: &str, span: Span, overlap_tokens: usize) -> Option<usize> {
    let words = (overlap_tokens as f64 / TOKENS_PER_WORD).ceil() as usize;
    if words == 0 {
        return None;
    }
    let slice = &text[span.start..span.end];
    let mut word_starts = vec![span.start];
    word_starts.extend(
        slice
            .match_indices(' ')
            .map(|(i, _)| span.start + i + 1)
            .filter(|&i| i < span.end),
    );
    if words >= word_starts.len() {
        return Some(span.start);
    }
    Some(word_starts[word_starts.len() - words])
}

/// Hard-split an oversized segment into ~`target_tokens × 4` byte pieces,
/// preferring the last space before the limit.
fn force_split(text: &str, segment: Span, config: &ChunkConfig) -> Vec<Span> {
    let bytes = text.as_bytes();
    let limit = config.target_tokens.saturating_mul(CHARS_PER_TOKEN).max(1);
    let mut pieces = Vec::new();
    let mut offset = segment.start;

    while offset < segment.end {
        let mut end = snap_to_char_boundary(text, offset.saturating_add(limit).min(segment.end));

        if end < segment.end {
            let window_end = if bytes[end] == b' ' { end + 1 } else { end };
            if let Some(space) = text[offset..window_end].rfind(' ') {
                if space > 0 {
                    end = offset + space;
                }
            }
        }

        if end <= offset {
            end = text[offset..]
                .char_indices()
                .nth(1)
                .map(|(i, _)| offset + i)
                .unwrap_or(segment.end);
        }

        let mut piece_end = end;
        while piece_end > offset && bytes[piece_end - 1] == b' ' {
            piece_end -= 1;
        }
        if piece_end > offset {
            pieces.push(Span {
                start: offset,
                end: piece_end,
            });
        }

        offset = end;
        while offset < segment.end && bytes[offset] == b' ' {
            offset += 1;
        }
    }

    pieces
}

/// Snap a byte index back to the nearest valid UTF-8 char boundary.
fn snap_to_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    let mut i = index;
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

fn make_chunk(text: &str, span: Span, index: usize) -> TextChunk {
    let slice = &text[span.start..span.end];
    TextChunk {
        text: slice.to_string(),
        token_count: estimate_token_count(slice),
        start_offset: span.start,
        end_offset: span.end,
        chunk_index: index,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIVE_WORDS: &str = "alpha beta gamma delta epsilon.";

    fn small_config() -> ChunkConfig {
        ChunkConfig {
            target_tokens: 20,
            min_tokens: 10,
            max_tokens: 30,
            overlap_tokens: 3,
        }
    }

    fn long_text(sentences: usize) -> String {
        (0..sentences)
            .map(|i| {
                format!(
                    "Section {} requires the landlord to maintain the premises in good repair.",
                    i
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n  ")
    }

    #[test]
    fn test_token_estimate_formula() {
        assert_eq!(estimate_token_count("hello world."), 3);
        assert_eq!(estimate_token_count(""), 0);
        assert_eq!(estimate_token_count("   \n\t "), 0);
        // 3 words, 2 punctuation marks: ceil(3.9 + 0.6) = 5
        assert_eq!(estimate_token_count("(a) b c"), 5);
    }

    #[test]
    fn test_empty_input_yields_no_chunks() {
        assert!(chunk_text("", &ChunkConfig::default()).is_empty());
        assert!(chunk_text(" \n\n\t ", &ChunkConfig::default()).is_empty());
    }

    #[test]
    fn test_small_text_single_chunk() {
        let chunks = chunk_text("  The   owner\nshall register.  ", &ChunkConfig::default());
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "The owner shall register.");
        assert_eq!(chunks[0].chunk_index, 0);
        assert_eq!(chunks[0].start_offset, 0);
        assert_eq!(chunks[0].end_offset, chunks[0].text.len());
        assert_eq!(chunks[0].token_count, estimate_token_count(&chunks[0].text));
    }

    #[test]
    fn test_overlap_seeds_next_chunk() {
        let text = vec![FIVE_WORDS; 6].join(" ");
        let chunks = chunk_text(&text, &small_config());
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].text, vec![FIVE_WORDS; 4].join(" "));
        assert!(chunks[1].text.starts_with("gamma delta epsilon. alpha"));
        assert!(chunks[1].start_offset < chunks[0].end_offset);
        assert_eq!(chunks[1].end_offset, text.len());
    }

    #[test]
    fn test_trailing_small_chunk_merges_into_previous() {
        let text = format!("{} one two three.", vec![FIVE_WORDS; 4].join(" "));
        let chunks = chunk_text(&text, &small_config());
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, text);
        assert_eq!(chunks[0].token_count, estimate_token_count(&text));
        assert_eq!(chunks[0].end_offset, text.len());
    }

    #[test]
    fn test_short_heading_joins_following_sentence() {
        let text = format!(
            "Short one two three. {}. {}.",
            vec!["w"; 21].join(" "),
            vec!["w"; 20].join(" ")
        );
        let config = small_config();
        let chunks = chunk_text(&text, &config);
        assert_eq!(chunks.len(), 2);
        assert!(chunks[0].text.starts_with("Short one two three. w w"));
        for c in &chunks[..chunks.len() - 1] {
            assert!(
                c.token_count >= config.min_tokens,
                "chunk {} has {} tokens",
                c.chunk_index,
                c.token_count
            );
        }
    }

    #[test]
    fn test_chunk_invariants_on_long_text() {
        let text = long_text(80);
        let normalized = normalize_whitespace(&text);
        let config = ChunkConfig::pipeline_default();
        let chunks = chunk_text(&text, &config);
        assert!(chunks.len() > 1);

        let mut prev_start = 0;
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.chunk_index, i);
            assert_eq!(c.text, &normalized[c.start_offset..c.end_offset]);
            assert_eq!(c.token_count, estimate_token_count(&c.text));
            assert!(c.start_offset >= prev_start);
            prev_start = c.start_offset;
            if i + 1 < chunks.len() {
                assert!(c.token_count <= config.max_tokens);
            }
        }
    }

    #[test]
    fn test_chunks_cover_all_non_whitespace() {
        let text = long_text(60);
        let normalized = normalize_whitespace(&text);
        let chunks = chunk_text(&text, &ChunkConfig::pipeline_default());

        for (i, b) in normalized.bytes().enumerate() {
            if b == b' ' {
                continue;
            }
            assert!(
                chunks
                    .iter()
                    .any(|c| c.start_offset <= i && i < c.end_offset),
                "byte {} not covered",
                i
            );
        }
    }

    #[test]
    fn test_oversized_sentence_is_force_split_at_words() {
        let text = vec!["provision"; 900].join(" ");
        let config = ChunkConfig::pipeline_default();
        let chunks = chunk_text(&text, &config);
        assert!(chunks.len() > 1);
        for c in &chunks {
            assert!(c.text.len() <= config.target_tokens * 4);
            assert!(c.text.split(' ').all(|w| w == "provision"));
        }
        let words: usize = chunks.iter().map(|c| c.text.split(' ').count()).sum();
        assert_eq!(words, 900);
    }

    #[test]
    fn test_multibyte_text_splits_on_char_boundaries() {
        let text = vec!["règlement"; 700].join(" ");
        let chunks = chunk_text(&text, &ChunkConfig::pipeline_default());
        assert!(chunks.len() > 1);
        for c in &chunks {
            assert!(c.text.split(' ').all(|w| w == "règlement"));
        }
    }

    #[test]
    fn test_huge_target_does_not_overflow_split_limit() {
        let config = ChunkConfig {
            target_tokens: usize::MAX - 1,
            min_tokens: 1,
            max_tokens: usize::MAX,
            overlap_tokens: 1,
        };
        let text = "alpha beta gamma";
        let segment = Span {
            start: 0,
            end: text.len(),
        };
        let pieces = force_split(text, segment, &config);
        assert_eq!(pieces, vec![segment]);
    }

    #[test]
    fn test_deterministic() {
        let text = long_text(50);
        let config = ChunkConfig::pipeline_default();
        assert_eq!(chunk_text(&text, &config), chunk_text(&text, &config));
    }

    #[test]
    fn test_config_validation() {
        assert!(ChunkConfig::default().validate().is_ok());
        assert!(ChunkConfig::pipeline_default().validate().is_ok());
        let bad = ChunkConfig {
            target_tokens: 50,
            min_tokens: 80,
            max_tokens: 400,
            overlap_tokens: 30,
        };
        assert!(bad.validate().is_err());
    }
}
