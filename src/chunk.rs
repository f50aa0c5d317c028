//! Line-oriented, token-budgeted source chunker.
//!
//! Splits file text into [`Chunk`]s that respect `max_tokens`. Splitting
//! happens on line boundaries so a chunk never cuts a statement in half
//! unless a single line is itself over budget. Adjacent chunks share up to
//! `overlap_tokens` of trailing lines, and a short tail may be absorbed into
//! the final chunk as long as it stays within the overflow allowance.
//!
//! Token counts are estimated at four characters per token. Every emitted
//! chunk satisfies `token_count <= floor(max_tokens * (1 + overflow_allowance))`.

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::config::ChunkingConfig;
use crate::models::Chunk;

/// Approximate chars-per-token ratio.
pub const CHARS_PER_TOKEN: usize = 4;

/// Estimate the token count of `text`.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(CHARS_PER_TOKEN)
}

#[derive(Debug, Clone, Copy)]
pub struct ChunkParams {
    pub max_tokens: usize,
    pub overlap_tokens: usize,
    pub overflow_allowance: f64,
}

impl ChunkParams {
    pub fn from_config(config: &ChunkingConfig) -> Self {
        Self {
            max_tokens: config.max_tokens,
            overlap_tokens: config.overlap_tokens,
            overflow_allowance: config.overflow_allowance,
        }
    }

    /// Absolute upper bound on a chunk's token count.
    pub fn hard_cap(&self) -> usize {
        let cap = (self.max_tokens as f64 * (1.0 + self.overflow_allowance)).floor() as usize;
        cap.max(self.max_tokens)
    }
}

struct Lines<'a> {
    text: Vec<&'a str>,
    /// prefix[i] = total chars of lines[0..i], excluding separators.
    prefix: Vec<usize>,
}

impl<'a> Lines<'a> {
    fn new(source: &'a str) -> Self {
        let text: Vec<&str> = source.lines().collect();
        let mut prefix = Vec::with_capacity(text.len() + 1);
        prefix.push(0);
        for line in &text {
            let last = prefix[prefix.len() - 1];
            prefix.push(last + line.chars().count());
        }
        Self { text, prefix }
    }

    fn len(&self) -> usize {
        self.text.len()
    }

    fn line_chars(&self, i: usize) -> usize {
        self.prefix[i + 1] - self.prefix[i]
    }

    /// Chars of lines[start..end] joined with `\n`.
    fn range_chars(&self, start: usize, end: usize) -> usize {
        if end <= start {
            return 0;
        }
        self.prefix[end] - self.prefix[start] + (end - start - 1)
    }

    fn join(&self, start: usize, end: usize) -> String {
        self.text[start..end].join("\n")
    }
}

/// Split `text` into chunks owned by `file_id`.
///
/// Returns chunks with contiguous indices starting at 0. Whitespace-only
/// input yields no chunks.
pub fn chunk_source(file_id: &str, text: &str, params: &ChunkParams) -> Vec<Chunk> {
    let mut out = ChunkSink::new(file_id);
    if text.trim().is_empty() || params.max_tokens == 0 {
        return out.chunks;
    }

    let max_chars = params.max_tokens * CHARS_PER_TOKEN;
    let cap_chars = params.hard_cap() * CHARS_PER_TOKEN;
    let overlap_chars = params.overlap_tokens * CHARS_PER_TOKEN;

    let lines = Lines::new(text);
    let n = lines.len();

    // Window is lines[start..end]; `end == i` at the top of each iteration.
    let mut start = 0;
    let mut end = 0;
    let mut i = 0;

    while i < n {
        if lines.line_chars(i) > max_chars {
            if end > start {
                out.push(lines.join(start, end), start + 1, end);
            }
            for piece in split_at_chars(lines.text[i], max_chars) {
                out.push(piece.to_string(), i + 1, i + 1);
            }
            i += 1;
            start = i;
            end = i;
            continue;
        }

        if lines.range_chars(start, i + 1) <= max_chars {
            end = i + 1;
            i += 1;
            continue;
        }

        // The next line does not fit. Absorb the whole tail if it stays under the cap.
        if lines.range_chars(start, n) <= cap_chars {
            end = n;
            break;
        }

        out.push(lines.join(start, end), start + 1, end);

        // Seed the next window with trailing lines of the one just emitted.
        let mut seed = end;
        while seed > start && lines.range_chars(seed - 1, end) <= overlap_chars {
            seed -= 1;
        }
        while seed < end && lines.range_chars(seed, i + 1) > max_chars {
            seed += 1;
        }
        start = seed;
        end = i;
    }

    if end > start {
        out.push(lines.join(start, end), start + 1, end);
    }

    out.chunks
}

/// Split a single over-long line into pieces of at most `max_chars` chars.
fn split_at_chars(line: &str, max_chars: usize) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut piece_start = 0;
    let mut count = 0;
    for (byte_idx, _) in line.char_indices() {
        if count == max_chars {
            pieces.push(&line[piece_start..byte_idx]);
            piece_start = byte_idx;
            count = 0;
        }
        count += 1;
    }
    if piece_start < line.len() {
        pieces.push(&line[piece_start..]);
    }
    pieces
}

struct ChunkSink {
    file_id: String,
    chunks: Vec<Chunk>,
}

impl ChunkSink {
    fn new(file_id: &str) -> Self {
        Self {
            file_id: file_id.to_string(),
            chunks: Vec::new(),
        }
    }

    fn push(&mut self, text: String, start_line: usize, end_line: usize) {
        if text.trim().is_empty() {
            return;
        }
        let index = self.chunks.len() as i64;
        self.chunks.push(make_chunk(
            &self.file_id,
            index,
            text,
            start_line as i64,
            end_line as i64,
        ));
    }
}

fn make_chunk(file_id: &str, index: i64, text: String, start_line: i64, end_line: i64) -> Chunk {
    Chunk {
        id: Uuid::new_v4().to_string(),
        file_id: file_id.to_string(),
        chunk_index: index,
        start_line,
        end_line,
        token_count: estimate_tokens(&text) as i64,
        hash: hash_text(&text),
        text,
    }
}

/// Hex SHA-256 of `text`.
pub fn hash_text(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(max_tokens: usize, overlap_tokens: usize, overflow: f64) -> ChunkParams {
        ChunkParams {
            max_tokens,
            overlap_tokens,
            overflow_allowance: overflow,
        }
    }

    fn numbered_lines(n: usize) -> String {
        (0..n)
            .map(|i| format!("let value_{:03} = {:03};", i, i))
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[test]
    fn test_estimate_tokens() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abc"), 1);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
    }

    #[test]
    fn test_small_text_single_chunk() {
        let chunks = chunk_source("f1", "def f():\n    return 1\n", &params(500, 50, 0.1));
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_index, 0);
        assert_eq!(chunks[0].start_line, 1);
        assert_eq!(chunks[0].end_line, 2);
        assert_eq!(chunks[0].text, "def f():\n    return 1");
    }

    #[test]
    fn test_whitespace_only_yields_nothing() {
        assert!(chunk_source("f1", "", &params(500, 50, 0.1)).is_empty());
        assert!(chunk_source("f1", "\n  \n\t\n", &params(500, 50, 0.1)).is_empty());
    }

    #[test]
    fn test_indices_contiguous_and_bounded() {
        let text = numbered_lines(200);
        let p = params(20, 5, 0.1);
        let chunks = chunk_source("f1", &text, &p);
        assert!(chunks.len() > 1);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.chunk_index, i as i64);
            assert!(c.token_count as usize <= p.hard_cap());
            assert_eq!(c.token_count as usize, estimate_tokens(&c.text));
        }
    }

    #[test]
    fn test_overlap_repeats_trailing_lines() {
        // Each line is 20 chars; max 20 tokens (80 chars) fits three lines.
        let text = numbered_lines(12);
        let chunks = chunk_source("f1", &text, &params(20, 6, 0.0));
        assert!(chunks.len() >= 2);
        for pair in chunks.windows(2) {
            assert!(
                pair[1].start_line <= pair[0].end_line,
                "expected overlap between {:?} and {:?}",
                (pair[0].start_line, pair[0].end_line),
                (pair[1].start_line, pair[1].end_line)
            );
            assert!(pair[1].end_line > pair[0].end_line, "chunking must make progress");
        }
    }

    #[test]
    fn test_zero_overlap_partitions_lines() {
        let text = numbered_lines(12);
        let chunks = chunk_source("f1", &text, &params(20, 0, 0.0));
        for pair in chunks.windows(2) {
            assert_eq!(pair[1].start_line, pair[0].end_line + 1);
        }
        assert_eq!(chunks.last().unwrap().end_line, 12);
    }

    #[test]
    fn test_short_tail_absorbed_within_allowance() {
        // Four lines of 20 chars joined by newlines: 83 chars = 21 tokens.
        let text = numbered_lines(4);
        let strict = chunk_source("f1", &text, &params(20, 0, 0.0));
        assert_eq!(strict.len(), 2);

        let lenient = chunk_source("f1", &text, &params(20, 0, 0.25));
        assert_eq!(lenient.len(), 1);
        assert_eq!(lenient[0].token_count, 21);
    }

    #[test]
    fn test_long_line_hard_split() {
        let long = "x".repeat(100);
        let text = format!("short\n{}\nend", long);
        let chunks = chunk_source("f1", &text, &params(10, 0, 0.0));
        assert_eq!(chunks[0].text, "short");
        let pieces: Vec<_> = chunks.iter().filter(|c| c.start_line == 2).collect();
        assert_eq!(pieces.len(), 3);
        assert!(pieces.iter().all(|c| c.token_count <= 10));
        assert_eq!(chunks.last().unwrap().text, "end");
    }

    #[test]
    fn test_split_respects_char_boundaries() {
        let line = "é".repeat(9);
        let pieces = split_at_chars(&line, 4);
        assert_eq!(pieces, vec!["éééé", "éééé", "é"]);
    }

    #[test]
    fn test_deterministic_text_and_hash() {
        let text = numbered_lines(40);
        let p = params(15, 4, 0.1);
        let a = chunk_source("f1", &text, &p);
        let b = chunk_source("f1", &text, &p);
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(b.iter()) {
            assert_eq!(x.text, y.text);
            assert_eq!(x.hash, y.hash);
            assert_eq!((x.start_line, x.end_line), (y.start_line, y.end_line));
        }
    }

    #[test]
    fn test_hard_cap_never_below_max() {
        assert_eq!(params(500, 50, 0.1).hard_cap(), 550);
        assert_eq!(params(7, 0, 0.0).hard_cap(), 7);
    }
}
