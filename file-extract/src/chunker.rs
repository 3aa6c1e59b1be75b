//! Overlapping token-window chunker.
//!
//! Tokens are runs of non-whitespace; no language-aware tokenization. Scoring
//! happens downstream in the lexical and vector channels, so the split only
//! needs to be stable and overlapping.

use doc_model::{ids, Chunk};

#[derive(Debug, Clone, Copy)]
pub struct ChunkParams {
    /// Tokens per window.
    pub max_tokens: usize,
    /// Tokens shared between consecutive windows. Must be `< max_tokens`.
    pub overlap: usize,
}

impl Default for ChunkParams {
    fn default() -> Self {
        Self { max_tokens: 1200, overlap: 80 }
    }
}

impl ChunkParams {
    /// Tokens advanced between window starts; never below 1 so degenerate
    /// parameter combinations cannot stall the indexer.
    pub fn step(&self) -> usize {
        self.max_tokens.saturating_sub(self.overlap).max(1)
    }
}

/// Split `text` into overlapping windows. Window `i` covers tokens
/// `[i*step, i*step + max_tokens)`; the last window is truncated to the
/// remaining tokens and emitted only if non-empty.
pub fn chunk_text(text: &str, path: &str, file_id: &str, params: &ChunkParams) -> Vec<Chunk> {
    let words: Vec<&str> = text.split_whitespace().collect();
    let mut chunks = Vec::new();

    let mut start = 0usize;
    let mut idx = 0u32;
    while start < words.len() {
        let end = (start + params.max_tokens).min(words.len());
        let window = &words[start..end];
        if window.is_empty() {
            break;
        }
        chunks.push(Chunk {
            chunk_id: ids::chunk_id(file_id, idx),
            file_id: file_id.to_string(),
            path: path.to_string(),
            idx,
            token_start: start,
            token_end: end,
            text: window.join(" "),
        });
        idx += 1;
        start += params.step();
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(n: usize) -> String {
        (0..n).map(|i| format!("w{i}")).collect::<Vec<_>>().join(" ")
    }

    #[test]
    fn windows_cover_text_with_overlap() {
        let text = words(10);
        let params = ChunkParams { max_tokens: 5, overlap: 2 };
        let chunks = chunk_text(&text, "/f", "fid", &params);

        let ranges: Vec<(usize, usize)> =
            chunks.iter().map(|c| (c.token_start, c.token_end)).collect();
        assert_eq!(ranges, vec![(0, 5), (3, 8), (6, 10), (9, 10)]);

        // Coverage in index order, each window starting `step` after the last.
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.idx as usize, i);
            assert!(c.token_end > c.token_start);
        }
        assert_eq!(chunks[0].text, "w0 w1 w2 w3 w4");
        assert_eq!(chunks.last().unwrap().text, "w9");
    }

    #[test]
    fn short_text_yields_one_truncated_window() {
        let chunks = chunk_text("alpha beta", "/f", "fid", &ChunkParams::default());
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].token_start, 0);
        assert_eq!(chunks[0].token_end, 2);
        assert_eq!(chunks[0].text, "alpha beta");
    }

    #[test]
    fn empty_and_whitespace_text_yield_no_chunks() {
        assert!(chunk_text("", "/f", "fid", &ChunkParams::default()).is_empty());
        assert!(chunk_text("  \n\t ", "/f", "fid", &ChunkParams::default()).is_empty());
    }

    #[test]
    fn chunk_ids_are_deterministic_per_index() {
        let text = words(12);
        let params = ChunkParams { max_tokens: 4, overlap: 1 };
        let a = chunk_text(&text, "/f", "fid", &params);
        let b = chunk_text(&text, "/f", "fid", &params);
        assert_eq!(a, b);
        let mut ids: Vec<&str> = a.iter().map(|c| c.chunk_id.as_str()).collect();
        ids.dedup();
        assert_eq!(ids.len(), a.len());
    }

    #[test]
    fn degenerate_overlap_still_terminates() {
        let params = ChunkParams { max_tokens: 3, overlap: 3 };
        let chunks = chunk_text(&words(6), "/f", "fid", &params);
        // step clamps to 1; every suffix window is emitted but the loop ends.
        assert_eq!(chunks.first().unwrap().token_start, 0);
        assert_eq!(chunks.last().unwrap().token_start, 5);
    }
}
