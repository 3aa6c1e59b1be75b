//! Hybrid retriever: vector recall and lexical recall fused into one
//! deterministic ranking.
//!
//! The two recall channels are independent. Vector recall (embed the query,
//! ANN top-k) is the slow path and runs on a worker thread under a
//! wall-clock timeout; lexical recall (FTS5 BM25) runs inline meanwhile.
//! Channel scores are min-max normalized independently, fused with
//! configured weights, boosted by exact-phrase and early-position matches,
//! then deduplicated by file.

use std::collections::{HashMap, HashSet};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::{debug, warn};

use doc_model::{ScoreBreakdown, ScoredChunk};
use embedder::Embedder;
use index_store::{Catalog, VectorStore};

use crate::config::SearchConfig;
use crate::ServiceError;

pub struct Retriever {
    catalog: Arc<Catalog>,
    vectors: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    cfg: SearchConfig,
}

impl Retriever {
    pub fn new(
        catalog: Arc<Catalog>,
        vectors: Arc<dyn VectorStore>,
        embedder: Arc<dyn Embedder>,
        cfg: SearchConfig,
    ) -> Self {
        Self { catalog, vectors, embedder, cfg }
    }

    /// Hybrid search returning the top `k` chunks, at most
    /// `max_results_per_file` per file (0 disables the dedup step).
    ///
    /// A failed channel degrades to the other one; when vector recall fails
    /// outright and lexical recall has nothing, the error is surfaced.
    pub fn search(
        &self,
        query: &str,
        k: usize,
        timeout: Duration,
        max_results_per_file: usize,
    ) -> Result<Vec<ScoredChunk>, ServiceError> {
        // Vector recall on a worker so the timeout is wall-clock.
        let (tx, rx) = mpsc::channel();
        {
            let embedder = Arc::clone(&self.embedder);
            let vectors = Arc::clone(&self.vectors);
            let query = query.to_string();
            let vec_k = self.cfg.vec_k;
            thread::spawn(move || {
                let result = embedder
                    .embed(&query)
                    .map_err(|e| format!("query embedding failed: {e}"))
                    .and_then(|qvec| {
                        vectors
                            .search(&qvec, vec_k)
                            .map_err(|e| format!("vector search failed: {e}"))
                    });
                let _ = tx.send(result);
            });
        }

        // Lexical recall inline.
        let cleaned = clean_query(query);
        let lex_hits: Vec<(String, f32)> = if cleaned.is_empty() {
            Vec::new()
        } else {
            self.catalog.fts_search(&cleaned, self.cfg.lex_k)
        };
        debug!(candidates = lex_hits.len(), "lexical recall");

        let mut vector_failed = None;
        let vec_hits: Vec<(String, f32)> = match rx.recv_timeout(timeout) {
            Ok(Ok(hits)) => hits.into_iter().map(|h| (h.chunk_id, h.score)).collect(),
            Ok(Err(e)) => {
                warn!(error = %e, "vector recall failed, degrading to lexical-only");
                vector_failed = Some(e);
                Vec::new()
            }
            Err(_) => {
                warn!(timeout_ms = timeout.as_millis() as u64, "vector recall timed out");
                Vec::new()
            }
        };
        debug!(candidates = vec_hits.len(), "vector recall");

        if let Some(e) = vector_failed {
            if lex_hits.is_empty() {
                return Err(ServiceError::VectorStoreUnavailable(e));
            }
        }

        let mut ranked = self.merge_and_score(query, &vec_hits, &lex_hits)?;
        if max_results_per_file > 0 {
            ranked = dedupe_by_file(ranked, max_results_per_file);
        }
        ranked.truncate(k);
        Ok(ranked)
    }

    /// Fuse the two candidate sets into a ranked list of at most `merge_k`
    /// chunks. Candidates whose catalog metadata is missing (orphans) are
    /// dropped. Ordering is deterministic: the union is iterated in
    /// insertion order (vector hits first, then lexical-only hits) and the
    /// final sort is stable.
    pub fn merge_and_score(
        &self,
        query: &str,
        vec_hits: &[(String, f32)],
        lex_hits: &[(String, f32)],
    ) -> Result<Vec<ScoredChunk>, ServiceError> {
        let vec_norm = minmax_normalize(vec_hits);
        let lex_norm = minmax_normalize(lex_hits);

        let mut order: Vec<&str> = Vec::with_capacity(vec_norm.len() + lex_norm.len());
        let mut merged: HashSet<&str> = HashSet::new();
        for (id, _) in vec_hits.iter().chain(lex_hits.iter()) {
            if merged.insert(id.as_str()) {
                order.push(id.as_str());
            }
        }

        let mut scored = Vec::with_capacity(order.len());
        for chunk_id in order {
            let cosine = vec_norm.get(chunk_id).copied().unwrap_or(0.0);
            let bm25 = lex_norm.get(chunk_id).copied().unwrap_or(0.0);

            let meta = match self.catalog.chunk_meta(chunk_id)? {
                Some(meta) => meta,
                None => continue,
            };
            let text = match self.catalog.get_chunk_text(chunk_id)? {
                Some(text) => text,
                None => continue,
            };

            let exact = exact_match_bonus(query, &text);
            let position_bonus = early_position_bonus(query, &text);
            let final_score = self.cfg.bm25_weight * bm25
                + self.cfg.cosine_weight * cosine
                + self.cfg.exact_boost * exact
                + self.cfg.early_pos_boost * position_bonus;

            scored.push(ScoredChunk {
                chunk_id: chunk_id.to_string(),
                file_id: meta.file_id,
                path: meta.path,
                text,
                score: final_score,
                score_breakdown: ScoreBreakdown {
                    cosine,
                    bm25,
                    exact,
                    position_bonus,
                    final_score,
                },
                chunk_idx: meta.idx,
            });
        }

        // Stable sort keeps insertion order on ties, avoiding ranking jitter.
        scored.sort_by(|a, b| {
            b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(self.cfg.merge_k);
        Ok(scored)
    }
}

/// Keep the best `max_per_file` chunks per file. Input must be sorted by
/// score descending; output stays globally sorted.
pub fn dedupe_by_file(ranked: Vec<ScoredChunk>, max_per_file: usize) -> Vec<ScoredChunk> {
    let mut kept_per_file: HashMap<String, usize> = HashMap::new();
    let mut out = Vec::with_capacity(ranked.len());
    for chunk in ranked {
        let kept = kept_per_file.entry(chunk.file_id.clone()).or_insert(0);
        if *kept < max_per_file {
            *kept += 1;
            out.push(chunk);
        }
    }
    out
}

/// Min-max normalize to `[0, 1]`. A channel whose scores are all equal is
/// passed through unchanged (no divide by zero). Later duplicates of an id
/// are ignored.
fn minmax_normalize(hits: &[(String, f32)]) -> HashMap<&str, f32> {
    if hits.is_empty() {
        return HashMap::new();
    }
    let min = hits.iter().map(|(_, s)| *s).fold(f32::INFINITY, f32::min);
    let max = hits.iter().map(|(_, s)| *s).fold(f32::NEG_INFINITY, f32::max);

    let mut out = HashMap::with_capacity(hits.len());
    for (id, score) in hits {
        let value = if max > min { (score - min) / (max - min) } else { *score };
        out.entry(id.as_str()).or_insert(value);
    }
    out
}

/// Lowercase, strip punctuation, collapse whitespace: the shape FTS5
/// accepts without tripping over query syntax.
pub fn clean_query(query: &str) -> String {
    let mapped: String = query
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    mapped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// 1.0 for a verbatim lowercase phrase match; otherwise the fraction of
/// query words present in the chunk's word set, but only when that fraction
/// reaches 0.7.
pub fn exact_match_bonus(query: &str, text: &str) -> f32 {
    let query = query.to_lowercase();
    let query = query.trim();
    if query.is_empty() {
        return 0.0;
    }
    let text = text.to_lowercase();
    if text.contains(query) {
        return 1.0;
    }

    let query_words: HashSet<&str> = query.split_whitespace().collect();
    if query_words.is_empty() {
        return 0.0;
    }
    let text_words: HashSet<&str> = text.split_whitespace().collect();
    let matched = query_words.iter().filter(|w| text_words.contains(*w)).count();
    let ratio = matched as f32 / query_words.len() as f32;
    if ratio >= 0.7 {
        ratio
    } else {
        0.0
    }
}

/// `1 - position_ratio` when the lowercase phrase first occurs within the
/// leading 30% of the chunk; 0 otherwise.
pub fn early_position_bonus(query: &str, text: &str) -> f32 {
    let query = query.to_lowercase();
    let query = query.trim();
    let text = text.to_lowercase();
    if query.is_empty() || text.is_empty() {
        return 0.0;
    }
    let pos = match text.find(query) {
        Some(pos) => pos,
        None => return 0.0,
    };
    let ratio = pos as f32 / text.len() as f32;
    if ratio <= 0.3 {
        1.0 - ratio
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(id: &str, score: f32) -> (String, f32) {
        (id.to_string(), score)
    }

    #[test]
    fn minmax_scales_to_unit_interval() {
        let hits = [hit("a", 0.9), hit("b", 0.6)];
        let norm = minmax_normalize(&hits);
        assert_eq!(norm["a"], 1.0);
        assert_eq!(norm["b"], 0.0);
    }

    #[test]
    fn minmax_passes_equal_scores_through() {
        let hits = [hit("a", 7.5), hit("b", 7.5)];
        let norm = minmax_normalize(&hits);
        assert_eq!(norm["a"], 7.5);
        assert_eq!(norm["b"], 7.5);
        assert!(minmax_normalize(&[]).is_empty());
    }

    #[test]
    fn clean_query_strips_punctuation() {
        assert_eq!(clean_query("What's \"FTS5\"?  (really)"), "what s fts5 really");
        assert_eq!(clean_query("..."), "");
    }

    #[test]
    fn exact_match_phrase_and_word_fraction() {
        assert_eq!(exact_match_bonus("artificial intelligence", "An artificial intelligence lab"), 1.0);
        // 2 of 3 words present: ratio below 0.7 gates to zero.
        assert_eq!(exact_match_bonus("alpha beta gamma", "beta alpha delta"), 0.0);
        // 3 of 4 words present: 0.75 passes the gate.
        let bonus = exact_match_bonus("alpha beta gamma delta", "delta beta words alpha");
        assert!((bonus - 0.75).abs() < 1e-6);
        assert_eq!(exact_match_bonus("", "anything"), 0.0);
    }

    #[test]
    fn position_bonus_rewards_early_matches() {
        let bonus = early_position_bonus("database", "database systems overview and more text");
        assert!(bonus > 0.99);

        let text = format!("{} database", "filler ".repeat(40));
        assert_eq!(early_position_bonus("database", &text), 0.0);
        assert_eq!(early_position_bonus("missing", "some text"), 0.0);
    }

    #[test]
    fn dedupe_keeps_top_n_per_file_in_rank_order() {
        let chunk = |file: &str, id: &str, score: f32| ScoredChunk {
            chunk_id: id.to_string(),
            file_id: file.to_string(),
            path: format!("/{file}.txt"),
            text: String::new(),
            score,
            score_breakdown: ScoreBreakdown::default(),
            chunk_idx: 0,
        };
        let ranked = vec![
            chunk("f1", "c1", 0.9),
            chunk("f2", "c2", 0.8),
            chunk("f1", "c3", 0.7),
            chunk("f1", "c4", 0.6),
        ];

        let top1 = dedupe_by_file(ranked.clone(), 1);
        assert_eq!(
            top1.iter().map(|c| c.chunk_id.as_str()).collect::<Vec<_>>(),
            vec!["c1", "c2"]
        );

        let top2 = dedupe_by_file(ranked, 2);
        assert_eq!(
            top2.iter().map(|c| c.chunk_id.as_str()).collect::<Vec<_>>(),
            vec!["c1", "c2", "c3"]
        );
    }
}
