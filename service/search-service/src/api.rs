//! Public search API: pagination, result shaping and a TTL cache keyed by
//! the full request. Never raises: failures come back inside the response
//! envelope with `items` empty.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use doc_model::{ScoredChunk, SearchHit, SearchOptions};

use crate::config::SearchConfig;
use crate::retriever::Retriever;
use crate::snippets::{self, MAX_SNIPPET_CHARS};

/// Cached responses expire after an hour.
const CACHE_TTL: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub total_hits: usize,
    pub page: usize,
    pub per_page: usize,
    pub total_pages: usize,
    pub has_next: bool,
    pub has_prev: bool,
    pub items: Vec<SearchHit>,
    pub search_time: f64,
    pub cache_hit: bool,
    pub timestamp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

struct CacheEntry {
    response: SearchResponse,
    inserted_at: Instant,
}

pub struct SearchApi {
    retriever: Retriever,
    cfg: SearchConfig,
    cache: Mutex<HashMap<String, CacheEntry>>,
}

impl SearchApi {
    pub fn new(retriever: Retriever, cfg: SearchConfig) -> Self {
        Self { retriever, cfg, cache: Mutex::new(HashMap::new()) }
    }

    /// Run a search and shape the paginated response. `k` caps the ranked
    /// result list before pagination; it defaults to the configured `top_k`.
    pub fn run(
        &self,
        query: &str,
        k: Option<usize>,
        page: usize,
        per_page: usize,
        opts: &SearchOptions,
    ) -> SearchResponse {
        let started = Instant::now();
        let k = k.unwrap_or(self.cfg.top_k);
        let page = page.max(1);
        let per_page = per_page.max(1);

        let cache_key = cache_key(query, k, page, per_page, opts);
        if let Some(mut cached) = self.cache_get(&cache_key) {
            debug!(query, "cache hit");
            cached.cache_hit = true;
            return cached;
        }

        let timeout = Duration::from_secs_f64(self.cfg.timeout_sec);
        let ranked = match self.retriever.search(query, k, timeout, opts.max_results_per_file) {
            Ok(ranked) => ranked,
            Err(e) => {
                warn!(query, error = %e, "search failed");
                return SearchResponse {
                    query: query.to_string(),
                    total_hits: 0,
                    page,
                    per_page,
                    total_pages: 0,
                    has_next: false,
                    has_prev: false,
                    items: Vec::new(),
                    search_time: started.elapsed().as_secs_f64(),
                    cache_hit: false,
                    timestamp: Utc::now().timestamp(),
                    error: Some(e.to_string()),
                };
            }
        };

        let hits: Vec<SearchHit> =
            ranked.iter().map(|chunk| self.shape_hit(chunk, query, opts)).collect();

        let total_hits = hits.len();
        let total_pages = total_hits.div_ceil(per_page);
        let start = (page - 1) * per_page;
        let items: Vec<SearchHit> =
            hits.into_iter().skip(start).take(per_page).collect();

        let response = SearchResponse {
            query: query.to_string(),
            total_hits,
            page,
            per_page,
            total_pages,
            has_next: page < total_pages,
            has_prev: page > 1,
            items,
            search_time: started.elapsed().as_secs_f64(),
            cache_hit: false,
            timestamp: Utc::now().timestamp(),
            error: None,
        };
        self.cache_put(cache_key, response.clone());
        response
    }

    fn shape_hit(&self, chunk: &ScoredChunk, query: &str, opts: &SearchOptions) -> SearchHit {
        let mut snippet = String::new();
        let mut context_range = (0, 0);
        if opts.include_snippets {
            let (raw, start, end) = snippets::make_snippet(&chunk.text, query, opts.snippet_radius);
            context_range = (start, end);
            snippet = snippets::truncate_snippet(&snippets::clean_snippet(&raw), MAX_SNIPPET_CHARS);
            if !opts.exact_match {
                snippet = snippets::highlight_query(&snippet, query);
            }
        }

        SearchHit {
            path: chunk.path.clone(),
            score: chunk.score,
            score_breakdown: chunk.score_breakdown,
            file_type: file_type_of(&chunk.path).to_string(),
            chunk_id: chunk.chunk_id.clone(),
            snippet,
            context_range,
            file_id: chunk.file_id.clone(),
            chunk_idx: chunk.chunk_idx,
        }
    }

    fn cache_get(&self, key: &str) -> Option<SearchResponse> {
        let mut cache = self.cache.lock().unwrap();
        if let Some(entry) = cache.get(key) {
            if entry.inserted_at.elapsed() <= CACHE_TTL {
                return Some(entry.response.clone());
            }
            cache.remove(key);
        }
        None
    }

    fn cache_put(&self, key: String, response: SearchResponse) {
        let mut cache = self.cache.lock().unwrap();
        // Oldest-timestamp eviction on overflow.
        while cache.len() >= self.cfg.cache_size.max(1) {
            let oldest = cache
                .iter()
                .min_by_key(|(_, entry)| entry.inserted_at)
                .map(|(k, _)| k.clone());
            match oldest {
                Some(k) => cache.remove(&k),
                None => break,
            };
        }
        cache.insert(key, CacheEntry { response, inserted_at: Instant::now() });
    }

    /// Drop every cached response (used after reindexing).
    pub fn clear_cache(&self) {
        self.cache.lock().unwrap().clear();
    }

    pub fn cache_len(&self) -> usize {
        self.cache.lock().unwrap().len()
    }
}

/// Deterministic key over the full request; option fields serialize in
/// declaration order so equal requests always collide.
fn cache_key(query: &str, k: usize, page: usize, per_page: usize, opts: &SearchOptions) -> String {
    let opts_json = serde_json::to_string(opts).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(query.as_bytes());
    hasher.update([0x1f]);
    hasher.update(format!("{k}|{page}|{per_page}|").as_bytes());
    hasher.update(opts_json.as_bytes());
    hex::encode(hasher.finalize())
}

fn file_type_of(path: &str) -> &'static str {
    let lower = path.to_lowercase();
    if lower.ends_with(".md") || lower.ends_with(".markdown") {
        "markdown"
    } else if lower.ends_with(".pdf") {
        "pdf"
    } else if lower.ends_with(".txt") || lower.ends_with(".text") {
        "text"
    } else if lower.ends_with(".html") || lower.ends_with(".htm") {
        "html"
    } else if lower.ends_with(".docx") || lower.ends_with(".doc") {
        "document"
    } else {
        "unknown"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_key_is_sensitive_to_every_field() {
        let opts = SearchOptions::default();
        let base = cache_key("q", 10, 1, 10, &opts);
        assert_eq!(base, cache_key("q", 10, 1, 10, &opts));
        assert_ne!(base, cache_key("q2", 10, 1, 10, &opts));
        assert_ne!(base, cache_key("q", 11, 1, 10, &opts));
        assert_ne!(base, cache_key("q", 10, 2, 10, &opts));
        assert_ne!(base, cache_key("q", 10, 1, 11, &opts));

        let mut opts2 = SearchOptions::default();
        opts2.exact_match = true;
        assert_ne!(base, cache_key("q", 10, 1, 10, &opts2));
    }

    #[test]
    fn file_types_map_from_extensions() {
        assert_eq!(file_type_of("/a/b.md"), "markdown");
        assert_eq!(file_type_of("/a/b.PDF"), "pdf");
        assert_eq!(file_type_of("/a/b.txt"), "text");
        assert_eq!(file_type_of("/a/b.htm"), "html");
        assert_eq!(file_type_of("/a/b.docx"), "document");
        assert_eq!(file_type_of("/a/b.rs"), "unknown");
    }
}
