//! Shared records used across the indexing and retrieval crates.

pub mod ids;

use serde::{Deserialize, Serialize};

/// Metadata row for one indexed file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileMeta {
    /// Stable identifier derived from `(path, mtime, size)`; see [`ids::file_id`].
    pub file_id: String,
    /// Absolute path of the source file.
    pub path: String,
    /// File size in bytes at index time.
    pub size: u64,
    /// Modification time in seconds since the epoch.
    pub mtime: i64,
    /// SHA-256 of the extracted text; see [`ids::content_sha256`].
    pub content_sha256: String,
}

/// One token window of a file's extracted text, the unit of indexing and
/// retrieval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub chunk_id: String,
    pub file_id: String,
    pub path: String,
    /// Monotonically increasing position of the chunk within its file.
    pub idx: u32,
    pub token_start: usize,
    pub token_end: usize,
    /// Space-joined text of the window.
    pub text: String,
}

/// Chunk metadata as stored in the catalog, joined with its owning file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMeta {
    pub chunk_id: String,
    pub file_id: String,
    pub idx: u32,
    pub token_start: usize,
    pub token_end: usize,
    pub path: String,
}

/// Per-channel scoring detail carried alongside every ranked result.
///
/// `cosine`, `bm25`, `exact` and `position_bonus` are normalized to `[0, 1]`;
/// `final_score` is their weighted sum and may exceed 1 by the boost weights.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub cosine: f32,
    pub bm25: f32,
    pub exact: f32,
    pub position_bonus: f32,
    #[serde(rename = "final")]
    pub final_score: f32,
}

/// A chunk together with its fused score, produced by the retriever.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub chunk_id: String,
    pub file_id: String,
    pub path: String,
    pub text: String,
    pub score: f32,
    pub score_breakdown: ScoreBreakdown,
    pub chunk_idx: u32,
}

/// A fully shaped search result as returned by the public API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub path: String,
    pub score: f32,
    pub score_breakdown: ScoreBreakdown,
    pub file_type: String,
    pub chunk_id: String,
    pub snippet: String,
    /// Byte range of the snippet window in the original chunk text.
    pub context_range: (usize, usize),
    pub file_id: String,
    pub chunk_idx: u32,
}

/// Caller-controlled search behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchOptions {
    /// Disables highlighting in snippets.
    pub exact_match: bool,
    /// Recognized but matching is always case-insensitive.
    pub case_sensitive: bool,
    /// Best chunks kept per file after ranking.
    pub max_results_per_file: usize,
    pub include_snippets: bool,
    /// Characters of context kept on each side of the best match.
    pub snippet_radius: usize,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            exact_match: false,
            case_sensitive: false,
            max_results_per_file: 1,
            include_snippets: true,
            snippet_radius: 50,
        }
    }
}

/// Counters accumulated over one indexing run (a slice or a complete crawl).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexStats {
    /// Files actually ingested (extracted, chunked and persisted).
    pub files_processed: u64,
    pub chunks_created: u64,
    /// Files visited but filtered out, unchanged or failed.
    pub files_skipped: u64,
    pub dirs_processed: u64,
    pub errors: u64,
    pub duration_seconds: f64,
}

impl IndexStats {
    /// Fold another run's counters into this one. Duration accumulates.
    pub fn merge(&mut self, other: &IndexStats) {
        self.files_processed += other.files_processed;
        self.chunks_created += other.chunks_created;
        self.files_skipped += other.files_skipped;
        self.dirs_processed += other.dirs_processed;
        self.errors += other.errors;
        self.duration_seconds += other.duration_seconds;
    }
}
