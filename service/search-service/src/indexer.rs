//! BFS streaming indexer with a persistent frontier and change-aware
//! ingestion.
//!
//! Exactly one actor dequeues, processes and writes back per slice. A slice
//! pops up to `max_items` frontier entries, processes them, then checkpoints
//! the frontier and flushes the vector store, so interrupting between slices
//! is safe. Per-item errors are recorded and the crawl continues.

use std::collections::HashSet;
use std::fs::Metadata;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};

use doc_model::{ids, Chunk, IndexStats};
use embedder::Embedder;
use file_extract::chunker::{self, ChunkParams};
use file_extract::Extractor;
use index_store::{Catalog, VectorPayload, VectorPoint, VectorStore};

use crate::config::Config;
use crate::frontier::Frontier;
use crate::ServiceError;

pub struct Indexer {
    config: Config,
    catalog: Arc<Catalog>,
    vectors: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    extractor: Arc<dyn Extractor>,
    allow_exts: HashSet<String>,
    exclude: Vec<glob::Pattern>,
    chunk_params: ChunkParams,
}

/// Result of a stale-file sweep.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct SweepReport {
    pub files_removed: u64,
    pub chunks_removed: u64,
    pub vectors_removed: u64,
}

impl Indexer {
    pub fn new(
        config: Config,
        catalog: Arc<Catalog>,
        vectors: Arc<dyn VectorStore>,
        embedder: Arc<dyn Embedder>,
        extractor: Arc<dyn Extractor>,
    ) -> Self {
        let allow_exts = config.index.allow_exts.iter().map(|e| e.to_lowercase()).collect();
        let exclude = config
            .index
            .exclude_patterns
            .iter()
            .filter_map(|p| match glob::Pattern::new(p) {
                Ok(pattern) => Some(pattern),
                Err(e) => {
                    warn!(pattern = %p, error = %e, "ignoring invalid exclude pattern");
                    None
                }
            })
            .collect();
        let chunk_params =
            ChunkParams { max_tokens: config.index.max_tokens, overlap: config.index.overlap };
        Self { config, catalog, vectors, embedder, extractor, allow_exts, exclude, chunk_params }
    }

    /// Process up to `max_items` frontier entries, then checkpoint. Callers
    /// loop until the frontier drains to perform a full crawl.
    pub fn run_bfs_slice(
        &self,
        roots: &[String],
        max_items: usize,
    ) -> Result<IndexStats, ServiceError> {
        let started = Instant::now();
        let started_at = Utc::now().timestamp();
        let mut stats = IndexStats::default();

        let mut frontier = Frontier::load(&self.config.paths.frontier_path());
        frontier.seed(roots);

        let mut level = Vec::new();
        while level.len() < max_items {
            match frontier.pop() {
                Some(item) => level.push(item),
                None => break,
            }
        }
        debug!(items = level.len(), "processing frontier slice");

        for item in &level {
            if let Err(e) = self.process_item(item, &mut frontier, &mut stats) {
                warn!(path = %item, error = %e, "item failed");
                frontier.record_error(format!("{item}: {e}"));
                stats.errors += 1;
            }
        }

        self.vectors
            .flush()
            .map_err(|e| ServiceError::VectorStoreUnavailable(e.to_string()))?;
        frontier.save()?;

        stats.duration_seconds = started.elapsed().as_secs_f64();
        if let Err(e) = self.catalog.record_index_run(started_at, &stats) {
            warn!(error = %e, "could not record index run stats");
        }
        Ok(stats)
    }

    /// Reset the frontier, then run slices until the queue drains.
    pub fn run_complete_index(
        &self,
        roots: &[String],
        max_items_per_slice: usize,
    ) -> Result<IndexStats, ServiceError> {
        Frontier::reset(&self.config.paths.frontier_path())?;
        info!("cleared existing frontier for fresh start");

        let mut total = IndexStats::default();
        loop {
            let slice = self.run_bfs_slice(roots, max_items_per_slice)?;
            total.merge(&slice);

            let frontier = Frontier::load(&self.config.paths.frontier_path());
            if frontier.queue_len() == 0 {
                info!("no more items to process, indexing complete");
                break;
            }
            let touched = slice.files_processed
                + slice.files_skipped
                + slice.dirs_processed
                + slice.errors;
            if touched == 0 {
                warn!(remaining = frontier.queue_len(), "slice made no progress, stopping");
                break;
            }
            debug!(
                processed = slice.files_processed,
                remaining = frontier.queue_len(),
                "slice complete"
            );
        }
        Ok(total)
    }

    fn process_item(
        &self,
        item: &str,
        frontier: &mut Frontier,
        stats: &mut IndexStats,
    ) -> Result<(), ServiceError> {
        let md = match std::fs::metadata(item) {
            Ok(md) => md,
            Err(_) => {
                debug!(path = %item, "path does not exist, skipping");
                stats.files_skipped += 1;
                return Ok(());
            }
        };
        let ident = file_identity(item, &md);
        if frontier.is_seen(item, ident) {
            debug!(path = %item, "already processed, skipping");
            return Ok(());
        }

        if md.is_file() {
            self.process_file(item, &md, stats)?;
            frontier.inc_files();
        } else if md.is_dir() {
            self.process_dir(item, frontier);
            frontier.inc_dirs();
            stats.dirs_processed += 1;
        }

        frontier.mark_seen(item.to_string(), ident);
        Ok(())
    }

    fn process_file(
        &self,
        path: &str,
        md: &Metadata,
        stats: &mut IndexStats,
    ) -> Result<(), ServiceError> {
        let ext = extension_of(path);
        if !self.allow_exts.contains(&ext) {
            debug!(path, ext = %ext, "extension not allowed, skipping");
            stats.files_skipped += 1;
            return Ok(());
        }
        if self.is_excluded(path) {
            debug!(path, "excluded by pattern");
            stats.files_skipped += 1;
            return Ok(());
        }

        let size = md.len();
        let mtime = mtime_secs(md);
        let file_id = ids::file_id(path, mtime, size);
        let existing_sha = self.catalog.file_sha256(&file_id)?;

        let text = match self.extractor.extract(Path::new(path)) {
            Ok(text) if !text.trim().is_empty() => text,
            Ok(_) => {
                debug!(path, "no text extracted, skipping");
                stats.files_skipped += 1;
                return Ok(());
            }
            Err(e) => {
                warn!(path, error = %e, "extraction failed, skipping");
                stats.files_skipped += 1;
                return Ok(());
            }
        };
        let content_sha = ids::content_sha256(&text);

        if existing_sha.as_deref() == Some(content_sha.as_str()) {
            // Unchanged content. A chunk row without a vector means an
            // earlier run died between the catalog write and the vector
            // upsert; that file must be re-embedded, not skipped.
            let chunk_ids = self.catalog.chunk_ids_for_file(&file_id)?;
            let complete =
                !chunk_ids.is_empty() && chunk_ids.iter().all(|id| self.vectors.contains(id));
            if complete {
                debug!(path, "file unchanged, skipping");
                stats.files_skipped += 1;
                return Ok(());
            }
            warn!(path, "chunks present but vectors missing, re-embedding");
        }

        // A changed file gets a new metadata-derived id; drop the superseded
        // records so old chunks cannot resurface in results.
        for stale_id in self.catalog.file_ids_for_path(path)? {
            if stale_id == file_id {
                continue;
            }
            let stale_chunks = self.catalog.chunk_ids_for_file(&stale_id)?;
            if let Err(e) = self.vectors.delete(&stale_chunks) {
                warn!(path, error = %e, "could not drop superseded vectors");
            }
            self.catalog.delete_file(&stale_id)?;
            debug!(path, "removed superseded file record");
        }

        self.catalog.upsert_file(path, size, mtime, &content_sha)?;
        let chunks = chunker::chunk_text(&text, path, &file_id, &self.chunk_params);
        self.catalog.insert_chunks(&file_id, &chunks)?;
        self.embed_and_upsert(&chunks, stats);

        stats.files_processed += 1;
        stats.chunks_created += chunks.len() as u64;
        info!(path, chunks = chunks.len(), "indexed file");
        Ok(())
    }

    /// Embedding failures are recoverable: the file stays findable lexically
    /// and the missing vectors trigger a re-embed on the next crawl.
    fn embed_and_upsert(&self, chunks: &[Chunk], stats: &mut IndexStats) {
        let dim = self.embedder.info().dimension;
        for batch in chunks.chunks(self.config.index.embed_batch) {
            let texts: Vec<&str> = batch.iter().map(|c| c.text.as_str()).collect();
            let vectors = match self.embedder.embed_batch(&texts) {
                Ok(v) => v,
                Err(e) => {
                    warn!(error = %e, "embedding unavailable, chunks stay lexical-only");
                    stats.errors += 1;
                    return;
                }
            };
            if vectors.iter().any(|v| v.len() != dim) {
                warn!("embedding dimension mismatch, chunks stay lexical-only");
                stats.errors += 1;
                return;
            }

            let points: Vec<VectorPoint> = batch
                .iter()
                .zip(vectors)
                .map(|(chunk, vector)| VectorPoint {
                    chunk_id: chunk.chunk_id.clone(),
                    vector,
                    payload: VectorPayload {
                        path: chunk.path.clone(),
                        file_id: chunk.file_id.clone(),
                        chunk_id: chunk.chunk_id.clone(),
                        idx: chunk.idx,
                    },
                })
                .collect();
            for upsert_batch in points.chunks(self.config.index.upsert_batch) {
                if let Err(e) = self.vectors.upsert(upsert_batch) {
                    warn!(error = %e, "vector upsert failed");
                    stats.errors += 1;
                    return;
                }
            }
        }
    }

    fn process_dir(&self, path: &str, frontier: &mut Frontier) {
        if self.is_excluded(path) {
            debug!(path, "excluded directory");
            return;
        }
        let entries = match std::fs::read_dir(path) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(path, error = %e, "cannot read directory, skipping");
                return;
            }
        };

        let mut added = 0usize;
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with('.') {
                continue;
            }
            let child = entry.path();
            let child_str = child.to_string_lossy().to_string();
            if self.is_excluded(&child_str) {
                continue;
            }
            // Keep already-visited identities out of the queue.
            if let Ok(md) = std::fs::metadata(&child) {
                if frontier.is_seen(&child_str, file_identity(&child_str, &md)) {
                    continue;
                }
            }
            frontier.enqueue(child_str);
            added += 1;
        }
        debug!(path, added, "enqueued directory children");
    }

    fn is_excluded(&self, path: &str) -> bool {
        self.exclude.iter().any(|p| p.matches(path))
    }

    /// Purge catalog rows, FTS entries and vectors of files that no longer
    /// exist on disk.
    pub fn sweep(&self) -> Result<SweepReport, ServiceError> {
        let mut report = SweepReport::default();
        for (file_id, path) in self.catalog.all_files()? {
            if Path::new(&path).exists() {
                continue;
            }
            let chunk_ids = self.catalog.chunk_ids_for_file(&file_id)?;
            let removed = self
                .vectors
                .delete(&chunk_ids)
                .map_err(|e| ServiceError::VectorStoreUnavailable(e.to_string()))?;
            self.catalog.delete_file(&file_id)?;
            report.files_removed += 1;
            report.chunks_removed += chunk_ids.len() as u64;
            report.vectors_removed += removed as u64;
            info!(path, chunks = chunk_ids.len(), "purged stale file");
        }
        self.vectors
            .flush()
            .map_err(|e| ServiceError::VectorStoreUnavailable(e.to_string()))?;
        Ok(report)
    }
}

/// Lowercase extension with its leading dot, or `""`.
fn extension_of(path: &str) -> String {
    Path::new(path)
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
        .unwrap_or_default()
}

fn mtime_secs(md: &Metadata) -> i64 {
    md.modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// `(device, inode)` on Unix; elsewhere a stable path hash that keeps
/// resumability but cannot detect renames.
#[cfg(unix)]
fn file_identity(_path: &str, md: &Metadata) -> (u64, u64) {
    use std::os::unix::fs::MetadataExt;
    (md.dev(), md.ino())
}

#[cfg(not(unix))]
fn file_identity(path: &str, _md: &Metadata) -> (u64, u64) {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};
    let mut hasher = DefaultHasher::new();
    path.hash(&mut hasher);
    (0, hasher.finish())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_includes_dot_and_folds_case() {
        assert_eq!(extension_of("/a/b/Report.TXT"), ".txt");
        assert_eq!(extension_of("/a/b/archive.tar.GZ"), ".gz");
        assert_eq!(extension_of("/a/b/README"), "");
    }
}
