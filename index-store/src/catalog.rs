//! SQLite catalog: file metadata, chunk metadata and the FTS5 lexical index.
//!
//! The catalog is the single source of truth for file and chunk rows. A
//! file's chunk rows and FTS entries are always replaced inside one
//! transaction, so a reader never observes chunks without matching FTS
//! entries. Readers may run concurrently with the single writer thanks to
//! WAL mode.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use doc_model::{ids, Chunk, ChunkMeta, IndexStats};

use crate::StoreError;

/// Bumped on DDL changes; a mismatch is fatal at open.
const SCHEMA_VERSION: i64 = 1;

#[derive(Debug)]
pub struct Catalog {
    conn: Mutex<Connection>,
    path: PathBuf,
}

impl Catalog {
    /// Open (creating if needed) the catalog at `path`, apply pragmas and
    /// verify the schema version recorded in `PRAGMA user_version`.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.pragma_update(None, "busy_timeout", &5000_i64)?;

        let found: i64 = conn.query_row("PRAGMA user_version", [], |r| r.get(0))?;
        match found {
            0 => {
                init_schema(&conn)?;
                conn.pragma_update(None, "user_version", &SCHEMA_VERSION)?;
            }
            v if v == SCHEMA_VERSION => {}
            v => {
                return Err(StoreError::SchemaMismatch { found: v, expected: SCHEMA_VERSION });
            }
        }

        Ok(Self { conn: Mutex::new(conn), path: path.to_path_buf() })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Upsert the file row and return its `file_id`.
    pub fn upsert_file(
        &self,
        path: &str,
        size: u64,
        mtime: i64,
        content_sha256: &str,
    ) -> Result<String, StoreError> {
        let file_id = ids::file_id(path, mtime, size);
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO files (file_id, path, size, mtime, content_sha256, indexed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(file_id) DO UPDATE SET
                 path = excluded.path,
                 size = excluded.size,
                 mtime = excluded.mtime,
                 content_sha256 = excluded.content_sha256,
                 indexed_at = excluded.indexed_at",
            params![file_id, path, size as i64, mtime, content_sha256, Utc::now().timestamp()],
        )?;
        Ok(file_id)
    }

    /// Stored content hash for a file, if the file is known.
    pub fn file_sha256(&self, file_id: &str) -> Result<Option<String>, StoreError> {
        let conn = self.conn.lock().unwrap();
        Ok(conn
            .query_row(
                "SELECT content_sha256 FROM files WHERE file_id = ?1",
                params![file_id],
                |r| r.get(0),
            )
            .optional()?)
    }

    /// Delete a file row, cascading its chunks and FTS entries.
    /// Returns whether a row existed.
    pub fn delete_file(&self, file_id: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM chunks_fts WHERE chunk_id IN
                 (SELECT chunk_id FROM chunks WHERE file_id = ?1)",
            params![file_id],
        )?;
        let deleted = tx.execute("DELETE FROM files WHERE file_id = ?1", params![file_id])?;
        tx.commit()?;
        Ok(deleted > 0)
    }

    /// Atomically replace all chunks of `file_id` with `chunks`, FTS entries
    /// included. Chunk order is the caller's; `idx` must be unique per file.
    pub fn insert_chunks(&self, file_id: &str, chunks: &[Chunk]) -> Result<(), StoreError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM chunks_fts WHERE chunk_id IN
                 (SELECT chunk_id FROM chunks WHERE file_id = ?1)",
            params![file_id],
        )?;
        tx.execute("DELETE FROM chunks WHERE file_id = ?1", params![file_id])?;
        {
            let now = Utc::now().timestamp();
            let mut insert_chunk = tx.prepare(
                "INSERT INTO chunks (chunk_id, file_id, idx, token_start, token_end, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            let mut insert_fts = tx.prepare(
                "INSERT INTO chunks_fts (chunk_id, text, path) VALUES (?1, ?2, ?3)",
            )?;
            for chunk in chunks {
                insert_chunk.execute(params![
                    chunk.chunk_id,
                    file_id,
                    chunk.idx,
                    chunk.token_start as i64,
                    chunk.token_end as i64,
                    now
                ])?;
                insert_fts.execute(params![chunk.chunk_id, chunk.text, chunk.path])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Upsert a single FTS row outside the per-file transaction.
    pub fn fts_insert(&self, chunk_id: &str, text: &str, path: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM chunks_fts WHERE chunk_id = ?1", params![chunk_id])?;
        tx.execute(
            "INSERT INTO chunks_fts (chunk_id, text, path) VALUES (?1, ?2, ?3)",
            params![chunk_id, text, path],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Ranked FTS5 top-`k` for `query`. SQLite's BM25 is negative with lower
    /// meaning better; the absolute value is returned so every candidate
    /// source is "larger is better". A query FTS5 cannot parse yields an
    /// empty list, not an error.
    pub fn fts_search(&self, query: &str, k: usize) -> Vec<(String, f32)> {
        let conn = self.conn.lock().unwrap();
        let run = || -> Result<Vec<(String, f32)>, rusqlite::Error> {
            let mut stmt = conn.prepare(
                "SELECT chunk_id, bm25(chunks_fts) AS score
                 FROM chunks_fts
                 WHERE chunks_fts MATCH ?1
                 ORDER BY bm25(chunks_fts)
                 LIMIT ?2",
            )?;
            let rows = stmt.query_map(params![query, k as i64], |r| {
                Ok((r.get::<_, String>(0)?, r.get::<_, f64>(1)? as f32))
            })?;
            let mut out = Vec::new();
            for row in rows {
                let (chunk_id, score) = row?;
                out.push((chunk_id, score.abs()));
            }
            Ok(out)
        };
        match run() {
            Ok(hits) => hits,
            Err(e) => {
                debug!(query, error = %e, "fts query rejected");
                Vec::new()
            }
        }
    }

    pub fn get_chunk_text(&self, chunk_id: &str) -> Result<Option<String>, StoreError> {
        let conn = self.conn.lock().unwrap();
        Ok(conn
            .query_row(
                "SELECT text FROM chunks_fts WHERE chunk_id = ?1",
                params![chunk_id],
                |r| r.get(0),
            )
            .optional()?)
    }

    pub fn chunk_meta(&self, chunk_id: &str) -> Result<Option<ChunkMeta>, StoreError> {
        let conn = self.conn.lock().unwrap();
        Ok(conn
            .query_row(
                "SELECT c.chunk_id, c.file_id, c.idx, c.token_start, c.token_end, f.path
                 FROM chunks c JOIN files f ON c.file_id = f.file_id
                 WHERE c.chunk_id = ?1",
                params![chunk_id],
                |r| {
                    Ok(ChunkMeta {
                        chunk_id: r.get(0)?,
                        file_id: r.get(1)?,
                        idx: r.get(2)?,
                        token_start: r.get::<_, i64>(3)? as usize,
                        token_end: r.get::<_, i64>(4)? as usize,
                        path: r.get(5)?,
                    })
                },
            )
            .optional()?)
    }

    /// Chunk ids of a file in `idx` order.
    pub fn chunk_ids_for_file(&self, file_id: &str) -> Result<Vec<String>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare("SELECT chunk_id FROM chunks WHERE file_id = ?1 ORDER BY idx")?;
        let rows = stmt.query_map(params![file_id], |r| r.get::<_, String>(0))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// `(files, chunks, fts_entries)` row counts.
    pub fn counts(&self) -> Result<(i64, i64, i64), StoreError> {
        let conn = self.conn.lock().unwrap();
        let files: i64 = conn.query_row("SELECT COUNT(*) FROM files", [], |r| r.get(0))?;
        let chunks: i64 = conn.query_row("SELECT COUNT(*) FROM chunks", [], |r| r.get(0))?;
        let fts: i64 = conn.query_row("SELECT COUNT(*) FROM chunks_fts", [], |r| r.get(0))?;
        Ok((files, chunks, fts))
    }

    /// All file ids recorded for `path`. More than one means earlier
    /// revisions of the file are still indexed (the id is derived from
    /// mtime and size).
    pub fn file_ids_for_path(&self, path: &str) -> Result<Vec<String>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT file_id FROM files WHERE path = ?1")?;
        let rows = stmt.query_map(params![path], |r| r.get::<_, String>(0))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Every known `(file_id, path)`, for the stale-file sweep.
    pub fn all_files(&self) -> Result<Vec<(String, String)>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT file_id, path FROM files ORDER BY path")?;
        let rows = stmt.query_map([], |r| Ok((r.get(0)?, r.get(1)?)))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Append one row to the auxiliary per-run stats table.
    pub fn record_index_run(&self, started_at: i64, stats: &IndexStats) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO index_stats
                 (started_at, duration_seconds, files_processed, chunks_created,
                  files_skipped, errors)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                started_at,
                stats.duration_seconds,
                stats.files_processed as i64,
                stats.chunks_created as i64,
                stats.files_skipped as i64,
                stats.errors as i64
            ],
        )?;
        Ok(())
    }

    /// Remove every row from every table, keeping the schema.
    pub fn reset(&self) -> Result<(), StoreError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM chunks_fts", [])?;
        tx.execute("DELETE FROM chunks", [])?;
        tx.execute("DELETE FROM files", [])?;
        tx.execute("DELETE FROM index_stats", [])?;
        tx.commit()?;
        Ok(())
    }
}

fn init_schema(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS files (
            file_id TEXT PRIMARY KEY,
            path TEXT NOT NULL,
            size INTEGER NOT NULL,
            mtime INTEGER NOT NULL,
            content_sha256 TEXT NOT NULL,
            indexed_at INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS chunks (
            chunk_id TEXT PRIMARY KEY,
            file_id TEXT NOT NULL REFERENCES files(file_id) ON DELETE CASCADE,
            idx INTEGER NOT NULL,
            token_start INTEGER NOT NULL,
            token_end INTEGER NOT NULL,
            created_at INTEGER NOT NULL,
            UNIQUE (file_id, idx)
        );
        CREATE INDEX IF NOT EXISTS idx_chunks_file ON chunks(file_id);

        CREATE VIRTUAL TABLE IF NOT EXISTS chunks_fts USING fts5(
            chunk_id UNINDEXED,
            text,
            path
        );

        CREATE TABLE IF NOT EXISTS index_stats (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            started_at INTEGER NOT NULL,
            duration_seconds REAL NOT NULL,
            files_processed INTEGER NOT NULL,
            chunks_created INTEGER NOT NULL,
            files_skipped INTEGER NOT NULL,
            errors INTEGER NOT NULL
        );
        ",
    )
}
