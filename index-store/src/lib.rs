pub mod catalog;
pub mod vector_index;

pub use catalog::Catalog;
pub use vector_index::LocalVectorIndex;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("catalog schema version {found} does not match expected {expected}")]
    SchemaMismatch { found: i64, expected: i64 },
    #[error("vector dimension {got} does not match collection dimension {expected}")]
    DimensionMismatch { got: usize, expected: usize },
    #[error("corrupt vector collection: {0}")]
    Corrupt(String),
}

/// Payload stored alongside each vector point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorPayload {
    pub path: String,
    pub file_id: String,
    pub chunk_id: String,
    pub idx: u32,
}

/// One point to upsert: id, unit vector and payload.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorPoint {
    pub chunk_id: String,
    pub vector: Vec<f32>,
    pub payload: VectorPayload,
}

/// A neighbor returned by similarity search. `score` is cosine similarity,
/// larger is better.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorHit {
    pub chunk_id: String,
    pub score: f32,
}

/// ANN engine holding one vector per chunk. Exactly one vector per
/// `chunk_id`; the distance metric is cosine. Implementations are
/// interchangeable; the in-process [`LocalVectorIndex`] is the default, a
/// remote engine can be substituted behind the same trait.
pub trait VectorStore: Send + Sync {
    fn upsert(&self, points: &[VectorPoint]) -> Result<(), StoreError>;
    /// Cosine-ranked top-`limit` neighbors of `vector`.
    fn search(&self, vector: &[f32], limit: usize) -> Result<Vec<VectorHit>, StoreError>;
    fn contains(&self, chunk_id: &str) -> bool;
    /// Remove points by id, returning how many existed.
    fn delete(&self, chunk_ids: &[String]) -> Result<usize, StoreError>;
    fn count(&self) -> usize;
    /// Persist any in-memory state; called at slice boundaries.
    fn flush(&self) -> Result<(), StoreError>;
    /// Drop every point and the on-disk collection.
    fn reset(&self) -> Result<(), StoreError>;
}
