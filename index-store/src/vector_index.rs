//! In-process cosine ANN engine backed by `hnsw_rs`.
//!
//! One collection is one directory holding `meta.json` (dimension and HNSW
//! parameters), `map.tsv` (point order, ids and payloads) and `vectors.bin`
//! (the raw f32 planes). The graph itself is rebuilt from the planes on load;
//! at the scale of a local document index the rebuild is cheap and avoids a
//! second serialized structure that could drift out of sync.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use hnsw_rs::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{StoreError, VectorHit, VectorPayload, VectorPoint, VectorStore};

const META_FILE: &str = "meta.json";
const MAP_FILE: &str = "map.tsv";
const VECTORS_FILE: &str = "vectors.bin";

/// HNSW build parameters, matching the collection contract defaults.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct HnswParams {
    pub m: usize,
    pub ef_construct: usize,
}

impl Default for HnswParams {
    fn default() -> Self {
        Self { m: 32, ef_construct: 256 }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct CollectionMeta {
    dim: usize,
    count: usize,
    distance: String,
    #[serde(default)]
    hnsw: Option<HnswParams>,
}

struct Inner {
    graph: Hnsw<'static, f32, DistCosine>,
    capacity: usize,
    /// Slot order is insertion order; `map.tsv` and `vectors.bin` share it.
    slots: Vec<String>,
    by_id: HashMap<String, usize>,
    vectors: Vec<Vec<f32>>,
    payloads: Vec<VectorPayload>,
    dirty: bool,
}

pub struct LocalVectorIndex {
    dir: PathBuf,
    dim: usize,
    params: HnswParams,
    inner: RwLock<Inner>,
}

impl std::fmt::Debug for LocalVectorIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalVectorIndex")
            .field("dir", &self.dir)
            .field("dim", &self.dim)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

const MAX_LAYER: usize = 16;
const MIN_CAPACITY: usize = 16_384;

fn new_graph(params: &HnswParams, capacity: usize) -> Hnsw<'static, f32, DistCosine> {
    Hnsw::new(params.m, capacity, MAX_LAYER, params.ef_construct, DistCosine {})
}

impl LocalVectorIndex {
    /// Open the collection at `dir`, creating it if missing. An existing
    /// collection must match `dim`.
    pub fn open(dir: &Path, dim: usize, params: HnswParams) -> Result<Self, StoreError> {
        fs::create_dir_all(dir)?;
        let index = Self {
            dir: dir.to_path_buf(),
            dim,
            params,
            inner: RwLock::new(Inner {
                graph: new_graph(&params, MIN_CAPACITY),
                capacity: MIN_CAPACITY,
                slots: Vec::new(),
                by_id: HashMap::new(),
                vectors: Vec::new(),
                payloads: Vec::new(),
                dirty: false,
            }),
        };
        if index.dir.join(META_FILE).exists() {
            index.load()?;
        }
        Ok(index)
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    fn load(&self) -> Result<(), StoreError> {
        let meta: CollectionMeta =
            serde_json::from_str(&fs::read_to_string(self.dir.join(META_FILE))?)
                .map_err(|e| StoreError::Corrupt(format!("meta.json: {e}")))?;
        if meta.dim != self.dim {
            return Err(StoreError::DimensionMismatch { got: meta.dim, expected: self.dim });
        }

        let bytes = fs::read(self.dir.join(VECTORS_FILE))?;
        let flat: Vec<f32> = bytemuck::pod_collect_to_vec(&bytes);
        if flat.len() != meta.count * meta.dim {
            return Err(StoreError::Corrupt(format!(
                "vectors.bin holds {} floats, expected {}",
                flat.len(),
                meta.count * meta.dim
            )));
        }

        let mut slots = Vec::with_capacity(meta.count);
        let mut by_id = HashMap::with_capacity(meta.count);
        let mut payloads = Vec::with_capacity(meta.count);
        for (lineno, line) in fs::read_to_string(self.dir.join(MAP_FILE))?.lines().enumerate() {
            let mut fields = line.splitn(4, '\t');
            let (chunk_id, file_id, idx, path_json) =
                match (fields.next(), fields.next(), fields.next(), fields.next()) {
                    (Some(a), Some(b), Some(c), Some(d)) => (a, b, c, d),
                    _ => {
                        return Err(StoreError::Corrupt(format!(
                            "map.tsv line {} is malformed",
                            lineno + 1
                        )))
                    }
                };
            let idx: u32 = idx
                .parse()
                .map_err(|_| StoreError::Corrupt(format!("map.tsv line {}: bad idx", lineno + 1)))?;
            let path: String = serde_json::from_str(path_json)
                .map_err(|e| StoreError::Corrupt(format!("map.tsv line {}: {e}", lineno + 1)))?;
            by_id.insert(chunk_id.to_string(), slots.len());
            slots.push(chunk_id.to_string());
            payloads.push(VectorPayload {
                path,
                file_id: file_id.to_string(),
                chunk_id: chunk_id.to_string(),
                idx,
            });
        }
        if slots.len() != meta.count {
            return Err(StoreError::Corrupt(format!(
                "map.tsv holds {} points, meta says {}",
                slots.len(),
                meta.count
            )));
        }

        let vectors: Vec<Vec<f32>> = flat.chunks(meta.dim).map(|c| c.to_vec()).collect();
        let capacity = MIN_CAPACITY.max(vectors.len().next_power_of_two());
        let graph = new_graph(&self.params, capacity);
        for (slot, v) in vectors.iter().enumerate() {
            graph.insert((v, slot));
        }
        debug!(dir = %self.dir.display(), points = slots.len(), "loaded vector collection");

        let mut inner = self.inner.write().unwrap();
        *inner = Inner { graph, capacity, slots, by_id, vectors, payloads, dirty: false };
        Ok(())
    }

    fn rebuild(inner: &mut Inner, params: &HnswParams) {
        let capacity = MIN_CAPACITY.max(inner.vectors.len().next_power_of_two());
        let graph = new_graph(params, capacity);
        for (slot, v) in inner.vectors.iter().enumerate() {
            graph.insert((v, slot));
        }
        inner.graph = graph;
        inner.capacity = capacity;
    }
}

impl VectorStore for LocalVectorIndex {
    fn upsert(&self, points: &[VectorPoint]) -> Result<(), StoreError> {
        if points.is_empty() {
            return Ok(());
        }
        for p in points {
            if p.vector.len() != self.dim {
                return Err(StoreError::DimensionMismatch {
                    got: p.vector.len(),
                    expected: self.dim,
                });
            }
        }

        let mut inner = self.inner.write().unwrap();
        let mut needs_rebuild = false;
        for p in points {
            match inner.by_id.get(&p.chunk_id).copied() {
                Some(slot) => {
                    if inner.vectors[slot] != p.vector {
                        inner.vectors[slot] = p.vector.clone();
                        needs_rebuild = true;
                    }
                    inner.payloads[slot] = p.payload.clone();
                }
                None => {
                    let slot = inner.slots.len();
                    if slot >= inner.capacity {
                        needs_rebuild = true;
                    }
                    inner.slots.push(p.chunk_id.clone());
                    inner.by_id.insert(p.chunk_id.clone(), slot);
                    inner.vectors.push(p.vector.clone());
                    inner.payloads.push(p.payload.clone());
                    if !needs_rebuild {
                        inner.graph.insert((&inner.vectors[slot], slot));
                    }
                }
            }
        }
        if needs_rebuild {
            Self::rebuild(&mut inner, &self.params);
        }
        inner.dirty = true;
        Ok(())
    }

    fn search(&self, vector: &[f32], limit: usize) -> Result<Vec<VectorHit>, StoreError> {
        if vector.len() != self.dim {
            return Err(StoreError::DimensionMismatch { got: vector.len(), expected: self.dim });
        }
        let inner = self.inner.read().unwrap();
        if inner.slots.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }
        let knn = limit.min(inner.slots.len());
        let ef = self.params.ef_construct.max(2 * knn);
        let neighbours = inner.graph.search(vector, knn, ef);
        Ok(neighbours
            .into_iter()
            .filter_map(|n| {
                inner.slots.get(n.d_id).map(|chunk_id| VectorHit {
                    chunk_id: chunk_id.clone(),
                    // DistCosine is a distance; similarity = 1 - d.
                    score: 1.0 - n.distance,
                })
            })
            .collect())
    }

    fn contains(&self, chunk_id: &str) -> bool {
        self.inner.read().unwrap().by_id.contains_key(chunk_id)
    }

    fn delete(&self, chunk_ids: &[String]) -> Result<usize, StoreError> {
        let mut inner = self.inner.write().unwrap();
        let before = inner.slots.len();
        let doomed: std::collections::HashSet<&str> =
            chunk_ids.iter().map(String::as_str).collect();

        let mut slots = Vec::with_capacity(before);
        let mut vectors = Vec::with_capacity(before);
        let mut payloads = Vec::with_capacity(before);
        for i in 0..before {
            if !doomed.contains(inner.slots[i].as_str()) {
                slots.push(inner.slots[i].clone());
                vectors.push(inner.vectors[i].clone());
                payloads.push(inner.payloads[i].clone());
            }
        }
        let removed = before - slots.len();
        if removed == 0 {
            return Ok(0);
        }

        inner.by_id = slots.iter().enumerate().map(|(i, id)| (id.clone(), i)).collect();
        inner.slots = slots;
        inner.vectors = vectors;
        inner.payloads = payloads;
        Self::rebuild(&mut inner, &self.params);
        inner.dirty = true;
        Ok(removed)
    }

    fn count(&self) -> usize {
        self.inner.read().unwrap().slots.len()
    }

    fn flush(&self) -> Result<(), StoreError> {
        let mut inner = self.inner.write().unwrap();
        if !inner.dirty {
            return Ok(());
        }

        let meta = CollectionMeta {
            dim: self.dim,
            count: inner.slots.len(),
            distance: "cosine".to_string(),
            hnsw: Some(self.params),
        };
        fs::write(self.dir.join(META_FILE), serde_json::to_string_pretty(&meta).unwrap())?;

        let mut map = String::new();
        for (slot, chunk_id) in inner.slots.iter().enumerate() {
            let p = &inner.payloads[slot];
            map.push_str(chunk_id);
            map.push('\t');
            map.push_str(&p.file_id);
            map.push('\t');
            map.push_str(&p.idx.to_string());
            map.push('\t');
            // JSON-encoded so tabs or newlines in a path cannot break the row.
            map.push_str(&serde_json::to_string(&p.path).unwrap());
            map.push('\n');
        }
        fs::write(self.dir.join(MAP_FILE), map)?;

        let mut flat: Vec<f32> = Vec::with_capacity(inner.slots.len() * self.dim);
        for v in &inner.vectors {
            flat.extend_from_slice(v);
        }
        fs::write(self.dir.join(VECTORS_FILE), bytemuck::cast_slice::<f32, u8>(&flat))?;

        inner.dirty = false;
        debug!(dir = %self.dir.display(), points = inner.slots.len(), "flushed vector collection");
        Ok(())
    }

    fn reset(&self) -> Result<(), StoreError> {
        let mut inner = self.inner.write().unwrap();
        *inner = Inner {
            graph: new_graph(&self.params, MIN_CAPACITY),
            capacity: MIN_CAPACITY,
            slots: Vec::new(),
            by_id: HashMap::new(),
            vectors: Vec::new(),
            payloads: Vec::new(),
            dirty: false,
        };
        for name in [META_FILE, MAP_FILE, VECTORS_FILE] {
            let path = self.dir.join(name);
            if path.exists() {
                if let Err(e) = fs::remove_file(&path) {
                    warn!(path = %path.display(), error = %e, "could not remove collection file");
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(v: [f32; 4]) -> Vec<f32> {
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        v.iter().map(|x| x / norm).collect()
    }

    fn point(id: &str, v: [f32; 4]) -> VectorPoint {
        VectorPoint {
            chunk_id: id.to_string(),
            vector: unit(v),
            payload: VectorPayload {
                path: format!("/docs/{id}.txt"),
                file_id: format!("file-{id}"),
                chunk_id: id.to_string(),
                idx: 0,
            },
        }
    }

    fn open(dir: &Path) -> LocalVectorIndex {
        LocalVectorIndex::open(dir, 4, HnswParams { m: 8, ef_construct: 32 }).unwrap()
    }

    #[test]
    fn search_ranks_by_cosine() {
        let dir = tempfile::tempdir().unwrap();
        let index = open(dir.path());
        index
            .upsert(&[
                point("a", [1.0, 0.0, 0.0, 0.0]),
                point("b", [0.9, 0.1, 0.0, 0.0]),
                point("c", [0.0, 0.0, 1.0, 0.0]),
            ])
            .unwrap();

        let hits = index.search(&unit([1.0, 0.0, 0.0, 0.0]), 2).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].chunk_id, "a");
        assert!(hits[0].score > hits[1].score);
        assert!(hits[0].score > 0.99);
    }

    #[test]
    fn flush_and_reopen_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        {
            let index = open(dir.path());
            index.upsert(&[point("a", [1.0, 0.0, 0.0, 0.0])]).unwrap();
            index.flush().unwrap();
        }
        let index = open(dir.path());
        assert_eq!(index.count(), 1);
        assert!(index.contains("a"));
        let hits = index.search(&unit([1.0, 0.0, 0.0, 0.0]), 1).unwrap();
        assert_eq!(hits[0].chunk_id, "a");
    }

    #[test]
    fn reopen_with_other_dimension_fails() {
        let dir = tempfile::tempdir().unwrap();
        {
            let index = open(dir.path());
            index.upsert(&[point("a", [1.0, 0.0, 0.0, 0.0])]).unwrap();
            index.flush().unwrap();
        }
        let err = LocalVectorIndex::open(dir.path(), 8, HnswParams::default()).unwrap_err();
        assert!(matches!(err, StoreError::DimensionMismatch { got: 4, expected: 8 }));
    }

    #[test]
    fn delete_removes_points_and_keeps_rest_searchable() {
        let dir = tempfile::tempdir().unwrap();
        let index = open(dir.path());
        index
            .upsert(&[point("a", [1.0, 0.0, 0.0, 0.0]), point("b", [0.0, 1.0, 0.0, 0.0])])
            .unwrap();

        assert_eq!(index.delete(&["a".to_string(), "zz".to_string()]).unwrap(), 1);
        assert!(!index.contains("a"));
        assert_eq!(index.count(), 1);
        let hits = index.search(&unit([0.0, 1.0, 0.0, 0.0]), 5).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk_id, "b");
    }

    #[test]
    fn reupsert_same_vector_is_a_noop_update() {
        let dir = tempfile::tempdir().unwrap();
        let index = open(dir.path());
        index.upsert(&[point("a", [1.0, 0.0, 0.0, 0.0])]).unwrap();
        index.upsert(&[point("a", [1.0, 0.0, 0.0, 0.0])]).unwrap();
        assert_eq!(index.count(), 1);

        // Changing the vector re-ranks instead of duplicating.
        index.upsert(&[point("a", [0.0, 0.0, 0.0, 1.0])]).unwrap();
        assert_eq!(index.count(), 1);
        let hits = index.search(&unit([0.0, 0.0, 0.0, 1.0]), 1).unwrap();
        assert!(hits[0].score > 0.99);
    }

    #[test]
    fn reset_clears_memory_and_disk() {
        let dir = tempfile::tempdir().unwrap();
        let index = open(dir.path());
        index.upsert(&[point("a", [1.0, 0.0, 0.0, 0.0])]).unwrap();
        index.flush().unwrap();
        index.reset().unwrap();
        assert_eq!(index.count(), 0);
        assert!(!dir.path().join("map.tsv").exists());
    }

    #[test]
    fn empty_collection_searches_empty() {
        let dir = tempfile::tempdir().unwrap();
        let index = open(dir.path());
        assert!(index.search(&unit([1.0, 0.0, 0.0, 0.0]), 5).unwrap().is_empty());
    }
}
