//! Configuration: built-in defaults, optional YAML overlay, environment
//! overrides.
//!
//! Every field carries a serde default so a partial config file only
//! overrides what it names. Environment variables use the `FINDEX_` prefix;
//! unknown variables are ignored, unparsable values are logged and ignored.

use std::env;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::ServiceError;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub index: IndexConfig,
    pub search: SearchConfig,
    #[serde(alias = "qdrant")]
    pub vectors: VectorConfig,
    pub embedding: EmbeddingConfig,
    pub paths: PathsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    pub max_tokens: usize,
    pub overlap: usize,
    pub embed_batch: usize,
    pub upsert_batch: usize,
    pub max_items: usize,
    pub allow_exts: Vec<String>,
    pub ocr_enabled: bool,
    pub max_pdf_pages: usize,
    pub exclude_patterns: Vec<String>,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            max_tokens: 1200,
            overlap: 80,
            embed_batch: 1024,
            upsert_batch: 4000,
            max_items: 1000,
            allow_exts: [".txt", ".md", ".markdown", ".pdf", ".docx", ".html", ".htm", ".rtf"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            ocr_enabled: false,
            max_pdf_pages: 50,
            exclude_patterns: [
                "**/node_modules/**",
                "**/.git/**",
                "**/__pycache__/**",
                "**/.venv/**",
                "**/venv/**",
                "**/target/**",
                "**/Library/**",
                "**/System/**",
                "**/Applications/**",
                "**/usr/**",
                "**/var/**",
                "**/tmp/**",
                "**/.cache/**",
                "**/.Trash/**",
                "**/.*/**",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub top_k: usize,
    pub lex_k: usize,
    pub vec_k: usize,
    pub merge_k: usize,
    pub timeout_sec: f64,
    pub bm25_weight: f32,
    pub cosine_weight: f32,
    pub exact_boost: f32,
    pub early_pos_boost: f32,
    pub cache_size: usize,
    pub snippet_radius: usize,
    pub max_results_per_file: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            top_k: 50,
            lex_k: 200,
            vec_k: 300,
            merge_k: 400,
            timeout_sec: 2.5,
            bm25_weight: 0.55,
            cosine_weight: 0.45,
            exact_boost: 0.20,
            early_pos_boost: 0.10,
            cache_size: 128,
            snippet_radius: 50,
            max_results_per_file: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorConfig {
    /// Reserved for remote engines; the local HNSW engine ignores it.
    pub url: Option<String>,
    pub collection: String,
    pub dim: usize,
    pub hnsw_m: usize,
    pub hnsw_ef_construct: usize,
    /// Reserved for remote engines (segment count).
    pub segments: usize,
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            url: None,
            collection: "findex_chunks".to_string(),
            dim: 384,
            hnsw_m: 32,
            hnsw_ef_construct: 256,
            segments: 4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// `"feature-hash"` (default) or `"onnx"` (requires the `onnx` feature).
    pub provider: String,
    pub model_id: String,
    pub model_path: Option<PathBuf>,
    pub tokenizer_path: Option<PathBuf>,
    pub runtime_library_path: Option<PathBuf>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "feature-hash".to_string(),
            model_id: "feature-hash-v1".to_string(),
            model_path: None,
            tokenizer_path: None,
            runtime_library_path: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Root of the persisted state; everything else is derived from it.
    pub store: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self { store: PathBuf::from("store") }
    }
}

impl PathsConfig {
    pub fn catalog_path(&self) -> PathBuf {
        self.store.join("catalog.db")
    }

    pub fn frontier_path(&self) -> PathBuf {
        self.store.join("frontier.json")
    }

    pub fn benchmarks_dir(&self) -> PathBuf {
        self.store.join("runs")
    }

    pub fn vectors_dir(&self) -> PathBuf {
        self.store.join("vectors")
    }
}

impl Config {
    /// Built-in defaults overlaid with the YAML file at `path` (if any),
    /// then with environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self, ServiceError> {
        let mut config = match path {
            Some(p) if p.exists() => {
                let raw = std::fs::read_to_string(p)?;
                serde_yaml::from_str(&raw).map_err(|e| {
                    ServiceError::InvalidConfig(format!("{}: {e}", p.display()))
                })?
            }
            _ => Config::default(),
        };
        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Some(v) = env_var("FINDEX_STORE_PATH") {
            self.paths.store = PathBuf::from(v);
        }
        if let Some(v) = env_var("FINDEX_VECTOR_URL") {
            self.vectors.url = Some(v);
        }
        if let Some(v) = env_var("FINDEX_VECTOR_COLLECTION") {
            self.vectors.collection = v;
        }
        if let Some(v) = env_var("FINDEX_INDEX_MAX_TOKENS") {
            parse_into(&mut self.index.max_tokens, "FINDEX_INDEX_MAX_TOKENS", &v);
        }
        if let Some(v) = env_var("FINDEX_INDEX_OCR") {
            self.index.ocr_enabled = v.eq_ignore_ascii_case("true") || v == "1";
        }
        if let Some(v) = env_var("FINDEX_SEARCH_TIMEOUT") {
            parse_into(&mut self.search.timeout_sec, "FINDEX_SEARCH_TIMEOUT", &v);
        }
        if let Some(v) = env_var("FINDEX_SEARCH_BM25_WEIGHT") {
            parse_into(&mut self.search.bm25_weight, "FINDEX_SEARCH_BM25_WEIGHT", &v);
        }
        if let Some(v) = env_var("FINDEX_SEARCH_COSINE_WEIGHT") {
            parse_into(&mut self.search.cosine_weight, "FINDEX_SEARCH_COSINE_WEIGHT", &v);
        }
    }

    /// Reject configurations the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ServiceError> {
        let weight_ok = |w: f32| (0.0..=1.0).contains(&w);
        if !weight_ok(self.search.bm25_weight) || !weight_ok(self.search.cosine_weight) {
            return Err(ServiceError::InvalidConfig(
                "search weights must be between 0 and 1".into(),
            ));
        }
        if self.search.timeout_sec <= 0.0 {
            return Err(ServiceError::InvalidConfig("search timeout must be positive".into()));
        }
        if self.index.embed_batch == 0 || self.index.upsert_batch == 0 {
            return Err(ServiceError::InvalidConfig("batch sizes must be positive".into()));
        }
        if self.index.max_tokens == 0 {
            return Err(ServiceError::InvalidConfig("max_tokens must be positive".into()));
        }
        if self.index.overlap >= self.index.max_tokens {
            return Err(ServiceError::InvalidConfig(
                "overlap must be smaller than max_tokens".into(),
            ));
        }
        if self.vectors.dim == 0 {
            return Err(ServiceError::InvalidConfig("vector dimension must be positive".into()));
        }
        Ok(())
    }
}

fn env_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.is_empty())
}

fn parse_into<T: std::str::FromStr>(slot: &mut T, name: &str, raw: &str) {
    match raw.parse() {
        Ok(v) => *slot = v,
        Err(_) => warn!(var = name, value = raw, "ignoring unparsable environment override"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.index.max_tokens, 1200);
        assert_eq!(config.search.bm25_weight, 0.55);
        assert_eq!(config.vectors.dim, 384);
    }

    #[test]
    fn partial_yaml_overlays_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(
            &path,
            "search:\n  bm25_weight: 0.7\nindex:\n  max_tokens: 256\npaths:\n  store: /tmp/findex-store\n",
        )
        .unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.search.bm25_weight, 0.7);
        // Untouched siblings keep their defaults.
        assert_eq!(config.search.cosine_weight, 0.45);
        assert_eq!(config.index.max_tokens, 256);
        assert_eq!(config.index.overlap, 80);
        assert_eq!(config.paths.catalog_path(), PathBuf::from("/tmp/findex-store/catalog.db"));
    }

    #[test]
    fn qdrant_section_alias_is_accepted() {
        let config: Config =
            serde_yaml::from_str("qdrant:\n  collection: legacy\n  dim: 128\n").unwrap();
        assert_eq!(config.vectors.collection, "legacy");
        assert_eq!(config.vectors.dim, 128);
    }

    #[test]
    fn missing_file_means_defaults() {
        let config = Config::load(Some(Path::new("/nonexistent/config.yaml"))).unwrap();
        assert_eq!(config.search.top_k, 50);
    }

    #[test]
    fn validation_rejects_bad_values() {
        let mut config = Config::default();
        config.search.bm25_weight = 2.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.index.overlap = config.index.max_tokens;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.search.timeout_sec = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn store_derives_the_layout() {
        let paths = PathsConfig { store: PathBuf::from("/data/s") };
        assert_eq!(paths.frontier_path(), PathBuf::from("/data/s/frontier.json"));
        assert_eq!(paths.benchmarks_dir(), PathBuf::from("/data/s/runs"));
        assert_eq!(paths.vectors_dir(), PathBuf::from("/data/s/vectors"));
    }
}
