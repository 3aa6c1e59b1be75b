//! Service layer wiring the stores, extractor and embedder into the
//! indexing and retrieval pipelines.

pub mod api;
pub mod bench;
pub mod config;
pub mod frontier;
pub mod indexer;
pub mod retriever;
pub mod snippets;

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tracing::info;

use embedder::{Embedder, HashEmbedder};
use file_extract::{DefaultExtractor, Extractor};
use index_store::{Catalog, LocalVectorIndex, StoreError, VectorStore};
use index_store::vector_index::HnswParams;

use crate::api::SearchApi;
use crate::config::Config;
use crate::frontier::Frontier;
use crate::indexer::Indexer;
use crate::retriever::Retriever;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),
    #[error("extraction failed: {0}")]
    ExtractionFailed(String),
    #[error("embedding unavailable: {0}")]
    EmbeddingUnavailable(String),
    #[error("vector store unavailable: {0}")]
    VectorStoreUnavailable(String),
    #[error("catalog error: {0}")]
    Catalog(#[from] StoreError),
    #[error("query timed out after {0:?}")]
    QueryTimeout(Duration),
    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

/// Aggregate view of the persisted state, for the `status` command.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub store_path: String,
    pub files: i64,
    pub chunks: i64,
    pub fts_entries: i64,
    pub vectors: usize,
    pub frontier_queue: usize,
    pub processed_files: u64,
    pub processed_dirs: u64,
    pub frontier_errors: usize,
}

/// The assembled engine: validated config plus the concrete collaborators
/// chosen at startup. Constructed once and passed to command handlers;
/// there is no process-global state besides what lives in the store
/// directory.
pub struct Engine {
    config: Config,
    catalog: Arc<Catalog>,
    vectors: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    extractor: Arc<dyn Extractor>,
}

impl Engine {
    /// Validate the config, create the store layout and open every backing
    /// store. A catalog schema mismatch is fatal here.
    pub fn open(config: Config) -> Result<Self, ServiceError> {
        config.validate()?;
        std::fs::create_dir_all(&config.paths.store)?;

        let catalog = Arc::new(Catalog::open(&config.paths.catalog_path())?);
        let collection_dir = config.paths.vectors_dir().join(&config.vectors.collection);
        let vectors: Arc<dyn VectorStore> = Arc::new(LocalVectorIndex::open(
            &collection_dir,
            config.vectors.dim,
            HnswParams { m: config.vectors.hnsw_m, ef_construct: config.vectors.hnsw_ef_construct },
        )?);
        let embedder = build_embedder(&config)?;
        let extractor: Arc<dyn Extractor> = Arc::new(DefaultExtractor {
            max_pdf_pages: config.index.max_pdf_pages,
            ocr_enabled: config.index.ocr_enabled,
        });

        Ok(Self { config, catalog, vectors, embedder, extractor })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn indexer(&self) -> Indexer {
        Indexer::new(
            self.config.clone(),
            Arc::clone(&self.catalog),
            Arc::clone(&self.vectors),
            Arc::clone(&self.embedder),
            Arc::clone(&self.extractor),
        )
    }

    pub fn retriever(&self) -> Retriever {
        Retriever::new(
            Arc::clone(&self.catalog),
            Arc::clone(&self.vectors),
            Arc::clone(&self.embedder),
            self.config.search.clone(),
        )
    }

    pub fn search_api(&self) -> SearchApi {
        SearchApi::new(self.retriever(), self.config.search.clone())
    }

    pub fn status(&self) -> Result<StatusReport, ServiceError> {
        let (files, chunks, fts_entries) = self.catalog.counts()?;
        let frontier = Frontier::load(&self.config.paths.frontier_path());
        Ok(StatusReport {
            store_path: self.config.paths.store.display().to_string(),
            files,
            chunks,
            fts_entries,
            vectors: self.vectors.count(),
            frontier_queue: frontier.queue_len(),
            processed_files: frontier.state().processed_files,
            processed_dirs: frontier.state().processed_dirs,
            frontier_errors: frontier.state().errors.len(),
        })
    }

    /// Clear every indexed artifact: catalog rows, vectors and the frontier
    /// checkpoint.
    pub fn reset(&self) -> Result<(), ServiceError> {
        self.catalog.reset()?;
        self.vectors
            .reset()
            .map_err(|e| ServiceError::VectorStoreUnavailable(e.to_string()))?;
        Frontier::reset(&self.config.paths.frontier_path())?;
        info!("store reset complete");
        Ok(())
    }
}

fn build_embedder(config: &Config) -> Result<Arc<dyn Embedder>, ServiceError> {
    match config.embedding.provider.as_str() {
        "feature-hash" | "hash" => Ok(Arc::new(
            HashEmbedder::with_model_id(&config.embedding.model_id, config.vectors.dim)
                .map_err(|e| ServiceError::InvalidConfig(e.to_string()))?,
        )),
        #[cfg(feature = "onnx")]
        "onnx" => {
            let require = |field: &Option<std::path::PathBuf>, name: &str| {
                field.clone().ok_or_else(|| {
                    ServiceError::InvalidConfig(format!("embedding.{name} is required for onnx"))
                })
            };
            let onnx = embedder::onnx::OnnxEmbedder::new(embedder::onnx::OnnxConfig {
                model_path: require(&config.embedding.model_path, "model_path")?,
                tokenizer_path: require(&config.embedding.tokenizer_path, "tokenizer_path")?,
                runtime_library_path: require(
                    &config.embedding.runtime_library_path,
                    "runtime_library_path",
                )?,
                dimension: config.vectors.dim,
                model_id: config.embedding.model_id.clone(),
            })
            .map_err(|e| ServiceError::EmbeddingUnavailable(e.to_string()))?;
            Ok(Arc::new(onnx))
        }
        #[cfg(not(feature = "onnx"))]
        "onnx" => Err(ServiceError::InvalidConfig(
            "embedding provider `onnx` requires building with the `onnx` feature".into(),
        )),
        other => Err(ServiceError::InvalidConfig(format!("unknown embedding provider `{other}`"))),
    }
}
