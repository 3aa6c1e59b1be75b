//! Benchmark harness: run queries through the search API and append the
//! measurements to an append-only CSV under `store/runs/`.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::info;

use doc_model::SearchOptions;

use crate::api::SearchApi;
use crate::ServiceError;

const BENCH_FILE: &str = "search_bench.csv";

#[derive(Debug, Clone, Serialize)]
pub struct BenchRecord {
    pub timestamp: i64,
    pub operation: String,
    pub query: String,
    pub total_hits: usize,
    pub search_time: f64,
    pub cache_hit: bool,
}

pub struct SearchBenchmark<'a> {
    api: &'a SearchApi,
    out_dir: PathBuf,
}

impl<'a> SearchBenchmark<'a> {
    pub fn new(api: &'a SearchApi, out_dir: &Path) -> Self {
        Self { api, out_dir: out_dir.to_path_buf() }
    }

    /// Run each query once through the hybrid pipeline and log one CSV row
    /// per query. Returns the records in query order.
    pub fn run_search_bench(&self, queries: &[String]) -> Result<Vec<BenchRecord>, ServiceError> {
        let opts = SearchOptions::default();
        let mut records = Vec::with_capacity(queries.len());
        for query in queries {
            let response = self.api.run(query, Some(10), 1, 10, &opts);
            records.push(BenchRecord {
                timestamp: response.timestamp,
                operation: "search_hybrid".to_string(),
                query: query.clone(),
                total_hits: response.total_hits,
                search_time: response.search_time,
                cache_hit: response.cache_hit,
            });
            info!(
                query,
                hits = response.total_hits,
                seconds = response.search_time,
                "bench query"
            );
        }
        self.append(&records)?;
        Ok(records)
    }

    fn append(&self, records: &[BenchRecord]) -> Result<(), ServiceError> {
        std::fs::create_dir_all(&self.out_dir)?;
        let path = self.out_dir.join(BENCH_FILE);
        let write_header = !path.exists();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let mut writer =
            csv::WriterBuilder::new().has_headers(write_header).from_writer(file);
        for record in records {
            writer
                .serialize(record)
                .map_err(|e| ServiceError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?;
        }
        writer.flush()?;
        Ok(())
    }
}
