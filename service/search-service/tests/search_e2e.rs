//! End-to-end scenarios over a temporary store: index a small corpus with
//! the deterministic embedder and the local vector engine, then exercise the
//! hybrid retrieval pipeline and the public API.

use std::path::Path;
use std::sync::Arc;

use doc_model::SearchOptions;
use embedder::HashEmbedder;
use file_extract::DefaultExtractor;
use index_store::vector_index::HnswParams;
use index_store::{Catalog, LocalVectorIndex, VectorStore};
use search_service::config::Config;
use search_service::indexer::Indexer;
use search_service::retriever::Retriever;
use search_service::Engine;

const DIM: usize = 128;

fn test_config(root: &Path) -> Config {
    let mut config = Config::default();
    config.paths.store = root.join("store");
    config.vectors.dim = DIM;
    config.vectors.hnsw_m = 8;
    config.vectors.hnsw_ef_construct = 32;
    config.index.max_tokens = 64;
    config.index.overlap = 8;
    // Temp dirs live under /tmp, which the default exclusions would filter.
    config.index.exclude_patterns = Vec::new();
    config
}

fn seed_corpus(docs: &Path) {
    std::fs::create_dir_all(docs).unwrap();
    std::fs::write(docs.join("taipei.txt"), "Taipei is the capital city of Taiwan.").unwrap();
    std::fs::write(
        docs.join("astrabit.txt"),
        "Astrabit is a technology company focused on artificial intelligence.",
    )
    .unwrap();
    std::fs::write(
        docs.join("lorem.txt"),
        "Lorem ipsum dolor sit amet consectetur adipiscing elit.",
    )
    .unwrap();
}

struct Stack {
    config: Config,
    catalog: Arc<Catalog>,
    vectors: Arc<LocalVectorIndex>,
}

impl Stack {
    fn open(root: &Path) -> Self {
        let config = test_config(root);
        let catalog = Arc::new(Catalog::open(&config.paths.catalog_path()).unwrap());
        let vectors = Arc::new(
            LocalVectorIndex::open(
                &config.paths.vectors_dir().join(&config.vectors.collection),
                DIM,
                HnswParams { m: 8, ef_construct: 32 },
            )
            .unwrap(),
        );
        Self { config, catalog, vectors }
    }

    fn indexer(&self) -> Indexer {
        Indexer::new(
            self.config.clone(),
            Arc::clone(&self.catalog),
            Arc::clone(&self.vectors) as Arc<dyn VectorStore>,
            Arc::new(HashEmbedder::new(DIM).unwrap()),
            Arc::new(DefaultExtractor::default()),
        )
    }

    fn retriever(&self) -> Retriever {
        Retriever::new(
            Arc::clone(&self.catalog),
            Arc::clone(&self.vectors) as Arc<dyn VectorStore>,
            Arc::new(HashEmbedder::new(DIM).unwrap()),
            self.config.search.clone(),
        )
    }
}

#[test]
fn index_then_search_exact_phrase() {
    let tmp = tempfile::tempdir().unwrap();
    let docs = tmp.path().join("docs");
    seed_corpus(&docs);

    let engine = Engine::open(test_config(tmp.path())).unwrap();
    let stats = engine
        .indexer()
        .run_complete_index(&[docs.to_string_lossy().to_string()], 100)
        .unwrap();
    assert_eq!(stats.files_processed, 3);
    assert!(stats.chunks_created >= 3);
    assert_eq!(stats.errors, 0);

    let response =
        engine.search_api().run("artificial intelligence", None, 1, 10, &SearchOptions::default());
    assert!(response.error.is_none());
    assert!(response.total_hits >= 1);
    let top = &response.items[0];
    assert!(top.path.ends_with("astrabit.txt"));
    assert_eq!(top.score_breakdown.exact, 1.0);
    assert!(top.snippet.to_lowercase().contains("artificial"));
}

#[test]
fn reindex_of_unchanged_files_is_idempotent() {
    let tmp = tempfile::tempdir().unwrap();
    let docs = tmp.path().join("docs");
    seed_corpus(&docs);
    let roots = vec![docs.to_string_lossy().to_string()];

    let stack = Stack::open(tmp.path());
    let indexer = stack.indexer();

    let first = indexer.run_complete_index(&roots, 100).unwrap();
    assert_eq!(first.files_processed, 3);
    let (files, chunks, fts) = stack.catalog.counts().unwrap();
    assert_eq!(files, 3);
    assert_eq!(chunks, fts);

    let second = indexer.run_complete_index(&roots, 100).unwrap();
    assert_eq!(second.files_processed, 0);
    assert_eq!(second.chunks_created, 0);
    assert_eq!(second.files_skipped, 3);
    assert_eq!(stack.catalog.counts().unwrap(), (files, chunks, fts));
}

#[test]
fn missing_vectors_force_a_reembed() {
    let tmp = tempfile::tempdir().unwrap();
    let docs = tmp.path().join("docs");
    seed_corpus(&docs);
    let roots = vec![docs.to_string_lossy().to_string()];

    let stack = Stack::open(tmp.path());
    let indexer = stack.indexer();
    indexer.run_complete_index(&roots, 100).unwrap();
    let before = stack.vectors.count();
    assert!(before >= 3);

    // Simulate a crash between the catalog write and the vector upsert.
    let all_ids: Vec<String> = stack
        .catalog
        .all_files()
        .unwrap()
        .iter()
        .flat_map(|(fid, _)| stack.catalog.chunk_ids_for_file(fid).unwrap())
        .collect();
    stack.vectors.delete(&all_ids).unwrap();
    assert_eq!(stack.vectors.count(), 0);

    let repair = indexer.run_complete_index(&roots, 100).unwrap();
    assert_eq!(repair.files_processed, 3);
    assert_eq!(stack.vectors.count(), before);
    for id in &all_ids {
        assert!(stack.vectors.contains(id));
    }
}

#[test]
fn fusion_normalizes_each_channel_independently() {
    let tmp = tempfile::tempdir().unwrap();
    let stack = Stack::open(tmp.path());

    // Three chunks whose text shares nothing with the query, so no bonuses.
    for (name, text) in [("a", "alpha one"), ("b", "beta two"), ("c", "gamma three")] {
        let path = format!("/docs/{name}.txt");
        let fid = stack.catalog.upsert_file(&path, 10, 100, "sha").unwrap();
        let chunk = doc_model::Chunk {
            chunk_id: format!("chunk-{name}"),
            file_id: fid.clone(),
            path,
            idx: 0,
            token_start: 0,
            token_end: 2,
            text: text.to_string(),
        };
        stack.catalog.insert_chunks(&fid, &[chunk]).unwrap();
    }

    let vec_hits = vec![("chunk-a".to_string(), 0.9), ("chunk-b".to_string(), 0.6)];
    let lex_hits = vec![("chunk-b".to_string(), 10.0), ("chunk-c".to_string(), 5.0)];
    let ranked = stack.retriever().merge_and_score("query", &vec_hits, &lex_hits).unwrap();

    let by_id = |id: &str| ranked.iter().find(|c| c.chunk_id == id).unwrap();
    let a = by_id("chunk-a");
    let b = by_id("chunk-b");
    let c = by_id("chunk-c");

    assert_eq!(a.score_breakdown.cosine, 1.0);
    assert_eq!(b.score_breakdown.cosine, 0.0);
    assert_eq!(b.score_breakdown.bm25, 1.0);
    assert_eq!(c.score_breakdown.bm25, 0.0);

    // final = 0.55*bm25 + 0.45*cosine with no bonuses.
    assert!((a.score - 0.45).abs() < 1e-6);
    assert!((b.score - 0.55).abs() < 1e-6);
    assert!(c.score.abs() < 1e-6);
    assert_eq!(ranked[0].chunk_id, "chunk-b");
}

#[test]
fn early_phrase_match_earns_the_position_bonus() {
    let tmp = tempfile::tempdir().unwrap();
    let docs = tmp.path().join("docs");
    std::fs::create_dir_all(&docs).unwrap();
    std::fs::write(
        docs.join("db.txt"),
        "database systems overview with storage engines and query planners explained",
    )
    .unwrap();

    let stack = Stack::open(tmp.path());
    stack
        .indexer()
        .run_complete_index(&[docs.to_string_lossy().to_string()], 100)
        .unwrap();

    let ranked = stack
        .retriever()
        .search("database", 10, std::time::Duration::from_secs_f64(2.5), 1)
        .unwrap();
    assert_eq!(ranked.len(), 1);
    let breakdown = ranked[0].score_breakdown;
    assert!(breakdown.position_bonus > 0.99);
    assert!(ranked[0].score >= 0.55 * breakdown.bm25 + 0.10 * breakdown.position_bonus - 1e-6);
}

#[test]
fn pagination_slices_the_ranked_results() {
    let tmp = tempfile::tempdir().unwrap();
    let docs = tmp.path().join("docs");
    std::fs::create_dir_all(&docs).unwrap();
    for i in 0..5 {
        std::fs::write(
            docs.join(format!("doc{i}.txt")),
            format!("shared sentinel phrase with unique marker number{i}"),
        )
        .unwrap();
    }

    let engine = Engine::open(test_config(tmp.path())).unwrap();
    engine
        .indexer()
        .run_complete_index(&[docs.to_string_lossy().to_string()], 100)
        .unwrap();
    let api = engine.search_api();
    let opts = SearchOptions::default();

    let page1 = api.run("shared sentinel phrase", None, 1, 2, &opts);
    assert_eq!(page1.total_hits, 5);
    assert_eq!(page1.total_pages, 3);
    assert_eq!(page1.items.len(), 2);
    assert!(page1.has_next);
    assert!(!page1.has_prev);

    let page3 = api.run("shared sentinel phrase", None, 3, 2, &opts);
    assert_eq!(page3.items.len(), 1);
    assert!(!page3.has_next);
    assert!(page3.has_prev);

    // Pages tile the ranked list without overlap.
    let page2 = api.run("shared sentinel phrase", None, 2, 2, &opts);
    let mut seen: Vec<String> = page1
        .items
        .iter()
        .chain(page2.items.iter())
        .chain(page3.items.iter())
        .map(|h| h.chunk_id.clone())
        .collect();
    seen.sort();
    seen.dedup();
    assert_eq!(seen.len(), 5);
}

#[test]
fn identical_queries_hit_the_cache() {
    let tmp = tempfile::tempdir().unwrap();
    let docs = tmp.path().join("docs");
    seed_corpus(&docs);

    let engine = Engine::open(test_config(tmp.path())).unwrap();
    engine
        .indexer()
        .run_complete_index(&[docs.to_string_lossy().to_string()], 100)
        .unwrap();
    let api = engine.search_api();
    let opts = SearchOptions::default();

    let first = api.run("capital city", Some(5), 1, 5, &opts);
    assert!(!first.cache_hit);
    let second = api.run("capital city", Some(5), 1, 5, &opts);
    assert!(second.cache_hit);
    assert_eq!(first.items, second.items);
    assert_eq!(first.total_hits, second.total_hits);

    // A different page is a different cache entry.
    let other = api.run("capital city", Some(5), 2, 5, &opts);
    assert!(!other.cache_hit);
}

#[test]
fn dedupe_respects_the_per_file_override() {
    let tmp = tempfile::tempdir().unwrap();
    let docs = tmp.path().join("docs");
    std::fs::create_dir_all(&docs).unwrap();
    // Small windows force several chunks per file, all matching the query.
    let body = (0..8)
        .map(|i| format!("sentinel keyword appears here in section {i} with filler words"))
        .collect::<Vec<_>>()
        .join(" ");
    std::fs::write(docs.join("big.txt"), body).unwrap();

    let mut config = test_config(tmp.path());
    config.index.max_tokens = 16;
    config.index.overlap = 2;
    let engine = Engine::open(config).unwrap();
    engine
        .indexer()
        .run_complete_index(&[docs.to_string_lossy().to_string()], 100)
        .unwrap();
    let api = engine.search_api();

    let single = api.run("sentinel keyword", None, 1, 10, &SearchOptions::default());
    assert_eq!(single.total_hits, 1);

    let mut opts = SearchOptions::default();
    opts.max_results_per_file = 3;
    let triple = api.run("sentinel keyword", None, 1, 10, &opts);
    assert_eq!(triple.total_hits, 3);
}

#[test]
fn changed_file_replaces_its_old_records() {
    let tmp = tempfile::tempdir().unwrap();
    let docs = tmp.path().join("docs");
    std::fs::create_dir_all(&docs).unwrap();
    let target = docs.join("note.txt");
    std::fs::write(&target, "first revision about volcanoes").unwrap();
    let roots = vec![docs.to_string_lossy().to_string()];

    let stack = Stack::open(tmp.path());
    let indexer = stack.indexer();
    indexer.run_complete_index(&roots, 100).unwrap();
    assert_eq!(stack.catalog.counts().unwrap().0, 1);

    // Different length changes size, which changes the file id.
    std::fs::write(&target, "second revision about glaciers and ice sheets").unwrap();
    let stats = indexer.run_complete_index(&roots, 100).unwrap();
    assert_eq!(stats.files_processed, 1);

    // Exactly one file row survives and the old text is gone everywhere.
    let files = stack.catalog.all_files().unwrap();
    assert_eq!(files.len(), 1);
    assert!(stack.catalog.fts_search("volcanoes", 10).is_empty());
    assert_eq!(stack.vectors.count() as i64, stack.catalog.counts().unwrap().1);

    let hits = stack.catalog.fts_search("glaciers", 10);
    assert_eq!(hits.len(), 1);
}

#[test]
fn sweep_purges_files_removed_from_disk() {
    let tmp = tempfile::tempdir().unwrap();
    let docs = tmp.path().join("docs");
    seed_corpus(&docs);
    let roots = vec![docs.to_string_lossy().to_string()];

    let stack = Stack::open(tmp.path());
    let indexer = stack.indexer();
    indexer.run_complete_index(&roots, 100).unwrap();

    std::fs::remove_file(docs.join("lorem.txt")).unwrap();
    let report = indexer.sweep().unwrap();
    assert_eq!(report.files_removed, 1);
    assert!(report.chunks_removed >= 1);
    assert_eq!(report.chunks_removed, report.vectors_removed);

    let (files, chunks, fts) = stack.catalog.counts().unwrap();
    assert_eq!(files, 2);
    assert_eq!(chunks, fts);
    assert!(stack.retriever().search("lorem ipsum", 10, std::time::Duration::from_secs(2), 1)
        .unwrap()
        .iter()
        .all(|c| !c.path.ends_with("lorem.txt")));
}

#[test]
fn engine_reset_clears_all_stores() {
    let tmp = tempfile::tempdir().unwrap();
    let docs = tmp.path().join("docs");
    seed_corpus(&docs);

    let engine = Engine::open(test_config(tmp.path())).unwrap();
    engine
        .indexer()
        .run_complete_index(&[docs.to_string_lossy().to_string()], 100)
        .unwrap();
    assert!(engine.status().unwrap().files > 0);

    engine.reset().unwrap();
    let status = engine.status().unwrap();
    assert_eq!(status.files, 0);
    assert_eq!(status.chunks, 0);
    assert_eq!(status.vectors, 0);
    assert_eq!(status.frontier_queue, 0);
}

#[test]
fn interrupted_crawl_resumes_from_the_checkpoint() {
    let tmp = tempfile::tempdir().unwrap();
    let docs = tmp.path().join("docs");
    seed_corpus(&docs);
    let roots = vec![docs.to_string_lossy().to_string()];

    let stack = Stack::open(tmp.path());
    let indexer = stack.indexer();

    // One-item slices: the first visits the directory only.
    let slice1 = indexer.run_bfs_slice(&roots, 1).unwrap();
    assert_eq!(slice1.files_processed, 0);
    assert_eq!(slice1.dirs_processed, 1);

    let mut total_files = 0;
    for _ in 0..10 {
        let slice = indexer.run_bfs_slice(&roots, 1).unwrap();
        total_files += slice.files_processed;
    }
    assert_eq!(total_files, 3);
    assert_eq!(stack.catalog.counts().unwrap().0, 3);
}
