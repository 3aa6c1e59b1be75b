//! `findex`, local hybrid document search.
//!
//! Commands: `bfs-index` crawls and indexes filesystem roots, `find` runs a
//! hybrid query, `status` reports store health, `reset-db` clears every
//! indexed artifact, `sweep` purges files that vanished from disk, `bench`
//! appends query timings to the benchmark CSV.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use doc_model::SearchOptions;
use search_service::bench::SearchBenchmark;
use search_service::config::Config;
use search_service::Engine;

#[derive(Parser)]
#[command(name = "findex", version, about = "Local hybrid document search engine")]
struct Cli {
    /// YAML config file; built-in defaults apply when it does not exist.
    #[arg(long, global = true, default_value = "config.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Index files under the given roots with the BFS streaming indexer.
    #[command(name = "bfs-index")]
    BfsIndex {
        /// Filesystem roots to crawl.
        #[arg(required = true)]
        paths: Vec<String>,
        /// Frontier entries processed per slice.
        #[arg(long, default_value_t = 1000)]
        max_items: usize,
        /// Tokens per chunk window.
        #[arg(long, default_value_t = 1200)]
        max_tokens: usize,
        /// Token overlap between consecutive windows.
        #[arg(long, default_value_t = 80)]
        overlap: usize,
        /// Enable OCR-capable extraction.
        #[arg(long)]
        ocr: bool,
        /// PDF pages read before the rest is ignored.
        #[arg(long, default_value_t = 50)]
        max_pdf_pages: usize,
        /// Comma-separated list of allowed extensions (e.g. `.txt,.md`).
        #[arg(long)]
        allow: Option<String>,
    },

    /// Search indexed content with hybrid retrieval.
    Find {
        query: String,
        /// Ranked results kept before pagination.
        #[arg(long)]
        max_results: Option<usize>,
        #[arg(long, default_value_t = 1)]
        page: usize,
        #[arg(long, default_value_t = 10)]
        per_page: usize,
        /// Print snippet context under each hit.
        #[arg(long)]
        show_context: bool,
        /// Recognized; matching is currently always case-insensitive.
        #[arg(long)]
        case_sensitive: bool,
        /// Exact-match mode (disables highlighting in snippets).
        #[arg(long)]
        exact: bool,
    },

    /// Report catalog, vector store and frontier state.
    Status {
        /// Emit the report as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Clear all indexed data (catalog, vectors, frontier).
    #[command(name = "reset-db")]
    ResetDb,

    /// Purge index entries of files that no longer exist on disk.
    Sweep,

    /// Run queries through the search pipeline and log timings to
    /// `store/runs/search_bench.csv`.
    Bench {
        #[arg(required = true)]
        queries: Vec<String>,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::from(2)
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = Config::load(Some(&cli.config)).context("loading configuration")?;

    match cli.command {
        Command::BfsIndex { paths, max_items, max_tokens, overlap, ocr, max_pdf_pages, allow } => {
            config.index.max_tokens = max_tokens;
            config.index.overlap = overlap;
            config.index.ocr_enabled = config.index.ocr_enabled || ocr;
            config.index.max_pdf_pages = max_pdf_pages;
            if let Some(allow) = allow {
                config.index.allow_exts = allow
                    .split(',')
                    .map(|e| {
                        let e = e.trim().to_lowercase();
                        if e.starts_with('.') {
                            e
                        } else {
                            format!(".{e}")
                        }
                    })
                    .filter(|e| e.len() > 1)
                    .collect();
            }

            let roots: Vec<String> = paths
                .iter()
                .map(|p| {
                    std::fs::canonicalize(p)
                        .map(|abs| abs.to_string_lossy().to_string())
                        .with_context(|| format!("root `{p}` is not accessible"))
                })
                .collect::<Result<_, _>>()?;

            let engine = Engine::open(config)?;
            let stats = engine.indexer().run_complete_index(&roots, max_items)?;

            println!("BFS indexing complete");
            println!("  files processed: {}", stats.files_processed);
            println!("  chunks created:  {}", stats.chunks_created);
            println!("  files skipped:   {}", stats.files_skipped);
            println!("  errors:          {}", stats.errors);
            println!("  duration:        {:.2}s", stats.duration_seconds);
            if stats.duration_seconds > 0.0 {
                println!(
                    "  rate:            {:.1} files/sec",
                    stats.files_processed as f64 / stats.duration_seconds
                );
            }
        }

        Command::Find {
            query,
            max_results,
            page,
            per_page,
            show_context,
            case_sensitive,
            exact,
        } => {
            let engine = Engine::open(config)?;
            let api = engine.search_api();
            let opts = SearchOptions {
                exact_match: exact,
                case_sensitive,
                ..SearchOptions::default()
            };
            let response = api.run(&query, max_results, page, per_page, &opts);
            if let Some(error) = response.error {
                bail!("search failed: {error}");
            }

            println!(
                "{} results for \"{}\" (page {}/{}, {:.3}s{})",
                response.total_hits,
                response.query,
                response.page,
                response.total_pages.max(1),
                response.search_time,
                if response.cache_hit { ", cached" } else { "" }
            );
            if response.items.is_empty() {
                println!("no results; run `findex bfs-index <path>` to index documents first");
                return Ok(());
            }
            for (rank, hit) in response.items.iter().enumerate() {
                let n = (response.page - 1) * response.per_page + rank + 1;
                println!("\n{n}. {} [{}]", hit.path, hit.file_type);
                println!(
                    "   score {:.3} (cos {:.2}, bm25 {:.2}, exact {:.2}, pos {:.2})",
                    hit.score,
                    hit.score_breakdown.cosine,
                    hit.score_breakdown.bm25,
                    hit.score_breakdown.exact,
                    hit.score_breakdown.position_bonus
                );
                if show_context && !hit.snippet.is_empty() {
                    println!("   {}", hit.snippet);
                }
            }
        }

        Command::Status { json } => {
            let engine = Engine::open(config)?;
            let status = engine.status()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                println!("store:           {}", status.store_path);
                println!("files indexed:   {}", status.files);
                println!("chunks:          {}", status.chunks);
                println!("fts entries:     {}", status.fts_entries);
                println!("vectors:         {}", status.vectors);
                println!("frontier queue:  {}", status.frontier_queue);
                println!("processed:       {} files, {} dirs", status.processed_files, status.processed_dirs);
                println!("crawl errors:    {}", status.frontier_errors);
                if status.files == 0 {
                    println!("\nrun `findex bfs-index <path>` to start indexing");
                }
            }
        }

        Command::ResetDb => {
            let engine = Engine::open(config)?;
            engine.reset()?;
            println!("store reset; all indexed data cleared");
        }

        Command::Sweep => {
            let engine = Engine::open(config)?;
            let report = engine.indexer().sweep()?;
            println!(
                "sweep removed {} files, {} chunks, {} vectors",
                report.files_removed, report.chunks_removed, report.vectors_removed
            );
        }

        Command::Bench { queries } => {
            let benchmarks_dir = config.paths.benchmarks_dir();
            let engine = Engine::open(config)?;
            let api = engine.search_api();
            let bench = SearchBenchmark::new(&api, &benchmarks_dir);
            let records = bench.run_search_bench(&queries)?;
            for record in &records {
                println!(
                    "{:<40} {:>5} hits  {:.3}s{}",
                    record.query,
                    record.total_hits,
                    record.search_time,
                    if record.cache_hit { "  (cache)" } else { "" }
                );
            }
        }
    }

    Ok(())
}
