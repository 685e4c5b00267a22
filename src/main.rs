//! # News Pipeline
//!
//! Turns news search-result listings into best-effort article records. Each
//! listing's redirect link is resolved to the real article URL, the leading
//! articles are fetched and extracted, and a representative image is carried
//! along or downloaded.
//!
//! ## Features
//!
//! - Three-strategy URL resolution (batch decoder, local decoding, redirect
//!   following) with per-strategy circuit breakers
//! - Three-strategy article extraction (structured metadata, readability
//!   scoring, boilerplate stripping) with text cleaning and block detection
//! - Image download with content validation
//! - Retries with exponential backoff and jitter on every network call
//! - JSON, CSV, Markdown and plain-text outputs
//!
//! ## Usage
//!
//! ```sh
//! news_pipeline -i listing.json -o ./data --image-mode download
//! ```
//!
//! ## Architecture
//!
//! The application follows a pipeline architecture:
//! 1. **Resolving**: Decode each redirect link to its canonical URL
//! 2. **Extracting**: Fetch and extract the first `full_scrape_count` articles
//! 3. **Images**: Carry or download each record's best image
//! 4. **Output**: Write JSON, CSV, Markdown and article text files
//!
//! Entries run concurrently on a bounded worker pool; stages within one entry
//! run in order. No stage failure aborts the run.

use clap::Parser;
use std::error::Error;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod cli;
mod config;
mod error;
mod extract;
mod http;
mod images;
mod models;
mod outputs;
mod pipeline;
mod resilience;
mod resolve;
mod utils;

use cli::{Cli, OutputFormat};
use config::PipelineConfig;
use http::HttpFetcher;
use models::{ListingEntry, RunSummary};
use outputs::{articles, csv, json, markdown};
use pipeline::{PipelineOrchestrator, RunBreakers};
use resilience::RunScope;
use utils::ensure_writable_dir;

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("news_pipeline starting up");

    // Parse CLI
    let args = Cli::parse();
    debug!(?args.input, ?args.output_dir, ?args.config, ?args.format, "Parsed CLI arguments");

    // ---- Load config ----
    let mut config = match &args.config {
        Some(path) => PipelineConfig::load(path).await?,
        None => PipelineConfig::default(),
    };
    args.apply_overrides(&mut config);
    config.validate()?;
    info!(
        full_scrape_count = config.full_scrape_count,
        image_mode = ?config.image_mode,
        decode_urls = config.decode_urls,
        workers = config.worker_pool_size,
        deadline = ?config.run_deadline,
        "Configuration ready"
    );

    // Early check: ensure output dir is writable
    if let Err(e) = ensure_writable_dir(&config.output_dir).await {
        error!(
            path = %config.output_dir.display(),
            error = %e,
            "Output directory is not writable (fix perms or choose a different path)"
        );
        return Err(e.into());
    }

    let entries = ListingEntry::load_all(&args.input).await?;
    info!(count = entries.len(), path = %args.input.display(), "Loaded listing entries");

    // ---- Run scope: deadline plus Ctrl-C ----
    let scope = RunScope::new(config.run_deadline);
    let token = scope.token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received; no new work will be started");
            token.cancel();
        }
    });

    // ---- Build and run the pipeline ----
    let fetcher = Arc::new(
        HttpFetcher::new(config.request_delay, config.request_timeout)?.with_scope(scope.clone()),
    );
    let breakers = RunBreakers::new(&config.breaker);
    let output_dir = config.output_dir.clone();
    let pipeline = PipelineOrchestrator::standard(config, fetcher, &breakers);

    let records = pipeline.run(entries, &scope).await;
    breakers.log_open();
    if scope.is_expired() {
        warn!("Run ended early; unstarted entries are marked NOT_ATTEMPTED");
    }

    // ---- Outputs ----
    if args.wants(OutputFormat::Json) {
        if let Err(e) = json::write_records(&records, &output_dir).await {
            error!(error = %e, "Failed to write JSON records");
        }
    }
    if args.wants(OutputFormat::Csv) {
        if let Err(e) = csv::write_records(&records, &output_dir).await {
            error!(error = %e, "Failed to write CSV records");
        }
    }
    if args.wants(OutputFormat::Markdown) {
        if let Err(e) = markdown::write_records(&records, &output_dir).await {
            error!(error = %e, "Failed to write Markdown records");
        }
    }
    if let Err(e) = articles::write_articles(&records, &output_dir).await {
        error!(error = %e, "Failed to write article text files");
    }

    // ---- Summary ----
    let summary = RunSummary::from_records(&records);
    info!(
        decoded = summary.decoded,
        decode_failed = summary.decode_failed,
        extracted = summary.extracted,
        partial = summary.extracted_partial,
        extract_failed = summary.extract_failed,
        images = summary.images,
        image_failed = summary.image_failed,
        "{}/{} articles fully scraped",
        summary.scraped(),
        summary.total
    );

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        "Execution complete"
    );

    Ok(())
}
