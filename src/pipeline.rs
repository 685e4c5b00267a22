//! Per-entry orchestration of the resolve, extract and image stages.
//!
//! [`PipelineOrchestrator::run`] turns every [`ListingEntry`] into exactly one
//! [`ArticleRecord`], in input order. Entries are processed by a bounded pool
//! of concurrent workers; within one entry the stages run in sequence because
//! each feeds the next:
//!
//! 1. **Resolve** the redirect link (when `decode_urls` is set)
//! 2. **Extract** the article for the first `full_scrape_count` entries,
//!    falling back to the redirect link itself if resolution failed
//! 3. **Image**: carry or download the best image URL according to the
//!    configured [`ImageMode`]
//!
//! Stage failures become status fields and never abort the run. Once the
//! [`RunScope`] expires, entries that have not started come back with every
//! stage `NOT_ATTEMPTED`, and started entries skip their remaining stages.

use crate::config::{BreakerSettings, PipelineConfig};
use crate::extract::{ArticleExtractor, status_for};
use crate::http::{BinarySource, HttpFetcher, PageSource};
use crate::images::ImageAcquirer;
use crate::models::{
    ArticleRecord, DecodeStatus, ExtractStatus, ImageMode, ImageStatus, ListingEntry, RunSummary,
};
use crate::resilience::{BreakerRegistry, BreakerState, RunScope};
use crate::resolve::UrlResolver;
use crate::utils::{slugify_title, truncate_for_log};
use futures::stream::{self, StreamExt};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// The breaker maps for one run, one per stage.
///
/// Passed into every stage explicitly so separate runs in one process never
/// share breaker state.
#[derive(Debug, Clone)]
pub struct RunBreakers {
    /// Keyed by strategy name.
    pub resolve: Arc<BreakerRegistry>,
    /// Keyed by article host.
    pub extract: Arc<BreakerRegistry>,
    /// Keyed by image host.
    pub images: Arc<BreakerRegistry>,
}

impl RunBreakers {
    pub fn new(settings: &BreakerSettings) -> Self {
        Self {
            resolve: Arc::new(BreakerRegistry::new("resolve", settings.clone())),
            extract: Arc::new(BreakerRegistry::new("extract", settings.clone())),
            images: Arc::new(BreakerRegistry::new("images", settings.clone())),
        }
    }

    /// Log every breaker that is not closed.
    pub fn log_open(&self) {
        for registry in [&self.resolve, &self.extract, &self.images] {
            for (key, state) in registry.snapshot() {
                if state != BreakerState::Closed {
                    warn!(stage = registry.name(), %key, ?state, "Breaker not closed at end of run");
                }
            }
        }
    }
}

pub struct PipelineOrchestrator {
    config: PipelineConfig,
    resolver: UrlResolver,
    extractor: ArticleExtractor,
    images: ImageAcquirer,
}

impl PipelineOrchestrator {
    pub fn new(
        config: PipelineConfig,
        resolver: UrlResolver,
        extractor: ArticleExtractor,
        images: ImageAcquirer,
    ) -> Self {
        Self {
            config,
            resolver,
            extractor,
            images,
        }
    }

    /// Every stage over one shared HTTP fetcher.
    pub fn standard(config: PipelineConfig, fetcher: Arc<HttpFetcher>, breakers: &RunBreakers) -> Self {
        let resolver = UrlResolver::standard(Arc::clone(&fetcher), &config, Arc::clone(&breakers.resolve));
        let pages: Arc<dyn PageSource> = fetcher.clone();
        let extractor = ArticleExtractor::standard(pages, &config, Arc::clone(&breakers.extract));
        let binaries: Arc<dyn BinarySource> = fetcher;
        let images = ImageAcquirer::standard(binaries, &config, Arc::clone(&breakers.images));
        Self::new(config, resolver, extractor, images)
    }

    /// Build one record per entry, in input order.
    #[instrument(level = "info", skip_all, fields(entries = entries.len(), workers = self.config.worker_pool_size))]
    pub async fn run(&self, entries: Vec<ListingEntry>, scope: &RunScope) -> Vec<ArticleRecord> {
        let workers = self.config.worker_pool_size.max(1);

        let mut ranked: Vec<(usize, ArticleRecord)> = stream::iter(entries.into_iter().enumerate())
            .map(|(rank, entry)| async move { (rank, self.process(rank, entry, scope).await) })
            .buffer_unordered(workers)
            .collect()
            .await;
        ranked.sort_by_key(|(rank, _)| *rank);
        let records: Vec<ArticleRecord> = ranked.into_iter().map(|(_, record)| record).collect();

        let summary = RunSummary::from_records(&records);
        info!(
            total = summary.total,
            decoded = summary.decoded,
            extracted = summary.extracted,
            partial = summary.extracted_partial,
            extract_failed = summary.extract_failed,
            images = summary.images,
            "Pipeline run finished"
        );
        records
    }

    #[instrument(
        level = "info",
        skip_all,
        fields(rank = rank, seq = entry.sequence_number, title = %truncate_for_log(&entry.title, 60))
    )]
    async fn process(&self, rank: usize, entry: ListingEntry, scope: &RunScope) -> ArticleRecord {
        let mut record = ArticleRecord::from_entry(entry);
        if scope.is_expired() {
            debug!("Run scope expired before entry started");
            return record;
        }

        if self.config.decode_urls {
            self.resolve_stage(&mut record, scope).await;
        }

        if rank < self.config.full_scrape_count {
            if scope.is_expired() {
                return record;
            }
            self.extract_stage(&mut record, scope).await;
        }

        if self.config.image_mode != ImageMode::Disabled {
            if scope.is_expired() {
                return record;
            }
            self.image_stage(&mut record, scope).await;
        }

        record
    }

    async fn resolve_stage(&self, record: &mut ArticleRecord, scope: &RunScope) {
        match self.resolver.resolve(&record.entry.redirect_link, scope).await {
            Ok(resolution) => {
                record.decoded_url = Some(resolution.canonical_url);
                record.decode_method = Some(resolution.method);
                record.decode_status = DecodeStatus::Succeeded;
            }
            Err(e) => {
                warn!(error = %e, "Could not resolve redirect link");
                record.decode_status = DecodeStatus::Failed;
            }
        }
    }

    async fn extract_stage(&self, record: &mut ArticleRecord, scope: &RunScope) {
        let target = match &record.decoded_url {
            Some(url) => url.clone(),
            None if self.config.extract_from_redirect_link => {
                debug!("Extracting from the redirect link directly");
                record.entry.redirect_link.clone()
            }
            None => return,
        };

        match self.extractor.extract(&target, scope).await {
            Ok(content) => {
                record.extract_status = status_for(&content);
                record.full_content = Some(content);
            }
            Err(e) => {
                warn!(error = %e, "Article extraction failed");
                record.extract_status = ExtractStatus::Failed;
            }
        }
    }

    async fn image_stage(&self, record: &mut ArticleRecord, scope: &RunScope) {
        let candidate = record
            .full_content
            .as_ref()
            .and_then(|c| c.top_image_url.clone())
            .or_else(|| record.entry.favicon_url.clone());
        let Some(image_url) = candidate else {
            debug!("No image URL available");
            record.image_status = ImageStatus::Failed;
            return;
        };

        match self.config.image_mode {
            ImageMode::Disabled => {}
            ImageMode::UrlOnly => {
                record.image_url = Some(image_url);
                record.image_path = None;
                record.image_status = ImageStatus::Succeeded;
            }
            ImageMode::Download | ImageMode::Both => {
                let stem = image_stem(record);
                match self
                    .images
                    .acquire(&image_url, &self.image_dir(), &stem, scope)
                    .await
                {
                    Ok(path) => {
                        record.image_path = Some(path.to_string_lossy().into_owned());
                        record.image_url = match self.config.image_mode {
                            ImageMode::Both => Some(image_url),
                            _ => None,
                        };
                        record.image_status = ImageStatus::Succeeded;
                    }
                    Err(e) => {
                        warn!(error = %e, url = %image_url, "Image download failed");
                        record.image_url = Some(image_url);
                        record.image_status = ImageStatus::Failed;
                    }
                }
            }
        }
    }

    fn image_dir(&self) -> PathBuf {
        self.config.output_dir.join("images")
    }
}

/// `<title-slug>_<sequence>`, stable across reruns.
pub fn image_stem(record: &ArticleRecord) -> String {
    format!(
        "{}_{:03}",
        slugify_title(&record.entry.title, 50),
        record.entry.sequence_number
    )
}
