//! Full-article extraction.
//!
//! [`ArticleExtractor`] fetches the article page and runs an ordered chain of
//! [`ExtractStrategy`] implementations:
//!
//! | Order | Strategy | Module | Produces |
//! |-------|----------|--------|----------|
//! | 1 | Structured | [`structured`] | Text, authors, date, summary, keywords, top image |
//! | 2 | Readability | [`readability`] | Text, top image |
//! | 3 | Heuristic | [`heuristic`] | Text |
//!
//! Every candidate body goes through [`clean`] before it is accepted. A body
//! that carries a verification phrase is treated as a block, and one that is
//! too short after cleaning is rejected; either way the chain moves on.
//!
//! All strategies for one URL share a circuit breaker keyed by the target
//! host, so a publisher that keeps failing stops costing retries while other
//! publishers are unaffected.

pub mod clean;
pub mod heuristic;
pub mod readability;
pub mod structured;

use crate::config::{ExtractionSettings, PipelineConfig};
use crate::error::{PipelineError, Result, Stage};
use crate::http::PageSource;
use crate::models::{ExtractStatus, ExtractionMethod, FullContent};
use crate::resilience::{BreakerRegistry, RetryPolicy, RunScope, guarded};
use crate::utils::host_of;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// One way of pulling an article body out of a page.
#[async_trait]
pub trait ExtractStrategy: Send + Sync {
    fn method(&self) -> ExtractionMethod;

    /// Fetch `url` and return the uncleaned body plus whatever metadata this
    /// strategy knows how to find.
    async fn attempt(&self, url: &str) -> Result<FullContent>;
}

pub struct ArticleExtractor {
    strategies: Vec<Arc<dyn ExtractStrategy>>,
    breakers: Arc<BreakerRegistry>,
    policy: RetryPolicy,
    settings: ExtractionSettings,
}

impl ArticleExtractor {
    pub fn new(
        strategies: Vec<Arc<dyn ExtractStrategy>>,
        breakers: Arc<BreakerRegistry>,
        policy: RetryPolicy,
        settings: ExtractionSettings,
    ) -> Self {
        Self {
            strategies,
            breakers,
            policy,
            settings,
        }
    }

    /// Structured, readability and heuristic extraction over `pages`.
    pub fn standard(
        pages: Arc<dyn PageSource>,
        config: &PipelineConfig,
        breakers: Arc<BreakerRegistry>,
    ) -> Self {
        let strategies: Vec<Arc<dyn ExtractStrategy>> = vec![
            Arc::new(structured::StructuredExtractor::new(Arc::clone(&pages))),
            Arc::new(readability::ReadabilityExtractor::new(Arc::clone(&pages))),
            Arc::new(heuristic::HeuristicExtractor::new(pages)),
        ];
        Self::new(
            strategies,
            breakers,
            RetryPolicy::network(&config.retry),
            config.extraction.clone(),
        )
    }

    /// Extract the article at `url`.
    ///
    /// Once `scope` expires no further strategy is started.
    #[instrument(level = "info", skip_all, fields(%url))]
    pub async fn extract(&self, url: &str, scope: &RunScope) -> Result<FullContent> {
        let host = host_of(url).unwrap_or_else(|| url.to_string());
        let breaker = self.breakers.get(&host);
        let mut last = String::from("no strategies configured");

        for strategy in &self.strategies {
            if scope.is_expired() {
                last = PipelineError::Cancelled.to_string();
                break;
            }
            let method = strategy.method();
            let min_words = self.min_words(method);

            let outcome = guarded(&breaker, &self.policy, scope, || {
                let strategy = Arc::clone(strategy);
                async move {
                    let raw = strategy.attempt(url).await?;
                    accept(raw, min_words, self.settings.min_block_words)
                }
            })
            .await;

            match outcome {
                Ok(content) => {
                    info!(
                        method = %method,
                        words = clean::word_count(&content.text),
                        "Extracted article"
                    );
                    return Ok(content);
                }
                Err(e) => {
                    warn!(method = %method, %host, error = %e, "Extraction strategy failed");
                    last = format!("{method}: {e}");
                }
            }
        }

        Err(PipelineError::AllStrategiesExhausted {
            stage: Stage::Extract,
            last,
        })
    }

    fn min_words(&self, method: ExtractionMethod) -> usize {
        match method {
            ExtractionMethod::Fallback2 => self.settings.min_heuristic_words,
            ExtractionMethod::Primary | ExtractionMethod::Fallback1 => {
                self.settings.min_article_words
            }
        }
    }
}

/// Clean a strategy's body and decide whether it is an article at all.
pub fn accept(mut content: FullContent, min_words: usize, min_block_words: usize) -> Result<FullContent> {
    let cleaned = clean::clean_text(&content.text, min_block_words);
    if let Some(phrase) = clean::verification_phrase(&cleaned) {
        return Err(PipelineError::BlockedOrUnavailable(format!(
            "verification page ({phrase:?})"
        )));
    }
    let words = clean::word_count(&cleaned);
    if words < min_words {
        return Err(PipelineError::InvalidContent(format!(
            "{words} words after cleaning, need {min_words}"
        )));
    }
    content.text = cleaned;
    Ok(content)
}

/// `SUCCEEDED` only for a primary extraction with every derived field.
pub fn status_for(content: &FullContent) -> ExtractStatus {
    if content.extraction_method == ExtractionMethod::Primary && content.is_complete() {
        ExtractStatus::Succeeded
    } else {
        ExtractStatus::Partial
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Serves canned pages by URL and counts fetches.
    #[derive(Default)]
    pub struct StaticPages {
        pages: HashMap<String, Result<String>>,
        pub fetches: AtomicU32,
    }

    impl StaticPages {
        pub fn with_page(mut self, url: &str, html: &str) -> Self {
            self.pages.insert(url.to_string(), Ok(html.to_string()));
            self
        }

        pub fn with_error(mut self, url: &str, error: fn() -> PipelineError) -> Self {
            self.pages.insert(url.to_string(), Err(error()));
            self
        }

        pub fn fetches(&self) -> u32 {
            self.fetches.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PageSource for StaticPages {
        async fn fetch_page(&self, url: &str) -> Result<String> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            match self.pages.get(url) {
                Some(Ok(html)) => Ok(html.clone()),
                Some(Err(e)) => Err(match e {
                    PipelineError::Network(m) => PipelineError::Network(m.clone()),
                    other => PipelineError::BlockedOrUnavailable(other.to_string()),
                }),
                None => Err(PipelineError::BlockedOrUnavailable(format!("HTTP 404 from {url}"))),
            }
        }
    }

    /// A complete article page with `paragraphs` twelve-word paragraphs.
    pub fn article_html(paragraphs: usize) -> String {
        let body: String = (0..paragraphs)
            .map(|i| {
                format!(
                    "<p>Paragraph {i} reports that the regional council approved the budget, officials said.</p>"
                )
            })
            .collect();
        format!(
            r#"<html><head>
            <meta name="author" content="Jane Roe">
            <meta property="article:published_time" content="2025-05-06T10:00:00Z">
            <meta property="og:image" content="https://cdn.example.com/lead.jpg">
            </head><body><article>{body}</article></body></html>"#
        )
    }
}
