//! Redirect-link resolution.
//!
//! A search-result link points at the search engine's redirect service, not
//! at the article. [`UrlResolver`] turns it into the canonical article URL by
//! walking an ordered chain of [`ResolveStrategy`] implementations:
//!
//! | Order | Strategy | Module | Notes |
//! |-------|----------|--------|-------|
//! | 1 | Batch decoder | [`batch`] | Asks the redirect service itself; fastest when it works |
//! | 2 | Custom resolver | [`custom`] | Decodes the link locally, no network |
//! | 3 | Browser | [`browser`] | Navigates the link and watches where it lands |
//!
//! Each strategy runs behind its own circuit breaker (keyed by strategy
//! name, since these are fixed upstream services) and the network retry
//! policy. The first strategy to produce a valid, different URL wins.

pub mod batch;
pub mod browser;
pub mod custom;

use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result, Stage};
use crate::http::HttpFetcher;
use crate::models::ResolveMethod;
use crate::resilience::{BreakerRegistry, RetryPolicy, RunScope, guarded};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::{STANDARD_NO_PAD, URL_SAFE_NO_PAD};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use url::Url;

/// One way of turning a redirect link into the article URL.
#[async_trait]
pub trait ResolveStrategy: Send + Sync {
    fn method(&self) -> ResolveMethod;

    async fn attempt(&self, redirect_link: &str) -> Result<String>;
}

/// A successful resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub canonical_url: String,
    pub method: ResolveMethod,
}

pub struct UrlResolver {
    strategies: Vec<Arc<dyn ResolveStrategy>>,
    breakers: Arc<BreakerRegistry>,
    policy: RetryPolicy,
}

impl UrlResolver {
    pub fn new(
        strategies: Vec<Arc<dyn ResolveStrategy>>,
        breakers: Arc<BreakerRegistry>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            strategies,
            breakers,
            policy,
        }
    }

    /// The standard three-strategy chain over real HTTP.
    pub fn standard(
        fetcher: Arc<HttpFetcher>,
        config: &PipelineConfig,
        breakers: Arc<BreakerRegistry>,
    ) -> Self {
        let strategies: Vec<Arc<dyn ResolveStrategy>> = vec![
            Arc::new(batch::BatchDecoder::new(
                Arc::clone(&fetcher),
                &config.decoder.base_url,
            )),
            Arc::new(custom::CustomResolver),
            Arc::new(browser::BrowserResolver::new(Arc::new(
                browser::RedirectNavigator::new(fetcher),
            ))),
        ];
        Self::new(strategies, breakers, RetryPolicy::network(&config.retry))
    }

    /// Resolve `redirect_link`, trying each strategy in order.
    ///
    /// Once `scope` expires no further strategy is started.
    #[instrument(level = "info", skip_all, fields(link = %crate::utils::truncate_for_log(redirect_link, 120)))]
    pub async fn resolve(&self, redirect_link: &str, scope: &RunScope) -> Result<Resolution> {
        let mut last = String::from("no strategies configured");

        for strategy in &self.strategies {
            if scope.is_expired() {
                last = PipelineError::Cancelled.to_string();
                break;
            }
            let method = strategy.method();
            let breaker = self.breakers.get(method.as_str());

            let outcome = guarded(&breaker, &self.policy, scope, || {
                let strategy = Arc::clone(strategy);
                async move {
                    let candidate = strategy.attempt(redirect_link).await?;
                    validate_resolved(redirect_link, &candidate)
                }
            })
            .await;

            match outcome {
                Ok(canonical_url) => {
                    info!(method = %method, url = %canonical_url, "Resolved redirect link");
                    return Ok(Resolution {
                        canonical_url,
                        method,
                    });
                }
                Err(e) => {
                    warn!(method = %method, error = %e, "Resolution strategy failed");
                    last = format!("{method}: {e}");
                }
            }
        }

        Err(PipelineError::AllStrategiesExhausted {
            stage: Stage::Resolve,
            last,
        })
    }
}

/// A resolved URL must be absolute http(s) and actually differ from the link.
pub fn validate_resolved(redirect_link: &str, candidate: &str) -> Result<String> {
    let candidate = candidate.trim();
    let parsed = Url::parse(candidate)
        .map_err(|e| PipelineError::MalformedInput(format!("resolved url {candidate:?}: {e}")))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(PipelineError::MalformedInput(format!(
            "resolved url has scheme {}",
            parsed.scheme()
        )));
    }
    if candidate == redirect_link {
        return Err(PipelineError::MalformedInput(
            "resolved url is the redirect link itself".into(),
        ));
    }
    Ok(parsed.to_string())
}

/// Hosts that belong to the redirect service rather than to a publisher.
pub fn is_redirect_service_host(host: &str) -> bool {
    host.starts_with("news.google.") || host.starts_with("consent.google.")
}

/// The encoded article id from `/articles/<id>`, `/rss/articles/<id>` or
/// `/read/<id>` paths.
pub fn article_id(link: &Url) -> Option<String> {
    let segments: Vec<&str> = link.path_segments()?.filter(|s| !s.is_empty()).collect();
    match segments.as_slice() {
        [.., kind, id] if matches!(*kind, "articles" | "read") => Some((*id).to_string()),
        _ => None,
    }
}

/// Decode a base64 article id, tolerating missing padding and either alphabet.
pub fn decode_article_id(id: &str) -> Option<Vec<u8>> {
    let trimmed = id.trim_end_matches('=');
    URL_SAFE_NO_PAD
        .decode(trimmed)
        .or_else(|_| STANDARD_NO_PAD.decode(trimmed))
        .ok()
}


#[cfg(test)]
mod tests {
    use super::testing::FakeStrategy;
    use super::*;
    use crate::config::BreakerSettings;
    use crate::resilience::BreakerState;
    use std::time::Duration;

    const LINK: &str = "https://news.google.com/rss/articles/CBMiabc?oc=5";

    fn policy() -> RetryPolicy {
        RetryPolicy::new(
            "test",
            2,
            Duration::ZERO,
            Duration::ZERO,
            0.0,
            PipelineError::is_retryable,
        )
    }

    fn registry(threshold: u32) -> Arc<BreakerRegistry> {
        Arc::new(BreakerRegistry::new(
            "resolve",
            BreakerSettings {
                failure_threshold: threshold,
                recovery_timeout: Duration::from_secs(300),
            },
        ))
    }

    #[tokio::test]
    async fn test_primary_server_error_falls_back_to_custom() {
        let primary = FakeStrategy::new(ResolveMethod::BatchDecoder, |_| {
            Err(PipelineError::Network("HTTP 500 from decoder".into()))
        });
        let custom = FakeStrategy::new(ResolveMethod::CustomResolver, |_| {
            Ok("https://www.example.com/story".to_string())
        });
        let browser = FakeStrategy::new(ResolveMethod::Browser, |_| {
            Ok("https://unused.example.com".to_string())
        });
        let chain: Vec<Arc<dyn ResolveStrategy>> =
            vec![primary.clone(), custom.clone(), browser.clone()];
        let resolver = UrlResolver::new(chain, registry(5), policy());

        let resolution = resolver.resolve(LINK, &RunScope::unbounded()).await.unwrap();
        assert_eq!(resolution.canonical_url, "https://www.example.com/story");
        assert_eq!(resolution.method, ResolveMethod::CustomResolver);
        assert_eq!(primary.calls(), 3);
        assert_eq!(custom.calls(), 1);
        assert_eq!(browser.calls(), 0);
    }

    #[tokio::test]
    async fn test_open_breaker_skips_strategy() {
        let primary = FakeStrategy::new(ResolveMethod::BatchDecoder, |_| {
            Err(PipelineError::Network("reset".into()))
        });
        let custom = FakeStrategy::new(ResolveMethod::CustomResolver, |_| {
            Ok("https://www.example.com/story".to_string())
        });
        let breakers = registry(1);
        let chain: Vec<Arc<dyn ResolveStrategy>> = vec![primary.clone(), custom.clone()];
        let resolver = UrlResolver::new(chain, Arc::clone(&breakers), policy());

        resolver.resolve(LINK, &RunScope::unbounded()).await.unwrap();
        assert_eq!(breakers.get("batch-decoder").state(), BreakerState::Open);

        resolver.resolve(LINK, &RunScope::unbounded()).await.unwrap();
        // Second run never reached the decoder.
        assert_eq!(primary.calls(), 3);
        assert_eq!(custom.calls(), 2);
    }

    #[tokio::test]
    async fn test_all_strategies_fail() {
        let a = FakeStrategy::new(ResolveMethod::BatchDecoder, |_| {
            Err(PipelineError::Parse("no signature".into()))
        });
        let b = FakeStrategy::new(ResolveMethod::CustomResolver, |_| {
            Err(PipelineError::MalformedInput("new-style id".into()))
        });
        let c = FakeStrategy::new(ResolveMethod::Browser, |link| Ok(link.to_string()));
        let chain: Vec<Arc<dyn ResolveStrategy>> = vec![a, b, c];
        let resolver = UrlResolver::new(chain, registry(5), policy());

        let err = resolver.resolve(LINK, &RunScope::unbounded()).await.unwrap_err();
        match err {
            PipelineError::AllStrategiesExhausted { stage, last } => {
                assert_eq!(stage, Stage::Resolve);
                assert!(last.starts_with("browser"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_expired_scope_starts_nothing() {
        let a = FakeStrategy::new(ResolveMethod::BatchDecoder, |_| {
            Ok("https://www.example.com/story".to_string())
        });
        let chain: Vec<Arc<dyn ResolveStrategy>> = vec![a.clone()];
        let resolver = UrlResolver::new(chain, registry(5), policy());
        let scope = RunScope::unbounded();
        scope.cancel();
        assert!(resolver.resolve(LINK, &scope).await.is_err());
        assert_eq!(a.calls(), 0);
    }

    #[test]
    fn test_validate_resolved() {
        assert!(validate_resolved(LINK, "https://www.example.com/a").is_ok());
        assert!(validate_resolved(LINK, LINK).is_err());
        assert!(validate_resolved(LINK, "javascript:alert(1)").is_err());
        assert!(validate_resolved(LINK, "/relative/path").is_err());
    }

    #[test]
    fn test_article_id_paths() {
        let rss = Url::parse("https://news.google.com/rss/articles/CBMiabc?oc=5").unwrap();
        assert_eq!(article_id(&rss).as_deref(), Some("CBMiabc"));
        let read = Url::parse("https://news.google.com/read/CBMixyz?hl=en-US").unwrap();
        assert_eq!(article_id(&read).as_deref(), Some("CBMixyz"));
        let other = Url::parse("https://www.example.com/news/today").unwrap();
        assert_eq!(article_id(&other), None);
    }
}
