//! Navigation-based resolution, the last resort of the chain.
//!
//! [`BrowserResolver`] hands the redirect link to a [`Navigator`] and reports
//! wherever navigation settles. The default [`RedirectNavigator`] follows the
//! chain the way a browser would without running scripts:
//!
//! - HTTP 3xx `Location` headers, relative ones joined to the current URL
//! - `<meta http-equiv="refresh">` targets
//! - the `data-n-au` attribute the redirect service embeds for its own
//!   client-side jump
//!
//! On the landing page the `<link rel="canonical">` or `og:url` value wins
//! over the raw address, which strips tracking parameters.

use super::{ResolveStrategy, is_redirect_service_host};
use crate::error::{PipelineError, Result};
use crate::http::HttpFetcher;
use crate::models::ResolveMethod;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use std::sync::Arc;
use tracing::{debug, instrument};
use url::Url;

const MAX_HOPS: usize = 10;

static META_REFRESH: Lazy<Selector> =
    Lazy::new(|| Selector::parse("meta[http-equiv]").expect("static selector"));
static CLIENT_JUMP: Lazy<Selector> =
    Lazy::new(|| Selector::parse("[data-n-au]").expect("static selector"));
static CANONICAL: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"link[rel="canonical"]"#).expect("static selector"));
static OG_URL: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"meta[property="og:url"]"#).expect("static selector"));

/// Something that can load a URL and report where it ended up.
#[async_trait]
pub trait Navigator: Send + Sync {
    async fn navigate(&self, url: &str) -> Result<String>;
}

pub struct BrowserResolver {
    navigator: Arc<dyn Navigator>,
}

impl BrowserResolver {
    pub fn new(navigator: Arc<dyn Navigator>) -> Self {
        Self { navigator }
    }
}

#[async_trait]
impl ResolveStrategy for BrowserResolver {
    fn method(&self) -> ResolveMethod {
        ResolveMethod::Browser
    }

    #[instrument(level = "info", skip_all, fields(strategy = "browser"))]
    async fn attempt(&self, redirect_link: &str) -> Result<String> {
        let landed = self.navigator.navigate(redirect_link).await?;
        let host = Url::parse(&landed)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_default();
        if is_redirect_service_host(&host) {
            return Err(PipelineError::BlockedOrUnavailable(format!(
                "navigation stopped on {host}"
            )));
        }
        Ok(landed)
    }
}

/// Follows redirects and client-side jumps over plain HTTP.
pub struct RedirectNavigator {
    fetcher: Arc<HttpFetcher>,
    max_hops: usize,
}

impl RedirectNavigator {
    pub fn new(fetcher: Arc<HttpFetcher>) -> Self {
        Self {
            fetcher,
            max_hops: MAX_HOPS,
        }
    }
}

#[async_trait]
impl Navigator for RedirectNavigator {
    async fn navigate(&self, url: &str) -> Result<String> {
        let mut current = Url::parse(url)
            .map_err(|e| PipelineError::MalformedInput(format!("navigation start: {e}")))?;

        for hop_number in 0..self.max_hops {
            let hop = self.fetcher.hop(current.as_str()).await?;
            if let Some(location) = hop.location {
                current = join(&current, &location)?;
                debug!(hop = hop_number, url = %current, "Followed redirect");
                continue;
            }
            let body = hop.body.unwrap_or_default();
            match landing_hints(&body) {
                LandingHints {
                    next: Some(next), ..
                } => {
                    let next = join(&current, &next)?;
                    if next == current {
                        return Ok(current.into());
                    }
                    debug!(hop = hop_number, url = %next, "Followed client-side jump");
                    current = next;
                }
                LandingHints {
                    canonical: Some(canonical),
                    ..
                } => {
                    return Ok(join(&current, &canonical)
                        .map(String::from)
                        .unwrap_or_else(|_| current.into()));
                }
                _ => return Ok(current.into()),
            }
        }
        Err(PipelineError::BlockedOrUnavailable(format!(
            "more than {} hops",
            self.max_hops
        )))
    }
}

fn join(base: &Url, target: &str) -> Result<Url> {
    let joined = base
        .join(target.trim())
        .map_err(|e| PipelineError::Parse(format!("bad redirect target {target:?}: {e}")))?;
    if !matches!(joined.scheme(), "http" | "https") {
        return Err(PipelineError::Parse(format!(
            "redirect to unsupported scheme {}",
            joined.scheme()
        )));
    }
    Ok(joined)
}

#[derive(Debug, Default, PartialEq)]
struct LandingHints {
    /// Where the page would send a browser next.
    next: Option<String>,
    /// What the page says its own address is.
    canonical: Option<String>,
}

fn landing_hints(html: &str) -> LandingHints {
    let document = Html::parse_document(html);

    let refresh = document
        .select(&META_REFRESH)
        .filter(|el| {
            el.value()
                .attr("http-equiv")
                .is_some_and(|v| v.eq_ignore_ascii_case("refresh"))
        })
        .filter_map(|el| el.value().attr("content"))
        .find_map(refresh_target);
    let jump = document
        .select(&CLIENT_JUMP)
        .filter_map(|el| el.value().attr("data-n-au"))
        .map(str::to_string)
        .find(|s| !s.is_empty());

    let canonical = document
        .select(&CANONICAL)
        .filter_map(|el| el.value().attr("href"))
        .chain(
            document
                .select(&OG_URL)
                .filter_map(|el| el.value().attr("content")),
        )
        .map(str::to_string)
        .find(|s| !s.is_empty());

    LandingHints {
        next: jump.or(refresh),
        canonical,
    }
}

/// `"0; url=https://..."` -> `https://...`
fn refresh_target(content: &str) -> Option<String> {
    let lower = content.to_ascii_lowercase();
    let at = lower.find("url=")?;
    let target = content[at + 4..].trim().trim_matches(|c| c == '\'' || c == '"');
    (!target.is_empty()).then(|| target.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct FixedNavigator(&'static str);

    #[async_trait]
    impl Navigator for FixedNavigator {
        async fn navigate(&self, _url: &str) -> Result<String> {
            Ok(self.0.to_string())
        }
    }

    fn navigator() -> RedirectNavigator {
        RedirectNavigator::new(Arc::new(
            HttpFetcher::new(Duration::ZERO, Duration::from_secs(5)).unwrap(),
        ))
    }

    #[test]
    fn test_refresh_target() {
        assert_eq!(
            refresh_target("0; URL='https://www.example.com/a'").as_deref(),
            Some("https://www.example.com/a")
        );
        assert_eq!(refresh_target("5"), None);
    }

    #[test]
    fn test_landing_hints_prefer_client_jump() {
        let html = r#"<html><head>
            <meta http-equiv="refresh" content="0;url=/slow">
            <link rel="canonical" href="https://www.example.com/canon">
        </head><body><c-wiz data-n-au="https://www.example.com/fast"></c-wiz></body></html>"#;
        let hints = landing_hints(html);
        assert_eq!(hints.next.as_deref(), Some("https://www.example.com/fast"));
        assert_eq!(hints.canonical.as_deref(), Some("https://www.example.com/canon"));
    }

    #[tokio::test]
    async fn test_follows_redirects_to_canonical() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/read/abc"))
            .respond_with(ResponseTemplate::new(302).insert_header("Location", "/landing?utm=x"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/landing"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<html><head><link rel="canonical" href="/landing"></head></html>"#,
            ))
            .mount(&server)
            .await;

        let landed = navigator()
            .navigate(&format!("{}/read/abc", server.uri()))
            .await
            .unwrap();
        assert_eq!(landed, format!("{}/landing", server.uri()));
    }

    #[tokio::test]
    async fn test_follows_client_side_jump() {
        let server = MockServer::start().await;
        let target = format!("{}/story", server.uri());
        Mock::given(method("GET"))
            .and(path("/rss/articles/abc"))
            .respond_with(ResponseTemplate::new(200).set_body_string(format!(
                r#"<html><body><c-wiz data-n-au="{target}"></c-wiz></body></html>"#
            )))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/story"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html><p>story</p></html>"))
            .mount(&server)
            .await;

        let landed = navigator()
            .navigate(&format!("{}/rss/articles/abc", server.uri()))
            .await
            .unwrap();
        assert_eq!(landed, target);
    }

    #[tokio::test]
    async fn test_redirect_loop_is_bounded() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/loop"))
            .respond_with(ResponseTemplate::new(302).insert_header("Location", "/loop"))
            .mount(&server)
            .await;

        let err = navigator()
            .navigate(&format!("{}/loop", server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::BlockedOrUnavailable(_)));
    }

    #[tokio::test]
    async fn test_landing_on_redirect_service_is_a_failure() {
        let resolver = BrowserResolver::new(Arc::new(FixedNavigator(
            "https://news.google.com/rss/articles/abc",
        )));
        let err = resolver
            .attempt("https://news.google.com/rss/articles/abc")
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::BlockedOrUnavailable(_)));

        let resolver =
            BrowserResolver::new(Arc::new(FixedNavigator("https://www.example.com/story")));
        assert_eq!(
            resolver
                .attempt("https://news.google.com/rss/articles/abc")
                .await
                .unwrap(),
            "https://www.example.com/story"
        );
    }
}
