//! Shared HTTP plumbing for every network stage.
//!
//! [`HttpFetcher`] owns the `reqwest` clients and applies the same rules to
//! every outbound call:
//! - the configured inter-request delay before the call
//! - a rotating desktop user agent
//! - a per-call timeout (a hung call surfaces as [`PipelineError::Timeout`])
//! - status classification via [`PipelineError::from_status`]
//!
//! Stages depend on the narrow [`PageSource`] and [`BinarySource`] traits
//! rather than on the fetcher itself, so tests can swap in canned responses.

use crate::error::{PipelineError, Result};
use crate::resilience::RunScope;
use async_trait::async_trait;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, CONTENT_TYPE, LOCATION, REFERER, USER_AGENT};
use reqwest::{Client, StatusCode, redirect};
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{debug, instrument};

const USER_AGENTS: [&str; 5] = [
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:125.0) Gecko/20100101 Firefox/125.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36 Edg/124.0.0.0",
];

/// Fetches HTML pages.
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn fetch_page(&self, url: &str) -> Result<String>;
}

/// Raw bytes plus the declared content type.
#[derive(Debug, Clone)]
pub struct FetchedBytes {
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

/// Fetches binary payloads with a size ceiling.
#[async_trait]
pub trait BinarySource: Send + Sync {
    async fn fetch_bytes(&self, url: &str, max_bytes: u64) -> Result<FetchedBytes>;
}

/// One hop of a manually followed redirect chain.
#[derive(Debug, Clone)]
pub struct Hop {
    pub status: StatusCode,
    pub location: Option<String>,
    /// Body of non-redirect responses, for client-side navigation hints.
    pub body: Option<String>,
}

#[derive(Debug)]
pub struct HttpFetcher {
    client: Client,
    no_redirect: Client,
    request_delay: Duration,
    timeout: Duration,
    requests: AtomicUsize,
    scope: RunScope,
}

impl HttpFetcher {
    pub fn new(request_delay: Duration, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(timeout)
            .pool_max_idle_per_host(10)
            .build()
            .map_err(|e| PipelineError::MalformedInput(format!("http client: {e}")))?;
        let no_redirect = Client::builder()
            .connect_timeout(timeout)
            .redirect(redirect::Policy::none())
            .build()
            .map_err(|e| PipelineError::MalformedInput(format!("http client: {e}")))?;
        Ok(Self {
            client,
            no_redirect,
            request_delay,
            timeout,
            requests: AtomicUsize::new(0),
            scope: RunScope::unbounded(),
        })
    }

    /// Tie the inter-request delay to a run's deadline and cancellation.
    pub fn with_scope(mut self, scope: RunScope) -> Self {
        self.scope = scope;
        self
    }

    pub fn scope(&self) -> &RunScope {
        &self.scope
    }

    /// Pause, then pick the next user agent.
    ///
    /// A pause cut short by the run scope means the call never starts.
    async fn prepare(&self) -> Result<&'static str> {
        if !self.request_delay.is_zero() && !self.scope.sleep(self.request_delay).await {
            return Err(PipelineError::Cancelled);
        }
        let n = self.requests.fetch_add(1, Ordering::Relaxed);
        Ok(USER_AGENTS[n % USER_AGENTS.len()])
    }

    async fn with_timeout<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        tokio::time::timeout(self.timeout, fut)
            .await
            .map_err(|_| PipelineError::Timeout(self.timeout))?
    }

    /// POST a form-encoded body and return the response text.
    #[instrument(level = "debug", skip_all, fields(%url))]
    pub async fn post_form(&self, url: &str, body: String, referer: &str) -> Result<String> {
        let agent = self.prepare().await?;
        self.with_timeout(async {
            let response = self
                .client
                .post(url)
                .header(USER_AGENT, agent)
                .header(CONTENT_TYPE, "application/x-www-form-urlencoded;charset=UTF-8")
                .header(REFERER, referer)
                .body(body)
                .send()
                .await?;
            let status = response.status();
            if !status.is_success() {
                return Err(PipelineError::from_status(status, url));
            }
            Ok(response.text().await?)
        })
        .await
    }

    /// GET without following redirects.
    #[instrument(level = "debug", skip_all, fields(%url))]
    pub async fn hop(&self, url: &str) -> Result<Hop> {
        let agent = self.prepare().await?;
        self.with_timeout(async {
            let response = self
                .no_redirect
                .get(url)
                .header(USER_AGENT, agent)
                .header(ACCEPT, "text/html,application/xhtml+xml")
                .send()
                .await?;
            let status = response.status();
            if status.is_redirection() {
                let location = response
                    .headers()
                    .get(LOCATION)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string);
                return Ok(Hop {
                    status,
                    location,
                    body: None,
                });
            }
            if !status.is_success() {
                return Err(PipelineError::from_status(status, url));
            }
            Ok(Hop {
                status,
                location: None,
                body: Some(response.text().await?),
            })
        })
        .await
    }
}

#[async_trait]
impl PageSource for HttpFetcher {
    #[instrument(level = "debug", skip_all, fields(%url))]
    async fn fetch_page(&self, url: &str) -> Result<String> {
        let agent = self.prepare().await?;
        self.with_timeout(async {
            let response = self
                .client
                .get(url)
                .header(USER_AGENT, agent)
                .header(ACCEPT, "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8")
                .header(ACCEPT_LANGUAGE, "en-US,en;q=0.5")
                .send()
                .await?;
            let status = response.status();
            if !status.is_success() {
                return Err(PipelineError::from_status(status, url));
            }
            let body = response.text().await?;
            debug!(bytes = body.len(), "Fetched page");
            Ok(body)
        })
        .await
    }
}

#[async_trait]
impl BinarySource for HttpFetcher {
    #[instrument(level = "debug", skip_all, fields(%url, max_bytes))]
    async fn fetch_bytes(&self, url: &str, max_bytes: u64) -> Result<FetchedBytes> {
        let agent = self.prepare().await?;
        self.with_timeout(async {
            let mut response = self.client.get(url).header(USER_AGENT, agent).send().await?;
            let status = response.status();
            if !status.is_success() {
                return Err(PipelineError::from_status(status, url));
            }
            if let Some(len) = response.content_length()
                && len > max_bytes
            {
                return Err(PipelineError::InvalidContent(format!(
                    "{len} bytes exceeds limit of {max_bytes}"
                )));
            }
            let content_type = response
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);

            let mut bytes = Vec::new();
            while let Some(chunk) = response.chunk().await? {
                bytes.extend_from_slice(&chunk);
                if bytes.len() as u64 > max_bytes {
                    return Err(PipelineError::InvalidContent(format!(
                        "body exceeds limit of {max_bytes} bytes"
                    )));
                }
            }
            Ok(FetchedBytes {
                content_type,
                bytes,
            })
        })
        .await
    }
}
