//! Batch-execute decoder for Google News redirect links.
//!
//! This is the fastest path when the redirect service cooperates. It takes
//! two requests:
//!
//! 1. Fetch the article's redirect page and read the signature and
//!    timestamp attributes (`data-n-a-sg`, `data-n-a-ts`) it embeds
//! 2. POST a `garturlreq` call to the service's batch-execute endpoint and
//!    read the decoded URL out of the `wrb.fr` response line
//!
//! # Response Format
//!
//! ```text
//! )]}'
//!
//! [["wrb.fr","Fbv4je","[\"garturlres\",\"https://publisher.example/story\",1]",null,null,null,"generic"]]
//! ```

use super::{ResolveStrategy, article_id, is_redirect_service_host};
use crate::error::{PipelineError, Result};
use crate::http::{HttpFetcher, PageSource};
use crate::models::ResolveMethod;
use crate::resilience::RetryPolicy;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{debug, instrument};
use url::Url;

static SIGNATURE_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("[data-n-a-sg][data-n-a-ts]").expect("static selector"));

const RPC_ID: &str = "Fbv4je";

pub struct BatchDecoder {
    fetcher: Arc<HttpFetcher>,
    base_url: String,
}

impl BatchDecoder {
    pub fn new(fetcher: Arc<HttpFetcher>, base_url: &str) -> Self {
        Self {
            fetcher,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn serves(&self, link: &Url) -> bool {
        let Some(host) = link.host_str() else {
            return false;
        };
        if is_redirect_service_host(host) {
            return true;
        }
        Url::parse(&self.base_url)
            .ok()
            .is_some_and(|base| base.host_str() == Some(host) && base.port() == link.port())
    }
}

#[async_trait]
impl ResolveStrategy for BatchDecoder {
    fn method(&self) -> ResolveMethod {
        ResolveMethod::BatchDecoder
    }

    #[instrument(level = "info", skip_all, fields(strategy = "batch-decoder"))]
    async fn attempt(&self, redirect_link: &str) -> Result<String> {
        let link = Url::parse(redirect_link)
            .map_err(|e| PipelineError::MalformedInput(format!("redirect link: {e}")))?;
        if !self.serves(&link) {
            return Err(PipelineError::MalformedInput(
                "not a redirect-service link".into(),
            ));
        }
        let id = article_id(&link).ok_or_else(|| {
            PipelineError::MalformedInput("redirect link has no article id".into())
        })?;

        let page_url = format!("{}/rss/articles/{}", self.base_url, id);
        let page = self.fetcher.fetch_page(&page_url).await?;
        let (signature, timestamp) = signature_params(&page)?;
        debug!(%timestamp, "Found decoding parameters");

        let endpoint = format!(
            "{}/_/DotsSplashUi/data/batchexecute?rpcids={RPC_ID}",
            self.base_url
        );
        let body = request_body(&id, &timestamp, &signature);
        let referer = format!("{}/", self.base_url);

        // A cut-off response is asked for again before the chain gives up.
        let (fetcher, endpoint, body, referer) = (&self.fetcher, &endpoint, &body, &referer);
        RetryPolicy::parsing()
            .execute_within(self.fetcher.scope(), || async move {
                let response = fetcher.post_form(endpoint, body.clone(), referer).await?;
                parse_response(&response)
            })
            .await
    }
}

/// Read `(signature, timestamp)` from the redirect page.
pub fn signature_params(html: &str) -> Result<(String, String)> {
    let document = Html::parse_document(html);
    let element = document
        .select(&SIGNATURE_SELECTOR)
        .next()
        .ok_or_else(|| PipelineError::Parse("redirect page has no decoding parameters".into()))?;
    let signature = element.value().attr("data-n-a-sg").unwrap_or_default();
    let timestamp = element.value().attr("data-n-a-ts").unwrap_or_default();
    if signature.is_empty() || timestamp.is_empty() {
        return Err(PipelineError::Parse("empty decoding parameters".into()));
    }
    Ok((signature.to_string(), timestamp.to_string()))
}

/// Form body for the `garturlreq` call.
pub fn request_body(id: &str, timestamp: &str, signature: &str) -> String {
    let inner = format!(
        r#"["garturlreq",[["X","X",["X","X"],null,null,1,1,"US:en",null,1,null,null,null,null,null,0,1],"X","X",1,[1,1,1],1,1,null,0,0,null,0],"{id}",{timestamp},"{signature}"]"#
    );
    let envelope = json!([[[RPC_ID, inner, Value::Null, "generic"]]]);
    format!("f.req={}", urlencoding::encode(&envelope.to_string()))
}

/// Pull the decoded URL out of a batch-execute response.
pub fn parse_response(body: &str) -> Result<String> {
    let line = body
        .lines()
        .map(str::trim)
        .find(|l| l.starts_with(r#"[["wrb.fr""#))
        .ok_or_else(|| PipelineError::Parse("no wrb.fr line in decoder response".into()))?;
    let outer: Value = serde_json::from_str(line)?;
    let payload = outer
        .get(0)
        .and_then(|row| row.get(2))
        .and_then(Value::as_str)
        .ok_or_else(|| PipelineError::Parse("decoder response has no payload".into()))?;
    let inner: Value = serde_json::from_str(payload)?;
    inner
        .get(1)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| PipelineError::Parse("decoder payload has no url".into()))
}
