//! Last-resort extraction: visible text of the main content container.
//!
//! The first element matching one of the common content selectors wins,
//! falling back to `<body>`. Text inside boilerplate tags is skipped and
//! block-level elements break lines, so the cleaner can judge each block on
//! its own.

use super::ExtractStrategy;
use crate::error::{PipelineError, Result};
use crate::http::PageSource;
use crate::models::{ExtractionMethod, FullContent};
use async_trait::async_trait;
use scraper::{ElementRef, Html, Node, Selector};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, instrument};

const CONTENT_SELECTORS: &[&str] = &[
    "article",
    ".article-content",
    ".content",
    ".post-content",
    ".entry-content",
    "main",
    ".main-content",
    "body",
];

const SKIPPED_TAGS: &[&str] = &[
    "script", "style", "noscript", "nav", "footer", "header", "aside", "form", "template",
];

const BLOCK_TAGS: &[&str] = &[
    "p", "div", "section", "article", "main", "li", "ul", "ol", "br", "h1", "h2", "h3", "h4",
    "h5", "h6", "blockquote", "pre", "table", "tr", "figure", "figcaption",
];

pub struct HeuristicExtractor {
    pages: Arc<dyn PageSource>,
}

impl HeuristicExtractor {
    pub fn new(pages: Arc<dyn PageSource>) -> Self {
        Self { pages }
    }
}

#[async_trait]
impl ExtractStrategy for HeuristicExtractor {
    fn method(&self) -> ExtractionMethod {
        ExtractionMethod::Fallback2
    }

    #[instrument(level = "info", skip_all, fields(strategy = "heuristic", %url))]
    async fn attempt(&self, url: &str) -> Result<FullContent> {
        let html = self.pages.fetch_page(url).await?;
        parse(&html)
    }
}

pub fn parse(html: &str) -> Result<FullContent> {
    let document = Html::parse_document(html);

    let root = CONTENT_SELECTORS
        .iter()
        .filter_map(|css| Selector::parse(css).ok())
        .find_map(|selector| document.select(&selector).next())
        .ok_or_else(|| PipelineError::Parse("page has no body".into()))?;
    debug!(container = root.value().name(), "Selected content container");

    let mut text = String::new();
    visible_text(root, &mut text);
    if text.trim().is_empty() {
        return Err(PipelineError::Parse("no visible text".into()));
    }

    Ok(FullContent {
        text,
        authors: Vec::new(),
        publish_date: None,
        summary: None,
        keywords: BTreeSet::new(),
        top_image_url: None,
        extraction_method: ExtractionMethod::Fallback2,
    })
}

fn visible_text(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => out.push_str(text),
            Node::Element(el) if SKIPPED_TAGS.contains(&el.name()) => {}
            Node::Element(el) => {
                let Some(child_element) = ElementRef::wrap(child) else {
                    continue;
                };
                let block = BLOCK_TAGS.contains(&el.name());
                if block {
                    out.push('\n');
                }
                visible_text(child_element, out);
                if block {
                    out.push('\n');
                }
            }
            _ => {}
        }
    }
}
