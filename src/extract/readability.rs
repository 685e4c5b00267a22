//! Readability-style fallback: find the densest block of prose.
//!
//! Every paragraph scores `1 + commas + min(chars / 100, 3)`. The score is
//! credited in full to the paragraph's parent and at half weight to its
//! grandparent. Containers whose class or id looks like page furniture
//! (comments, sidebars, promos) are never candidates. The best-scoring
//! container's paragraphs become the text, and its first image the top image.
//!
//! No other metadata is produced.

use super::ExtractStrategy;
use crate::error::{PipelineError, Result};
use crate::http::PageSource;
use crate::models::{ExtractionMethod, FullContent};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, instrument};
use url::Url;

static PARAGRAPHS: Lazy<Selector> = Lazy::new(|| Selector::parse("p").expect("static selector"));
static IMAGES: Lazy<Selector> = Lazy::new(|| Selector::parse("img[src]").expect("static selector"));
static OG_IMAGE: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"meta[property="og:image"]"#).expect("static selector"));
static UNLIKELY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)comment|footer|sidebar|promo|related|share|social|newsletter|nav|menu|banner|cookie")
        .expect("static regex")
});

const MIN_PARAGRAPH_CHARS: usize = 25;

pub struct ReadabilityExtractor {
    pages: Arc<dyn PageSource>,
}

impl ReadabilityExtractor {
    pub fn new(pages: Arc<dyn PageSource>) -> Self {
        Self { pages }
    }
}

#[async_trait]
impl ExtractStrategy for ReadabilityExtractor {
    fn method(&self) -> ExtractionMethod {
        ExtractionMethod::Fallback1
    }

    #[instrument(level = "info", skip_all, fields(strategy = "readability", %url))]
    async fn attempt(&self, url: &str) -> Result<FullContent> {
        let html = self.pages.fetch_page(url).await?;
        parse(&html, url)
    }
}

pub fn parse(html: &str, page_url: &str) -> Result<FullContent> {
    let document = Html::parse_document(html);

    let mut scores: HashMap<_, f64> = HashMap::new();
    for paragraph in document.select(&PARAGRAPHS) {
        let text = paragraph.text().collect::<String>();
        let chars = text.trim().chars().count();
        if chars < MIN_PARAGRAPH_CHARS {
            continue;
        }
        let score = 1.0 + text.matches(',').count() as f64 + (chars as f64 / 100.0).min(3.0);

        let Some(parent) = paragraph.parent().and_then(ElementRef::wrap) else {
            continue;
        };
        if is_candidate(parent) {
            *scores.entry(parent.id()).or_default() += score;
        }
        if let Some(grandparent) = parent.parent().and_then(ElementRef::wrap)
            && is_candidate(grandparent)
        {
            *scores.entry(grandparent.id()).or_default() += score / 2.0;
        }
    }

    let (best_id, best_score) = scores
        .into_iter()
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .ok_or_else(|| PipelineError::Parse("no readable content block".into()))?;
    let best = document
        .tree
        .get(best_id)
        .and_then(ElementRef::wrap)
        .ok_or_else(|| PipelineError::Parse("content block vanished".into()))?;
    debug!(score = best_score, tag = best.value().name(), "Selected content block");

    let text = best
        .select(&PARAGRAPHS)
        .map(|p| p.text().collect::<Vec<_>>().join(" ").trim().to_string())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join("\n");

    let top_image_url = best
        .select(&IMAGES)
        .filter_map(|img| img.value().attr("src"))
        .chain(
            document
                .select(&OG_IMAGE)
                .filter_map(|m| m.value().attr("content")),
        )
        .find_map(|src| {
            Url::parse(page_url)
                .ok()
                .and_then(|base| base.join(src.trim()).ok())
                .map(String::from)
        });

    Ok(FullContent {
        text,
        authors: Vec::new(),
        publish_date: None,
        summary: None,
        keywords: BTreeSet::new(),
        top_image_url,
        extraction_method: ExtractionMethod::Fallback1,
    })
}

fn is_candidate(element: ElementRef<'_>) -> bool {
    let value = element.value();
    if matches!(value.name(), "body" | "html") {
        return false;
    }
    let marker = format!(
        "{} {}",
        value.attr("class").unwrap_or_default(),
        value.id().unwrap_or_default()
    );
    !UNLIKELY.is_match(&marker)
}
