//! Primary extraction: article text plus full metadata.
//!
//! Metadata is gathered from the sources publishers actually fill in, in
//! priority order:
//!
//! | Field | Sources |
//! |-------|---------|
//! | text | JSON-LD `articleBody`, else `<article>` paragraphs, else all paragraphs |
//! | authors | JSON-LD `author`, `meta[name=author]`, `article:author` |
//! | publish date | JSON-LD `datePublished`, `article:published_time`, `<time datetime>` |
//! | summary | JSON-LD `description`, `og:description`, `meta[name=description]` |
//! | keywords | JSON-LD / meta `keywords`, plus the most frequent content words |
//! | top image | `og:image`, `twitter:image`, JSON-LD `image` |

use super::{ExtractStrategy, clean};
use crate::error::{PipelineError, Result};
use crate::http::PageSource;
use crate::models::{ExtractionMethod, FullContent};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate};
use itertools::Itertools;
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, instrument};
use url::Url;

static JSON_LD: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(r#"script[type="application/ld+json"]"#).expect("static selector")
});
static ARTICLE_PARAGRAPHS: Lazy<Selector> =
    Lazy::new(|| Selector::parse("article p").expect("static selector"));
static PARAGRAPHS: Lazy<Selector> = Lazy::new(|| Selector::parse("p").expect("static selector"));
static TIME: Lazy<Selector> =
    Lazy::new(|| Selector::parse("time[datetime]").expect("static selector"));

const ARTICLE_TYPES: &[&str] = &[
    "NewsArticle",
    "Article",
    "ReportageNewsArticle",
    "AnalysisNewsArticle",
    "BlogPosting",
];

const CONTENT_KEYWORDS: usize = 10;

const STOPWORDS: &[&str] = &[
    "about", "after", "also", "been", "before", "being", "could", "does", "from", "have",
    "into", "just", "like", "more", "most", "much", "only", "other", "over", "said", "says",
    "some", "such", "than", "that", "their", "them", "then", "there", "these", "they", "this",
    "those", "through", "under", "very", "were", "what", "when", "where", "which", "while",
    "will", "with", "would", "your",
];

pub struct StructuredExtractor {
    pages: Arc<dyn PageSource>,
}

impl StructuredExtractor {
    pub fn new(pages: Arc<dyn PageSource>) -> Self {
        Self { pages }
    }
}

#[async_trait]
impl ExtractStrategy for StructuredExtractor {
    fn method(&self) -> ExtractionMethod {
        ExtractionMethod::Primary
    }

    #[instrument(level = "info", skip_all, fields(strategy = "primary", %url))]
    async fn attempt(&self, url: &str) -> Result<FullContent> {
        let html = self.pages.fetch_page(url).await?;
        parse(&html, url)
    }
}

/// Extract text and metadata from a fetched page.
pub fn parse(html: &str, page_url: &str) -> Result<FullContent> {
    let document = Html::parse_document(html);
    let linked = linked_data(&document);

    let text = linked
        .as_ref()
        .and_then(|ld| ld.get("articleBody"))
        .and_then(Value::as_str)
        .filter(|body| !body.trim().is_empty())
        .map(clean::split_sentences)
        .unwrap_or_else(|| paragraph_text(&document));
    if text.trim().is_empty() {
        return Err(PipelineError::Parse("page has no article text".into()));
    }

    let mut authors = linked
        .as_ref()
        .and_then(|ld| ld.get("author"))
        .map(names)
        .unwrap_or_default();
    if authors.is_empty() {
        authors = meta_values(&document, &["author", "article:author", "byl"])
            .into_iter()
            .filter(|a| !a.starts_with("http"))
            .map(|a| a.trim_start_matches("By ").trim().to_string())
            .collect();
    }
    let authors: Vec<String> = authors.into_iter().unique().collect();

    let publish_date = linked
        .as_ref()
        .and_then(|ld| ld.get("datePublished"))
        .and_then(Value::as_str)
        .and_then(parse_date)
        .or_else(|| {
            meta_values(&document, &["article:published_time", "pubdate", "date"])
                .iter()
                .find_map(|v| parse_date(v))
        })
        .or_else(|| {
            document
                .select(&TIME)
                .filter_map(|t| t.value().attr("datetime"))
                .find_map(parse_date)
        });

    let summary = linked
        .as_ref()
        .and_then(|ld| ld.get("description"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .or_else(|| {
            meta_values(&document, &["og:description", "description"])
                .into_iter()
                .next()
        })
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());

    let mut keywords: BTreeSet<String> = linked
        .as_ref()
        .and_then(|ld| ld.get("keywords"))
        .map(keyword_list)
        .unwrap_or_default();
    for raw in meta_values(&document, &["keywords", "news_keywords"]) {
        keywords.extend(split_keywords(&raw));
    }
    keywords.extend(frequent_words(&text, CONTENT_KEYWORDS));

    let top_image_url = meta_values(&document, &["og:image", "twitter:image", "twitter:image:src"])
        .into_iter()
        .next()
        .or_else(|| linked.as_ref().and_then(|ld| ld.get("image")).and_then(image_url))
        .and_then(|src| absolutize(page_url, &src));

    debug!(
        words = text.split_whitespace().count(),
        authors = authors.len(),
        has_date = publish_date.is_some(),
        "Parsed structured article"
    );

    Ok(FullContent {
        text,
        authors,
        publish_date,
        summary,
        keywords,
        top_image_url,
        extraction_method: ExtractionMethod::Primary,
    })
}

/// The first JSON-LD object that describes an article.
fn linked_data(document: &Html) -> Option<Value> {
    document
        .select(&JSON_LD)
        .filter_map(|script| serde_json::from_str::<Value>(&script.inner_html()).ok())
        .flat_map(flatten_graph)
        .find(is_article)
}

fn flatten_graph(value: Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items.into_iter().flat_map(flatten_graph).collect(),
        Value::Object(mut map) => match map.remove("@graph") {
            Some(graph) => flatten_graph(graph),
            None => vec![Value::Object(map)],
        },
        _ => Vec::new(),
    }
}

fn is_article(value: &Value) -> bool {
    match value.get("@type") {
        Some(Value::String(t)) => ARTICLE_TYPES.contains(&t.as_str()),
        Some(Value::Array(types)) => types
            .iter()
            .filter_map(Value::as_str)
            .any(|t| ARTICLE_TYPES.contains(&t)),
        _ => false,
    }
}

/// Author names from a string, a `Person` object, or a list of either.
fn names(value: &Value) -> Vec<String> {
    let raw: Vec<String> = match value {
        Value::String(name) => vec![name.trim().to_string()],
        Value::Object(map) => map
            .get("name")
            .and_then(Value::as_str)
            .map(|n| vec![n.trim().to_string()])
            .unwrap_or_default(),
        Value::Array(items) => items.iter().flat_map(names).collect(),
        _ => Vec::new(),
    };
    raw.into_iter().filter(|n| !n.is_empty()).collect()
}

fn keyword_list(value: &Value) -> BTreeSet<String> {
    match value {
        Value::String(raw) => split_keywords(raw),
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .flat_map(split_keywords)
            .collect(),
        _ => BTreeSet::new(),
    }
}

fn split_keywords(raw: &str) -> BTreeSet<String> {
    raw.split(',')
        .map(|k| k.trim().to_lowercase())
        .filter(|k| !k.is_empty())
        .collect()
}

fn image_url(value: &Value) -> Option<String> {
    match value {
        Value::String(url) => Some(url.clone()),
        Value::Object(map) => map.get("url").and_then(Value::as_str).map(str::to_string),
        Value::Array(items) => items.iter().find_map(image_url),
        _ => None,
    }
}

/// `content` of every `<meta>` whose `name` or `property` is in `keys`,
/// in `keys` order.
fn meta_values(document: &Html, keys: &[&str]) -> Vec<String> {
    keys.iter()
        .flat_map(|key| {
            let selector = format!(r#"meta[name="{key}"], meta[property="{key}"]"#);
            Selector::parse(&selector)
                .map(|sel| {
                    document
                        .select(&sel)
                        .filter_map(|el| el.value().attr("content"))
                        .map(|c| c.trim().to_string())
                        .filter(|c| !c.is_empty())
                        .collect::<Vec<_>>()
                })
                .unwrap_or_default()
        })
        .collect()
}

fn paragraph_text(document: &Html) -> String {
    let in_article: Vec<String> = document
        .select(&ARTICLE_PARAGRAPHS)
        .map(element_text)
        .filter(|t| !t.is_empty())
        .collect();
    if !in_article.is_empty() {
        return in_article.join("\n");
    }
    document
        .select(&PARAGRAPHS)
        .map(element_text)
        .filter(|t| !t.is_empty())
        .join("\n")
}

fn element_text(element: ElementRef<'_>) -> String {
    element.text().collect::<Vec<_>>().join(" ").trim().to_string()
}

/// Accepts RFC 3339 timestamps and plain `YYYY-MM-DD` prefixes.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.date_naive());
    }
    raw.get(..10)
        .and_then(|prefix| NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok())
}

/// The `limit` most frequent content words, ties broken alphabetically.
pub fn frequent_words(text: &str, limit: usize) -> BTreeSet<String> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for word in text
        .split(|c: char| !c.is_alphanumeric() && c != '\'')
        .map(|w| w.trim_matches('\'').to_lowercase())
        .filter(|w| w.chars().count() >= 4 && !w.chars().all(|c| c.is_ascii_digit()))
        .filter(|w| !STOPWORDS.contains(&w.as_str()))
    {
        *counts.entry(word).or_default() += 1;
    }
    counts
        .into_iter()
        .filter(|(_, n)| *n >= 2)
        .sorted_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)))
        .take(limit)
        .map(|(word, _)| word)
        .collect()
}

fn absolutize(page_url: &str, src: &str) -> Option<String> {
    let src = src.trim();
    if src.is_empty() {
        return None;
    }
    match Url::parse(page_url) {
        Ok(base) => base.join(src).ok().map(String::from),
        Err(_) => Url::parse(src).ok().map(String::from),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<html><head>
        <meta property="og:image" content="/images/lead.jpg">
        <meta name="description" content="Council approves transit budget.">
        <meta name="keywords" content="Transit, Budget">
        <script type="application/ld+json">
        {"@context":"https://schema.org","@graph":[
            {"@type":"WebSite","name":"Example Times"},
            {"@type":"NewsArticle","headline":"Budget passes",
             "author":[{"@type":"Person","name":"Jane Roe"},{"@type":"Person","name":"John Doe"}],
             "datePublished":"2025-05-06T09:30:00-04:00"}
        ]}
        </script>
    </head><body>
        <nav><p>Home</p></nav>
        <article>
            <p>The council voted on Tuesday to approve the new transit budget for the city.</p>
            <p>Transit officials said the budget would add three new bus routes next spring.</p>
        </article>
    </body></html>"#;

    #[test]
    fn test_parse_collects_metadata() {
        let content = parse(PAGE, "https://www.example.com/news/budget").unwrap();
        assert_eq!(content.authors, vec!["Jane Roe", "John Doe"]);
        assert_eq!(content.publish_date, NaiveDate::from_ymd_opt(2025, 5, 6));
        assert_eq!(content.summary.as_deref(), Some("Council approves transit budget."));
        assert_eq!(
            content.top_image_url.as_deref(),
            Some("https://www.example.com/images/lead.jpg")
        );
        assert!(content.keywords.contains("transit"));
        assert!(content.keywords.contains("budget"));
        assert!(content.text.starts_with("The council voted"));
        assert!(!content.text.contains("Home"));
        assert!(content.is_complete());
    }

    #[test]
    fn test_article_body_is_split_into_sentences() {
        let html = r#"<html><head><script type="application/ld+json">
            {"@type":"NewsArticle","articleBody":"The council met on Tuesday. Members approved the budget."}
        </script></head><body></body></html>"#;
        let content = parse(html, "https://www.example.com/a").unwrap();
        assert_eq!(
            content.text,
            "The council met on Tuesday.\nMembers approved the budget."
        );
    }

    #[test]
    fn test_parse_falls_back_to_meta_tags() {
        let html = r#"<html><head>
            <meta name="author" content="By Sam Poe">
            <meta property="article:published_time" content="2024-12-31">
        </head><body><p>Only paragraph on the page with some words in it.</p></body></html>"#;
        let content = parse(html, "https://www.example.com/a").unwrap();
        assert_eq!(content.authors, vec!["Sam Poe"]);
        assert_eq!(content.publish_date, NaiveDate::from_ymd_opt(2024, 12, 31));
        assert!(content.top_image_url.is_none());
    }

    #[test]
    fn test_parse_without_text_is_an_error() {
        let err = parse("<html><body><div></div></body></html>", "https://a.example/").unwrap_err();
        assert!(matches!(err, PipelineError::Parse(_)));
    }

    #[test]
    fn test_frequent_words() {
        let words = frequent_words(
            "River river RIVER flood flood bridge that that that 2025 2025",
            2,
        );
        let expected: BTreeSet<String> = ["flood", "river"].into_iter().map(String::from).collect();
        assert_eq!(words, expected);
    }

    #[test]
    fn test_parse_date_formats() {
        assert_eq!(parse_date("2025-01-02T03:04:05Z"), NaiveDate::from_ymd_opt(2025, 1, 2));
        assert_eq!(parse_date("2025-01-02"), NaiveDate::from_ymd_opt(2025, 1, 2));
        assert_eq!(parse_date("yesterday"), None);
    }
}
