//! Data models for listing entries and the article records built from them.
//!
//! This module defines the core data structures used throughout the pipeline:
//! - [`ListingEntry`]: One row from a search-results page, as produced by the
//!   external results parser
//! - [`ArticleRecord`]: The merged, best-effort output record for one entry
//! - [`FullContent`]: Extracted article body and derived metadata
//! - Stage status enums and [`RunSummary`] for partial-success reporting
//!
//! Records serialize with camelCase field names so downstream consumers see
//! the same shape the JSON output documents.

use crate::error::{PipelineError, Result};
use chrono::{DateTime, NaiveDate, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;

/// A single search-result listing before any deep scraping.
///
/// Immutable once parsed; the pipeline only ever reads it.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingEntry {
    /// 1-based position in the results page.
    pub sequence_number: u32,
    pub title: String,
    /// The search engine's redirect link for this result.
    pub redirect_link: String,
    #[serde(default)]
    pub snippet: String,
    #[serde(default)]
    pub publisher: Option<String>,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
    /// Publisher favicon picked up by the results parser, if any.
    #[serde(default)]
    pub favicon_url: Option<String>,
}

impl ListingEntry {
    /// Read a JSON array of entries, ordered by sequence number.
    pub async fn load_all(path: &Path) -> Result<Vec<ListingEntry>> {
        let raw = tokio::fs::read_to_string(path).await?;
        let mut entries: Vec<ListingEntry> = serde_json::from_str(&raw)
            .map_err(|e| PipelineError::MalformedInput(format!("listing {}: {e}", path.display())))?;
        entries.sort_by_key(|e| e.sequence_number);
        Ok(entries)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecodeStatus {
    #[default]
    NotAttempted,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExtractStatus {
    #[default]
    NotAttempted,
    Succeeded,
    /// Text obtained, but not every derived field.
    Partial,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ImageStatus {
    #[default]
    NotAttempted,
    Succeeded,
    Failed,
}

/// Which link of the resolution chain produced the canonical URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResolveMethod {
    BatchDecoder,
    CustomResolver,
    Browser,
}

impl ResolveMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolveMethod::BatchDecoder => "batch-decoder",
            ResolveMethod::CustomResolver => "custom-resolver",
            ResolveMethod::Browser => "browser",
        }
    }
}

impl fmt::Display for ResolveMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which link of the extraction chain produced the content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExtractionMethod {
    /// Structured extraction with full metadata.
    Primary,
    /// Readability-style content scoring.
    #[serde(rename = "FALLBACK_1")]
    Fallback1,
    /// Boilerplate-stripping heuristic.
    #[serde(rename = "FALLBACK_2")]
    Fallback2,
}

impl fmt::Display for ExtractionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExtractionMethod::Primary => "primary",
            ExtractionMethod::Fallback1 => "readability",
            ExtractionMethod::Fallback2 => "heuristic",
        };
        f.write_str(s)
    }
}

/// How the image stage treats the best available image URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ImageMode {
    Disabled,
    /// Carry the URL through, never download.
    #[default]
    UrlOnly,
    /// Download, keep only the local path.
    Download,
    /// Download and keep both the URL and the local path.
    Both,
}

/// Extracted article body and derived metadata.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FullContent {
    pub text: String,
    pub authors: Vec<String>,
    pub publish_date: Option<NaiveDate>,
    pub summary: Option<String>,
    pub keywords: BTreeSet<String>,
    pub top_image_url: Option<String>,
    pub extraction_method: ExtractionMethod,
}

impl FullContent {
    /// Every derived field the primary strategy is expected to fill.
    pub fn is_complete(&self) -> bool {
        !self.authors.is_empty() && self.publish_date.is_some()
    }
}

/// The merged output record for one listing entry.
///
/// Always produced, whatever happened in the stages; the status fields say
/// how far each stage got.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticleRecord {
    #[serde(flatten)]
    pub entry: ListingEntry,
    pub decoded_url: Option<String>,
    pub decode_status: DecodeStatus,
    pub decode_method: Option<ResolveMethod>,
    pub full_content: Option<FullContent>,
    pub extract_status: ExtractStatus,
    pub image_url: Option<String>,
    pub image_path: Option<String>,
    pub image_status: ImageStatus,
}

impl ArticleRecord {
    /// A record with every stage `NOT_ATTEMPTED`.
    pub fn from_entry(entry: ListingEntry) -> Self {
        Self {
            entry,
            decoded_url: None,
            decode_status: DecodeStatus::NotAttempted,
            decode_method: None,
            full_content: None,
            extract_status: ExtractStatus::NotAttempted,
            image_url: None,
            image_path: None,
            image_status: ImageStatus::NotAttempted,
        }
    }

    /// The URL the article actually lives at, or the redirect link if the
    /// real one was never found.
    pub fn best_url(&self) -> &str {
        self.decoded_url.as_deref().unwrap_or(&self.entry.redirect_link)
    }

    /// Extract the domain name (before .com/.org/etc) from the best URL.
    /// For example: "https://lite.cnn.com/article" -> "cnn"
    pub fn source_tag(&self) -> Option<String> {
        let parsed = url::Url::parse(self.best_url()).ok()?;
        let host = parsed.host_str()?;
        let parts: Vec<&str> = host.split('.').collect();
        if parts.len() >= 2 {
            Some(parts[parts.len() - 2].to_string())
        } else {
            None
        }
    }
}

/// Per-status counts over a finished run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub total: usize,
    pub decoded: usize,
    pub decode_failed: usize,
    pub extracted: usize,
    pub extracted_partial: usize,
    pub extract_failed: usize,
    pub images: usize,
    pub image_failed: usize,
}

impl RunSummary {
    pub fn from_records(records: &[ArticleRecord]) -> Self {
        let mut summary = RunSummary {
            total: records.len(),
            ..Default::default()
        };
        for record in records {
            match record.decode_status {
                DecodeStatus::Succeeded => summary.decoded += 1,
                DecodeStatus::Failed => summary.decode_failed += 1,
                DecodeStatus::NotAttempted => {}
            }
            match record.extract_status {
                ExtractStatus::Succeeded => summary.extracted += 1,
                ExtractStatus::Partial => summary.extracted_partial += 1,
                ExtractStatus::Failed => summary.extract_failed += 1,
                ExtractStatus::NotAttempted => {}
            }
            match record.image_status {
                ImageStatus::Succeeded => summary.images += 1,
                ImageStatus::Failed => summary.image_failed += 1,
                ImageStatus::NotAttempted => {}
            }
        }
        summary
    }

    /// Records with any extracted text, full or partial.
    pub fn scraped(&self) -> usize {
        self.extracted + self.extracted_partial
    }
}

#[cfg(test)]
pub(crate) fn sample_entry(sequence_number: u32, redirect_link: &str) -> ListingEntry {
    ListingEntry {
        sequence_number,
        title: format!("Headline number {sequence_number}"),
        redirect_link: redirect_link.to_string(),
        snippet: "A short snippet".to_string(),
        publisher: Some("Example Times".to_string()),
        published_at: None,
        favicon_url: Some("https://example.com/favicon.ico".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_starts_not_attempted() {
        let record = ArticleRecord::from_entry(sample_entry(1, "https://news.google.com/x"));
        assert_eq!(record.decode_status, DecodeStatus::NotAttempted);
        assert_eq!(record.extract_status, ExtractStatus::NotAttempted);
        assert_eq!(record.image_status, ImageStatus::NotAttempted);
        assert_eq!(record.best_url(), "https://news.google.com/x");
    }

    #[test]
    fn test_record_serialization_is_flat_and_camel_case() {
        let mut record = ArticleRecord::from_entry(sample_entry(3, "https://news.google.com/x"));
        record.decoded_url = Some("https://www.example.com/story".to_string());
        record.decode_status = DecodeStatus::Succeeded;
        record.full_content = Some(FullContent {
            text: "body".to_string(),
            authors: vec!["Jane Roe".to_string()],
            publish_date: NaiveDate::from_ymd_opt(2025, 5, 6),
            summary: None,
            keywords: BTreeSet::new(),
            top_image_url: None,
            extraction_method: ExtractionMethod::Fallback1,
        });
        record.extract_status = ExtractStatus::Partial;

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["sequenceNumber"], 3);
        assert_eq!(json["decodedUrl"], "https://www.example.com/story");
        assert_eq!(json["decodeStatus"], "SUCCEEDED");
        assert_eq!(json["extractStatus"], "PARTIAL");
        assert_eq!(json["imageStatus"], "NOT_ATTEMPTED");
        assert_eq!(json["fullContent"]["extractionMethod"], "FALLBACK_1");
        assert_eq!(json["fullContent"]["publishDate"], "2025-05-06");
    }

    #[tokio::test]
    async fn test_load_all_sorts_by_sequence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("listing.json");
        let entries = vec![
            sample_entry(2, "https://news.google.com/rss/articles/b"),
            sample_entry(1, "https://news.google.com/rss/articles/a"),
        ];
        std::fs::write(&path, serde_json::to_string(&entries).unwrap()).unwrap();

        let loaded = ListingEntry::load_all(&path).await.unwrap();
        let seqs: Vec<u32> = loaded.iter().map(|e| e.sequence_number).collect();
        assert_eq!(seqs, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_load_all_rejects_non_array() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("listing.json");
        std::fs::write(&path, r#"{"title": "x"}"#).unwrap();
        let err = ListingEntry::load_all(&path).await.unwrap_err();
        assert!(matches!(err, PipelineError::MalformedInput(_)));
    }

    #[test]
    fn test_listing_entry_optional_fields_default() {
        let json = r#"{
            "sequenceNumber": 7,
            "title": "Title",
            "redirectLink": "https://news.google.com/read/abc"
        }"#;
        let entry: ListingEntry = serde_json::from_str(json).unwrap();
        assert_eq!(entry.sequence_number, 7);
        assert!(entry.publisher.is_none());
        assert!(entry.favicon_url.is_none());
        assert_eq!(entry.snippet, "");
    }

    #[test]
    fn test_source_tag_prefers_decoded_url() {
        let mut record = ArticleRecord::from_entry(sample_entry(1, "https://news.google.com/x"));
        assert_eq!(record.source_tag(), Some("google".to_string()));
        record.decoded_url = Some("https://lite.cnn.com/2025/05/06/article".to_string());
        assert_eq!(record.source_tag(), Some("cnn".to_string()));
    }

    #[test]
    fn test_image_mode_parses_kebab_case() {
        let mode: ImageMode = serde_yaml::from_str("url-only").unwrap();
        assert_eq!(mode, ImageMode::UrlOnly);
        let mode: ImageMode = serde_yaml::from_str("both").unwrap();
        assert_eq!(mode, ImageMode::Both);
    }

    #[test]
    fn test_run_summary_counts() {
        let mut a = ArticleRecord::from_entry(sample_entry(1, "https://a.example/1"));
        a.decode_status = DecodeStatus::Succeeded;
        a.extract_status = ExtractStatus::Succeeded;
        let mut b = ArticleRecord::from_entry(sample_entry(2, "https://a.example/2"));
        b.decode_status = DecodeStatus::Failed;
        b.extract_status = ExtractStatus::Partial;
        b.image_status = ImageStatus::Failed;

        let summary = RunSummary::from_records(&[a, b]);
        assert_eq!(summary.total, 2);
        assert_eq!(summary.decoded, 1);
        assert_eq!(summary.decode_failed, 1);
        assert_eq!(summary.scraped(), 2);
        assert_eq!(summary.image_failed, 1);
    }
}
