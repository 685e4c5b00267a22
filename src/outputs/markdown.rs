//! Markdown rendering of article records.
//!
//! Each record becomes its own file named `<seq>_<title-slug>.md` under
//! `<output_dir>/markdown/`. Records without extracted content still get a
//! file carrying the listing fields and stage statuses.

use super::write_file;
use crate::error::Result;
use crate::models::ArticleRecord;
use crate::utils::slugify_title;
use itertools::Itertools;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tracing::{info, instrument};

/// Render one record as a Markdown document.
pub fn record_to_markdown(record: &ArticleRecord) -> String {
    let entry = &record.entry;
    let mut md = String::new();

    let _ = writeln!(md, "# {}\n", entry.title);
    if let Some(publisher) = &entry.publisher {
        let _ = writeln!(md, "- **Publisher:** {publisher}");
    }
    if let Some(at) = entry.published_at {
        let _ = writeln!(md, "- **Listed:** {}", at.to_rfc3339());
    }
    let _ = writeln!(md, "- **Link:** <{}>", record.best_url());
    if let Some(tag) = record.source_tag() {
        let _ = writeln!(md, "- **Source:** {tag}");
    }

    let decode = match record.decode_method {
        Some(method) => format!("{:?} ({method})", record.decode_status),
        None => format!("{:?}", record.decode_status),
    };
    let _ = writeln!(md, "- **Decode:** {decode}");

    let extract = match &record.full_content {
        Some(content) => format!("{:?} ({})", record.extract_status, content.extraction_method),
        None => format!("{:?}", record.extract_status),
    };
    let _ = writeln!(md, "- **Extraction:** {extract}");
    let _ = writeln!(md, "- **Image:** {:?}", record.image_status);

    if let Some(path) = &record.image_path {
        let _ = writeln!(md, "\n![{}]({path})", entry.title);
    } else if let Some(url) = &record.image_url {
        let _ = writeln!(md, "\n![{}]({url})", entry.title);
    }

    if !entry.snippet.is_empty() {
        let _ = writeln!(md, "\n> {}", entry.snippet);
    }

    if let Some(content) = &record.full_content {
        if !content.authors.is_empty() {
            let _ = writeln!(md, "\n**By** {}", content.authors.iter().join(", "));
        }
        if let Some(date) = content.publish_date {
            let _ = writeln!(md, "\n**Published:** {date}");
        }
        if let Some(summary) = &content.summary {
            let _ = writeln!(md, "\n## Summary\n\n{summary}");
        }
        if !content.keywords.is_empty() {
            let _ = writeln!(
                md,
                "\n## Keywords\n\n{}",
                content.keywords.iter().map(|k| format!("`{k}`")).join(" ")
            );
        }
        let _ = writeln!(md, "\n## Article\n");
        for paragraph in content.text.lines().filter(|l| !l.trim().is_empty()) {
            let _ = writeln!(md, "{}\n", paragraph.trim());
        }
    }

    md
}

/// `<seq>_<title-slug>.md`
pub fn file_name(record: &ArticleRecord) -> String {
    format!(
        "{:03}_{}.md",
        record.entry.sequence_number,
        slugify_title(&record.entry.title, 60)
    )
}

/// Write one Markdown file per record under `<output_dir>/markdown/`.
#[instrument(level = "info", skip_all, fields(output_dir = %output_dir.display(), count = records.len()))]
pub async fn write_records(records: &[ArticleRecord], output_dir: &Path) -> Result<Vec<PathBuf>> {
    let dir = output_dir.join("markdown");
    let mut written = Vec::with_capacity(records.len());
    for record in records {
        let path = dir.join(file_name(record));
        write_file(&path, &record_to_markdown(record)).await?;
        written.push(path);
    }
    info!(files = written.len(), dir = %dir.display(), "Wrote Markdown records");
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        DecodeStatus, ExtractStatus, ExtractionMethod, FullContent, ResolveMethod, sample_entry,
    };
    use chrono::NaiveDate;

    fn extracted_record() -> ArticleRecord {
        let mut record =
            ArticleRecord::from_entry(sample_entry(7, "https://news.google.com/rss/articles/x"));
        record.decoded_url = Some("https://www.example.com/news/budget".to_string());
        record.decode_status = DecodeStatus::Succeeded;
        record.decode_method = Some(ResolveMethod::CustomResolver);
        record.extract_status = ExtractStatus::Succeeded;
        record.full_content = Some(FullContent {
            text: "First paragraph.\n\nSecond paragraph.".to_string(),
            authors: vec!["Jane Roe".to_string(), "John Doe".to_string()],
            publish_date: NaiveDate::from_ymd_opt(2025, 5, 6),
            summary: Some("Council passes the budget.".to_string()),
            keywords: ["budget".to_string(), "council".to_string()].into(),
            top_image_url: None,
            extraction_method: ExtractionMethod::Primary,
        });
        record
    }

    #[test]
    fn test_record_to_markdown_full() {
        let md = record_to_markdown(&extracted_record());
        assert!(md.starts_with("# Headline number 7\n"));
        assert!(md.contains("- **Link:** <https://www.example.com/news/budget>"));
        assert!(md.contains("- **Source:** example"));
        assert!(md.contains("- **Decode:** Succeeded (custom-resolver)"));
        assert!(md.contains("- **Extraction:** Succeeded (primary)"));
        assert!(md.contains("**By** Jane Roe, John Doe"));
        assert!(md.contains("**Published:** 2025-05-06"));
        assert!(md.contains("`budget` `council`"));
        assert!(md.contains("First paragraph.\n\nSecond paragraph.\n"));
    }

    #[test]
    fn test_listing_only_record_has_no_article_section() {
        let record = ArticleRecord::from_entry(sample_entry(2, "https://news.google.com/rss/articles/y"));
        let md = record_to_markdown(&record);
        assert!(md.contains("- **Extraction:** NotAttempted"));
        assert!(md.contains("> A short snippet"));
        assert!(!md.contains("## Article"));
    }

    #[tokio::test]
    async fn test_write_records_names_files_by_sequence() {
        let dir = tempfile::tempdir().unwrap();
        let written = write_records(&[extracted_record()], dir.path()).await.unwrap();
        assert_eq!(
            written,
            vec![dir.path().join("markdown").join("007_headline-number-7.md")]
        );
        assert!(written[0].exists());
    }
}
