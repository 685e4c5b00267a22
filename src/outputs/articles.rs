//! Plain-text files for fully extracted articles.
//!
//! Every record with extracted content gets `<output_dir>/articles/<slug>.txt`:
//!
//! ```text
//! Title: Council passes budget
//! URL: https://www.example.com/news/budget
//! Authors: Jane Roe, John Doe
//! Publish Date: 2025-05-06
//! Keywords: budget, council
//! Summary: Council passes the budget.
//! ==================================================
//!
//! <article text>
//! ```
//!
//! Two records whose titles slug the same get the sequence number appended to
//! the later one.

use super::write_file;
use crate::error::Result;
use crate::models::ArticleRecord;
use crate::utils::slugify_title;
use itertools::Itertools;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};

const SEPARATOR_WIDTH: usize = 50;

/// Header plus body, or `None` for records without extracted content.
pub fn render(record: &ArticleRecord) -> Option<String> {
    let content = record.full_content.as_ref()?;
    let or_unknown = |v: String| if v.is_empty() { "Unknown".to_string() } else { v };

    Some(format!(
        "Title: {}\nURL: {}\nAuthors: {}\nPublish Date: {}\nKeywords: {}\nSummary: {}\n{}\n\n{}\n",
        record.entry.title,
        record.best_url(),
        or_unknown(content.authors.iter().join(", ")),
        content
            .publish_date
            .map(|d| d.to_string())
            .unwrap_or_else(|| "Unknown".to_string()),
        or_unknown(content.keywords.iter().join(", ")),
        content.summary.as_deref().unwrap_or("Unknown"),
        "=".repeat(SEPARATOR_WIDTH),
        content.text.trim(),
    ))
}

#[instrument(level = "info", skip_all, fields(output_dir = %output_dir.display()))]
pub async fn write_articles(records: &[ArticleRecord], output_dir: &Path) -> Result<Vec<PathBuf>> {
    let dir = output_dir.join("articles");
    let mut used = HashSet::new();
    let mut written = Vec::new();

    for record in records {
        let Some(body) = render(record) else {
            continue;
        };
        let mut stem = slugify_title(&record.entry.title, 80);
        if !used.insert(stem.clone()) {
            stem = format!("{stem}_{:03}", record.entry.sequence_number);
            debug!(%stem, "Duplicate title slug");
            used.insert(stem.clone());
        }
        let path = dir.join(format!("{stem}.txt"));
        write_file(&path, &body).await?;
        written.push(path);
    }

    info!(files = written.len(), dir = %dir.display(), "Wrote article text files");
    Ok(written)
}
