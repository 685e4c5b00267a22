//! CSV output for spreadsheet users.
//!
//! One row per record, in input order. List fields (authors, keywords) are
//! joined into a single cell and the article text is cut to a preview:
//!
//! ```text
//! output_dir/
//! └── records.csv
//! ```

use super::write_file;
use crate::error::{PipelineError, Result};
use crate::models::{ArticleRecord, DecodeStatus, ExtractStatus, ImageStatus};
use chrono::{DateTime, NaiveDate, Utc};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, instrument};

pub const RECORDS_FILE: &str = "records.csv";

/// Characters of article text kept in the `full_text` column.
const TEXT_PREVIEW_CHARS: usize = 500;

const LIST_SEPARATOR: &str = ", ";

/// One flattened CSV row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CsvRow {
    pub sequence_number: u32,
    pub title: String,
    pub redirect_link: String,
    pub decoded_url: Option<String>,
    pub publisher: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub decode_status: DecodeStatus,
    pub extract_status: ExtractStatus,
    pub image_status: ImageStatus,
    pub image_url: Option<String>,
    pub image_path: Option<String>,
    pub full_text: Option<String>,
    pub authors: Option<String>,
    pub publish_date: Option<NaiveDate>,
    pub summary: Option<String>,
    pub keywords: Option<String>,
    pub top_image: Option<String>,
}

impl From<&ArticleRecord> for CsvRow {
    fn from(record: &ArticleRecord) -> Self {
        let content = record.full_content.as_ref();
        let joined = |items: Vec<&String>| {
            (!items.is_empty()).then(|| items.into_iter().join(LIST_SEPARATOR))
        };

        Self {
            sequence_number: record.entry.sequence_number,
            title: record.entry.title.clone(),
            redirect_link: record.entry.redirect_link.clone(),
            decoded_url: record.decoded_url.clone(),
            publisher: record.entry.publisher.clone(),
            published_at: record.entry.published_at,
            decode_status: record.decode_status,
            extract_status: record.extract_status,
            image_status: record.image_status,
            image_url: record.image_url.clone(),
            image_path: record.image_path.clone(),
            full_text: content
                .filter(|c| !c.text.is_empty())
                .map(|c| preview(&c.text)),
            authors: content.and_then(|c| joined(c.authors.iter().collect())),
            publish_date: content.and_then(|c| c.publish_date),
            summary: content.and_then(|c| c.summary.clone()),
            keywords: content.and_then(|c| joined(c.keywords.iter().collect())),
            top_image: content.and_then(|c| c.top_image_url.clone()),
        }
    }
}

fn preview(text: &str) -> String {
    if text.chars().count() <= TEXT_PREVIEW_CHARS {
        return text.to_string();
    }
    let cut: String = text.chars().take(TEXT_PREVIEW_CHARS).collect();
    format!("{cut}...")
}

/// Render `records` as CSV text with a header row.
pub fn render(records: &[ArticleRecord]) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for record in records {
        writer
            .serialize(CsvRow::from(record))
            .map_err(|e| PipelineError::Parse(format!("serializing csv row: {e}")))?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| PipelineError::Parse(format!("flushing csv: {e}")))?;
    String::from_utf8(bytes).map_err(|e| PipelineError::Parse(format!("csv is not utf-8: {e}")))
}

/// Write `records` to `<output_dir>/records.csv`.
#[instrument(level = "info", skip_all, fields(output_dir = %output_dir.display(), count = records.len()))]
pub async fn write_records(records: &[ArticleRecord], output_dir: &Path) -> Result<PathBuf> {
    let contents = render(records)?;
    let path = output_dir.join(RECORDS_FILE);
    write_file(&path, &contents).await?;
    info!(path = %path.display(), "Wrote CSV records");
    Ok(path)
}
