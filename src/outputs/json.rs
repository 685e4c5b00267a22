//! JSON output for downstream consumers.
//!
//! All records of a run are serialized as one pretty-printed array, in input
//! order, with extracted content nested under `fullContent`:
//!
//! ```text
//! output_dir/
//! └── records.json
//! ```
//!
//! The file is overwritten on every run, so rerunning the same input yields
//! the same file.

use super::write_file;
use crate::error::{PipelineError, Result};
use crate::models::ArticleRecord;
use std::path::{Path, PathBuf};
use tracing::{info, instrument};

pub const RECORDS_FILE: &str = "records.json";

/// Write `records` to `<output_dir>/records.json`.
///
/// # Arguments
///
/// * `records` - The finished records, in input order
/// * `output_dir` - Base directory for run output
///
/// # Returns
///
/// The path written, or an error if serialization or every write attempt
/// failed.
#[instrument(level = "info", skip_all, fields(output_dir = %output_dir.display(), count = records.len()))]
pub async fn write_records(records: &[ArticleRecord], output_dir: &Path) -> Result<PathBuf> {
    let json = serde_json::to_string_pretty(records)
        .map_err(|e| PipelineError::Parse(format!("serializing records: {e}")))?;

    let path = output_dir.join(RECORDS_FILE);
    write_file(&path, &json).await?;
    info!(path = %path.display(), "Wrote JSON records");
    Ok(path)
}
