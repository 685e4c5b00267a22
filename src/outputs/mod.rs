//! Output generation modules for JSON, CSV, Markdown, and article text files.
//!
//! This module contains submodules responsible for writing finished
//! [`ArticleRecord`](crate::models::ArticleRecord)s to disk. Every write goes
//! through the `file` retry policy so a transient filesystem hiccup does not
//! lose a run's results.
//!
//! # Submodules
//!
//! - [`json`]: Writes all records as one JSON array
//! - [`csv`]: Writes one flattened row per record
//! - [`markdown`]: Writes one Markdown file per record
//! - [`articles`]: Writes a plain-text file per fully extracted article
//!
//! # Output Structure
//!
//! ```text
//! output_dir/
//! ├── records.json
//! ├── records.csv
//! ├── markdown/
//! │   ├── 001_budget-passes.md
//! │   └── 002_storm-damage.md
//! ├── articles/
//! │   └── budget-passes.txt
//! └── images/
//!     └── budget-passes_001.jpg
//! ```

pub mod articles;
pub mod csv;
pub mod json;
pub mod markdown;

use crate::error::Result;
use crate::resilience::RetryPolicy;
use std::path::Path;

/// Create the parent directory and write `contents` to `path`, retrying
/// transient I/O failures.
pub(crate) async fn write_file(path: &Path, contents: &str) -> Result<()> {
    RetryPolicy::file()
        .execute(|| async move {
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(path, contents).await?;
            Ok(())
        })
        .await
}
