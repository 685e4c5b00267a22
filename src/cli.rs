//! Command-line interface definitions for the news pipeline.
//!
//! This module defines the CLI arguments and options using the `clap` crate.
//! Most options can also be provided via environment variables. Options that
//! mirror a [`PipelineConfig`] field override the value loaded from the
//! config file.

use crate::config::PipelineConfig;
use crate::models::ImageMode;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

/// A record file to write at the end of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Csv,
    Markdown,
}

/// Command-line arguments for the news pipeline.
///
/// # Examples
///
/// ```sh
/// # Resolve and extract with defaults
/// news_pipeline -i listing.json
///
/// # Write JSON and a CSV sheet
/// news_pipeline -i listing.json -f json,csv
///
/// # Download images for the top ten entries, stop after five minutes
/// news_pipeline -i listing.json -o ./out --full-count 10 \
///     --image-mode download --deadline-secs 300
///
/// # Listing-only run, no decoding
/// news_pipeline -i listing.json --no-decode --full-count 0
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// JSON array of listing entries to process
    #[arg(short, long, env = "NEWS_PIPELINE_INPUT")]
    pub input: PathBuf,

    /// Base directory for records, article text and images
    #[arg(short, long, env = "NEWS_PIPELINE_OUTPUT_DIR")]
    pub output_dir: Option<PathBuf>,

    /// Optional path to config.yaml file
    #[arg(short, long, env = "NEWS_PIPELINE_CONFIG")]
    pub config: Option<PathBuf>,

    /// How many leading entries get full article extraction
    #[arg(long)]
    pub full_count: Option<usize>,

    /// What to do with each article's image
    #[arg(long, value_enum)]
    pub image_mode: Option<ImageMode>,

    /// Skip redirect-link decoding
    #[arg(long)]
    pub no_decode: bool,

    /// Number of entries processed concurrently
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Stop starting new work after this many seconds
    #[arg(long)]
    pub deadline_secs: Option<u64>,

    /// Record output formats, comma separated (json, csv, markdown)
    #[arg(short, long, value_enum, value_delimiter = ',', default_value = "json")]
    pub format: Vec<OutputFormat>,
}

impl Cli {
    pub fn wants(&self, format: OutputFormat) -> bool {
        self.format.contains(&format)
    }

    /// Apply every flag that was given on top of `config`.
    pub fn apply_overrides(&self, config: &mut PipelineConfig) {
        if let Some(dir) = &self.output_dir {
            config.output_dir = dir.clone();
        }
        if let Some(count) = self.full_count {
            config.full_scrape_count = count;
        }
        if let Some(mode) = self.image_mode {
            config.image_mode = mode;
        }
        if self.no_decode {
            config.decode_urls = false;
        }
        if let Some(workers) = self.workers {
            config.worker_pool_size = workers;
        }
        if let Some(secs) = self.deadline_secs {
            config.run_deadline = Some(Duration::from_secs(secs));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::parse_from([
            "news_pipeline",
            "--input",
            "./listing.json",
            "--output-dir",
            "./out",
        ]);

        assert_eq!(cli.input, PathBuf::from("./listing.json"));
        assert_eq!(cli.output_dir, Some(PathBuf::from("./out")));
        assert_eq!(cli.format, vec![OutputFormat::Json]);
        assert!(!cli.no_decode);
    }

    #[test]
    fn test_cli_short_flags() {
        let cli = Cli::parse_from([
            "news_pipeline",
            "-i",
            "/tmp/in.json",
            "-w",
            "5",
            "-f",
            "csv,markdown",
        ]);

        assert_eq!(cli.input, PathBuf::from("/tmp/in.json"));
        assert_eq!(cli.workers, Some(5));
        assert!(cli.wants(OutputFormat::Csv));
        assert!(cli.wants(OutputFormat::Markdown));
        assert!(!cli.wants(OutputFormat::Json));
    }

    #[test]
    fn test_overrides_replace_only_given_fields() {
        let cli = Cli::parse_from([
            "news_pipeline",
            "-i",
            "in.json",
            "--full-count",
            "12",
            "--image-mode",
            "download",
            "--no-decode",
            "--deadline-secs",
            "90",
        ]);
        let mut config = PipelineConfig::default();
        cli.apply_overrides(&mut config);

        assert_eq!(config.full_scrape_count, 12);
        assert_eq!(config.image_mode, ImageMode::Download);
        assert!(!config.decode_urls);
        assert_eq!(config.run_deadline, Some(Duration::from_secs(90)));
        assert_eq!(config.worker_pool_size, PipelineConfig::default().worker_pool_size);
        assert_eq!(config.output_dir, PipelineConfig::default().output_dir);
    }
}
