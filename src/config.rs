//! Run configuration.
//!
//! [`PipelineConfig`] is loaded from an optional YAML file and then patched by
//! CLI overrides. Every field has a default so an empty file (or no file at
//! all) yields a working configuration.
//!
//! Durations accept either a bare number of seconds or a suffixed string:
//!
//! ```yaml
//! full_scrape_count: 10
//! image_mode: download
//! request_delay: 1500ms
//! run_deadline: 5m
//! retry:
//!   max_retries: 4
//!   base_delay: 1s
//! breaker:
//!   failure_threshold: 3
//!   recovery_timeout: 30s
//! ```

use crate::error::{PipelineError, Result};
use crate::models::ImageMode;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, instrument};

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// How many leading entries get full article extraction.
    pub full_scrape_count: usize,
    pub image_mode: ImageMode,
    pub decode_urls: bool,
    /// Try extraction on the redirect link itself when decoding failed.
    pub extract_from_redirect_link: bool,
    /// Fixed pause before every outbound call made for an entry.
    #[serde(with = "duration_serde")]
    pub request_delay: Duration,
    /// Per-call timeout; a hung call counts as one retryable failure.
    #[serde(with = "duration_serde")]
    pub request_timeout: Duration,
    pub worker_pool_size: usize,
    #[serde(with = "optional_duration_serde")]
    pub run_deadline: Option<Duration>,
    pub output_dir: PathBuf,
    pub retry: RetrySettings,
    pub breaker: BreakerSettings,
    pub extraction: ExtractionSettings,
    pub images: ImageSettings,
    pub decoder: DecoderSettings,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            full_scrape_count: 5,
            image_mode: ImageMode::UrlOnly,
            decode_urls: true,
            extract_from_redirect_link: true,
            request_delay: Duration::from_secs(2),
            request_timeout: Duration::from_secs(30),
            worker_pool_size: 3,
            run_deadline: None,
            output_dir: PathBuf::from("data"),
            retry: RetrySettings::default(),
            breaker: BreakerSettings::default(),
            extraction: ExtractionSettings::default(),
            images: ImageSettings::default(),
            decoder: DecoderSettings::default(),
        }
    }
}

/// Tuning for the network retry policy.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_retries: u32,
    #[serde(with = "duration_serde")]
    pub base_delay: Duration,
    #[serde(with = "duration_serde")]
    pub max_delay: Duration,
    /// Delays are scaled by a uniform factor in `1 ± jitter_fraction`.
    pub jitter_fraction: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            jitter_fraction: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct BreakerSettings {
    pub failure_threshold: u32,
    #[serde(with = "duration_serde")]
    pub recovery_timeout: Duration,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(60),
        }
    }
}

/// Thresholds applied by the text cleaner.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ExtractionSettings {
    /// Minimum cleaned words for structured and readability output.
    pub min_article_words: usize,
    /// Minimum cleaned words for the heuristic fallback.
    pub min_heuristic_words: usize,
    /// Lines with fewer words than this are dropped as navigation.
    pub min_block_words: usize,
}

impl Default for ExtractionSettings {
    fn default() -> Self {
        Self {
            min_article_words: 100,
            min_heuristic_words: 50,
            min_block_words: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ImageSettings {
    pub max_image_bytes: u64,
}

impl Default for ImageSettings {
    fn default() -> Self {
        Self {
            max_image_bytes: 10 * 1024 * 1024,
        }
    }
}

/// Where the batch decoding service lives.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DecoderSettings {
    pub base_url: String,
}

impl Default for DecoderSettings {
    fn default() -> Self {
        Self {
            base_url: "https://news.google.com".to_string(),
        }
    }
}

impl PipelineConfig {
    /// Load a YAML config file.
    #[instrument(level = "info", skip_all, fields(path = %path.display()))]
    pub async fn load(path: &Path) -> Result<Self> {
        let raw = tokio::fs::read_to_string(path).await?;
        let config = Self::from_yaml(&raw)?;
        info!("Loaded pipeline configuration");
        Ok(config)
    }

    pub fn from_yaml(raw: &str) -> Result<Self> {
        // An empty document deserializes to unit, not a map.
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self = serde_yaml::from_str(raw)
            .map_err(|e| PipelineError::MalformedInput(format!("config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.worker_pool_size == 0 {
            return Err(PipelineError::MalformedInput(
                "config: worker_pool_size must be at least 1".into(),
            ));
        }
        if self.breaker.failure_threshold == 0 {
            return Err(PipelineError::MalformedInput(
                "config: breaker.failure_threshold must be at least 1".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.retry.jitter_fraction) {
            return Err(PipelineError::MalformedInput(
                "config: retry.jitter_fraction must be within 0.0..=1.0".into(),
            ));
        }
        if self.retry.base_delay > self.retry.max_delay {
            return Err(PipelineError::MalformedInput(
                "config: retry.base_delay exceeds retry.max_delay".into(),
            ));
        }
        Ok(())
    }
}

/// Parse `"250ms"`, `"2s"`, `"5m"`, `"1h"`, or a bare number of seconds.
pub fn parse_duration(raw: &str) -> Option<Duration> {
    let raw = raw.trim();
    let split = raw
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(raw.len());
    let (number, unit) = raw.split_at(split);
    let value: f64 = number.parse().ok()?;
    if value < 0.0 {
        return None;
    }
    let secs = match unit.trim() {
        "" | "s" => value,
        "ms" => value / 1000.0,
        "m" => value * 60.0,
        "h" => value * 3600.0,
        _ => return None,
    };
    Some(Duration::from_secs_f64(secs))
}

fn format_duration(duration: &Duration) -> String {
    if duration.subsec_millis() == 0 {
        format!("{}s", duration.as_secs())
    } else {
        format!("{}ms", duration.as_millis())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawDuration {
    Seconds(u64),
    Text(String),
}

impl RawDuration {
    fn into_duration<E: serde::de::Error>(self) -> std::result::Result<Duration, E> {
        match self {
            RawDuration::Seconds(secs) => Ok(Duration::from_secs(secs)),
            RawDuration::Text(text) => parse_duration(&text)
                .ok_or_else(|| E::custom(format!("invalid duration: {text:?}"))),
        }
    }
}

mod duration_serde {
    use super::{RawDuration, format_duration};
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format_duration(duration))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        RawDuration::deserialize(deserializer)?.into_duration()
    }
}

mod optional_duration_serde {
    use super::{RawDuration, format_duration};
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => serializer.serialize_some(&format_duration(d)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<RawDuration>::deserialize(deserializer)? {
            Some(raw) => raw.into_duration().map(Some),
            None => Ok(None),
        }
    }
}
