//! Image acquisition.
//!
//! [`ImageAcquirer`] downloads an article's representative image and stores
//! it under the output directory. Downloads run behind the network retry
//! policy and a circuit breaker keyed by the image host; the disk write runs
//! behind the file policy.
//!
//! A response is only written if it is a non-empty image below the size
//! ceiling. Anything else is [`PipelineError::InvalidContent`], which is
//! never retried.
//!
//! # File Naming
//!
//! ```text
//! <dest_dir>/<stem>.<ext>
//! ```
//!
//! The extension comes from the content type, then the URL path, then
//! defaults to `jpg`.

use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::http::{BinarySource, FetchedBytes};
use crate::resilience::{BreakerRegistry, RetryPolicy, RunScope, guarded};
use crate::utils::host_of;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, instrument};
use url::Url;

const KNOWN_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp", "svg", "avif", "bmp", "ico"];

pub struct ImageAcquirer {
    source: Arc<dyn BinarySource>,
    breakers: Arc<BreakerRegistry>,
    network: RetryPolicy,
    file: RetryPolicy,
    max_bytes: u64,
}

impl ImageAcquirer {
    pub fn new(
        source: Arc<dyn BinarySource>,
        breakers: Arc<BreakerRegistry>,
        network: RetryPolicy,
        file: RetryPolicy,
        max_bytes: u64,
    ) -> Self {
        Self {
            source,
            breakers,
            network,
            file,
            max_bytes,
        }
    }

    pub fn standard(
        source: Arc<dyn BinarySource>,
        config: &PipelineConfig,
        breakers: Arc<BreakerRegistry>,
    ) -> Self {
        Self::new(
            source,
            breakers,
            RetryPolicy::network(&config.retry),
            RetryPolicy::file(),
            config.images.max_image_bytes,
        )
    }

    /// Download `image_url` and save it as `dest_dir/<stem>.<ext>`.
    #[instrument(level = "info", skip_all, fields(url = %image_url))]
    pub async fn acquire(
        &self,
        image_url: &str,
        dest_dir: &Path,
        stem: &str,
        scope: &RunScope,
    ) -> Result<PathBuf> {
        let parsed = Url::parse(image_url)
            .map_err(|e| PipelineError::MalformedInput(format!("image url: {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(PipelineError::MalformedInput(format!(
                "image url has scheme {}",
                parsed.scheme()
            )));
        }
        let host = host_of(image_url).unwrap_or_else(|| image_url.to_string());
        let breaker = self.breakers.get(&host);

        let fetched = guarded(&breaker, &self.network, scope, || async move {
            let fetched = self.source.fetch_bytes(image_url, self.max_bytes).await?;
            validate(&fetched, self.max_bytes)?;
            Ok(fetched)
        })
        .await?;

        let ext = extension_for(fetched.content_type.as_deref(), &parsed);
        let path = dest_dir.join(format!("{stem}.{ext}"));
        let (target, bytes) = (&path, &fetched.bytes);
        self.file
            .execute(|| async move {
                tokio::fs::create_dir_all(dest_dir).await?;
                tokio::fs::write(target, bytes).await?;
                Ok(())
            })
            .await?;

        info!(path = %path.display(), bytes = fetched.bytes.len(), "Saved image");
        Ok(path)
    }
}

/// Reject anything that is not a non-empty image within the size limit.
pub fn validate(fetched: &FetchedBytes, max_bytes: u64) -> Result<()> {
    if fetched.bytes.is_empty() {
        return Err(PipelineError::InvalidContent("empty body".into()));
    }
    if fetched.bytes.len() as u64 > max_bytes {
        return Err(PipelineError::InvalidContent(format!(
            "{} bytes exceeds limit of {max_bytes}",
            fetched.bytes.len()
        )));
    }
    match fetched.content_type.as_deref().map(media_type) {
        Some(media) if media.starts_with("image/") => Ok(()),
        Some(media) => Err(PipelineError::InvalidContent(format!(
            "content type {media} is not an image"
        ))),
        None if sniff_extension(&fetched.bytes).is_some() => Ok(()),
        None => Err(PipelineError::InvalidContent(
            "no content type and unrecognised bytes".into(),
        )),
    }
}

fn media_type(content_type: &str) -> &str {
    content_type.split(';').next().unwrap_or_default().trim()
}

/// File extension for a saved image.
pub fn extension_for(content_type: Option<&str>, url: &Url) -> String {
    let from_type = content_type.map(media_type).and_then(|media| {
        let ext = match media.to_ascii_lowercase().as_str() {
            "image/jpeg" | "image/jpg" | "image/pjpeg" => "jpg",
            "image/png" => "png",
            "image/gif" => "gif",
            "image/webp" => "webp",
            "image/svg+xml" => "svg",
            "image/avif" => "avif",
            "image/bmp" => "bmp",
            "image/x-icon" | "image/vnd.microsoft.icon" => "ico",
            _ => return None,
        };
        Some(ext.to_string())
    });
    from_type
        .or_else(|| {
            Path::new(url.path())
                .extension()
                .and_then(|e| e.to_str())
                .map(str::to_ascii_lowercase)
                .filter(|e| KNOWN_EXTENSIONS.contains(&e.as_str()))
        })
        .unwrap_or_else(|| "jpg".to_string())
}

fn sniff_extension(bytes: &[u8]) -> Option<&'static str> {
    if bytes.starts_with(&[0xff, 0xd8, 0xff]) {
        Some("jpg")
    } else if bytes.starts_with(b"\x89PNG\r\n\x1a\n") {
        Some("png")
    } else if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
        Some("gif")
    } else if bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        Some("webp")
    } else {
        None
    }
}
