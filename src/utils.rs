//! Utility functions for string manipulation, URLs, and file system checks.
//!
//! This module provides helper functions used throughout the application:
//! - String truncation for log fields
//! - Slugification of titles for file names
//! - Host extraction for circuit-breaker keys
//! - File system validation for output directories

use std::fs as stdfs;
use std::path::Path;
use tokio::fs;
use tracing::{info, instrument};
use url::Url;

/// Truncate a string for logging purposes.
///
/// Long strings are truncated to `max` characters with an ellipsis and
/// byte count indicator appended. Truncation never splits a character.
///
/// # Arguments
///
/// * `s` - The string to potentially truncate
/// * `max` - Maximum number of characters to keep
///
/// # Returns
///
/// The original string if it has at most `max` characters, otherwise a
/// truncated version with `"…(+N bytes)"` appended.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(truncate_for_log("short", 100), "short");
/// assert_eq!(truncate_for_log("a".repeat(500), 10), "aaaaaaaaaa…(+490 bytes)");
/// ```
pub fn truncate_for_log(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        None => s.to_string(),
        Some((cut, _)) => format!("{}…(+{} bytes)", &s[..cut], s.len() - cut),
    }
}

/// Convert a title to a file-name-safe slug.
///
/// Lowercases the text, drops anything that is not alphanumeric, and joins
/// the remaining words with hyphens. The result is capped at `max_chars`
/// characters and never ends with a hyphen. An empty result becomes
/// `"untitled"`.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(slugify_title("Hello World", 60), "hello-world");
/// assert_eq!(slugify_title("Test-Article!", 60), "test-article");
/// ```
pub fn slugify_title(title: &str, max_chars: usize) -> String {
    let slug = title
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect::<Vec<_>>()
        .join("-");
    let capped: String = slug.chars().take(max_chars).collect();
    let capped = capped.trim_end_matches('-');
    if capped.is_empty() {
        "untitled".to_string()
    } else {
        capped.to_string()
    }
}

/// The lowercase host of `url`, without a `www.` prefix.
///
/// Used as the circuit-breaker key for per-publisher stages.
pub fn host_of(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?.to_ascii_lowercase();
    Some(host.strip_prefix("www.").map(str::to_string).unwrap_or(host))
}

/// Ensure a directory exists and is writable.
///
/// This function creates the directory if it doesn't exist, then performs
/// a write test by creating and immediately deleting a probe file.
///
/// # Errors
///
/// Returns an error if:
/// - The directory cannot be created
/// - The directory is not writable (permission denied, read-only filesystem, etc.)
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn ensure_writable_dir(path: &Path) -> std::io::Result<()> {
    fs::create_dir_all(path).await?;
    // A small sync write has the simplest error surface.
    let probe_path = path.join("..__probe_write__");
    stdfs::File::create(&probe_path)?;
    let _ = stdfs::remove_file(&probe_path);
    info!("Output directory is writable");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_for_log_short_string() {
        let s = "Hello, world!";
        assert_eq!(truncate_for_log(s, 100), "Hello, world!");
    }

    #[test]
    fn test_truncate_for_log_long_string() {
        let s = "a".repeat(500);
        let result = truncate_for_log(&s, 100);
        assert!(result.starts_with(&"a".repeat(100)));
        assert!(result.contains("…(+400 bytes)"));
    }

    #[test]
    fn test_truncate_for_log_multibyte() {
        let result = truncate_for_log("héllo wörld", 2);
        assert!(result.starts_with("hé…"));
    }

    #[test]
    fn test_slugify_title() {
        assert_eq!(slugify_title("Hello World", 60), "hello-world");
        assert_eq!(slugify_title("Test-Article!", 60), "test-article");
        assert_eq!(slugify_title("Multiple   Spaces", 60), "multiple-spaces");
        assert_eq!(slugify_title("Special@#$Characters", 60), "special-characters");
        assert_eq!(
            slugify_title("Trump-Xi 'situationship'", 60),
            "trump-xi-situationship"
        );
        assert_eq!(slugify_title("Long headline here", 6), "long-h");
        assert_eq!(slugify_title("Long headline", 5), "long");
        assert_eq!(slugify_title("!!!", 60), "untitled");
    }

    #[test]
    fn test_host_of() {
        assert_eq!(host_of("https://www.Example.com/a?b=c").as_deref(), Some("example.com"));
        assert_eq!(host_of("https://lite.cnn.com/x").as_deref(), Some("lite.cnn.com"));
        assert_eq!(host_of("not a url"), None);
    }

    #[tokio::test]
    async fn test_ensure_writable_dir_creates_nested() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a/b/c");
        ensure_writable_dir(&nested).await.unwrap();
        assert!(nested.is_dir());
        assert!(!nested.join("..__probe_write__").exists());
    }
}
