//! Local decoding of redirect links, without touching the network.
//!
//! Two link shapes can be decoded offline:
//!
//! - links that carry the destination in a `url`, `q`, or `u` query parameter
//! - old-style article ids, whose base64 payload is a small protobuf message
//!   with the destination URL stored as a length-prefixed string field
//!
//! ```text
//! 08 13 22 <varint len> <url bytes ...> [d2 01 00]
//! ```
//!
//! Newer ids (those containing the `AU_yqL` marker) are opaque and only the
//! batch decoder or a real navigation can resolve them.

use super::{ResolveStrategy, article_id, decode_article_id};
use crate::error::{PipelineError, Result};
use crate::models::ResolveMethod;
use async_trait::async_trait;
use tracing::debug;
use url::Url;

const OLD_STYLE_PREFIX: [u8; 3] = [0x08, 0x13, 0x22];
const NEW_STYLE_MARKER: &[u8] = b"AU_yqL";

pub struct CustomResolver;

#[async_trait]
impl ResolveStrategy for CustomResolver {
    fn method(&self) -> ResolveMethod {
        ResolveMethod::CustomResolver
    }

    async fn attempt(&self, redirect_link: &str) -> Result<String> {
        decode_locally(redirect_link)
    }
}

/// Decode `redirect_link` into the destination URL, if its shape allows.
pub fn decode_locally(redirect_link: &str) -> Result<String> {
    let link = Url::parse(redirect_link)
        .map_err(|e| PipelineError::MalformedInput(format!("redirect link: {e}")))?;

    if let Some(target) = query_target(&link) {
        debug!("Destination carried in query string");
        return Ok(target);
    }

    let id = article_id(&link)
        .ok_or_else(|| PipelineError::MalformedInput("redirect link has no article id".into()))?;
    let bytes = decode_article_id(&id)
        .ok_or_else(|| PipelineError::MalformedInput("article id is not base64".into()))?;

    if contains(&bytes, NEW_STYLE_MARKER) {
        return Err(PipelineError::MalformedInput(
            "new-style article id cannot be decoded locally".into(),
        ));
    }
    old_style_url(&bytes)
        .ok_or_else(|| PipelineError::MalformedInput("article id carries no url".into()))
}

fn query_target(link: &Url) -> Option<String> {
    link.query_pairs()
        .find(|(key, value)| {
            matches!(key.as_ref(), "url" | "q" | "u")
                && (value.starts_with("http://") || value.starts_with("https://"))
        })
        .map(|(_, value)| value.into_owned())
}

/// Pull the URL field out of an old-style id payload.
fn old_style_url(bytes: &[u8]) -> Option<String> {
    if let Some(rest) = bytes.strip_prefix(&OLD_STYLE_PREFIX)
        && let Some((len, header)) = read_varint(rest)
    {
        let body = &rest[header..];
        let len = usize::try_from(len).ok()?;
        if len <= body.len() {
            let url = std::str::from_utf8(&body[..len]).ok()?;
            if url.starts_with("http") {
                return Some(url.to_string());
            }
        }
    }
    scan_for_url(bytes)
}

/// Fallback for payloads with an unexpected header: take the first run of
/// URL-safe bytes starting at `http`.
fn scan_for_url(bytes: &[u8]) -> Option<String> {
    let start = bytes.windows(4).position(|w| w == b"http")?;
    let end = bytes[start..]
        .iter()
        .position(|&b| !(b.is_ascii_graphic()))
        .map_or(bytes.len(), |n| start + n);
    let candidate = std::str::from_utf8(&bytes[start..end]).ok()?;
    Url::parse(candidate).ok().map(|_| candidate.to_string())
}

/// Protobuf base-128 varint. Returns the value and how many bytes it took.
fn read_varint(bytes: &[u8]) -> Option<(u64, usize)> {
    let mut value = 0u64;
    for (i, &byte) in bytes.iter().enumerate().take(10) {
        value |= u64::from(byte & 0x7f) << (7 * i);
        if byte & 0x80 == 0 {
            return Some((value, i + 1));
        }
    }
    None
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}
