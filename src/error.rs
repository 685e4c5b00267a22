//! Error taxonomy shared by every pipeline stage.
//!
//! Stage failures never escape the orchestrator: they are classified here,
//! used by the retry policy and circuit breakers to decide what to do next,
//! and finally folded into status fields on the output record.

use std::fmt;
use std::io;
use thiserror::Error;

/// The pipeline stage an error belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Resolve,
    Extract,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Resolve => "url resolution",
            Stage::Extract => "article extraction",
        };
        f.write_str(s)
    }
}

/// Every failure a stage can produce.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Transient transport failure: connection reset, DNS, HTTP 429/5xx.
    #[error("network error: {0}")]
    Network(String),

    /// A single call ran past its per-call timeout.
    #[error("request timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// 401/403, other client errors, or a CAPTCHA/paywall signature match.
    #[error("blocked or unavailable: {0}")]
    BlockedOrUnavailable(String),

    /// The input does not carry what a strategy needs (e.g. no encoded id).
    #[error("malformed input: {0}")]
    MalformedInput(String),

    /// Every strategy in a chain failed or was gated off.
    #[error("all strategies exhausted for {stage}: {last}")]
    AllStrategiesExhausted { stage: Stage, last: String },

    /// Downloaded bytes are not an acceptable image.
    #[error("invalid content: {0}")]
    InvalidContent(String),

    /// The breaker for this key refused the call.
    #[error("circuit breaker open for {key}")]
    BreakerOpen { key: String },

    /// The run deadline passed or the run was cancelled.
    #[error("run cancelled before the call could start")]
    Cancelled,

    /// The response body could not be parsed.
    #[error("parse error: {0}")]
    Parse(String),

    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;

impl PipelineError {
    /// Retryable: timeouts, connection resets, HTTP 429/5xx.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PipelineError::Network(_) | PipelineError::Timeout(_))
    }

    /// Transient filesystem failures that are worth another attempt.
    pub fn is_transient_io(&self) -> bool {
        match self {
            PipelineError::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::Interrupted
                    | io::ErrorKind::WouldBlock
                    | io::ErrorKind::TimedOut
                    | io::ErrorKind::ResourceBusy
            ),
            _ => false,
        }
    }

    /// Whether this outcome should move a circuit breaker toward OPEN.
    ///
    /// Bad input says nothing about the health of the target, and the two
    /// short-circuit variants never reached it at all.
    pub fn counts_against_breaker(&self) -> bool {
        !matches!(
            self,
            PipelineError::MalformedInput(_)
                | PipelineError::BreakerOpen { .. }
                | PipelineError::Cancelled
        )
    }

    /// Classify an HTTP status that is not a success.
    pub fn from_status(status: reqwest::StatusCode, url: &str) -> Self {
        let code = status.as_u16();
        if code == 429 || status.is_server_error() {
            PipelineError::Network(format!("HTTP {code} from {url}"))
        } else {
            PipelineError::BlockedOrUnavailable(format!("HTTP {code} from {url}"))
        }
    }
}

impl From<reqwest::Error> for PipelineError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            let url = err.url().map(|u| u.as_str()).unwrap_or("<unknown>");
            return PipelineError::from_status(status, url);
        }
        if err.is_builder() {
            return PipelineError::MalformedInput(err.to_string());
        }
        if err.is_decode() {
            return PipelineError::Parse(err.to_string());
        }
        PipelineError::Network(err.to_string())
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        PipelineError::Parse(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn test_status_classification() {
        let too_many = PipelineError::from_status(StatusCode::TOO_MANY_REQUESTS, "u");
        assert!(too_many.is_retryable());

        let server = PipelineError::from_status(StatusCode::BAD_GATEWAY, "u");
        assert!(server.is_retryable());

        let forbidden = PipelineError::from_status(StatusCode::FORBIDDEN, "u");
        assert!(!forbidden.is_retryable());
        assert!(matches!(forbidden, PipelineError::BlockedOrUnavailable(_)));

        let missing = PipelineError::from_status(StatusCode::NOT_FOUND, "u");
        assert!(!missing.is_retryable());
    }

    #[test]
    fn test_breaker_accounting() {
        assert!(PipelineError::Network("reset".into()).counts_against_breaker());
        assert!(PipelineError::BlockedOrUnavailable("captcha".into()).counts_against_breaker());
        assert!(!PipelineError::MalformedInput("no id".into()).counts_against_breaker());
        assert!(!PipelineError::Cancelled.counts_against_breaker());
    }

    #[test]
    fn test_transient_io() {
        let busy = PipelineError::Io(io::Error::new(io::ErrorKind::Interrupted, "eintr"));
        assert!(busy.is_transient_io());
        let denied = PipelineError::Io(io::Error::new(io::ErrorKind::PermissionDenied, "ro"));
        assert!(!denied.is_transient_io());
    }

    #[test]
    fn test_exhausted_message_names_stage() {
        let err = PipelineError::AllStrategiesExhausted {
            stage: Stage::Extract,
            last: "heuristic: too short".into(),
        };
        assert_eq!(
            err.to_string(),
            "all strategies exhausted for article extraction: heuristic: too short"
        );
        assert_eq!(Stage::Resolve.to_string(), "url resolution");
    }
}
