//! Raw HTTP retrieval for provider endpoints.
//!
//! [`HttpFetcher`] makes exactly one request per call. There are no in-call
//! retries: a failed fetch is reported to the circuit breaker, whose backoff
//! window decides when the next attempt happens. Every failure is reduced to
//! a [`FetchFailure`] carrying the HTTP status (when there was one) and a
//! readable reason.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;

/// Maximum length of the response body preview included in error logs.
const BODY_PREVIEW_LEN: usize = 300;

/// Errors that can occur while fetching a provider payload.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// Connection, timeout, or body read failure.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The provider answered with a non-success status.
    #[error("HTTP {status}: {reason}")]
    Status {
        /// Numeric status code.
        status: u16,
        /// Canonical reason phrase, or the status code when unknown.
        reason: String,
    },
}

impl FetchError {
    /// The HTTP status, if the provider answered at all.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http(e) => e.status().map(|s| s.as_u16()),
            Self::Status { status, .. } => Some(*status),
        }
    }

    /// Whether the request ran out of time.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Http(e) if e.is_timeout())
    }
}

/// A failed fetch (or unusable payload) as seen by the circuit breaker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchFailure {
    /// HTTP status code, when the provider answered.
    pub status: Option<u16>,
    /// Human-readable reason.
    pub reason: String,
}

impl FetchFailure {
    /// A failure with an explicit reason and no status.
    #[must_use]
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            status: None,
            reason: reason.into(),
        }
    }

    /// A failure described only by its HTTP status.
    #[must_use]
    pub fn from_status(status: u16) -> Self {
        Self {
            status: Some(status),
            reason: status_reason(status),
        }
    }

    /// The payload arrived but no adapter could make sense of it.
    #[must_use]
    pub fn unparseable() -> Self {
        Self::new("unparseable response")
    }
}

impl From<&FetchError> for FetchFailure {
    fn from(e: &FetchError) -> Self {
        match e {
            FetchError::Status { status, reason } => Self {
                status: Some(*status),
                reason: reason.clone(),
            },
            FetchError::Http(err) if err.is_timeout() => Self::new("request timed out"),
            FetchError::Http(err) if err.is_connect() => Self::new("connection failed"),
            FetchError::Http(err) => Self {
                status: err.status().map(|s| s.as_u16()),
                reason: err.to_string(),
            },
        }
    }
}

/// Readable text for an HTTP status: `"503 Service Unavailable"`.
#[must_use]
pub fn status_reason(status: u16) -> String {
    StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .map_or_else(|| format!("HTTP {status}"), |r| format!("{status} {r}"))
}

/// Something that can retrieve a raw provider payload.
#[async_trait]
pub trait RawFetcher: Send + Sync {
    /// Fetches `url` and returns the body text.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError`] if the request fails or the provider answers
    /// with a non-success status.
    async fn fetch(&self, url: &str) -> Result<String, FetchError>;
}

/// [`RawFetcher`] backed by a shared [`reqwest::Client`].
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Creates a fetcher whose requests time out after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Http`] if the TLS backend fails to initialize.
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("skyfeed/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl RawFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let preview: String = body.chars().take(BODY_PREVIEW_LEN).collect();
            log::warn!("HTTP {status} from {url}\n  body preview: {preview}");
            return Err(FetchError::Status {
                status: status.as_u16(),
                reason: status_reason(status.as_u16()),
            });
        }

        Ok(response.text().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reasons_come_from_status_codes() {
        assert_eq!(status_reason(503), "503 Service Unavailable");
        assert_eq!(status_reason(401), "401 Unauthorized");
        assert_eq!(status_reason(599), "HTTP 599");
    }

    #[test]
    fn status_error_converts_to_failure() {
        let err = FetchError::Status {
            status: 429,
            reason: status_reason(429),
        };
        assert_eq!(err.status(), Some(429));
        assert!(!err.is_timeout());
        let failure = FetchFailure::from(&err);
        assert_eq!(failure, FetchFailure::from_status(429));
        assert_eq!(failure.reason, "429 Too Many Requests");
    }

    #[test]
    fn unparseable_has_no_status() {
        let failure = FetchFailure::unparseable();
        assert_eq!(failure.status, None);
        assert_eq!(failure.reason, "unparseable response");
    }

    #[test]
    fn builds_client() {
        assert!(HttpFetcher::new(Duration::from_secs(5)).is_ok());
    }
}
