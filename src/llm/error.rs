//! Provider error taxonomy.
//!
//! Every failure mode of a provider call collapses into [`ProviderError`].
//! The fallback chain treats all of them the same way (advance to the next
//! provider in auto mode, terminal in explicit mode); the kind is kept for
//! logging and the call ledger's error messages.

use std::time::Duration;

use thiserror::Error;

/// Coarse classification of a provider failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    /// 429 or an explicit quota message.
    RateLimited,
    /// 5xx from the provider.
    ServerError,
    /// Other 4xx (bad request, auth rejected upstream).
    ClientError,
    /// Connection-level failure.
    Network,
    /// The request exceeded its deadline.
    Timeout,
    /// Response body did not contain a usable news payload.
    Parse,
    /// No credential configured for the provider.
    MissingKey,
}

impl std::fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ProviderErrorKind::RateLimited => "rate_limited",
            ProviderErrorKind::ServerError => "server_error",
            ProviderErrorKind::ClientError => "client_error",
            ProviderErrorKind::Network => "network",
            ProviderErrorKind::Timeout => "timeout",
            ProviderErrorKind::Parse => "parse",
            ProviderErrorKind::MissingKey => "missing_key",
        };
        f.write_str(s)
    }
}

/// Error returned by a provider client.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("rate limited: {message}")]
    RateLimited { message: String },

    #[error("server error {status}: {message}")]
    Server { status: u16, message: String },

    #[error("client error {status}: {message}")]
    Client { status: u16, message: String },

    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("malformed response: {0}")]
    Parse(String),

    #[error("API key not configured")]
    MissingKey,
}

impl ProviderError {
    pub fn kind(&self) -> ProviderErrorKind {
        match self {
            ProviderError::RateLimited { .. } => ProviderErrorKind::RateLimited,
            ProviderError::Server { .. } => ProviderErrorKind::ServerError,
            ProviderError::Client { .. } => ProviderErrorKind::ClientError,
            ProviderError::Network(_) => ProviderErrorKind::Network,
            ProviderError::Timeout(_) => ProviderErrorKind::Timeout,
            ProviderError::Parse(_) => ProviderErrorKind::Parse,
            ProviderError::MissingKey => ProviderErrorKind::MissingKey,
        }
    }

    /// Build an error from a non-success HTTP response.
    pub fn from_status(status: u16, body: &str) -> Self {
        // Bodies can be huge HTML error pages; keep the ledger readable.
        let message = truncate(body, 500);
        match classify_http_status(status) {
            ProviderErrorKind::RateLimited => ProviderError::RateLimited { message },
            ProviderErrorKind::ServerError => ProviderError::Server { status, message },
            _ => ProviderError::Client { status, message },
        }
    }

    /// Build an error from a reqwest transport failure.
    pub fn from_transport(err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            ProviderError::Timeout(timeout)
        } else if err.is_connect() {
            ProviderError::Network(format!("connection failed: {err}"))
        } else {
            ProviderError::Network(format!("request failed: {err}"))
        }
    }
}

/// Map an HTTP status code onto an error kind.
pub fn classify_http_status(status: u16) -> ProviderErrorKind {
    match status {
        429 => ProviderErrorKind::RateLimited,
        500..=599 => ProviderErrorKind::ServerError,
        400..=499 => ProviderErrorKind::ClientError,
        _ => ProviderErrorKind::ServerError,
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &s[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classification() {
        assert_eq!(classify_http_status(429), ProviderErrorKind::RateLimited);
        assert_eq!(classify_http_status(503), ProviderErrorKind::ServerError);
        assert_eq!(classify_http_status(401), ProviderErrorKind::ClientError);
        assert_eq!(classify_http_status(404), ProviderErrorKind::ClientError);
        assert_eq!(classify_http_status(302), ProviderErrorKind::ServerError);
    }

    #[test]
    fn from_status_builds_matching_variant() {
        assert_eq!(
            ProviderError::from_status(429, "slow down").kind(),
            ProviderErrorKind::RateLimited
        );
        assert_eq!(
            ProviderError::from_status(500, "boom").kind(),
            ProviderErrorKind::ServerError
        );
        assert_eq!(
            ProviderError::from_status(400, "bad").kind(),
            ProviderErrorKind::ClientError
        );
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        let s = "привет".repeat(100);
        let err = ProviderError::from_status(500, &s);
        let ProviderError::Server { message, .. } = err else {
            panic!("expected server error");
        };
        assert!(message.len() <= 504);
        assert!(message.ends_with('…'));
    }
}
