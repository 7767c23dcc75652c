use std::time::Duration;

use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("request failed after {attempts} attempt(s): {source}")]
    Exhausted {
        attempts: u32,
        #[source]
        source: Box<ApiError>,
    },

    #[error("rate limited by the translation server: {0}")]
    RateLimited(String),

    #[error("{url} does not accept this method (HTTP 405); the API base URL or endpoint is misconfigured")]
    MethodNotAllowed { url: String },

    #[error("refusing to call {url}: {host} is the static frontend host, not the translation API")]
    BlockedHost { url: String, host: String },

    #[error("invalid request URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("session handshake failed: {0}")]
    Session(String),

    #[error("unexpected response body: {0}")]
    Decode(String),

    #[error("failed to read response body: {0}")]
    Io(#[from] std::io::Error),
}

impl ApiError {
    /// Failures that a later attempt may not repeat.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ApiError::Network(_) | ApiError::Timeout(_) | ApiError::Session(_) | ApiError::Io(_)
        )
    }
}

/// Pulls a human-readable message out of an error body.
///
/// The server answers failures with `{"detail": ...}`; anything else falls back
/// to the raw text.
pub fn error_detail(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "no details provided".to_string();
    }

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        for key in ["detail", "error", "message"] {
            match value.get(key) {
                Some(Value::String(text)) => return text.clone(),
                Some(Value::Null) | None => continue,
                Some(other) => return other.to_string(),
            }
        }
    }

    trimmed.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detail_prefers_json_detail_field() {
        assert_eq!(error_detail(r#"{"detail":"Too many requests"}"#), "Too many requests");
        assert_eq!(error_detail(r#"{"error":"bad file"}"#), "bad file");
    }

    #[test]
    fn detail_falls_back_to_text() {
        assert_eq!(error_detail("  upstream exploded \n"), "upstream exploded");
        assert_eq!(error_detail(""), "no details provided");
    }

    #[test]
    fn structured_detail_is_rendered_as_json() {
        let detail = error_detail(r#"{"detail":[{"loc":["body","file"]}]}"#);
        assert!(detail.contains("loc"));
    }

    #[test]
    fn exhausted_names_attempts_and_cause() {
        let err = ApiError::Exhausted {
            attempts: 3,
            source: Box::new(ApiError::Timeout(Duration::from_secs(120))),
        };
        let message = err.to_string();
        assert!(message.contains("3 attempt"));
        assert!(message.contains("timed out after 120s"));
    }
}
