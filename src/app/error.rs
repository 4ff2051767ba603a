use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum KeepsakeError {
    #[error("Not signed in")]
    Unauthenticated,

    #[error("Favorite already exists for property {property_id}")]
    Conflict { property_id: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Stale response discarded")]
    StaleResponse,

    #[error("Backend error ({status}): {message}")]
    Backend {
        status: u16,
        code: Option<String>,
        message: String,
    },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Controller has been disposed")]
    Disposed,

    #[error("{0}")]
    Other(String),
}

impl KeepsakeError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, KeepsakeError::Conflict { .. })
    }

    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            KeepsakeError::Network(_) | KeepsakeError::Timeout(_) => true,
            KeepsakeError::Http(e) => e.is_timeout() || e.is_connect(),
            KeepsakeError::Backend { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Fold any backend failure into the generic network error that
    /// controllers report; the original message is kept.
    pub fn into_transient(self) -> Self {
        match self {
            KeepsakeError::Unauthenticated
            | KeepsakeError::Conflict { .. }
            | KeepsakeError::Network(_)
            | KeepsakeError::StaleResponse
            | KeepsakeError::Disposed => self,
            other => KeepsakeError::Network(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, KeepsakeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_into_transient_keeps_message() {
        let err = KeepsakeError::Backend {
            status: 500,
            code: None,
            message: "boom".into(),
        };
        match err.into_transient() {
            KeepsakeError::Network(msg) => assert!(msg.contains("boom")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_conflict_is_not_folded() {
        let err = KeepsakeError::Conflict {
            property_id: "p1".into(),
        };
        assert!(err.into_transient().is_conflict());
    }

    #[test]
    fn test_transient_classification() {
        assert!(KeepsakeError::Timeout(Duration::from_secs(1)).is_transient());
        assert!(KeepsakeError::Backend {
            status: 503,
            code: None,
            message: String::new()
        }
        .is_transient());
        assert!(!KeepsakeError::Backend {
            status: 403,
            code: None,
            message: String::new()
        }
        .is_transient());
        assert!(!KeepsakeError::Unauthenticated.is_transient());
    }

    #[tokio::test]
    async fn test_malformed_request_is_not_transient() {
        let err = reqwest::Client::new().get("not a url").build().unwrap_err();
        assert!(!KeepsakeError::from(err).is_transient());
    }
}
