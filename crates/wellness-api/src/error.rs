//! Error types for the wellness API client.

use thiserror::Error;
use wellsync_core::sync::{UpstreamCallError, UpstreamFailure};

/// Result type alias for wellness API operations.
pub type Result<T> = std::result::Result<T, WellnessApiError>;

/// Errors raised while talking to the wellness API.
#[derive(Debug, Error)]
pub enum WellnessApiError {
    /// Transport failure (connect, timeout, body read)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Non-2xx response; the body is kept verbatim for classification.
    #[error("API error ({status}) on {path}")]
    Api {
        status: u16,
        path: String,
        dataset_source: String,
        body: String,
    },

    /// Bearer token could not be encoded as a header value.
    #[error("Authentication error: {0}")]
    Auth(String),
}

impl WellnessApiError {
    pub fn api(
        status: u16,
        path: impl Into<String>,
        dataset_source: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self::Api {
            status,
            path: path.into(),
            dataset_source: dataset_source.into(),
            body: body.into(),
        }
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth(message.into())
    }

    /// HTTP status if this is an API error.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<WellnessApiError> for UpstreamCallError {
    fn from(err: WellnessApiError) -> Self {
        match err {
            WellnessApiError::Api {
                status,
                path,
                dataset_source,
                body,
            } => UpstreamCallError::Status(UpstreamFailure {
                dataset_source,
                http_status: status,
                raw_body: body,
                request_path: path,
            }),
            // A token that cannot be sent is treated like one the API rejected.
            WellnessApiError::Auth(message) => UpstreamCallError::Status(UpstreamFailure {
                dataset_source: String::new(),
                http_status: 401,
                raw_body: message,
                request_path: String::new(),
            }),
            other => UpstreamCallError::Transport(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_error_keeps_body_for_classification() {
        let err = WellnessApiError::api(
            400,
            "/wellness-api/rest/sleeps",
            "sleeps",
            "InvalidPullTokenException",
        );
        assert_eq!(err.status_code(), Some(400));

        match UpstreamCallError::from(err) {
            UpstreamCallError::Status(failure) => {
                assert_eq!(failure.http_status, 400);
                assert_eq!(failure.raw_body, "InvalidPullTokenException");
                assert_eq!(failure.request_path, "/wellness-api/rest/sleeps");
                assert_eq!(failure.dataset_source, "sleeps");
            }
            other => panic!("expected status error, got {:?}", other),
        }
    }

    #[test]
    fn unencodable_token_maps_to_unauthorized() {
        let err = WellnessApiError::auth("Invalid access token format");
        assert_eq!(err.status_code(), None);
        assert!(matches!(
            UpstreamCallError::from(err),
            UpstreamCallError::Status(UpstreamFailure {
                http_status: 401,
                ..
            })
        ));
    }
}
