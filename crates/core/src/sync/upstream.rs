//! Contract between the sync engine and the upstream wellness API transport.

use std::collections::BTreeSet;

use async_trait::async_trait;
use serde::Serialize;

use super::window_planner::SyncWindow;
use crate::health::DatasetKey;

/// Bearer token plus the permission scopes granted to it.
///
/// Owned by the caller for a single sync attempt and never persisted.
#[derive(Clone, PartialEq, Eq)]
pub struct UpstreamCredential {
    token: String,
    scopes: BTreeSet<String>,
}

impl UpstreamCredential {
    pub fn new(token: impl Into<String>, scopes: impl IntoIterator<Item = String>) -> Self {
        Self {
            token: token.into(),
            scopes: scopes
                .into_iter()
                .map(|s| s.trim().to_ascii_uppercase())
                .filter(|s| !s.is_empty())
                .collect(),
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn scopes(&self) -> impl Iterator<Item = &str> {
        self.scopes.iter().map(String::as_str)
    }

    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.contains(&scope.to_ascii_uppercase())
    }
}

impl std::fmt::Debug for UpstreamCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamCredential")
            .field("token", &"<redacted>")
            .field("scopes", &self.scopes)
            .finish()
    }
}

/// Non-2xx upstream response, body preserved for classification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpstreamFailure {
    pub dataset_source: String,
    pub http_status: u16,
    pub raw_body: String,
    pub request_path: String,
}

/// Failure of a single upstream call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpstreamCallError {
    /// Upstream answered with a non-success status.
    Status(UpstreamFailure),
    /// The request never produced a response (connect, timeout, body read).
    Transport(String),
}

impl std::fmt::Display for UpstreamCallError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Status(failure) => write!(
                f,
                "{} responded {} on {}",
                failure.dataset_source, failure.http_status, failure.request_path
            ),
            Self::Transport(message) => write!(f, "transport error: {}", message),
        }
    }
}

/// Transport for the upstream wellness API. One call per window; the
/// implementation builds the mode-specific query parameters.
#[async_trait]
pub trait WellnessUpstream: Send + Sync {
    /// Rows for one dataset and window. Empty or non-array bodies yield an empty list.
    async fn fetch_window(
        &self,
        credential: &UpstreamCredential,
        dataset: DatasetKey,
        window: &SyncWindow,
    ) -> Result<Vec<serde_json::Value>, UpstreamCallError>;

    /// Permission scopes granted to the token.
    async fn fetch_permissions(&self, token: &str) -> Result<Vec<String>, UpstreamCallError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credential_scopes_are_normalized() {
        let credential = UpstreamCredential::new(
            "tok",
            vec![" historical_data_export ".to_string(), String::new()],
        );
        assert!(credential.has_scope("HISTORICAL_DATA_EXPORT"));
        assert!(credential.has_scope("historical_data_export"));
        assert_eq!(credential.scopes().count(), 1);
    }

    #[test]
    fn credential_debug_redacts_token() {
        let credential = UpstreamCredential::new("super-secret", Vec::new());
        assert!(!format!("{:?}", credential).contains("super-secret"));
    }
}
