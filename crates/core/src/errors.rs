//! Error types shared across the wellsync crates.

use serde::Serialize;
use thiserror::Error;

/// Result type alias used by core services and repository traits.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error for wellness sync operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Classified failure reported by the upstream wellness API.
    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    /// Local store unreachable or write failed.
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// Required input (user id, credential, dataset key) missing or invalid.
    #[error("Malformed input: {0}")]
    MalformedInput(String),

    /// The token lacks a scope the requested dataset needs.
    #[error("Permission not granted: {}", .0.join(", "))]
    PermissionNotGranted(Vec<String>),

    /// Another sync pass for the same user's device is already running.
    #[error("Sync already in progress for user {0}")]
    SyncInProgress(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

impl Error {
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedInput(message.into())
    }

    /// True when the error means the user has to reconnect the wearable account.
    pub fn needs_reauth(&self) -> bool {
        matches!(
            self,
            Self::Upstream(UpstreamError {
                kind: UpstreamErrorKind::AuthExpired,
                ..
            })
        )
    }
}

/// Store-level failures.
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Internal database error: {0}")]
    Internal(String),
}

/// Sub-kind of an upstream failure after classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum UpstreamErrorKind {
    AuthExpired,
    InvalidToken,
    MissingTimeRange,
    NotProvisioned,
    InsufficientPermission,
    Unclassified,
}

impl UpstreamErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthExpired => "auth_expired",
            Self::InvalidToken => "invalid_token",
            Self::MissingTimeRange => "missing_time_range",
            Self::NotProvisioned => "not_provisioned",
            Self::InsufficientPermission => "insufficient_permission",
            Self::Unclassified => "unclassified",
        }
    }
}

/// Upstream failure carrying enough detail for the caller to decide whether to
/// prompt a reconnect, wait, or contact support.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamError {
    pub kind: UpstreamErrorKind,
    pub http_status: Option<u16>,
    pub dataset_source: String,
    pub summary: String,
}

impl std::fmt::Display for UpstreamError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.http_status {
            Some(status) => write!(
                f,
                "Upstream {} error ({}) from {}: {}",
                self.kind.as_str(),
                status,
                self.dataset_source,
                self.summary
            ),
            None => write!(
                f,
                "Upstream {} error from {}: {}",
                self.kind.as_str(),
                self.dataset_source,
                self.summary
            ),
        }
    }
}

impl std::error::Error for UpstreamError {}

impl UpstreamError {
    pub fn new(
        kind: UpstreamErrorKind,
        http_status: Option<u16>,
        dataset_source: impl Into<String>,
        summary: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            http_status,
            dataset_source: dataset_source.into(),
            summary: summary.into(),
        }
    }
}
