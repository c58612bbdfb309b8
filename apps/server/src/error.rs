use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::error;
use wellsync_core::health::HISTORICAL_DATA_EXPORT_PERMISSION;
use wellsync_core::errors::{Error as CoreError, UpstreamError, UpstreamErrorKind};

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Upstream(UpstreamError),
    #[error("Permission not granted: {}", .0.join(", "))]
    PermissionNotGranted(Vec<String>),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Internal(String),
}

/// Body of every failed response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureBody {
    pub success: bool,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required_permissions: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub needs_reauth: Option<bool>,
}

impl FailureBody {
    fn new(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: error.into(),
            source: None,
            detail: None,
            required_permissions: None,
            action: None,
            needs_reauth: None,
        }
    }

    fn action(mut self, action: &str) -> Self {
        self.action = Some(action.to_string());
        self
    }

    fn upstream(mut self, upstream: &UpstreamError) -> Self {
        self.source = Some(upstream.dataset_source.clone());
        self.detail = Some(upstream.summary.clone()).filter(|s| !s.is_empty());
        self
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::PermissionNotGranted(_) => StatusCode::FORBIDDEN,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Upstream(upstream) => match upstream.kind {
                UpstreamErrorKind::AuthExpired => StatusCode::UNAUTHORIZED,
                UpstreamErrorKind::NotProvisioned => StatusCode::FORBIDDEN,
                UpstreamErrorKind::InsufficientPermission => StatusCode::CONFLICT,
                UpstreamErrorKind::InvalidToken
                | UpstreamErrorKind::MissingTimeRange
                | UpstreamErrorKind::Unclassified => StatusCode::BAD_GATEWAY,
            },
        }
    }

    pub fn body(&self) -> FailureBody {
        match self {
            ApiError::BadRequest(message) | ApiError::Conflict(message) => {
                FailureBody::new(message.clone())
            }
            ApiError::Internal(message) => FailureBody::new(message.clone()),
            ApiError::Unauthorized(message) => FailureBody {
                needs_reauth: Some(true),
                ..FailureBody::new(message.clone()).action("reconnect")
            },
            ApiError::PermissionNotGranted(required) => FailureBody {
                required_permissions: Some(required.clone()),
                ..FailureBody::new("Permission not granted").action("grant_permission")
            },
            ApiError::Upstream(upstream) => match upstream.kind {
                UpstreamErrorKind::AuthExpired => FailureBody {
                    needs_reauth: Some(true),
                    ..FailureBody::new("Wearable authorization expired")
                        .upstream(upstream)
                        .action("reconnect")
                },
                UpstreamErrorKind::NotProvisioned => {
                    FailureBody::new("Endpoint is not enabled for this application")
                        .upstream(upstream)
                        .action("enable_endpoint")
                }
                UpstreamErrorKind::InsufficientPermission => FailureBody {
                    required_permissions: Some(vec![
                        HISTORICAL_DATA_EXPORT_PERMISSION.to_string()
                    ]),
                    ..FailureBody::new("Backfill requires historical data export")
                        .upstream(upstream)
                        .action("grant_permission")
                },
                _ => FailureBody::new("Upstream wellness API error")
                    .upstream(upstream)
                    .action("retry_later"),
            },
        }
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Upstream(upstream) => ApiError::Upstream(upstream),
            CoreError::MalformedInput(message) => ApiError::BadRequest(message),
            CoreError::PermissionNotGranted(required) => ApiError::PermissionNotGranted(required),
            CoreError::SyncInProgress(_) => ApiError::Conflict("sync already in progress".into()),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("[Wellness] {} {}", status, self);
        }
        (status, Json(self.body())).into_response()
    }
}
