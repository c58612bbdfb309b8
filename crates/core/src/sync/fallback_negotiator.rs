//! Two-mode fetch negotiation.
//!
//! ```text
//! TryPrimary  -> Done | TryFallback (retryable) | NeedsReauth (auth) | Failed
//! TryFallback -> Done | NotProvisioned | NeedsReauth (auth) | Failed
//! ```
//!
//! Entering `TryFallback` requires the historical-data-export scope; without
//! it the negotiation ends in `InsufficientPermission` and no fallback call
//! is made. Each mode runs at most once per negotiation.

use std::sync::Arc;

use log::{info, warn};
use serde::Serialize;
use serde_json::Value;

use super::error_classifier::{
    classify_failure, is_auth_error, is_not_provisioned, summarize_body, FailureClass,
};
use super::upstream::{
    UpstreamCallError, UpstreamCredential, UpstreamFailure, WellnessUpstream,
};
use super::upstream_fetcher::{fetch_range, WindowFailure};
use super::window_planner::{QueryMode, SyncRange, SyncWindow, DEFAULT_MAX_WINDOW_SECS};
use crate::errors::{UpstreamError, UpstreamErrorKind};
use crate::health::{collapse_rows, DatasetKey, HISTORICAL_DATA_EXPORT_PERMISSION};

/// Classified failure of one mode pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NegotiationFailure {
    pub dataset: DatasetKey,
    pub mode: QueryMode,
    pub class: FailureClass,
    pub http_status: Option<u16>,
    pub summary: String,
    pub window: Option<SyncWindow>,
}

impl NegotiationFailure {
    fn from_window_failure(dataset: DatasetKey, mode: QueryMode, failure: &WindowFailure) -> Self {
        match &failure.error {
            UpstreamCallError::Status(status) => {
                let class = match mode {
                    QueryMode::Primary => classify_failure(status),
                    QueryMode::Fallback => classify_fallback_failure(status),
                };
                Self {
                    dataset,
                    mode,
                    class,
                    http_status: Some(status.http_status),
                    summary: summarize_body(&status.raw_body),
                    window: Some(failure.window),
                }
            }
            UpstreamCallError::Transport(message) => Self {
                dataset,
                mode,
                class: FailureClass::Unclassified,
                http_status: None,
                summary: message.clone(),
                window: Some(failure.window),
            },
        }
    }

    pub fn to_upstream_error(&self) -> UpstreamError {
        UpstreamError::new(
            self.class.error_kind(),
            self.http_status,
            self.dataset.as_str(),
            self.summary.clone(),
        )
    }
}

/// Fallback failures are not retried, so only auth and provisioning
/// signatures matter there.
fn classify_fallback_failure(failure: &UpstreamFailure) -> FailureClass {
    if is_auth_error(failure.http_status, &failure.raw_body) {
        FailureClass::AuthError
    } else if is_not_provisioned(failure) {
        FailureClass::NotProvisioned
    } else {
        classify_failure(failure)
    }
}

/// Terminal state of a negotiation.
#[derive(Debug, Clone, PartialEq)]
pub enum NegotiationOutcome {
    Done {
        dataset: DatasetKey,
        rows: Vec<Value>,
        mode: QueryMode,
        windows_fetched: usize,
        /// Primary failure that triggered the fallback, when one happened.
        primary_failure: Option<NegotiationFailure>,
    },
    NeedsReauth(NegotiationFailure),
    NotProvisioned(NegotiationFailure),
    InsufficientPermission {
        required_permissions: Vec<String>,
        primary_failure: NegotiationFailure,
    },
    Failed(NegotiationFailure),
}

impl NegotiationOutcome {
    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done { .. })
    }

    pub fn needs_reauth(&self) -> bool {
        matches!(self, Self::NeedsReauth(_))
    }

    /// Upstream error for every non-`Done` outcome.
    pub fn error(&self) -> Option<UpstreamError> {
        match self {
            Self::Done { .. } => None,
            Self::NeedsReauth(failure) => Some(UpstreamError {
                kind: UpstreamErrorKind::AuthExpired,
                ..failure.to_upstream_error()
            }),
            Self::NotProvisioned(failure) => Some(UpstreamError {
                kind: UpstreamErrorKind::NotProvisioned,
                ..failure.to_upstream_error()
            }),
            Self::InsufficientPermission {
                required_permissions,
                primary_failure,
            } => Some(UpstreamError::new(
                UpstreamErrorKind::InsufficientPermission,
                primary_failure.http_status,
                primary_failure.dataset.as_str(),
                format!(
                    "Fallback requires permissions: {}",
                    required_permissions.join(", ")
                ),
            )),
            Self::Failed(failure) => Some(failure.to_upstream_error()),
        }
    }
}

enum NegotiationState {
    TryPrimary,
    TryFallback { primary_failure: NegotiationFailure },
}

/// Drives the primary and fallback query modes for one dataset.
#[derive(Clone)]
pub struct FallbackNegotiator {
    upstream: Arc<dyn WellnessUpstream>,
    max_window_seconds: i64,
}

impl FallbackNegotiator {
    pub fn new(upstream: Arc<dyn WellnessUpstream>) -> Self {
        Self {
            upstream,
            max_window_seconds: DEFAULT_MAX_WINDOW_SECS,
        }
    }

    pub fn with_max_window_seconds(mut self, max_window_seconds: i64) -> Self {
        self.max_window_seconds = max_window_seconds.max(1);
        self
    }

    pub async fn negotiate(
        &self,
        credential: &UpstreamCredential,
        dataset: DatasetKey,
        range: SyncRange,
    ) -> NegotiationOutcome {
        let mut state = NegotiationState::TryPrimary;

        loop {
            state = match state {
                NegotiationState::TryPrimary => {
                    let failure = match fetch_range(
                        self.upstream.as_ref(),
                        credential,
                        dataset,
                        range,
                        self.max_window_seconds,
                        QueryMode::Primary,
                    )
                    .await
                    {
                        Ok(fetched) => {
                            return done(
                                dataset,
                                fetched.rows,
                                QueryMode::Primary,
                                fetched.windows_fetched,
                                None,
                            );
                        }
                        Err(window_failure) => NegotiationFailure::from_window_failure(
                            dataset,
                            QueryMode::Primary,
                            &window_failure,
                        ),
                    };

                    warn!(
                        "[WellnessSync] {} primary fetch failed ({:?}, status {:?}): {}",
                        dataset, failure.class, failure.http_status, failure.summary
                    );

                    if failure.class.is_retryable() {
                        if !credential.has_scope(HISTORICAL_DATA_EXPORT_PERMISSION) {
                            info!(
                                "[WellnessSync] {} fallback skipped: {} not granted",
                                dataset, HISTORICAL_DATA_EXPORT_PERMISSION
                            );
                            return NegotiationOutcome::InsufficientPermission {
                                required_permissions: vec![
                                    HISTORICAL_DATA_EXPORT_PERMISSION.to_string()
                                ],
                                primary_failure: failure,
                            };
                        }
                        NegotiationState::TryFallback {
                            primary_failure: failure,
                        }
                    } else if failure.class == FailureClass::AuthError {
                        return NegotiationOutcome::NeedsReauth(failure);
                    } else {
                        return NegotiationOutcome::Failed(failure);
                    }
                }
                NegotiationState::TryFallback { primary_failure } => {
                    info!(
                        "[WellnessSync] {} retrying full range in fallback mode",
                        dataset
                    );
                    return match fetch_range(
                        self.upstream.as_ref(),
                        credential,
                        dataset,
                        range,
                        self.max_window_seconds,
                        QueryMode::Fallback,
                    )
                    .await
                    {
                        Ok(fetched) => done(
                            dataset,
                            fetched.rows,
                            QueryMode::Fallback,
                            fetched.windows_fetched,
                            Some(primary_failure),
                        ),
                        Err(window_failure) => {
                            let failure = NegotiationFailure::from_window_failure(
                                dataset,
                                QueryMode::Fallback,
                                &window_failure,
                            );
                            warn!(
                                "[WellnessSync] {} fallback fetch failed ({:?}, status {:?}): {}",
                                dataset, failure.class, failure.http_status, failure.summary
                            );
                            match failure.class {
                                FailureClass::AuthError => NegotiationOutcome::NeedsReauth(failure),
                                FailureClass::NotProvisioned => {
                                    NegotiationOutcome::NotProvisioned(failure)
                                }
                                _ => NegotiationOutcome::Failed(failure),
                            }
                        }
                    };
                }
            };
        }
    }
}

fn done(
    dataset: DatasetKey,
    rows: Vec<Value>,
    mode: QueryMode,
    windows_fetched: usize,
    primary_failure: Option<NegotiationFailure>,
) -> NegotiationOutcome {
    let rows = collapse_rows(dataset, rows);
    info!(
        "[WellnessSync] {} fetched {} rows over {} windows ({})",
        dataset,
        rows.len(),
        windows_fetched,
        mode.source_label()
    );
    NegotiationOutcome::Done {
        dataset,
        rows,
        mode,
        windows_fetched,
        primary_failure,
    }
}
