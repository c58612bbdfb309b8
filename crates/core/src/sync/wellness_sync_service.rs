//! Entry points for the read path, the capability catalog and full sync passes.

use std::sync::Arc;

use chrono::Utc;
use log::{info, warn};
use serde::Serialize;

use super::capability_model::{
    build_capability_catalog, check_endpoint, CapabilityDescriptor, EndpointCheck,
};
use super::device_connection::{
    DeviceConnection, DeviceConnectionRepositoryTrait, DeviceSyncSession, SyncFlightRegistry,
    WEARABLE_PROVIDER,
};
use super::error_classifier::{classify_failure, is_auth_error, summarize_body, FailureClass};
use super::fallback_negotiator::{FallbackNegotiator, NegotiationOutcome};
use super::ingestion_service::{
    record_source, DatasetIngestResult, IngestBatch, IngestionService,
};
use super::upstream::{UpstreamCallError, UpstreamCredential, WellnessUpstream};
use super::window_planner::{SyncRange, DEFAULT_MAX_WINDOW_SECS};
use crate::errors::{Error, Result, UpstreamError, UpstreamErrorKind};
use crate::health::{DatasetKey, StoredWellnessRecord, WellnessRecordRepositoryTrait};

pub const MIN_LOOKBACK_DAYS: u32 = 1;
pub const MAX_LOOKBACK_DAYS: u32 = 30;
pub const DEFAULT_LOOKBACK_DAYS: u32 = 7;
/// Span of the primary-mode request used to check an endpoint.
pub const DEFAULT_CHECK_WINDOW_SECS: i64 = 3_600;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncConfig {
    pub max_window_seconds: i64,
    pub default_days: u32,
    pub check_window_seconds: i64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_window_seconds: DEFAULT_MAX_WINDOW_SECS,
            default_days: DEFAULT_LOOKBACK_DAYS,
            check_window_seconds: DEFAULT_CHECK_WINDOW_SECS,
        }
    }
}

/// Clamps a requested lookback to `[1, 30]` days.
pub fn clamp_days(requested: Option<i64>, default_days: u32) -> u32 {
    let days = requested.unwrap_or(i64::from(default_days));
    days.clamp(i64::from(MIN_LOOKBACK_DAYS), i64::from(MAX_LOOKBACK_DAYS)) as u32
}

/// Result of a read-path fetch. Failed negotiations are carried in `outcome`.
#[derive(Debug, Clone)]
pub struct DatasetFetch {
    pub dataset_key: DatasetKey,
    pub days: u32,
    pub permissions: Vec<String>,
    pub outcome: NegotiationOutcome,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub user_id: String,
    pub days: u32,
    pub datasets: Vec<DatasetIngestResult>,
    pub notices: Vec<String>,
    pub catalog: Vec<CapabilityDescriptor>,
    pub device: DeviceConnection,
}

impl SyncReport {
    pub fn imported_total(&self) -> usize {
        self.datasets.iter().map(|d| d.imported).sum()
    }

    pub fn skipped_total(&self) -> usize {
        self.datasets.iter().map(|d| d.skipped).sum()
    }
}

fn require(value: &str, what: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::malformed(format!("{} is required", what)));
    }
    Ok(())
}

fn call_error_to_upstream(dataset_source: &str, error: UpstreamCallError) -> UpstreamError {
    match error {
        UpstreamCallError::Status(failure) => {
            let kind = if is_auth_error(failure.http_status, &failure.raw_body) {
                UpstreamErrorKind::AuthExpired
            } else {
                classify_failure(&failure).error_kind()
            };
            UpstreamError::new(
                kind,
                Some(failure.http_status),
                dataset_source,
                summarize_body(&failure.raw_body),
            )
        }
        UpstreamCallError::Transport(message) => UpstreamError::new(
            UpstreamErrorKind::Unclassified,
            None,
            dataset_source,
            message,
        ),
    }
}

pub struct WellnessSyncService {
    upstream: Arc<dyn WellnessUpstream>,
    records: Arc<dyn WellnessRecordRepositoryTrait>,
    devices: Arc<dyn DeviceConnectionRepositoryTrait>,
    ingestion: IngestionService,
    flights: SyncFlightRegistry,
    config: SyncConfig,
}

impl WellnessSyncService {
    pub fn new(
        upstream: Arc<dyn WellnessUpstream>,
        records: Arc<dyn WellnessRecordRepositoryTrait>,
        devices: Arc<dyn DeviceConnectionRepositoryTrait>,
        config: SyncConfig,
    ) -> Self {
        Self {
            upstream,
            ingestion: IngestionService::new(records.clone()),
            records,
            devices,
            flights: SyncFlightRegistry::new(),
            config,
        }
    }

    /// Shares an in-flight registry with other holders.
    pub fn with_flight_registry(mut self, flights: SyncFlightRegistry) -> Self {
        self.flights = flights;
        self
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    fn negotiator(&self) -> FallbackNegotiator {
        FallbackNegotiator::new(self.upstream.clone())
            .with_max_window_seconds(self.config.max_window_seconds)
    }

    /// Resolves the granted scopes for `token` into a credential.
    pub async fn credential_for(&self, token: &str) -> Result<UpstreamCredential> {
        require(token, "Bearer token")?;
        let scopes = self
            .upstream
            .fetch_permissions(token)
            .await
            .map_err(|e| Error::Upstream(call_error_to_upstream("permissions", e)))?;
        Ok(UpstreamCredential::new(token, scopes))
    }

    /// Read path: negotiates one dataset over the last `days` days. No writes.
    pub async fn fetch_dataset(
        &self,
        user_id: &str,
        token: &str,
        dataset: DatasetKey,
        days: Option<i64>,
    ) -> Result<DatasetFetch> {
        require(user_id, "userId")?;
        require(token, "Bearer token")?;

        let credential = self.credential_for(token).await?;
        let required = dataset.required_permission();
        if !credential.has_scope(required) {
            return Err(Error::PermissionNotGranted(vec![required.to_string()]));
        }

        let days = clamp_days(days, self.config.default_days);
        let range = SyncRange::last_days(Utc::now().timestamp(), days);
        let outcome = self.negotiator().negotiate(&credential, dataset, range).await;

        Ok(DatasetFetch {
            dataset_key: dataset,
            days,
            permissions: credential.scopes().map(str::to_string).collect(),
            outcome,
        })
    }

    pub async fn capability_catalog(&self, token: &str) -> Result<Vec<CapabilityDescriptor>> {
        let credential = self.credential_for(token).await?;
        self.catalog_for(&credential).await
    }

    async fn catalog_for(
        &self,
        credential: &UpstreamCredential,
    ) -> Result<Vec<CapabilityDescriptor>> {
        let now = Utc::now().timestamp();
        let mut checks = Vec::with_capacity(DatasetKey::ALL.len());

        for dataset in DatasetKey::ALL {
            let check = if credential.has_scope(dataset.required_permission()) {
                check_endpoint(
                    self.upstream.as_ref(),
                    credential,
                    dataset,
                    now,
                    self.config.check_window_seconds,
                )
                .await
                .map_err(|failure| Error::Upstream(failure.to_upstream_error()))?
            } else {
                EndpointCheck::Skipped
            };
            checks.push((dataset.as_str().to_string(), check));
        }

        Ok(build_capability_catalog(credential, checks))
    }

    /// Full fetch-classify-ingest pass for the user's device.
    ///
    /// Every enabled dataset is negotiated before anything is written. A
    /// `NeedsReauth` outcome on any dataset moves the device to `error`,
    /// skips ingestion and is returned as an error.
    pub async fn run_sync(
        &self,
        user_id: &str,
        token: &str,
        days: Option<i64>,
    ) -> Result<SyncReport> {
        require(user_id, "userId")?;
        require(token, "Bearer token")?;

        // Claimed before the lookup so two first passes cannot both create a device.
        let guard = self.flights.acquire(user_id, WEARABLE_PROVIDER)?;
        let connection = match self.devices.get_for_user(user_id)? {
            Some(connection) => connection,
            None => DeviceConnection::new(user_id, Utc::now()),
        };
        let session = DeviceSyncSession::start(self.devices.clone(), guard, connection).await?;

        let credential_and_catalog = async {
            let credential = self.credential_for(token).await?;
            let catalog = self.catalog_for(&credential).await?;
            Ok::<_, Error>((credential, catalog))
        }
        .await;
        let (credential, catalog) = match credential_and_catalog {
            Ok(pair) => pair,
            Err(e) => {
                if e.needs_reauth() {
                    session.needs_reauth(e.to_string()).await?;
                } else {
                    session.fail().await?;
                }
                return Err(e);
            }
        };

        let days = clamp_days(days, self.config.default_days);
        let range = SyncRange::last_days(Utc::now().timestamp(), days);
        let negotiator = self.negotiator();

        let mut notices = Vec::new();
        let mut outcomes = Vec::new();
        for descriptor in &catalog {
            if descriptor.enabled_for_sync {
                let outcome = negotiator
                    .negotiate(&credential, descriptor.dataset_key, range)
                    .await;
                outcomes.push((descriptor.dataset_key, outcome));
            } else if descriptor.supported_locally {
                notices.push(format!(
                    "{} skipped: {}",
                    descriptor.label,
                    descriptor.reason.as_deref().unwrap_or("not available")
                ));
            }
        }

        if let Some(reauth) = outcomes.iter().find_map(|(_, outcome)| match outcome {
            NegotiationOutcome::NeedsReauth(_) => outcome.error(),
            _ => None,
        }) {
            warn!(
                "[WellnessSync] Sync for user {} needs re-authorization: {}",
                user_id, reauth
            );
            session.needs_reauth(reauth.summary.clone()).await?;
            return Err(Error::Upstream(reauth));
        }

        let mut batches = Vec::new();
        let mut failed = Vec::new();
        for (dataset, outcome) in outcomes {
            match outcome {
                NegotiationOutcome::Done {
                    rows,
                    mode,
                    primary_failure,
                    ..
                } => {
                    if let Some(primary) = primary_failure {
                        notices.push(format!(
                            "{}: recent-upload query rejected ({}); imported from backfill",
                            dataset.label(),
                            primary.summary
                        ));
                    }
                    batches.push(IngestBatch {
                        dataset_key: dataset,
                        source: record_source(mode),
                        rows,
                    });
                }
                other => {
                    if let Some(error) = other.error() {
                        notices.push(notice_for(dataset, &other, &error));
                        failed.push(DatasetIngestResult::failed(dataset, error.to_string()));
                    }
                }
            }
        }

        let (mut datasets, device) = self.ingestion.ingest_pass(session, batches).await?;
        datasets.extend(failed);

        let report = SyncReport {
            user_id: user_id.to_string(),
            days,
            datasets,
            notices,
            catalog,
            device,
        };
        info!(
            "[WellnessSync] Sync for user {} done: imported={} skipped={} notices={}",
            user_id,
            report.imported_total(),
            report.skipped_total(),
            report.notices.len()
        );
        Ok(report)
    }

    pub fn list_records(
        &self,
        user_id: &str,
        dataset: DatasetKey,
        from_ms: i64,
        to_ms: i64,
    ) -> Result<Vec<StoredWellnessRecord>> {
        require(user_id, "userId")?;
        if from_ms > to_ms {
            return Err(Error::malformed("from must not be after to"));
        }
        self.records.list_in_range(user_id, dataset, from_ms, to_ms)
    }

    pub fn connection(&self, user_id: &str) -> Result<Option<DeviceConnection>> {
        require(user_id, "userId")?;
        self.devices.get_for_user(user_id)
    }

    pub fn is_syncing(&self, user_id: &str) -> bool {
        self.flights.is_in_flight(user_id, WEARABLE_PROVIDER)
    }
}

fn notice_for(dataset: DatasetKey, outcome: &NegotiationOutcome, error: &UpstreamError) -> String {
    match outcome {
        NegotiationOutcome::NotProvisioned(_) => format!(
            "{}: endpoint is not enabled for this application",
            dataset.label()
        ),
        NegotiationOutcome::InsufficientPermission {
            required_permissions,
            ..
        } => format!(
            "{}: backfill requires {}",
            dataset.label(),
            required_permissions.join(", ")
        ),
        NegotiationOutcome::Failed(failure) if failure.class == FailureClass::Unclassified => {
            format!("{}: upstream error: {}", dataset.label(), error.summary)
        }
        _ => format!("{}: {}", dataset.label(), error.summary),
    }
}
