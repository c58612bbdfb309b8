//! Wellness read path, sync trigger and stored-record queries.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header::AUTHORIZATION, HeaderMap},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use wellsync_core::health::{
    collapse_rows, normalize_row, CanonicalRecord, DatasetKey, StoredWellnessRecord, UpstreamRow,
};
use wellsync_core::sync::{
    CapabilityDescriptor, DatasetFetch, DeviceConnection, NegotiationOutcome, SyncReport,
};

use crate::error::{ApiError, ApiResult};
use crate::main_lib::AppState;

// ─────────────────────────────────────────────────────────────────────────────
// Request/Response Types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WellnessQuery {
    pub user_id: Option<String>,
    /// Kept as text so a bad value gets the JSON failure body.
    pub days: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordsQuery {
    pub user_id: Option<String>,
    pub dataset_key: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SleepResponse {
    pub success: bool,
    pub source: &'static str,
    pub sleep: Vec<CanonicalRecord>,
    pub permissions: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetResponse {
    pub success: bool,
    pub dataset_key: DatasetKey,
    pub source: &'static str,
    pub days: u32,
    pub rows: Vec<CanonicalRecord>,
    pub permissions: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogResponse {
    pub success: bool,
    pub user_id: String,
    pub datasets: Vec<CapabilityDescriptor>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResponse {
    pub success: bool,
    pub imported: usize,
    pub skipped: usize,
    #[serde(flatten)]
    pub report: SyncReport,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordsResponse {
    pub success: bool,
    pub dataset_key: DatasetKey,
    pub records: Vec<StoredWellnessRecord>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionResponse {
    pub success: bool,
    pub connection: Option<DeviceConnection>,
    pub syncing: bool,
}

// ─────────────────────────────────────────────────────────────────────────────
// Request helpers
// ─────────────────────────────────────────────────────────────────────────────

fn required_param(value: Option<&str>, name: &str) -> ApiResult<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ApiError::BadRequest(format!("{} is required", name)))
}

fn parse_i64_param(value: Option<&str>, name: &str) -> ApiResult<Option<i64>> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        Some(raw) => raw
            .parse::<i64>()
            .map(Some)
            .map_err(|_| ApiError::BadRequest(format!("{} must be an integer", name))),
        None => Ok(None),
    }
}

fn parse_dataset_key(raw: &str) -> ApiResult<DatasetKey> {
    raw.parse::<DatasetKey>().map_err(ApiError::BadRequest)
}

fn bearer_token(headers: &HeaderMap) -> ApiResult<String> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ApiError::Unauthorized("Missing bearer token".to_string()))
}

/// Normalized records of a finished negotiation, or the failure it ended in.
fn negotiated_rows(fetch: DatasetFetch) -> ApiResult<(&'static str, Vec<CanonicalRecord>)> {
    match fetch.outcome {
        NegotiationOutcome::Done { rows, mode, .. } => {
            let records = collapse_rows(fetch.dataset_key, rows)
                .into_iter()
                .filter_map(|row| UpstreamRow::parse(fetch.dataset_key, row))
                .map(|row| normalize_row(&row))
                .collect();
            Ok((mode.source_label(), records))
        }
        other => {
            let error = other.error().ok_or_else(|| {
                ApiError::Internal("Negotiation ended without a result".to_string())
            })?;
            warn!(
                "[Wellness] Read of {} failed: {}",
                fetch.dataset_key, error
            );
            Err(ApiError::Upstream(error))
        }
    }
}

async fn fetch_for_request(
    state: &AppState,
    headers: &HeaderMap,
    query: &WellnessQuery,
    dataset: DatasetKey,
) -> ApiResult<DatasetFetch> {
    let user_id = required_param(query.user_id.as_deref(), "userId")?;
    let days = parse_i64_param(query.days.as_deref(), "days")?;
    let token = bearer_token(headers)?;

    info!("[Wellness] Reading {} for user {}", dataset, user_id);
    Ok(state
        .sync_service
        .fetch_dataset(&user_id, &token, dataset, days)
        .await?)
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

async fn get_sleep(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<WellnessQuery>,
) -> ApiResult<Json<SleepResponse>> {
    let fetch = fetch_for_request(&state, &headers, &query, DatasetKey::Sleeps).await?;
    let permissions = fetch.permissions.clone();
    let (source, sleep) = negotiated_rows(fetch)?;

    Ok(Json(SleepResponse {
        success: true,
        source,
        sleep,
        permissions,
    }))
}

async fn get_dataset(
    State(state): State<Arc<AppState>>,
    Path(dataset_key): Path<String>,
    headers: HeaderMap,
    Query(query): Query<WellnessQuery>,
) -> ApiResult<Json<DatasetResponse>> {
    let dataset = parse_dataset_key(&dataset_key)?;
    let fetch = fetch_for_request(&state, &headers, &query, dataset).await?;
    let permissions = fetch.permissions.clone();
    let days = fetch.days;
    let (source, rows) = negotiated_rows(fetch)?;

    Ok(Json(DatasetResponse {
        success: true,
        dataset_key: dataset,
        source,
        days,
        rows,
        permissions,
    }))
}

async fn get_sync_catalog(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<WellnessQuery>,
) -> ApiResult<Json<CatalogResponse>> {
    let user_id = required_param(query.user_id.as_deref(), "userId")?;
    let token = bearer_token(&headers)?;

    let datasets = state.sync_service.capability_catalog(&token).await?;
    Ok(Json(CatalogResponse {
        success: true,
        user_id,
        datasets,
    }))
}

async fn run_sync(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<WellnessQuery>,
) -> ApiResult<Json<SyncResponse>> {
    let user_id = required_param(query.user_id.as_deref(), "userId")?;
    let days = parse_i64_param(query.days.as_deref(), "days")?;
    let token = bearer_token(&headers)?;

    info!("[Wellness] Sync requested for user {}", user_id);
    let report = state.sync_service.run_sync(&user_id, &token, days).await?;

    Ok(Json(SyncResponse {
        success: true,
        imported: report.imported_total(),
        skipped: report.skipped_total(),
        report,
    }))
}

async fn list_records(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RecordsQuery>,
) -> ApiResult<Json<RecordsResponse>> {
    let user_id = required_param(query.user_id.as_deref(), "userId")?;
    let dataset = parse_dataset_key(&required_param(query.dataset_key.as_deref(), "datasetKey")?)?;
    let from = parse_i64_param(query.from.as_deref(), "from")?.unwrap_or(0);
    let to = parse_i64_param(query.to.as_deref(), "to")?.unwrap_or(i64::MAX);

    let records = state
        .sync_service
        .list_records(&user_id, dataset, from, to)?;
    Ok(Json(RecordsResponse {
        success: true,
        dataset_key: dataset,
        records,
    }))
}

async fn get_connection(
    State(state): State<Arc<AppState>>,
    Query(query): Query<WellnessQuery>,
) -> ApiResult<Json<ConnectionResponse>> {
    let user_id = required_param(query.user_id.as_deref(), "userId")?;
    let connection = state.sync_service.connection(&user_id)?;
    let syncing = state.sync_service.is_syncing(&user_id);

    Ok(Json(ConnectionResponse {
        success: true,
        connection,
        syncing,
    }))
}

pub async fn healthz(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "defaultDays": state.config.sync.default_days,
    }))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        // Read path (no writes)
        .route("/wellness/sleep", get(get_sleep))
        .route("/wellness/datasets/{datasetKey}", get(get_dataset))
        // Capability catalog and full sync pass
        .route("/wellness/sync", get(get_sync_catalog).post(run_sync))
        // Local data
        .route("/wellness/records", get(list_records))
        .route("/wellness/connection", get(get_connection))
}
