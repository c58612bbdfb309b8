//! Idempotent ingestion of negotiated rows into the local store.

use std::sync::Arc;

use chrono::Utc;
use log::{debug, error, info};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::device_connection::{DeviceConnection, DeviceSyncSession};
use super::window_planner::QueryMode;
use crate::errors::Result;
use crate::health::{
    collapse_rows, dedup_key, normalize_row, DatasetKey, NewWellnessRecord, RawRow,
    RecordSource, UpstreamRow, WellnessRecordRepositoryTrait,
};

/// Per-dataset counts of one ingestion pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetIngestResult {
    pub dataset_key: DatasetKey,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<RecordSource>,
    pub imported: usize,
    pub skipped: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DatasetIngestResult {
    pub fn empty(dataset_key: DatasetKey) -> Self {
        Self {
            dataset_key,
            source: None,
            imported: 0,
            skipped: 0,
            error: None,
        }
    }

    pub fn failed(dataset_key: DatasetKey, error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::empty(dataset_key)
        }
    }
}

/// Rows for one dataset as returned by a successful negotiation.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestBatch {
    pub dataset_key: DatasetKey,
    pub source: RecordSource,
    pub rows: Vec<Value>,
}

pub fn record_source(mode: QueryMode) -> RecordSource {
    match mode {
        QueryMode::Primary => RecordSource::Upload,
        QueryMode::Fallback => RecordSource::Backfill,
    }
}

pub struct IngestionService {
    records: Arc<dyn WellnessRecordRepositoryTrait>,
}

impl IngestionService {
    pub fn new(records: Arc<dyn WellnessRecordRepositoryTrait>) -> Self {
        Self { records }
    }

    /// Inserts every row of `batch` whose dedup key is not yet stored.
    ///
    /// Rows are checked and inserted one at a time. A store failure stops the
    /// dataset and is reported in the result; counts up to that row are kept.
    pub async fn ingest_dataset(&self, user_id: &str, batch: IngestBatch) -> DatasetIngestResult {
        let IngestBatch {
            dataset_key,
            source,
            rows,
        } = batch;
        let mut result = DatasetIngestResult {
            source: Some(source),
            ..DatasetIngestResult::empty(dataset_key)
        };
        let fallback_recorded_at = Utc::now().timestamp_millis();

        for (position, value) in collapse_rows(dataset_key, rows).into_iter().enumerate() {
            let Some(raw) = RawRow::from_value(value) else {
                result.skipped += 1;
                continue;
            };
            let key = dedup_key(dataset_key, &raw, position);

            match self.records.exists(user_id, dataset_key, &key) {
                Ok(true) => {
                    result.skipped += 1;
                    continue;
                }
                Ok(false) => {}
                Err(e) => {
                    error!(
                        "[WellnessSync] Store lookup failed for {} {}: {}",
                        dataset_key, key, e
                    );
                    result.error = Some(e.to_string());
                    break;
                }
            }

            let Some(row) = UpstreamRow::parse(dataset_key, raw.into_value()) else {
                result.skipped += 1;
                continue;
            };
            let record = normalize_row(&row);
            let new_record = NewWellnessRecord {
                user_id: user_id.to_string(),
                dataset_key,
                recorded_at_ms: record.recorded_at_ms().unwrap_or(fallback_recorded_at),
                dedup_key: key,
                source,
                record,
            };

            match self.records.insert(new_record).await {
                Ok(true) => result.imported += 1,
                Ok(false) => result.skipped += 1,
                Err(e) => {
                    error!("[WellnessSync] Store insert failed for {}: {}", dataset_key, e);
                    result.error = Some(e.to_string());
                    break;
                }
            }
        }

        debug!(
            "[WellnessSync] {} ingest: imported={} skipped={}",
            dataset_key, result.imported, result.skipped
        );
        result
    }

    /// Ingests every batch in order, then completes the device session.
    pub async fn ingest_pass(
        &self,
        session: DeviceSyncSession,
        batches: Vec<IngestBatch>,
    ) -> Result<(Vec<DatasetIngestResult>, DeviceConnection)> {
        let user_id = session.connection().user_id.clone();
        let mut results = Vec::with_capacity(batches.len());
        for batch in batches {
            results.push(self.ingest_dataset(&user_id, batch).await);
        }

        let device = session.complete().await?;
        info!(
            "[WellnessSync] Ingest pass for user {} finished: {} datasets, {} imported, device {}",
            user_id,
            results.len(),
            results.iter().map(|r| r.imported).sum::<usize>(),
            device.connection_status.as_str()
        );
        Ok((results, device))
    }
}
