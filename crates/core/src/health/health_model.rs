//! Canonical wellness records and the store contracts that persist them.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::dataset::{DatasetKey, RecordKind};
use crate::errors::Result;

/// Local workout vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityType {
    Run,
    Ride,
    Swim,
    Walk,
    Hike,
    Strength,
    Cardio,
    Row,
    Yoga,
    Other,
}

/// How final the upstream considers a sleep session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SleepConfidence {
    Final,
    Tentative,
    Manual,
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityRecord {
    pub activity_id: Option<String>,
    pub name: Option<String>,
    pub activity_type: ActivityType,
    /// Upstream vocabulary value the type was mapped from.
    pub upstream_type: Option<String>,
    pub started_at_ms: Option<i64>,
    pub start_offset_ms: Option<i64>,
    pub duration_minutes: Option<f64>,
    pub distance_meters: Option<f64>,
    pub average_heart_rate: Option<i64>,
    pub max_heart_rate: Option<i64>,
    pub active_kilocalories: Option<f64>,
    pub steps: Option<i64>,
    pub device_name: Option<String>,
    pub manual: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SleepSessionRecord {
    pub sleep_summary_id: Option<String>,
    pub calendar_date: Option<String>,
    pub started_at_ms: Option<i64>,
    pub start_offset_ms: Option<i64>,
    pub duration_minutes: Option<f64>,
    pub deep_minutes: Option<f64>,
    pub light_minutes: Option<f64>,
    pub rem_minutes: Option<f64>,
    pub awake_minutes: Option<f64>,
    /// Overall score clamped to `[0, 100]`.
    pub sleep_score: Option<i64>,
    pub confidence: SleepConfidence,
}

/// Daily and metric summaries share one generic shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryRecord {
    pub dataset_key: DatasetKey,
    pub summary_id: Option<String>,
    pub calendar_date: Option<String>,
    pub started_at_ms: Option<i64>,
    pub start_offset_ms: Option<i64>,
    pub duration_minutes: Option<f64>,
    pub metrics: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CanonicalRecord {
    Activity(ActivityRecord),
    SleepSession(SleepSessionRecord),
    Summary(SummaryRecord),
}

impl CanonicalRecord {
    pub fn kind(&self) -> RecordKind {
        match self {
            Self::Activity(_) => RecordKind::Activity,
            Self::SleepSession(_) => RecordKind::SleepSession,
            Self::Summary(_) => RecordKind::Summary,
        }
    }

    pub fn started_at_ms(&self) -> Option<i64> {
        match self {
            Self::Activity(r) => r.started_at_ms,
            Self::SleepSession(r) => r.started_at_ms,
            Self::Summary(r) => r.started_at_ms,
        }
    }

    pub fn calendar_date(&self) -> Option<&str> {
        match self {
            Self::Activity(_) => None,
            Self::SleepSession(r) => r.calendar_date.as_deref(),
            Self::Summary(r) => r.calendar_date.as_deref(),
        }
    }

    /// Point in time the record describes, in epoch milliseconds: the start
    /// time when known, else midnight UTC of the calendar date.
    pub fn recorded_at_ms(&self) -> Option<i64> {
        self.started_at_ms().or_else(|| {
            self.calendar_date()
                .and_then(|d| chrono::NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|dt| dt.and_utc().timestamp_millis())
        })
    }
}

/// Query mode a row was fetched with, persisted as the record source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordSource {
    Upload,
    Backfill,
}

impl RecordSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Upload => "upload",
            Self::Backfill => "backfill",
        }
    }
}

/// Canonical record ready for insertion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewWellnessRecord {
    pub user_id: String,
    pub dataset_key: DatasetKey,
    pub dedup_key: String,
    pub source: RecordSource,
    pub recorded_at_ms: i64,
    pub record: CanonicalRecord,
}

/// Canonical record as persisted, keyed by `(user_id, dataset_key, dedup_key)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredWellnessRecord {
    pub user_id: String,
    pub dataset_key: DatasetKey,
    pub dedup_key: String,
    pub record_kind: RecordKind,
    pub source: String,
    pub recorded_at_ms: i64,
    pub payload: serde_json::Value,
    pub imported_at: DateTime<Utc>,
}

/// Store for canonical records. The key triple is the idempotency contract.
#[async_trait]
pub trait WellnessRecordRepositoryTrait: Send + Sync {
    fn exists(&self, user_id: &str, dataset_key: DatasetKey, dedup_key: &str) -> Result<bool>;

    fn get(
        &self,
        user_id: &str,
        dataset_key: DatasetKey,
        dedup_key: &str,
    ) -> Result<Option<StoredWellnessRecord>>;

    /// Records with `from_ms <= recorded_at < to_ms`, ordered by `recorded_at`.
    fn list_in_range(
        &self,
        user_id: &str,
        dataset_key: DatasetKey,
        from_ms: i64,
        to_ms: i64,
    ) -> Result<Vec<StoredWellnessRecord>>;

    /// Inserts unless the key already exists. Returns whether a row was written.
    async fn insert(&self, record: NewWellnessRecord) -> Result<bool>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(calendar_date: Option<&str>, started_at_ms: Option<i64>) -> CanonicalRecord {
        CanonicalRecord::Summary(SummaryRecord {
            dataset_key: DatasetKey::Dailies,
            summary_id: None,
            calendar_date: calendar_date.map(str::to_string),
            started_at_ms,
            start_offset_ms: None,
            duration_minutes: None,
            metrics: BTreeMap::new(),
        })
    }

    #[test]
    fn recorded_at_prefers_start_time() {
        let record = summary(Some("2024-03-01"), Some(1_709_280_000_500));
        assert_eq!(record.recorded_at_ms(), Some(1_709_280_000_500));
    }

    #[test]
    fn recorded_at_falls_back_to_calendar_midnight() {
        let record = summary(Some("2024-03-01"), None);
        assert_eq!(record.recorded_at_ms(), Some(1_709_251_200_000));
        assert_eq!(summary(Some("not-a-date"), None).recorded_at_ms(), None);
    }

    #[test]
    fn canonical_record_serializes_with_kind_tag() {
        let value = serde_json::to_value(summary(None, Some(1))).unwrap();
        assert_eq!(value["kind"], "summary");
        assert_eq!(value["datasetKey"], "dailies");
    }
}
