//! Database model for canonical wellness records.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use wellsync_core::health::{DatasetKey, NewWellnessRecord, RecordKind, StoredWellnessRecord};

use crate::errors::StorageError;

#[derive(Queryable, Insertable, Selectable, Debug, Clone, PartialEq)]
#[diesel(table_name = crate::schema::wellness_records)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct WellnessRecordDB {
    pub user_id: String,
    pub dataset_key: String,
    pub dedup_key: String,
    pub record_kind: String,
    pub source: String,
    pub recorded_at: i64,
    pub payload: String,
    pub imported_at: String,
}

impl WellnessRecordDB {
    pub fn from_new(
        record: &NewWellnessRecord,
        imported_at: DateTime<Utc>,
    ) -> Result<Self, StorageError> {
        Ok(Self {
            user_id: record.user_id.clone(),
            dataset_key: record.dataset_key.as_str().to_string(),
            dedup_key: record.dedup_key.clone(),
            record_kind: record.record.kind().as_str().to_string(),
            source: record.source.as_str().to_string(),
            recorded_at: record.recorded_at_ms,
            payload: serde_json::to_string(&record.record)?,
            imported_at: imported_at.to_rfc3339(),
        })
    }
}

fn enum_from_db<T: serde::de::DeserializeOwned>(value: &str) -> Result<T, StorageError> {
    Ok(serde_json::from_value(serde_json::Value::String(
        value.to_string(),
    ))?)
}

impl TryFrom<WellnessRecordDB> for StoredWellnessRecord {
    type Error = StorageError;

    fn try_from(db: WellnessRecordDB) -> Result<Self, Self::Error> {
        let dataset_key = db
            .dataset_key
            .parse::<DatasetKey>()
            .map_err(StorageError::Corrupt)?;
        let record_kind: RecordKind = enum_from_db(&db.record_kind)?;
        let imported_at = DateTime::parse_from_rfc3339(&db.imported_at)
            .map_err(|e| StorageError::Corrupt(format!("imported_at: {}", e)))?
            .with_timezone(&Utc);

        Ok(Self {
            user_id: db.user_id,
            dataset_key,
            dedup_key: db.dedup_key,
            record_kind,
            source: db.source,
            recorded_at_ms: db.recorded_at,
            payload: serde_json::from_str(&db.payload)?,
            imported_at,
        })
    }
}
