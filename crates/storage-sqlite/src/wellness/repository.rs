use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use diesel::prelude::*;
use log::debug;

use wellsync_core::health::{
    DatasetKey, NewWellnessRecord, StoredWellnessRecord, WellnessRecordRepositoryTrait,
};
use wellsync_core::Result;

use super::model::WellnessRecordDB;
use crate::db::{get_connection, DbPool, WriteHandle};
use crate::errors::StorageError;
use crate::schema::wellness_records;

pub struct WellnessRecordRepository {
    pool: Arc<DbPool>,
    writer: WriteHandle,
}

impl WellnessRecordRepository {
    pub fn new(pool: Arc<DbPool>, writer: WriteHandle) -> Self {
        Self { pool, writer }
    }

    pub fn count_for_user(&self, user_id: &str) -> Result<i64> {
        let mut conn = get_connection(&self.pool)?;
        let count = wellness_records::table
            .filter(wellness_records::user_id.eq(user_id))
            .count()
            .get_result::<i64>(&mut conn)
            .map_err(StorageError::from)?;
        Ok(count)
    }
}

#[async_trait]
impl WellnessRecordRepositoryTrait for WellnessRecordRepository {
    fn exists(&self, user_id: &str, dataset_key: DatasetKey, dedup_key: &str) -> Result<bool> {
        let mut conn = get_connection(&self.pool)?;
        let found = wellness_records::table
            .find((user_id, dataset_key.as_str(), dedup_key))
            .select(wellness_records::dedup_key)
            .first::<String>(&mut conn)
            .optional()
            .map_err(StorageError::from)?;
        Ok(found.is_some())
    }

    fn get(
        &self,
        user_id: &str,
        dataset_key: DatasetKey,
        dedup_key: &str,
    ) -> Result<Option<StoredWellnessRecord>> {
        let mut conn = get_connection(&self.pool)?;
        let row = wellness_records::table
            .find((user_id, dataset_key.as_str(), dedup_key))
            .select(WellnessRecordDB::as_select())
            .first::<WellnessRecordDB>(&mut conn)
            .optional()
            .map_err(StorageError::from)?;
        Ok(row.map(StoredWellnessRecord::try_from).transpose()?)
    }

    fn list_in_range(
        &self,
        user_id: &str,
        dataset_key: DatasetKey,
        from_ms: i64,
        to_ms: i64,
    ) -> Result<Vec<StoredWellnessRecord>> {
        let mut conn = get_connection(&self.pool)?;
        let rows = wellness_records::table
            .filter(wellness_records::user_id.eq(user_id))
            .filter(wellness_records::dataset_key.eq(dataset_key.as_str()))
            .filter(wellness_records::recorded_at.ge(from_ms))
            .filter(wellness_records::recorded_at.lt(to_ms))
            .order((
                wellness_records::recorded_at.asc(),
                wellness_records::dedup_key.asc(),
            ))
            .select(WellnessRecordDB::as_select())
            .load::<WellnessRecordDB>(&mut conn)
            .map_err(StorageError::from)?;

        rows.into_iter()
            .map(|row| StoredWellnessRecord::try_from(row).map_err(Into::into))
            .collect()
    }

    async fn insert(&self, record: NewWellnessRecord) -> Result<bool> {
        let row = WellnessRecordDB::from_new(&record, Utc::now())?;
        self.writer
            .exec(move |conn| {
                let written = diesel::insert_or_ignore_into(wellness_records::table)
                    .values(&row)
                    .execute(conn)
                    .map_err(StorageError::from)?;
                if written == 0 {
                    debug!(
                        "Wellness record {}/{} already stored",
                        row.dataset_key, row.dedup_key
                    );
                }
                Ok(written > 0)
            })
            .await
    }
}
