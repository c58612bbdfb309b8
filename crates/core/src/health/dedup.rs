//! Dedup keys and in-response row collapsing.

use std::collections::HashSet;

use log::debug;
use serde_json::Value;
use sha2::{Digest, Sha256};

use super::dataset::DatasetKey;
use super::upstream_row::RawRow;

const CALENDAR_DATE_FIELD: &str = "calendarDate";
const START_TIME_FIELD: &str = "startTimeInSeconds";
const HASH_PREFIX_CHARS: usize = 32;

/// First explicit upstream identifier present on the row.
pub fn upstream_identifier(dataset: DatasetKey, row: &RawRow) -> Option<String> {
    dataset
        .identifier_fields()
        .iter()
        .find_map(|field| row.text(field))
}

/// Stable per-row key, derived in priority order from:
/// 1. an explicit upstream identifier,
/// 2. calendar date plus start time, when both are present,
/// 3. a content hash of the serialized row combined with its batch position.
pub fn dedup_key(dataset: DatasetKey, row: &RawRow, position: usize) -> String {
    if let Some(id) = upstream_identifier(dataset, row) {
        return format!("id:{}", id);
    }

    if let (Some(calendar_date), Some(start_time)) =
        (row.text(CALENDAR_DATE_FIELD), row.integer(START_TIME_FIELD))
    {
        return format!("ts:{}:{}", calendar_date, start_time);
    }

    // serde_json maps are ordered by key, so equal rows serialize identically.
    let serialized = serde_json::to_string(row.fields()).unwrap_or_default();
    let digest = Sha256::digest(serialized.as_bytes());
    let hex = hex::encode(digest);
    format!("hash:{}:{}", &hex[..HASH_PREFIX_CHARS], position)
}

/// Collapses rows that share an identifier and calendar date within one
/// upstream response. First occurrence wins; rows without an identifier are
/// never collapsed. Non-object values are dropped.
pub fn collapse_rows(dataset: DatasetKey, rows: Vec<Value>) -> Vec<Value> {
    let mut seen: HashSet<(String, Option<String>)> = HashSet::new();
    let mut kept = Vec::with_capacity(rows.len());
    let mut collapsed = 0usize;

    for value in rows {
        let Some(row) = RawRow::from_value(value) else {
            collapsed += 1;
            continue;
        };
        if let Some(id) = upstream_identifier(dataset, &row) {
            let signature = (id, row.text(CALENDAR_DATE_FIELD));
            if !seen.insert(signature) {
                collapsed += 1;
                continue;
            }
        }
        kept.push(row.into_value());
    }

    if collapsed > 0 {
        debug!(
            "[WellnessSync] Collapsed {} duplicate or malformed {} rows",
            collapsed, dataset
        );
    }
    kept
}
