//! Unit and vocabulary normalization from upstream rows to canonical records.

use std::collections::BTreeMap;

use serde_json::Value;

use super::dataset::DatasetKey;
use super::dedup::upstream_identifier;
use super::health_model::{
    ActivityRecord, ActivityType, CanonicalRecord, SleepConfidence, SleepSessionRecord,
    SummaryRecord,
};
use super::upstream_row::{RawRow, UpstreamRow};

const SCORE_MIN: i64 = 0;
const SCORE_MAX: i64 = 100;

/// Upstream workout vocabulary. Unlisted values map to [`ActivityType::Other`].
const ACTIVITY_TYPE_TABLE: &[(&str, ActivityType)] = &[
    ("RUNNING", ActivityType::Run),
    ("TRAIL_RUNNING", ActivityType::Run),
    ("TREADMILL_RUNNING", ActivityType::Run),
    ("TRACK_RUNNING", ActivityType::Run),
    ("INDOOR_RUNNING", ActivityType::Run),
    ("CYCLING", ActivityType::Ride),
    ("ROAD_BIKING", ActivityType::Ride),
    ("MOUNTAIN_BIKING", ActivityType::Ride),
    ("GRAVEL_CYCLING", ActivityType::Ride),
    ("INDOOR_CYCLING", ActivityType::Ride),
    ("VIRTUAL_RIDE", ActivityType::Ride),
    ("LAP_SWIMMING", ActivityType::Swim),
    ("OPEN_WATER_SWIMMING", ActivityType::Swim),
    ("SWIMMING", ActivityType::Swim),
    ("WALKING", ActivityType::Walk),
    ("CASUAL_WALKING", ActivityType::Walk),
    ("HIKING", ActivityType::Hike),
    ("STRENGTH_TRAINING", ActivityType::Strength),
    ("FITNESS_EQUIPMENT", ActivityType::Cardio),
    ("ELLIPTICAL", ActivityType::Cardio),
    ("STAIR_CLIMBING", ActivityType::Cardio),
    ("HIIT", ActivityType::Cardio),
    ("INDOOR_ROWING", ActivityType::Row),
    ("ROWING", ActivityType::Row),
    ("YOGA", ActivityType::Yoga),
];

/// Upstream sleep validation vocabulary. Unlisted values map to
/// [`SleepConfidence::Other`].
const SLEEP_VALIDATION_TABLE: &[(&str, SleepConfidence)] = &[
    ("ENHANCED_FINAL", SleepConfidence::Final),
    ("AUTO_FINAL", SleepConfidence::Final),
    ("DEVICE", SleepConfidence::Final),
    ("ENHANCED_TENTATIVE", SleepConfidence::Tentative),
    ("AUTO_TENTATIVE", SleepConfidence::Tentative),
    ("MANUAL", SleepConfidence::Manual),
    ("AUTO_MANUAL", SleepConfidence::Manual),
];

/// Fields never copied into a stored payload.
const DROPPED_FIELDS: &[&str] = &["userId", "userAccessToken"];

/// Fields already lifted into typed summary columns.
const SUMMARY_HEADER_FIELDS: &[&str] = &[
    "summaryId",
    "calendarDate",
    "startTimeInSeconds",
    "startTimeOffsetInSeconds",
    "durationInSeconds",
];

/// Fields holding epoch-second timestamps (converted to milliseconds).
const TIMESTAMP_FIELDS: &[&str] = &[
    "measurementTimeInSeconds",
    "measurementTimeOffsetInSeconds",
    "endTimeInSeconds",
];

pub fn map_activity_type(upstream: &str) -> ActivityType {
    let normalized = upstream.trim().to_ascii_uppercase();
    ACTIVITY_TYPE_TABLE
        .iter()
        .find(|(name, _)| *name == normalized)
        .map(|(_, mapped)| *mapped)
        .unwrap_or(ActivityType::Other)
}

pub fn map_sleep_confidence(upstream: &str) -> SleepConfidence {
    let normalized = upstream.trim().to_ascii_uppercase();
    SLEEP_VALIDATION_TABLE
        .iter()
        .find(|(name, _)| *name == normalized)
        .map(|(_, mapped)| *mapped)
        .unwrap_or(SleepConfidence::Other)
}

pub fn seconds_to_millis(seconds: i64) -> i64 {
    seconds.saturating_mul(1000)
}

pub fn seconds_to_minutes(seconds: f64) -> f64 {
    seconds / 60.0
}

pub fn clamp_score(score: i64) -> i64 {
    score.clamp(SCORE_MIN, SCORE_MAX)
}

fn is_body_battery_field(field: &str) -> bool {
    field.starts_with("bodyBattery")
}

/// Converts one tagged upstream row into its canonical record.
pub fn normalize_row(row: &UpstreamRow) -> CanonicalRecord {
    match row {
        UpstreamRow::Sleep(raw) => CanonicalRecord::SleepSession(normalize_sleep(raw)),
        UpstreamRow::Activity { dataset, row } => {
            let mut record = normalize_activity(row);
            record.manual = record.manual
                || *dataset == DatasetKey::ManuallyUpdatedActivities;
            CanonicalRecord::Activity(record)
        }
        UpstreamRow::Summary { dataset, row } => CanonicalRecord::Summary(SummaryRecord {
            dataset_key: *dataset,
            summary_id: upstream_identifier(*dataset, row),
            calendar_date: row.text("calendarDate"),
            started_at_ms: row.integer("startTimeInSeconds").map(seconds_to_millis),
            start_offset_ms: row
                .integer("startTimeOffsetInSeconds")
                .map(seconds_to_millis),
            duration_minutes: row.float("durationInSeconds").map(seconds_to_minutes),
            metrics: normalize_metrics(row),
        }),
    }
}

fn normalize_sleep(raw: &RawRow) -> SleepSessionRecord {
    let score = raw
        .object("overallSleepScore")
        .and_then(|s| s.integer("value"))
        .or_else(|| raw.integer("sleepScore"))
        .map(clamp_score);

    SleepSessionRecord {
        sleep_summary_id: upstream_identifier(DatasetKey::Sleeps, raw),
        calendar_date: raw.text("calendarDate"),
        started_at_ms: raw.integer("startTimeInSeconds").map(seconds_to_millis),
        start_offset_ms: raw
            .integer("startTimeOffsetInSeconds")
            .map(seconds_to_millis),
        duration_minutes: raw.float("durationInSeconds").map(seconds_to_minutes),
        deep_minutes: raw
            .float("deepSleepDurationInSeconds")
            .map(seconds_to_minutes),
        light_minutes: raw
            .float("lightSleepDurationInSeconds")
            .map(seconds_to_minutes),
        rem_minutes: raw.float("remSleepInSeconds").map(seconds_to_minutes),
        awake_minutes: raw
            .float("awakeDurationInSeconds")
            .map(seconds_to_minutes),
        sleep_score: score,
        confidence: raw
            .text("validation")
            .map(|v| map_sleep_confidence(&v))
            .unwrap_or(SleepConfidence::Other),
    }
}

fn normalize_activity(raw: &RawRow) -> ActivityRecord {
    let upstream_type = raw.text("activityType");
    ActivityRecord {
        activity_id: upstream_identifier(DatasetKey::Activities, raw),
        name: raw.text("activityName"),
        activity_type: upstream_type
            .as_deref()
            .map(map_activity_type)
            .unwrap_or(ActivityType::Other),
        upstream_type,
        started_at_ms: raw.integer("startTimeInSeconds").map(seconds_to_millis),
        start_offset_ms: raw
            .integer("startTimeOffsetInSeconds")
            .map(seconds_to_millis),
        duration_minutes: raw.float("durationInSeconds").map(seconds_to_minutes),
        distance_meters: raw.float("distanceInMeters"),
        average_heart_rate: raw.integer("averageHeartRateInBeatsPerMinute"),
        max_heart_rate: raw.integer("maxHeartRateInBeatsPerMinute"),
        active_kilocalories: raw.float("activeKilocalories"),
        steps: raw.integer("steps"),
        device_name: raw.text("deviceName"),
        manual: matches!(raw.fields().get("manual"), Some(Value::Bool(true))),
    }
}

/// Copies the remaining summary fields, converting units by field name:
/// epoch-second timestamps become `...Ms`, `...InSeconds` durations become
/// `...InMinutes`, body-battery values are clamped to `[0, 100]`.
fn normalize_metrics(raw: &RawRow) -> BTreeMap<String, Value> {
    let mut metrics = BTreeMap::new();

    for (field, value) in raw.fields() {
        if DROPPED_FIELDS.contains(&field.as_str())
            || SUMMARY_HEADER_FIELDS.contains(&field.as_str())
            || value.is_null()
        {
            continue;
        }

        if TIMESTAMP_FIELDS.contains(&field.as_str()) {
            if let Some(seconds) = raw.integer(field) {
                let key = format!("{}Ms", field.trim_end_matches("InSeconds"));
                metrics.insert(key, Value::from(seconds_to_millis(seconds)));
                continue;
            }
        }

        if let Some(stem) = field.strip_suffix("InSeconds") {
            if let Some(seconds) = raw.float(field) {
                metrics.insert(
                    format!("{}InMinutes", stem),
                    Value::from(seconds_to_minutes(seconds)),
                );
                continue;
            }
        }

        if is_body_battery_field(field) {
            if let Some(score) = raw.integer(field) {
                metrics.insert(field.clone(), Value::from(clamp_score(score)));
                continue;
            }
        }

        metrics.insert(field.clone(), value.clone());
    }

    metrics
}
