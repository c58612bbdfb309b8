//! Fixed catalog of upstream dataset keys.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Permission scope required for activity-family datasets.
pub const ACTIVITY_EXPORT_PERMISSION: &str = "ACTIVITY_EXPORT";
/// Permission scope required for health/wellness datasets.
pub const HEALTH_EXPORT_PERMISSION: &str = "HEALTH_EXPORT";
/// Permission scope required before the backfill (summary-window) mode is attempted.
pub const HISTORICAL_DATA_EXPORT_PERMISSION: &str = "HISTORICAL_DATA_EXPORT";

/// Datasets the upstream wellness API exposes. The list is part of the contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DatasetKey {
    Dailies,
    Epochs,
    Sleeps,
    BodyComps,
    StressDetails,
    UserMetrics,
    #[serde(rename = "pulseox")]
    PulseOx,
    AllDayRespiration,
    HealthSnapshot,
    Hrv,
    BloodPressures,
    SkinTemp,
    Activities,
    ActivityDetails,
    ManuallyUpdatedActivities,
}

/// Shape of the canonical record a dataset normalizes into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Activity,
    SleepSession,
    Summary,
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Activity => "activity",
            Self::SleepSession => "sleep_session",
            Self::Summary => "summary",
        }
    }
}

impl DatasetKey {
    pub const ALL: [DatasetKey; 15] = [
        DatasetKey::Dailies,
        DatasetKey::Epochs,
        DatasetKey::Sleeps,
        DatasetKey::BodyComps,
        DatasetKey::StressDetails,
        DatasetKey::UserMetrics,
        DatasetKey::PulseOx,
        DatasetKey::AllDayRespiration,
        DatasetKey::HealthSnapshot,
        DatasetKey::Hrv,
        DatasetKey::BloodPressures,
        DatasetKey::SkinTemp,
        DatasetKey::Activities,
        DatasetKey::ActivityDetails,
        DatasetKey::ManuallyUpdatedActivities,
    ];

    /// Wire name, also used as the REST path segment.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dailies => "dailies",
            Self::Epochs => "epochs",
            Self::Sleeps => "sleeps",
            Self::BodyComps => "bodyComps",
            Self::StressDetails => "stressDetails",
            Self::UserMetrics => "userMetrics",
            Self::PulseOx => "pulseox",
            Self::AllDayRespiration => "allDayRespiration",
            Self::HealthSnapshot => "healthSnapshot",
            Self::Hrv => "hrv",
            Self::BloodPressures => "bloodPressures",
            Self::SkinTemp => "skinTemp",
            Self::Activities => "activities",
            Self::ActivityDetails => "activityDetails",
            Self::ManuallyUpdatedActivities => "manuallyUpdatedActivities",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Dailies => "Daily summaries",
            Self::Epochs => "Activity epochs",
            Self::Sleeps => "Sleep",
            Self::BodyComps => "Body composition",
            Self::StressDetails => "Stress & body battery",
            Self::UserMetrics => "Fitness metrics",
            Self::PulseOx => "Pulse oximetry",
            Self::AllDayRespiration => "Respiration",
            Self::HealthSnapshot => "Health snapshot",
            Self::Hrv => "Heart rate variability",
            Self::BloodPressures => "Blood pressure",
            Self::SkinTemp => "Skin temperature",
            Self::Activities => "Workouts",
            Self::ActivityDetails => "Workout details",
            Self::ManuallyUpdatedActivities => "Manually edited workouts",
        }
    }

    /// REST path of the dataset endpoint, relative to the API base URL.
    pub fn path(&self) -> String {
        format!("/wellness-api/rest/{}", self.as_str())
    }

    pub fn required_permission(&self) -> &'static str {
        match self {
            Self::Activities | Self::ActivityDetails | Self::ManuallyUpdatedActivities => {
                ACTIVITY_EXPORT_PERMISSION
            }
            _ => HEALTH_EXPORT_PERMISSION,
        }
    }

    pub fn record_kind(&self) -> RecordKind {
        match self {
            Self::Sleeps => RecordKind::SleepSession,
            Self::Activities | Self::ActivityDetails | Self::ManuallyUpdatedActivities => {
                RecordKind::Activity
            }
            _ => RecordKind::Summary,
        }
    }

    /// Whether rows of this dataset are imported into the local store.
    pub fn supported_locally(&self) -> bool {
        matches!(
            self,
            Self::Dailies
                | Self::Sleeps
                | Self::BodyComps
                | Self::StressDetails
                | Self::UserMetrics
                | Self::Hrv
                | Self::Activities
                | Self::ManuallyUpdatedActivities
        )
    }

    /// Field names carrying an explicit upstream identifier, in priority order.
    pub(crate) fn identifier_fields(&self) -> &'static [&'static str] {
        match self {
            Self::Sleeps => &["sleepSummaryId", "summaryId"],
            Self::Activities | Self::ActivityDetails | Self::ManuallyUpdatedActivities => {
                &["activityId", "summaryId"]
            }
            _ => &["summaryId"],
        }
    }
}

impl fmt::Display for DatasetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DatasetKey {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        DatasetKey::ALL
            .iter()
            .find(|key| key.as_str().eq_ignore_ascii_case(trimmed))
            .copied()
            .ok_or_else(|| format!("Unknown dataset key '{}'", trimmed))
    }
}
