//! Untyped upstream rows, tagged by the dataset they came from.
//!
//! Upstream payloads carry no fixed schema. Every accessor checks field
//! presence and type instead of assuming a shape.

use serde_json::{Map, Value};

use super::dataset::{DatasetKey, RecordKind};

/// One upstream JSON object with presence-checked accessors.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRow(Map<String, Value>);

impl RawRow {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    /// Wraps a JSON value; anything but an object yields `None`.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(fields) => Some(Self(fields)),
            _ => None,
        }
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.get(field).is_some_and(|v| !v.is_null())
    }

    /// String field. Numbers are rendered so numeric identifiers compare equal
    /// to their string form.
    pub fn text(&self, field: &str) -> Option<String> {
        match self.0.get(field)? {
            Value::String(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    None
                } else {
                    Some(trimmed.to_string())
                }
            }
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    pub fn integer(&self, field: &str) -> Option<i64> {
        match self.0.get(field)? {
            Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.round() as i64)),
            Value::String(s) => s.trim().parse::<i64>().ok(),
            _ => None,
        }
    }

    pub fn float(&self, field: &str) -> Option<f64> {
        match self.0.get(field)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
    }

    pub fn object(&self, field: &str) -> Option<RawRow> {
        match self.0.get(field)? {
            Value::Object(map) => Some(RawRow(map.clone())),
            _ => None,
        }
    }
}

/// Upstream row tagged with the record family it normalizes into.
#[derive(Debug, Clone, PartialEq)]
pub enum UpstreamRow {
    Sleep(RawRow),
    Activity { dataset: DatasetKey, row: RawRow },
    Summary { dataset: DatasetKey, row: RawRow },
}

impl UpstreamRow {
    /// Tags a raw JSON value. Non-object values are not rows and yield `None`.
    pub fn parse(dataset: DatasetKey, value: Value) -> Option<Self> {
        let row = RawRow::from_value(value)?;
        Some(match dataset.record_kind() {
            RecordKind::SleepSession => Self::Sleep(row),
            RecordKind::Activity => Self::Activity { dataset, row },
            RecordKind::Summary => Self::Summary { dataset, row },
        })
    }

    pub fn dataset(&self) -> DatasetKey {
        match self {
            Self::Sleep(_) => DatasetKey::Sleeps,
            Self::Activity { dataset, .. } | Self::Summary { dataset, .. } => *dataset,
        }
    }

    pub fn raw(&self) -> &RawRow {
        match self {
            Self::Sleep(row) => row,
            Self::Activity { row, .. } | Self::Summary { row, .. } => row,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn non_object_values_are_not_rows() {
        assert!(UpstreamRow::parse(DatasetKey::Sleeps, json!([1, 2])).is_none());
        assert!(UpstreamRow::parse(DatasetKey::Sleeps, json!("x")).is_none());
    }

    #[test]
    fn tags_rows_by_dataset_family() {
        let row = UpstreamRow::parse(DatasetKey::ManuallyUpdatedActivities, json!({})).unwrap();
        assert!(matches!(row, UpstreamRow::Activity { .. }));
        assert_eq!(row.dataset(), DatasetKey::ManuallyUpdatedActivities);

        let row = UpstreamRow::parse(DatasetKey::Sleeps, json!({})).unwrap();
        assert!(matches!(row, UpstreamRow::Sleep(_)));
    }

    #[test]
    fn accessors_check_presence_and_type() {
        let row = RawRow::from_value(json!({
            "activityId": 12345,
            "name": "  ",
            "durationInSeconds": "1800",
            "distance": 5012.4,
            "nested": {"value": 81},
            "missing": null
        }))
        .unwrap();

        assert_eq!(row.text("activityId").as_deref(), Some("12345"));
        assert_eq!(row.text("name"), None);
        assert_eq!(row.integer("durationInSeconds"), Some(1800));
        assert_eq!(row.float("distance"), Some(5012.4));
        assert_eq!(row.object("nested").and_then(|n| n.integer("value")), Some(81));
        assert!(!row.contains("missing"));
        assert_eq!(row.integer("absent"), None);
    }
}
