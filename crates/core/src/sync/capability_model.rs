//! Per-dataset capability catalog assembled from upstream metadata.

use std::collections::HashMap;

use log::debug;
use serde::{Deserialize, Serialize};

use super::error_classifier::{
    classify_failure, is_auth_error, is_not_provisioned, summarize_body, FailureClass,
};
use super::fallback_negotiator::NegotiationFailure;
use super::upstream::{UpstreamCallError, UpstreamCredential, WellnessUpstream};
use super::window_planner::{QueryMode, SyncWindow};
use crate::health::DatasetKey;

/// Result of checking one dataset endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndpointCheck {
    Reachable,
    Unreachable { reason: String },
    /// Check not attempted because the permission is missing.
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilityDescriptor {
    pub dataset_key: DatasetKey,
    pub label: String,
    pub permission_granted: bool,
    pub endpoint_reachable: bool,
    pub enabled_for_sync: bool,
    pub supported_locally: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl CapabilityDescriptor {
    fn new(dataset: DatasetKey, permission_granted: bool, check: &EndpointCheck) -> Self {
        let endpoint_reachable = matches!(check, EndpointCheck::Reachable);
        let supported_locally = dataset.supported_locally();

        let reason = if !permission_granted {
            Some(format!(
                "Permission {} not granted",
                dataset.required_permission()
            ))
        } else if let EndpointCheck::Unreachable { reason } = check {
            Some(reason.clone())
        } else if !endpoint_reachable {
            Some("Endpoint not checked".to_string())
        } else if !supported_locally {
            Some("Dataset is not imported by this application yet".to_string())
        } else {
            None
        };

        Self {
            dataset_key: dataset,
            label: dataset.label().to_string(),
            permission_granted,
            endpoint_reachable,
            enabled_for_sync: permission_granted && endpoint_reachable && supported_locally,
            supported_locally,
            reason,
        }
    }
}

/// Builds one descriptor per allow-listed dataset, in allow-list order.
///
/// Checks for unrecognized keys are dropped. Allow-listed keys without a
/// check are reported as unreachable.
pub fn build_capability_catalog<I>(
    credential: &UpstreamCredential,
    checks: I,
) -> Vec<CapabilityDescriptor>
where
    I: IntoIterator<Item = (String, EndpointCheck)>,
{
    let mut by_key: HashMap<DatasetKey, EndpointCheck> = HashMap::new();
    for (raw_key, check) in checks {
        match raw_key.parse::<DatasetKey>() {
            Ok(dataset) => {
                by_key.entry(dataset).or_insert(check);
            }
            Err(_) => debug!(
                "[WellnessSync] Dropping capability for unrecognized dataset '{}'",
                raw_key
            ),
        }
    }

    DatasetKey::ALL
        .iter()
        .map(|dataset| {
            let permission_granted = credential.has_scope(dataset.required_permission());
            let check = by_key.remove(dataset).unwrap_or(EndpointCheck::Skipped);
            CapabilityDescriptor::new(*dataset, permission_granted, &check)
        })
        .collect()
}

/// Checks one dataset with a primary-mode request over the most recent
/// `check_window_seconds`.
///
/// A retryable classification still counts as reachable: the endpoint exists
/// and only the query mode was rejected. Auth failures abort the catalog.
pub async fn check_endpoint(
    upstream: &dyn WellnessUpstream,
    credential: &UpstreamCredential,
    dataset: DatasetKey,
    now_epoch_seconds: i64,
    check_window_seconds: i64,
) -> Result<EndpointCheck, NegotiationFailure> {
    let window = SyncWindow {
        start_epoch_seconds: (now_epoch_seconds - check_window_seconds.max(1)).max(0),
        end_epoch_seconds: now_epoch_seconds.max(0),
        mode: QueryMode::Primary,
    };

    let failure = match upstream.fetch_window(credential, dataset, &window).await {
        Ok(_) => return Ok(EndpointCheck::Reachable),
        Err(UpstreamCallError::Transport(message)) => {
            return Ok(EndpointCheck::Unreachable {
                reason: format!("Upstream unreachable: {}", message),
            });
        }
        Err(UpstreamCallError::Status(failure)) => failure,
    };

    if is_auth_error(failure.http_status, &failure.raw_body) {
        return Err(NegotiationFailure {
            dataset,
            mode: QueryMode::Primary,
            class: FailureClass::AuthError,
            http_status: Some(failure.http_status),
            summary: summarize_body(&failure.raw_body),
            window: Some(window),
        });
    }
    if is_not_provisioned(&failure) {
        return Ok(EndpointCheck::Unreachable {
            reason: "Endpoint not enabled for this application".to_string(),
        });
    }

    let class = classify_failure(&failure);
    if class.is_retryable() {
        Ok(EndpointCheck::Reachable)
    } else {
        Ok(EndpointCheck::Unreachable {
            reason: summarize_body(&failure.raw_body),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credential(scopes: &[&str]) -> UpstreamCredential {
        UpstreamCredential::new("tok", scopes.iter().map(|s| s.to_string()))
    }

    #[test]
    fn catalog_has_one_descriptor_per_allow_listed_key() {
        let catalog = build_capability_catalog(
            &credential(&["HEALTH_EXPORT", "ACTIVITY_EXPORT"]),
            vec![
                ("sleeps".to_string(), EndpointCheck::Reachable),
                ("moveIQ".to_string(), EndpointCheck::Reachable),
                ("bogus".to_string(), EndpointCheck::Reachable),
            ],
        );
        assert_eq!(catalog.len(), DatasetKey::ALL.len());
        assert!(catalog.iter().all(|d| d.dataset_key.as_str() != "moveIQ"));
    }

    #[test]
    fn enabled_requires_permission_reachability_and_local_support() {
        let catalog = build_capability_catalog(
            &credential(&["HEALTH_EXPORT"]),
            vec![
                ("sleeps".to_string(), EndpointCheck::Reachable),
                ("epochs".to_string(), EndpointCheck::Reachable),
                ("activities".to_string(), EndpointCheck::Reachable),
                (
                    "hrv".to_string(),
                    EndpointCheck::Unreachable {
                        reason: "Endpoint not enabled for this application".to_string(),
                    },
                ),
            ],
        );
        let find = |key: DatasetKey| catalog.iter().find(|d| d.dataset_key == key).unwrap();

        let sleeps = find(DatasetKey::Sleeps);
        assert!(sleeps.enabled_for_sync);
        assert_eq!(sleeps.reason, None);

        let epochs = find(DatasetKey::Epochs);
        assert!(!epochs.enabled_for_sync);
        assert!(!epochs.supported_locally);
        assert!(epochs.reason.as_deref().unwrap().contains("not imported"));

        let activities = find(DatasetKey::Activities);
        assert!(!activities.permission_granted);
        assert_eq!(
            activities.reason.as_deref(),
            Some("Permission ACTIVITY_EXPORT not granted")
        );

        let hrv = find(DatasetKey::Hrv);
        assert!(hrv.permission_granted);
        assert!(!hrv.endpoint_reachable);
        assert_eq!(
            hrv.reason.as_deref(),
            Some("Endpoint not enabled for this application")
        );

        let dailies = find(DatasetKey::Dailies);
        assert_eq!(dailies.reason.as_deref(), Some("Endpoint not checked"));
    }

    #[test]
    fn descriptor_serializes_camel_case() {
        let catalog = build_capability_catalog(
            &credential(&["HEALTH_EXPORT"]),
            vec![("sleeps".to_string(), EndpointCheck::Reachable)],
        );
        let value = serde_json::to_value(&catalog[2]).unwrap();
        assert_eq!(value["datasetKey"], "sleeps");
        assert_eq!(value["enabledForSync"], true);
        assert!(value.get("reason").is_none());
    }
}
