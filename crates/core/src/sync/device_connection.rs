//! Device connection lifecycle and per-device single-flight guard.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, error};
use serde::{Deserialize, Serialize};

use crate::errors::{Error, Result};

/// Provider name stored on connections created by this engine.
pub const WEARABLE_PROVIDER: &str = "wearable";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Disconnected,
    Connected,
    Syncing,
    Error,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connected => "connected",
            Self::Syncing => "syncing",
            Self::Error => "error",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "disconnected" => Some(Self::Disconnected),
            "connected" => Some(Self::Connected),
            "syncing" => Some(Self::Syncing),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceConnection {
    pub device_id: String,
    pub user_id: String,
    pub provider: String,
    pub connection_status: ConnectionStatus,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Terminal outcome of a sync pass as seen by the connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncPassOutcome {
    Completed,
    NeedsReauth { message: String },
    /// Provisioning gaps, missing permissions, generic failures.
    Failed,
}

impl DeviceConnection {
    pub fn new(user_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            device_id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            provider: WEARABLE_PROVIDER.to_string(),
            connection_status: ConnectionStatus::Disconnected,
            last_sync_at: None,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Enters `syncing` and returns the status held before the pass.
    pub fn begin_sync(&mut self, now: DateTime<Utc>) -> ConnectionStatus {
        let prior = self.connection_status;
        self.connection_status = ConnectionStatus::Syncing;
        self.updated_at = now;
        prior
    }

    /// Leaves `syncing`.
    ///
    /// Only a reauth outcome moves the connection to `error`. A completed pass
    /// connects the device unless it was already in `error`; every other
    /// outcome restores the prior status.
    pub fn finish_sync(
        &mut self,
        prior: ConnectionStatus,
        outcome: &SyncPassOutcome,
        now: DateTime<Utc>,
    ) {
        self.updated_at = now;
        match outcome {
            SyncPassOutcome::NeedsReauth { message } => {
                self.connection_status = ConnectionStatus::Error;
                self.last_error = Some(message.clone());
            }
            SyncPassOutcome::Completed if prior != ConnectionStatus::Error => {
                self.connection_status = ConnectionStatus::Connected;
                self.last_sync_at = Some(now);
                self.last_error = None;
            }
            SyncPassOutcome::Completed | SyncPassOutcome::Failed => {
                self.connection_status = prior;
            }
        }
    }
}

#[async_trait]
pub trait DeviceConnectionRepositoryTrait: Send + Sync {
    fn get_for_user(&self, user_id: &str) -> Result<Option<DeviceConnection>>;

    async fn upsert(&self, connection: DeviceConnection) -> Result<DeviceConnection>;
}

/// In-process set of `(user, provider)` slots with a pass in flight. Keyed on
/// provider, not device id: the slot is held before the device row exists.
#[derive(Debug, Clone, Default)]
pub struct SyncFlightRegistry {
    in_flight: Arc<Mutex<HashSet<String>>>,
}

impl SyncFlightRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims the `(user_id, provider)` slot; fails when a pass is already running.
    pub fn acquire(&self, user_id: &str, provider: &str) -> Result<SyncFlightGuard> {
        let key = format!("{}:{}", user_id, provider);
        let mut in_flight = self
            .in_flight
            .lock()
            .map_err(|_| Error::Unexpected("Sync flight registry is poisoned".to_string()))?;
        if !in_flight.insert(key.clone()) {
            return Err(Error::SyncInProgress(user_id.to_string()));
        }
        Ok(SyncFlightGuard {
            registry: self.in_flight.clone(),
            key,
        })
    }

    pub fn is_in_flight(&self, user_id: &str, provider: &str) -> bool {
        self.in_flight
            .lock()
            .map(|set| set.contains(&format!("{}:{}", user_id, provider)))
            .unwrap_or(false)
    }
}

/// Releases the device slot on drop.
#[derive(Debug)]
pub struct SyncFlightGuard {
    registry: Arc<Mutex<HashSet<String>>>,
    key: String,
}

impl Drop for SyncFlightGuard {
    fn drop(&mut self) {
        if let Ok(mut in_flight) = self.registry.lock() {
            in_flight.remove(&self.key);
        }
    }
}

/// A device connection held in `syncing` for the duration of one pass.
///
/// Exactly one of [`complete`](Self::complete), [`needs_reauth`](Self::needs_reauth)
/// or [`fail`](Self::fail) ends the session and persists the final status.
pub struct DeviceSyncSession {
    repository: Arc<dyn DeviceConnectionRepositoryTrait>,
    connection: DeviceConnection,
    prior_status: ConnectionStatus,
    _guard: SyncFlightGuard,
}

impl DeviceSyncSession {
    /// Marks the device `syncing` and persists that status. `guard` must be
    /// the slot claimed for the connection's user and provider.
    pub async fn start(
        repository: Arc<dyn DeviceConnectionRepositoryTrait>,
        guard: SyncFlightGuard,
        mut connection: DeviceConnection,
    ) -> Result<Self> {
        let prior_status = connection.begin_sync(Utc::now());
        let connection = repository.upsert(connection).await?;
        debug!(
            "[WellnessSync] Device {} syncing (prior status {})",
            connection.device_id,
            prior_status.as_str()
        );
        Ok(Self {
            repository,
            connection,
            prior_status,
            _guard: guard,
        })
    }

    pub fn connection(&self) -> &DeviceConnection {
        &self.connection
    }

    pub fn prior_status(&self) -> ConnectionStatus {
        self.prior_status
    }

    pub async fn complete(self) -> Result<DeviceConnection> {
        self.finish(SyncPassOutcome::Completed).await
    }

    pub async fn needs_reauth(self, message: impl Into<String>) -> Result<DeviceConnection> {
        self.finish(SyncPassOutcome::NeedsReauth {
            message: message.into(),
        })
        .await
    }

    pub async fn fail(self) -> Result<DeviceConnection> {
        self.finish(SyncPassOutcome::Failed).await
    }

    async fn finish(self, outcome: SyncPassOutcome) -> Result<DeviceConnection> {
        let Self {
            repository,
            mut connection,
            prior_status,
            _guard,
        } = self;
        connection.finish_sync(prior_status, &outcome, Utc::now());
        let device_id = connection.device_id.clone();
        repository.upsert(connection).await.inspect_err(|e| {
            error!(
                "[WellnessSync] Failed to persist final status for device {}: {}",
                device_id, e
            );
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connection_in(status: ConnectionStatus) -> DeviceConnection {
        let mut connection = DeviceConnection::new("user-1", Utc::now());
        connection.connection_status = status;
        connection
    }

    #[test]
    fn completed_pass_connects_device() {
        let mut connection = connection_in(ConnectionStatus::Disconnected);
        let prior = connection.begin_sync(Utc::now());
        assert_eq!(connection.connection_status, ConnectionStatus::Syncing);

        let now = Utc::now();
        connection.finish_sync(prior, &SyncPassOutcome::Completed, now);
        assert_eq!(connection.connection_status, ConnectionStatus::Connected);
        assert_eq!(connection.last_sync_at, Some(now));
    }

    #[test]
    fn completed_pass_keeps_error_status() {
        let mut connection = connection_in(ConnectionStatus::Error);
        let prior = connection.begin_sync(Utc::now());
        connection.finish_sync(prior, &SyncPassOutcome::Completed, Utc::now());
        assert_eq!(connection.connection_status, ConnectionStatus::Error);
        assert_eq!(connection.last_sync_at, None);
    }

    #[test]
    fn only_reauth_moves_to_error() {
        let mut connection = connection_in(ConnectionStatus::Connected);
        let prior = connection.begin_sync(Utc::now());
        connection.finish_sync(prior, &SyncPassOutcome::Failed, Utc::now());
        assert_eq!(connection.connection_status, ConnectionStatus::Connected);

        let prior = connection.begin_sync(Utc::now());
        connection.finish_sync(
            prior,
            &SyncPassOutcome::NeedsReauth {
                message: "token expired".to_string(),
            },
            Utc::now(),
        );
        assert_eq!(connection.connection_status, ConnectionStatus::Error);
        assert_eq!(connection.last_error.as_deref(), Some("token expired"));
    }

    #[test]
    fn registry_rejects_second_pass_until_guard_drops() {
        let registry = SyncFlightRegistry::new();
        let guard = registry.acquire("u", WEARABLE_PROVIDER).unwrap();
        assert!(registry.is_in_flight("u", WEARABLE_PROVIDER));
        assert!(matches!(
            registry.acquire("u", WEARABLE_PROVIDER),
            Err(Error::SyncInProgress(_))
        ));
        assert!(registry.acquire("u", "other").is_ok());
        assert!(registry.acquire("v", WEARABLE_PROVIDER).is_ok());

        drop(guard);
        assert!(!registry.is_in_flight("u", WEARABLE_PROVIDER));
        assert!(registry.acquire("u", WEARABLE_PROVIDER).is_ok());
    }

    #[test]
    fn status_round_trips_through_str() {
        for status in [
            ConnectionStatus::Disconnected,
            ConnectionStatus::Connected,
            ConnectionStatus::Syncing,
            ConnectionStatus::Error,
        ] {
            assert_eq!(ConnectionStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(ConnectionStatus::parse("bogus"), None);
    }
}
