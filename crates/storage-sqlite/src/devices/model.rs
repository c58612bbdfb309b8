use chrono::{DateTime, Utc};
use diesel::prelude::*;
use wellsync_core::sync::{ConnectionStatus, DeviceConnection};

use crate::errors::StorageError;

#[derive(Queryable, Insertable, AsChangeset, Selectable, Debug, Clone, PartialEq)]
#[diesel(primary_key(device_id))]
#[diesel(table_name = crate::schema::device_connections)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
#[diesel(treat_none_as_null = true)]
pub struct DeviceConnectionDB {
    pub device_id: String,
    pub user_id: String,
    pub provider: String,
    pub connection_status: String,
    pub last_sync_at: Option<String>,
    pub last_error: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

fn parse_timestamp(field: &str, value: &str) -> Result<DateTime<Utc>, StorageError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StorageError::Corrupt(format!("{}: {}", field, e)))
}

impl From<&DeviceConnection> for DeviceConnectionDB {
    fn from(connection: &DeviceConnection) -> Self {
        Self {
            device_id: connection.device_id.clone(),
            user_id: connection.user_id.clone(),
            provider: connection.provider.clone(),
            connection_status: connection.connection_status.as_str().to_string(),
            last_sync_at: connection.last_sync_at.map(|dt| dt.to_rfc3339()),
            last_error: connection.last_error.clone(),
            created_at: connection.created_at.to_rfc3339(),
            updated_at: connection.updated_at.to_rfc3339(),
        }
    }
}

impl TryFrom<DeviceConnectionDB> for DeviceConnection {
    type Error = StorageError;

    fn try_from(db: DeviceConnectionDB) -> Result<Self, Self::Error> {
        let connection_status = ConnectionStatus::parse(&db.connection_status).ok_or_else(|| {
            StorageError::Corrupt(format!("connection_status '{}'", db.connection_status))
        })?;
        Ok(Self {
            last_sync_at: db
                .last_sync_at
                .as_deref()
                .map(|value| parse_timestamp("last_sync_at", value))
                .transpose()?,
            created_at: parse_timestamp("created_at", &db.created_at)?,
            updated_at: parse_timestamp("updated_at", &db.updated_at)?,
            device_id: db.device_id,
            user_id: db.user_id,
            provider: db.provider,
            connection_status,
            last_error: db.last_error,
        })
    }
}
