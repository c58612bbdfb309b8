use std::sync::Arc;

use async_trait::async_trait;
use diesel::prelude::*;

use wellsync_core::sync::{DeviceConnection, DeviceConnectionRepositoryTrait};
use wellsync_core::Result;

use super::model::DeviceConnectionDB;
use crate::db::{get_connection, DbPool, WriteHandle};
use crate::errors::StorageError;
use crate::schema::device_connections;

pub struct DeviceConnectionRepository {
    pool: Arc<DbPool>,
    writer: WriteHandle,
}

impl DeviceConnectionRepository {
    pub fn new(pool: Arc<DbPool>, writer: WriteHandle) -> Self {
        Self { pool, writer }
    }
}

#[async_trait]
impl DeviceConnectionRepositoryTrait for DeviceConnectionRepository {
    fn get_for_user(&self, user_id: &str) -> Result<Option<DeviceConnection>> {
        let mut conn = get_connection(&self.pool)?;
        let row = device_connections::table
            .filter(device_connections::user_id.eq(user_id))
            .order(device_connections::updated_at.desc())
            .select(DeviceConnectionDB::as_select())
            .first::<DeviceConnectionDB>(&mut conn)
            .optional()
            .map_err(StorageError::from)?;
        Ok(row.map(DeviceConnection::try_from).transpose()?)
    }

    async fn upsert(&self, connection: DeviceConnection) -> Result<DeviceConnection> {
        let row = DeviceConnectionDB::from(&connection);
        self.writer
            .exec(move |conn| {
                diesel::insert_into(device_connections::table)
                    .values(&row)
                    .on_conflict(device_connections::device_id)
                    .do_update()
                    .set(&row)
                    .execute(conn)
                    .map_err(StorageError::from)?;
                Ok(())
            })
            .await?;
        Ok(connection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::tempdir;
    use wellsync_core::sync::ConnectionStatus;

    use crate::db::{create_pool, init, run_migrations, write_actor::spawn_writer};

    fn setup_repo() -> DeviceConnectionRepository {
        let app_data = tempdir()
            .expect("tempdir")
            .keep()
            .to_string_lossy()
            .to_string();
        let db_path = init(&app_data).expect("init db");
        run_migrations(&db_path).expect("migrate db");
        let pool = create_pool(&db_path).expect("create pool");
        let writer = spawn_writer(pool.as_ref().clone());
        DeviceConnectionRepository::new(pool, writer)
    }

    #[tokio::test]
    async fn upsert_round_trips_and_clears_error() {
        let repo = setup_repo();
        assert!(repo.get_for_user("u1").unwrap().is_none());

        let mut connection = DeviceConnection::new("u1", Utc::now());
        connection.connection_status = ConnectionStatus::Error;
        connection.last_error = Some("token expired".to_string());
        repo.upsert(connection.clone()).await.unwrap();

        let stored = repo.get_for_user("u1").unwrap().expect("stored");
        assert_eq!(stored.device_id, connection.device_id);
        assert_eq!(stored.connection_status, ConnectionStatus::Error);
        assert_eq!(stored.last_error.as_deref(), Some("token expired"));

        connection.connection_status = ConnectionStatus::Connected;
        connection.last_error = None;
        connection.last_sync_at = Some(Utc::now());
        repo.upsert(connection.clone()).await.unwrap();

        let stored = repo.get_for_user("u1").unwrap().expect("stored");
        assert_eq!(stored.connection_status, ConnectionStatus::Connected);
        assert_eq!(stored.last_error, None);
        assert!(stored.last_sync_at.is_some());
    }
}
