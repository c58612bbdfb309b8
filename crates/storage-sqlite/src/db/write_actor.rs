//! Serializes all writes through one dedicated connection.

use diesel::sqlite::SqliteConnection;
use log::error;
use tokio::sync::{mpsc, oneshot};

use wellsync_core::errors::{DatabaseError, Error, Result};

use super::DbPool;

type Job = Box<dyn FnOnce(&mut SqliteConnection) + Send + 'static>;

/// Either the job's own error or a transaction failure.
enum TxError {
    Job(Error),
    Diesel(diesel::result::Error),
}

impl From<diesel::result::Error> for TxError {
    fn from(err: diesel::result::Error) -> Self {
        Self::Diesel(err)
    }
}

#[derive(Clone, Debug)]
pub struct WriteHandle {
    tx: mpsc::UnboundedSender<Job>,
}

impl WriteHandle {
    /// Runs `job` on the writer connection inside an immediate transaction.
    pub async fn exec<F, T>(&self, job: F) -> Result<T>
    where
        F: FnOnce(&mut SqliteConnection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        let boxed: Job = Box::new(move |conn| {
            let result = conn
                .immediate_transaction::<T, TxError, _>(|conn| job(conn).map_err(TxError::Job))
                .map_err(|e| match e {
                    TxError::Job(err) => err,
                    TxError::Diesel(err) => crate::errors::StorageError::from(err).into(),
                });
            let _ = reply_tx.send(result);
        });

        self.tx
            .send(boxed)
            .map_err(|_| Error::Database(DatabaseError::Internal("Writer is not running".into())))?;
        reply_rx.await.map_err(|_| {
            Error::Database(DatabaseError::Internal(
                "Writer dropped the job without replying".into(),
            ))
        })?
    }
}

/// Starts the writer thread. It exits once every handle is dropped.
pub fn spawn_writer(pool: DbPool) -> WriteHandle {
    let (tx, mut rx) = mpsc::unbounded_channel::<Job>();

    let spawned = std::thread::Builder::new()
        .name("wellsync-db-writer".into())
        .spawn(move || {
            while let Some(job) = rx.blocking_recv() {
                match pool.get() {
                    Ok(mut conn) => job(&mut *conn),
                    // Dropping the job closes its reply channel.
                    Err(e) => error!("Writer could not acquire a connection: {}", e),
                }
            }
        });
    if let Err(e) = spawned {
        error!("Failed to start database writer thread: {}", e);
    }

    WriteHandle { tx }
}
