//! SQLite storage for wellness records and device connections.

pub mod db;
pub mod devices;
pub mod errors;
pub mod schema;
pub mod wellness;

pub use db::{create_pool, get_connection, init, run_migrations, DbPool, WriteHandle};
pub use devices::DeviceConnectionRepository;
pub use errors::StorageError;
pub use wellness::WellnessRecordRepository;
