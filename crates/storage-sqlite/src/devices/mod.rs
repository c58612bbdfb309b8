//! SQLite persistence for device connections.

mod model;
mod repository;

pub use model::DeviceConnectionDB;
pub use repository::DeviceConnectionRepository;
