//! SQLite persistence for canonical wellness records.

mod model;
mod repository;

pub use model::WellnessRecordDB;
pub use repository::WellnessRecordRepository;
