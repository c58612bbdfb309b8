//! Wearable wellness-data ingestion core.

pub mod errors;
pub mod health;
pub mod sync;

pub use errors::{Error, Result};
