//! Windowed upstream fetching, fallback negotiation and idempotent ingestion.

mod capability_model;
mod device_connection;
mod error_classifier;
mod fallback_negotiator;
mod ingestion_service;
mod upstream;
mod upstream_fetcher;
mod wellness_sync_service;
mod window_planner;

pub use capability_model::*;
pub use device_connection::*;
pub use error_classifier::*;
pub use fallback_negotiator::*;
pub use ingestion_service::*;
pub use upstream::*;
pub use upstream_fetcher::*;
pub use wellness_sync_service::*;
pub use window_planner::*;
