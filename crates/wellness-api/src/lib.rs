//! REST client for the wearable vendor's wellness API.

mod client;
mod error;

pub use client::{WellnessApiClient, DEFAULT_BASE_URL, PERMISSIONS_PATH};
pub use error::{Result, WellnessApiError};
