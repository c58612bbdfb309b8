//! Environment-driven server configuration.

use std::str::FromStr;

use anyhow::Context;
use wellsync_core::sync::{
    SyncConfig, DEFAULT_LOOKBACK_DAYS, DEFAULT_MAX_WINDOW_SECS, MAX_LOOKBACK_DAYS,
    MIN_LOOKBACK_DAYS,
};
use wellsync_wellness_api::DEFAULT_BASE_URL;

const DEFAULT_DATA_DIR: &str = "./data";
const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8088";

#[derive(Debug, Clone)]
pub struct Config {
    pub listen_addr: String,
    pub data_dir: String,
    pub wellness_api_url: String,
    pub log_level: String,
    pub sync: SyncConfig,
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_parse<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env_string(key) {
        Some(raw) => raw
            .parse::<T>()
            .with_context(|| format!("Invalid value for {}: '{}'", key, raw)),
        None => Ok(default),
    }
}

fn wellness_api_base_url() -> String {
    env_string("WELLNESS_API_URL")
        .map(|v| v.trim_end_matches('/').to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let max_window_seconds: i64 = env_parse("WELLSYNC_MAX_WINDOW_SECS", DEFAULT_MAX_WINDOW_SECS)?;
        if max_window_seconds <= 0 {
            anyhow::bail!("WELLSYNC_MAX_WINDOW_SECS must be positive");
        }
        let default_days: u32 = env_parse("WELLSYNC_DEFAULT_DAYS", DEFAULT_LOOKBACK_DAYS)?;

        Ok(Self {
            listen_addr: env_string("WELLSYNC_LISTEN_ADDR")
                .unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_string()),
            data_dir: env_string("WELLSYNC_DATA_DIR").unwrap_or_else(|| DEFAULT_DATA_DIR.to_string()),
            wellness_api_url: wellness_api_base_url(),
            log_level: env_string("RUST_LOG").unwrap_or_else(|| "info".to_string()),
            sync: SyncConfig {
                max_window_seconds,
                default_days: default_days.clamp(MIN_LOOKBACK_DAYS, MAX_LOOKBACK_DAYS),
                ..SyncConfig::default()
            },
        })
    }
}
