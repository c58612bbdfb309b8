use std::sync::Arc;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;
use wellsync_core::sync::{WellnessSyncService, WellnessUpstream};
use wellsync_storage_sqlite::{
    create_pool, db::write_actor::spawn_writer, init, run_migrations,
    DeviceConnectionRepository, WellnessRecordRepository,
};
use wellsync_wellness_api::WellnessApiClient;

use crate::config::Config;

pub struct AppState {
    pub sync_service: Arc<WellnessSyncService>,
    pub config: Config,
}

pub fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Builds state against the configured upstream API.
pub fn build_state(config: Config) -> anyhow::Result<Arc<AppState>> {
    let client = WellnessApiClient::new(&config.wellness_api_url)
        .context("Failed to build wellness API client")?;
    build_state_with_upstream(config, Arc::new(client))
}

/// Opens the store under `config.data_dir` and wires the sync service.
pub fn build_state_with_upstream(
    config: Config,
    upstream: Arc<dyn WellnessUpstream>,
) -> anyhow::Result<Arc<AppState>> {
    let db_path = init(&config.data_dir).context("Failed to initialize data directory")?;
    run_migrations(&db_path).context("Failed to run migrations")?;
    let pool = create_pool(&db_path).context("Failed to open database pool")?;
    let writer = spawn_writer(pool.as_ref().clone());

    let records = Arc::new(WellnessRecordRepository::new(pool.clone(), writer.clone()));
    let devices = Arc::new(DeviceConnectionRepository::new(pool, writer));

    let sync_service = Arc::new(WellnessSyncService::new(
        upstream,
        records,
        devices,
        config.sync,
    ));
    info!(
        "[Wellness] Store ready at {} (upstream {})",
        db_path, config.wellness_api_url
    );

    Ok(Arc::new(AppState {
        sync_service,
        config,
    }))
}
