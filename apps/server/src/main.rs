mod api;
mod config;
mod error;
mod main_lib;

use tracing::info;

use crate::config::Config;
use crate::main_lib::{build_state, init_tracing};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;
    init_tracing(&config);

    let listen_addr = config.listen_addr.clone();
    let state = build_state(config)?;
    let app = api::app_router(state);

    let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
    info!("wellsync server listening on {}", listen_addr);
    axum::serve(listener, app).await?;

    Ok(())
}
