use std::sync::Arc;

use axum::{routing::get, Router};

use crate::main_lib::AppState;

mod wellness;

#[cfg(test)]
mod tests;

pub fn app_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(wellness::healthz))
        .nest("/api/v1", wellness::router())
        .with_state(state)
}
