//! HTTP surface: schedules, stop search and stop info.

mod api;
mod state;

pub use state::AppState;

use anyhow::{Context, Result};
use axum::Router;
use axum::routing::get;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/schedule", get(api::missing_stop))
        .route("/schedule/", get(api::missing_stop))
        .route("/schedule/{stop_id}", get(api::schedule))
        .route("/schedule/{stop_id}/", get(api::schedule))
        .route("/searchStops", get(api::search_stops))
        .route("/stopInfo", get(api::stop_info))
        .fallback(api::not_found)
        .layer(CorsLayer::new().allow_origin(Any))
        .with_state(state)
}

pub async fn serve(state: Arc<AppState>, port: u16) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("binding port {port}"))?;
    info!(port, "Server listening");
    axum::serve(listener, router(state))
        .await
        .context("server terminated")
}
