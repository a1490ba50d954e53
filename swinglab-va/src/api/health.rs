//! Health check endpoint

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
    pub uptime_seconds: i64,
}

pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health))
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let uptime = (chrono::Utc::now() - state.startup_time).num_seconds();
    Json(HealthResponse {
        status: "ok",
        service: "swinglab-va",
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: uptime,
    })
}
