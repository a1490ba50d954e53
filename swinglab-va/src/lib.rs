//! swinglab-va library interface
//!
//! Exposes the analysis pipeline and job orchestration for integration
//! testing.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod workflow;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::sync::Arc;
use swinglab_common::events::EventBus;

use crate::config::AnalysisConfig;
use crate::workflow::JobRunner;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Job store connection pool
    pub db: SqlitePool,
    /// Event bus for pipeline observability
    pub event_bus: EventBus,
    /// Per-job orchestrator
    pub runner: JobRunner,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(db: SqlitePool, event_bus: EventBus, config: Arc<AnalysisConfig>) -> Self {
        let runner = JobRunner::new(db.clone(), event_bus.clone(), config);
        Self {
            db,
            event_bus,
            runner,
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::analysis_routes())
        .merge(api::health_routes())
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}
