//! API handlers for the job contract

pub mod health;
pub mod jobs;

pub use health::health_routes;
pub use jobs::analysis_routes;
