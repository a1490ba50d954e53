//! Data models for the Video Analysis service

pub mod analysis;
pub mod job;

pub use analysis::{
    AnalysisResult, AnalysisSource, ImpactStability, PlaneLabel, StabilityLabel, SwingEvents,
    SwingMetrics, SwingPlane, Tempo,
};
pub use job::AnalysisJob;
pub use swinglab_common::events::{JobClassification, JobStatus};
