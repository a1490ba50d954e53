//! Event types for the SwingLab event system
//!
//! Provides shared event definitions and the EventBus used by the Video
//! Analysis service for internal decoupling and observability.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Analysis job lifecycle state
///
/// Single canonical vocabulary for job state; terminal states are
/// `Done` and `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Job accepted, pipeline not yet dispatched
    Pending,
    /// Pipeline executing in the background
    Running,
    /// Pipeline finished with a result
    Done,
    /// Pipeline finished with an error
    Failed,
}

impl JobStatus {
    /// Terminal states admit no further transitions
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Failed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Done => "done",
            JobStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Classification attached to a terminal job state
///
/// `NotSwing` rides a `Done` job (the precheck gate is a classified result,
/// not an error); the remaining variants ride `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobClassification {
    /// Precheck decided the clip does not contain a swing
    NotSwing,
    /// Unrecoverable decode/container problem in preparation or analysis
    DecodeFailure,
    /// Normalizer/track builder produced no usable frames or tracks
    NoData,
    /// Unexpected failure caught at the orchestrator boundary
    InternalError,
}

/// SwingLab event types
///
/// Events are broadcast via EventBus; subscribers observe the job pipeline
/// without coupling to the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SwingEvent {
    /// Analysis job accepted for execution
    JobSubmitted {
        job_id: String,
        filename: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Job transitioned between lifecycle states
    JobStateChanged {
        job_id: String,
        old_status: JobStatus,
        new_status: JobStatus,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Video preparation finished (repair, transcode, or cache hit)
    VideoPrepared {
        job_id: String,
        prepared_path: String,
        reused_cache: bool,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Precheck gate produced a decision
    PrecheckCompleted {
        job_id: String,
        is_swing: bool,
        reason: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Analysis produced a terminal result
    AnalysisCompleted {
        job_id: String,
        status: JobStatus,
        classification: Option<JobClassification>,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

// ============================================================================
// EventBus Implementation
// ============================================================================

/// Broadcast event bus backed by `tokio::sync::broadcast`
///
/// Slow subscribers lag and drop old events rather than blocking emitters.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SwingEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<SwingEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: SwingEvent,
    ) -> Result<usize, broadcast::error::SendError<SwingEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: SwingEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_status_terminal_states() {
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(JobStatus::Done.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
    }

    #[test]
    fn job_status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&JobStatus::Running).unwrap(),
            "\"running\""
        );
        assert_eq!(
            serde_json::to_string(&JobClassification::NotSwing).unwrap(),
            "\"NOT_SWING\""
        );
    }

    #[tokio::test]
    async fn event_bus_delivers_to_subscriber() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.emit_lossy(SwingEvent::JobSubmitted {
            job_id: "swing-001".to_string(),
            filename: "swing-001.mp4".to_string(),
            timestamp: chrono::Utc::now(),
        });

        match rx.recv().await.unwrap() {
            SwingEvent::JobSubmitted { job_id, .. } => assert_eq!(job_id, "swing-001"),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn emit_without_subscribers_is_lossy() {
        let bus = EventBus::new(4);
        assert_eq!(bus.subscriber_count(), 0);
        bus.emit_lossy(SwingEvent::PrecheckCompleted {
            job_id: "j".to_string(),
            is_swing: true,
            reason: "ok".to_string(),
            timestamp: chrono::Utc::now(),
        });
    }
}
