//! Analysis job state machine
//!
//! **[SVA-WF-010]** A job progresses `pending → running → {done, failed}`;
//! terminal states admit no further transitions. A job is uniquely
//! identified by `job_id` and idempotently replaceable by re-submission.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{AnalysisResult, JobClassification, JobStatus};

/// Persisted analysis job record
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisJob {
    /// Unique job identifier (no path separators)
    pub job_id: String,

    /// Source clip filename relative to the media directory
    pub filename: String,

    /// Current lifecycle state
    pub status: JobStatus,

    /// Terminal classification (NOT_SWING, decode failure, ...)
    pub classification: Option<JobClassification>,

    /// First time this job identifier was created
    pub created_at: DateTime<Utc>,

    /// Latest submission time (resubmission refreshes this)
    pub requested_at: DateTime<Utc>,

    /// When the pipeline was dispatched
    pub started_at: Option<DateTime<Utc>>,

    /// When the job reached a terminal state
    pub finished_at: Option<DateTime<Utc>>,

    /// Failure diagnostics, set only on `failed`
    pub error_message: Option<String>,

    /// Analysis result, set only in terminal states
    pub result: Option<AnalysisResult>,
}

impl AnalysisJob {
    /// Create a new job record in `Pending`
    pub fn new(job_id: String, filename: String) -> Self {
        let now = Utc::now();
        Self {
            job_id,
            filename,
            status: JobStatus::Pending,
            classification: None,
            created_at: now,
            requested_at: now,
            started_at: None,
            finished_at: None,
            error_message: None,
            result: None,
        }
    }

    /// Transition to a new state, stamping `started_at`/`finished_at`
    pub fn transition_to(&mut self, new_status: JobStatus) -> JobStatus {
        let old_status = self.status;
        self.status = new_status;
        match new_status {
            JobStatus::Running => {
                self.started_at = Some(Utc::now());
            }
            JobStatus::Done | JobStatus::Failed => {
                self.finished_at = Some(Utc::now());
            }
            JobStatus::Pending => {}
        }
        old_status
    }

    /// Reset a record for re-execution after a forced or failed resubmission
    ///
    /// `created_at` is preserved; everything derived from a prior run clears.
    pub fn reset_for_resubmission(&mut self, filename: String) {
        self.filename = filename;
        self.status = JobStatus::Pending;
        self.classification = None;
        self.requested_at = Utc::now();
        self.started_at = None;
        self.finished_at = None;
        self.error_message = None;
        self.result = None;
    }

    /// Mark the job done with a result and optional classification
    pub fn complete(&mut self, result: AnalysisResult, classification: Option<JobClassification>) {
        self.result = Some(result);
        self.classification = classification;
        self.error_message = None;
        self.transition_to(JobStatus::Done);
    }

    /// Mark the job failed, preserving diagnostics and any partial result
    pub fn fail(
        &mut self,
        message: String,
        classification: JobClassification,
        result: Option<AnalysisResult>,
    ) {
        self.error_message = Some(message);
        self.classification = Some(classification);
        self.result = result;
        self.transition_to(JobStatus::Failed);
    }

    /// Check if the job is in a terminal state
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AnalysisSource;

    #[test]
    fn new_job_starts_pending() {
        let job = AnalysisJob::new("swing-7".to_string(), "swing-7.mp4".to_string());
        assert_eq!(job.status, JobStatus::Pending);
        assert!(job.result.is_none());
        assert!(job.finished_at.is_none());
        assert!(!job.is_terminal());
    }

    #[test]
    fn running_stamps_started_at() {
        let mut job = AnalysisJob::new("j".to_string(), "j.mp4".to_string());
        let old = job.transition_to(JobStatus::Running);
        assert_eq!(old, JobStatus::Pending);
        assert!(job.started_at.is_some());
        assert!(job.finished_at.is_none());
    }

    #[test]
    fn terminal_transition_stamps_finished_at() {
        let mut job = AnalysisJob::new("j".to_string(), "j.mp4".to_string());
        job.transition_to(JobStatus::Running);
        job.fail(
            "boom".to_string(),
            JobClassification::InternalError,
            None,
        );
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.is_terminal());
        assert!(job.finished_at.is_some());
        assert_eq!(job.error_message.as_deref(), Some("boom"));
    }

    #[test]
    fn resubmission_reset_preserves_created_at() {
        let mut job = AnalysisJob::new("j".to_string(), "j.mp4".to_string());
        let created = job.created_at;
        job.complete(
            AnalysisResult::unavailable(AnalysisSource::LocalFallback, String::new()),
            None,
        );
        assert!(job.is_terminal());

        job.reset_for_resubmission("j.mp4".to_string());
        assert_eq!(job.created_at, created);
        assert_eq!(job.status, JobStatus::Pending);
        assert!(job.result.is_none());
        assert!(job.classification.is_none());
        assert!(job.requested_at >= created);
    }
}
