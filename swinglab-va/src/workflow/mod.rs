//! Job orchestration
//!
//! **[SVA-WF-020]** Submission is idempotent per job identifier; the
//! pipeline runs as a background task while the caller gets an immediate
//! acknowledgment. At most one pipeline execution per identifier is in
//! flight at any time, enforced by an in-memory set with a drop guard.

pub mod pipeline;

use serde::Deserialize;
use sqlx::SqlitePool;
use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex};
use swinglab_common::events::{EventBus, SwingEvent};
use swinglab_common::{Error, Result};

use crate::config::AnalysisConfig;
use crate::models::{AnalysisJob, JobStatus};
use crate::services::is_supported_extension;

/// Analysis submission request
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRequest {
    /// Job identifier; derived from the filename stem when absent
    pub job_id: Option<String>,
    /// Clip filename relative to the media directory
    pub filename: Option<String>,
    /// Override idempotent replay and bypass the precheck gate
    #[serde(default)]
    pub force: bool,
    /// Declared frame rate from the upstream producer
    pub fps: Option<f64>,
    /// Inline detection payload (arbitrary schema, normalized downstream)
    pub detections: Option<serde_json::Value>,
}

/// Submission outcome: the job as acknowledged, and whether a new pipeline
/// execution was dispatched for it
#[derive(Debug, Clone)]
pub struct SubmitOutcome {
    pub job: AnalysisJob,
    pub dispatched: bool,
}

/// Per-job orchestrator
#[derive(Clone)]
pub struct JobRunner {
    pub(crate) db: SqlitePool,
    pub(crate) event_bus: EventBus,
    pub(crate) config: Arc<AnalysisConfig>,
    /// Identifiers with a pipeline execution currently in flight
    in_flight: Arc<Mutex<HashSet<String>>>,
}

impl JobRunner {
    pub fn new(db: SqlitePool, event_bus: EventBus, config: Arc<AnalysisConfig>) -> Self {
        Self {
            db,
            event_bus,
            config,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Accept an analysis submission
    ///
    /// Input errors (bad identifier, unsupported extension, missing source)
    /// surface synchronously; the job is not created. Resubmitting an
    /// identifier already `pending`/`running`/`done` returns the existing
    /// state unless `force` is set; `force` on a `running` job acknowledges
    /// without restarting it.
    pub async fn submit(&self, request: SubmitRequest) -> Result<SubmitOutcome> {
        let existing = match &request.job_id {
            Some(id) => {
                validate_job_id(id)?;
                crate::db::jobs::load_job(&self.db, id).await?
            }
            None => None,
        };

        let filename = request
            .filename
            .clone()
            .or_else(|| existing.as_ref().map(|j| j.filename.clone()))
            .ok_or_else(|| Error::InvalidInput("filename is required".to_string()))?;

        if filename.contains('/') || filename.contains('\\') {
            return Err(Error::InvalidInput(format!(
                "filename must not contain path separators: {}",
                filename
            )));
        }
        if !is_supported_extension(&filename) {
            return Err(Error::InvalidInput(format!(
                "unsupported video container: {}",
                filename
            )));
        }

        let job_id = match request.job_id.clone() {
            Some(id) => id,
            None => {
                let id = derive_job_id(&filename)?;
                validate_job_id(&id)?;
                id
            }
        };

        let source = self.config.media_dir().join(&filename);
        if !source.exists() {
            return Err(Error::NotFound(format!(
                "source video not found: {}",
                filename
            )));
        }

        // Idempotency: a derived identifier may still hit an existing job
        let existing = match existing {
            Some(j) => Some(j),
            None => crate::db::jobs::load_job(&self.db, &job_id).await?,
        };

        let mut job = match existing {
            Some(existing) => match existing.status {
                JobStatus::Running if request.force => {
                    // Acknowledge but never restart an in-flight pipeline
                    tracing::info!(
                        job_id = %job_id,
                        "force submission on running job acknowledged without restart"
                    );
                    return Ok(SubmitOutcome {
                        job: existing,
                        dispatched: false,
                    });
                }
                JobStatus::Pending | JobStatus::Running | JobStatus::Done if !request.force => {
                    tracing::debug!(
                        job_id = %job_id,
                        status = %existing.status,
                        "idempotent resubmission, returning existing state"
                    );
                    return Ok(SubmitOutcome {
                        job: existing,
                        dispatched: false,
                    });
                }
                _ => {
                    // Failed, or forced pending/done: re-run
                    let mut refreshed = existing;
                    refreshed.reset_for_resubmission(filename.clone());
                    refreshed
                }
            },
            None => AnalysisJob::new(job_id.clone(), filename.clone()),
        };

        // Transition to running happens synchronously on accept
        let old_status = job.transition_to(JobStatus::Running);
        crate::db::jobs::save_job(&self.db, &job).await?;

        self.event_bus.emit_lossy(SwingEvent::JobSubmitted {
            job_id: job.job_id.clone(),
            filename: job.filename.clone(),
            timestamp: chrono::Utc::now(),
        });
        self.event_bus.emit_lossy(SwingEvent::JobStateChanged {
            job_id: job.job_id.clone(),
            old_status,
            new_status: job.status,
            timestamp: chrono::Utc::now(),
        });

        tracing::info!(
            job_id = %job.job_id,
            filename = %job.filename,
            force = request.force,
            "analysis job accepted, dispatching pipeline"
        );

        let runner = self.clone();
        let background_job = job.clone();
        let fps = request.fps;
        let detections = request.detections.clone();
        let force = request.force;
        tokio::spawn(async move {
            runner.execute(background_job, fps, detections, force).await;
        });

        Ok(SubmitOutcome {
            job,
            dispatched: true,
        })
    }

    /// Try to claim the in-flight slot for an identifier; `None` means a
    /// pipeline execution for it is already running
    pub(crate) fn claim_in_flight(&self, job_id: &str) -> Option<InFlightGuard> {
        let mut set = self
            .in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if !set.insert(job_id.to_string()) {
            return None;
        }
        Some(InFlightGuard {
            set: Arc::clone(&self.in_flight),
            job_id: job_id.to_string(),
        })
    }
}

/// Drop guard releasing the per-identifier in-flight slot
pub(crate) struct InFlightGuard {
    set: Arc<Mutex<HashSet<String>>>,
    job_id: String,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let mut set = self
            .set
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        set.remove(&self.job_id);
    }
}

/// Job identifiers are path-safe single segments
pub fn validate_job_id(job_id: &str) -> Result<()> {
    if job_id.trim().is_empty() {
        return Err(Error::InvalidInput("job identifier is empty".to_string()));
    }
    if job_id.contains('/') || job_id.contains('\\') {
        return Err(Error::InvalidInput(format!(
            "job identifier must not contain path separators: {}",
            job_id
        )));
    }
    if job_id == "." || job_id == ".." {
        return Err(Error::InvalidInput(format!(
            "invalid job identifier: {}",
            job_id
        )));
    }
    Ok(())
}

/// Derive a job identifier from the clip filename stem
pub fn derive_job_id(filename: &str) -> Result<String> {
    Path::new(filename)
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| {
            Error::InvalidInput(format!(
                "cannot derive job identifier from filename: {}",
                filename
            ))
        })
}
