//! Pipeline execution
//!
//! **[SVA-WF-030]** Video Preparation → precheck gate → analysis (Metrics
//! Engine over supplied detections, or the external delegate, or the local
//! fallback) → persisted terminal state. Component-level data-quality
//! problems degrade to null fields; only resource failures become job
//! failures, and they are always caught here rather than crashing the
//! process.
//!
//! Per-subprocess deadlines are the only timeouts; a pipeline-wide deadline
//! is future hardening.

use serde_json::Value;
use swinglab_common::events::SwingEvent;
use uuid::Uuid;

use crate::models::{
    AnalysisJob, AnalysisResult, AnalysisSource, JobClassification, SwingEvents,
};
use crate::services::event_detector::EventSignals;
use crate::services::track_builder::{CoordinateDomain, Track};
use crate::services::{
    compute_metrics, detect_events, is_decode_failure_text, normalize_payload, DelegateClient,
    DelegateError, PrecheckClient, PrecheckDecision, PreparedVideo, VideoPreparer,
};
use crate::workflow::JobRunner;

/// Terminal outcome of one pipeline execution
enum PipelineOutcome {
    Done {
        result: AnalysisResult,
        classification: Option<JobClassification>,
    },
    Failed {
        message: String,
        classification: JobClassification,
        result: Option<AnalysisResult>,
    },
}

impl JobRunner {
    /// Execute the pipeline for an accepted job and persist the terminal
    /// state. Never panics the orchestrator; never runs twice concurrently
    /// for one identifier.
    pub(crate) async fn execute(
        &self,
        mut job: AnalysisJob,
        fps_hint: Option<f64>,
        detections: Option<Value>,
        force: bool,
    ) {
        let _guard = match self.claim_in_flight(&job.job_id) {
            Some(guard) => guard,
            None => {
                tracing::warn!(
                    job_id = %job.job_id,
                    "pipeline already in flight for identifier, ignoring trigger"
                );
                return;
            }
        };

        let outcome = self.run_pipeline(&job, fps_hint, detections, force).await;

        let old_status = job.status;
        match outcome {
            PipelineOutcome::Done {
                result,
                classification,
            } => {
                job.complete(result, classification);
            }
            PipelineOutcome::Failed {
                message,
                classification,
                result,
            } => {
                tracing::warn!(
                    job_id = %job.job_id,
                    classification = ?classification,
                    error = %message,
                    "analysis pipeline failed"
                );
                job.fail(message, classification, result);
            }
        }

        if let Err(e) = crate::db::jobs::save_job(&self.db, &job).await {
            tracing::error!(
                job_id = %job.job_id,
                error = %e,
                "failed to persist terminal job state"
            );
        }

        self.event_bus.emit_lossy(SwingEvent::JobStateChanged {
            job_id: job.job_id.clone(),
            old_status,
            new_status: job.status,
            timestamp: chrono::Utc::now(),
        });
        self.event_bus.emit_lossy(SwingEvent::AnalysisCompleted {
            job_id: job.job_id.clone(),
            status: job.status,
            classification: job.classification,
            timestamp: chrono::Utc::now(),
        });

        tracing::info!(
            job_id = %job.job_id,
            status = %job.status,
            classification = ?job.classification,
            "analysis job finished"
        );
    }

    async fn run_pipeline(
        &self,
        job: &AnalysisJob,
        fps_hint: Option<f64>,
        detections: Option<Value>,
        force: bool,
    ) -> PipelineOutcome {
        let source = self.config.media_dir().join(&job.filename);

        // Stage 1: container preparation
        let preparer = VideoPreparer::new(
            self.config.ffmpeg_path.clone(),
            self.config.ffprobe_path.clone(),
            self.config.prepared_dir(),
            self.config.probe_timeout,
            self.config.remux_timeout,
            self.config.transcode_timeout,
        );
        let prepared = match preparer.prepare(&source).await {
            Ok(p) => p,
            Err(e) => {
                let message = e.to_string();
                let classification = if e.is_decode_failure() || is_decode_failure_text(&message)
                {
                    JobClassification::DecodeFailure
                } else {
                    JobClassification::InternalError
                };
                return PipelineOutcome::Failed {
                    message,
                    classification,
                    result: None,
                };
            }
        };

        self.event_bus.emit_lossy(SwingEvent::VideoPrepared {
            job_id: job.job_id.clone(),
            prepared_path: prepared.path.display().to_string(),
            reused_cache: prepared.reused_cache,
            timestamp: chrono::Utc::now(),
        });

        // Stage 2: precheck gate (the override flag bypasses it entirely)
        if !force {
            if let Some(decision) = self.run_precheck(job, &prepared).await {
                return decision;
            }
        }

        // Stage 3: analysis
        let detections = detections.or_else(|| self.load_sidecar_detections(&job.filename));
        match detections {
            Some(payload) => self.analyze_detections(&payload, fps_hint, prepared.warnings),
            None => self.analyze_delegated(&prepared, fps_hint).await,
        }
    }

    /// Run the precheck gate; `Some` means the pipeline terminates here
    async fn run_precheck(
        &self,
        job: &AnalysisJob,
        prepared: &PreparedVideo,
    ) -> Option<PipelineOutcome> {
        let command = self.config.precheck_command.as_ref()?;
        let client = PrecheckClient::new(
            command.clone(),
            self.config.precheck_settings.clone(),
            self.config.precheck_timeout,
        );

        match client.run(&prepared.path).await {
            PrecheckDecision::NotSwing { reason } => {
                self.event_bus.emit_lossy(SwingEvent::PrecheckCompleted {
                    job_id: job.job_id.clone(),
                    is_swing: false,
                    reason: reason.clone(),
                    timestamp: chrono::Utc::now(),
                });
                let mut result = AnalysisResult::unavailable(
                    AnalysisSource::LocalFallback,
                    format!("No swing detected ({}); full analysis skipped.", reason),
                );
                result.warnings = prepared.warnings.clone();
                Some(PipelineOutcome::Done {
                    result,
                    classification: Some(JobClassification::NotSwing),
                })
            }
            PrecheckDecision::Proceed { reason } => {
                self.event_bus.emit_lossy(SwingEvent::PrecheckCompleted {
                    job_id: job.job_id.clone(),
                    is_swing: true,
                    reason,
                    timestamp: chrono::Utc::now(),
                });
                None
            }
        }
    }

    /// Metrics Engine over an externally supplied detection payload
    fn analyze_detections(
        &self,
        payload: &Value,
        fps_hint: Option<f64>,
        warnings: Vec<String>,
    ) -> PipelineOutcome {
        let clip = normalize_payload(payload, fps_hint);
        let detected = detect_events(
            &clip.frames,
            self.config.ball_class_id,
            self.config.club_class_id,
        );
        let metrics = compute_metrics(&detected.events, &detected.signals, &detected.club);

        let result = AnalysisResult {
            analysis_id: Uuid::new_v4(),
            source: AnalysisSource::Detections,
            impact_source: detected
                .signals
                .impact_source
                .map(|s| s.as_str().to_string()),
            events: detected.events,
            metrics,
            warnings,
        };

        // No usable frames or tracks: descriptive failure, nothing fabricated
        if clip.frames.is_empty() || (detected.ball.len() < 2 && detected.club.len() < 2) {
            return PipelineOutcome::Failed {
                message: "no usable detection frames or tracks in payload".to_string(),
                classification: JobClassification::NoData,
                result: Some(result),
            };
        }

        PipelineOutcome::Done {
            result,
            classification: None,
        }
    }

    /// Delegate analysis with explicit local fallback
    async fn analyze_delegated(
        &self,
        prepared: &PreparedVideo,
        fps_hint: Option<f64>,
    ) -> PipelineOutcome {
        let mut warnings = prepared.warnings.clone();

        if let Some(command) = &self.config.delegate_command {
            let client = DelegateClient::new(command.clone(), self.config.delegate_timeout);
            match client.analyze(&prepared.path, fps_hint, None).await {
                Ok(report) => {
                    let mut result = report.into_result();
                    result.warnings = warnings;
                    return PipelineOutcome::Done {
                        result,
                        classification: None,
                    };
                }
                Err(DelegateError::Failed { code, stderr }) if is_decode_failure_text(&stderr) => {
                    return PipelineOutcome::Failed {
                        message: format!("delegate decode failure (exit {:?}): {}", code, stderr),
                        classification: JobClassification::DecodeFailure,
                        result: None,
                    };
                }
                Err(e) => {
                    tracing::warn!(error = %e, "delegate analysis failed, using local fallback");
                    warnings.push(format!("delegate analysis failed: {}", e));
                }
            }
        }

        // Local fallback: canonical null-filled metrics with explicit caveats
        let empty_club = Track {
            points: Vec::new(),
            domain: CoordinateDomain::Pixel,
        };
        let signals = EventSignals {
            ball_track: false,
            club_track: false,
            impact_source: None,
        };
        let events = SwingEvents::default();
        let metrics = compute_metrics(&events, &signals, &empty_club);

        PipelineOutcome::Done {
            result: AnalysisResult {
                analysis_id: Uuid::new_v4(),
                source: AnalysisSource::LocalFallback,
                impact_source: None,
                events,
                metrics,
                warnings,
            },
            classification: None,
        }
    }

    /// Detections may live beside the clip as `<stem>.detections.json`
    fn load_sidecar_detections(&self, filename: &str) -> Option<Value> {
        let stem = std::path::Path::new(filename).file_stem()?.to_str()?;
        let path = self
            .config
            .media_dir()
            .join(format!("{}.detections.json", stem));
        let raw = std::fs::read_to_string(&path).ok()?;
        match serde_json::from_str(&raw) {
            Ok(value) => {
                tracing::debug!(path = %path.display(), "sidecar detections loaded");
                Some(value)
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "unparseable sidecar detections, ignoring"
                );
                None
            }
        }
    }
}
