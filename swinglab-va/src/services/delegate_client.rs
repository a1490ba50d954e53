//! External analysis delegate client
//!
//! **[SVA-DEL-010]** When no detection payload accompanies a job, analysis
//! can be delegated to an external worker fed `{path, fps, roi}` on stdin
//! and returning swing/ball-flight metrics plus a coach summary on stdout.
//! Delegate failure selects the local fallback path via an explicit outcome
//! variant, never exception-driven branching.

use serde::Deserialize;
use serde_json::Value;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use uuid::Uuid;

use crate::models::{
    AnalysisResult, AnalysisSource, ImpactStability, PlaneLabel, StabilityLabel, SwingEvents,
    SwingMetrics, SwingPlane, Tempo,
};

/// Club-path angle (degrees) beyond which the delegate's path reads as a
/// directional tendency rather than neutral
const PATH_ANGLE_NEUTRAL_DEG: f64 = 1.0;

/// Delegate client errors
#[derive(Debug, Error)]
pub enum DelegateError {
    /// Worker binary missing or not executable
    #[error("failed to spawn delegate: {0}")]
    Spawn(String),

    /// Worker exceeded its deadline and was killed
    #[error("delegate timed out after {0}s")]
    Timeout(u64),

    /// Worker exited non-zero
    #[error("delegate failed (exit {code:?}): {stderr}")]
    Failed { code: Option<i32>, stderr: String },

    /// Worker output was not the expected JSON document
    #[error("failed to parse delegate output: {0}")]
    Parse(String),

    /// I/O error on the worker's channels
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Swing metrics section of the delegate report; every field optional
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DelegateSwing {
    pub backswing_time_ms: Option<f64>,
    pub downswing_time_ms: Option<f64>,
    pub tempo_ratio: Option<f64>,
    pub club_path_angle: Option<f64>,
    pub plane_deviation_std: Option<f64>,
    pub on_plane_ratio: Option<f64>,
}

/// Delegate report document
#[derive(Debug, Clone, Deserialize)]
pub struct DelegateReport {
    pub swing: Option<DelegateSwing>,
    #[serde(rename = "ballFlight")]
    pub ball_flight: Option<Value>,
    pub shot_type: Option<String>,
    #[serde(default)]
    pub coach_summary: Vec<String>,
    pub analysis_id: Option<String>,
}

impl DelegateReport {
    /// Map the delegate document into the canonical result shape
    ///
    /// Absent fields stay null; the delegate reports no event timeline, so
    /// events are always unresolved on this path.
    pub fn into_result(self) -> AnalysisResult {
        let swing = self.swing.unwrap_or_default();

        let tempo = match (swing.backswing_time_ms, swing.downswing_time_ms) {
            (Some(back), Some(down)) if back > 0.0 && down > 0.0 => Tempo {
                backswing_ms: Some(back),
                downswing_ms: Some(down),
                ratio: swing.tempo_ratio.or(Some((back / down * 100.0).round() / 100.0)),
            },
            _ => Tempo::default(),
        };

        let swing_plane = match swing.club_path_angle {
            Some(angle) => {
                let label = if angle > PATH_ANGLE_NEUTRAL_DEG {
                    PlaneLabel::InsideOut
                } else if angle < -PATH_ANGLE_NEUTRAL_DEG {
                    PlaneLabel::OutsideIn
                } else {
                    PlaneLabel::Neutral
                };
                let confidence = swing
                    .on_plane_ratio
                    .map(|r| r.clamp(0.0, 1.0))
                    .unwrap_or_else(|| (angle.abs() / 10.0).clamp(0.0, 1.0));
                SwingPlane { label, confidence }
            }
            None => SwingPlane::default(),
        };

        let impact_stability = match swing.plane_deviation_std {
            Some(std_dev) => {
                let score = (1.0 - std_dev).clamp(0.0, 1.0);
                let label = if score >= 0.6 {
                    StabilityLabel::Stable
                } else {
                    StabilityLabel::Unstable
                };
                ImpactStability { label, score }
            }
            None => ImpactStability::default(),
        };

        let summary = if self.coach_summary.is_empty() {
            "Delegate analysis completed.".to_string()
        } else {
            self.coach_summary.join(" ")
        };

        let analysis_id = self
            .analysis_id
            .as_deref()
            .and_then(|s| Uuid::parse_str(s).ok())
            .unwrap_or_else(Uuid::new_v4);

        AnalysisResult {
            analysis_id,
            source: AnalysisSource::Delegate,
            impact_source: None,
            events: SwingEvents::default(),
            metrics: SwingMetrics {
                swing_plane,
                tempo,
                impact_stability,
                summary,
            },
            warnings: Vec::new(),
        }
    }
}

/// Delegate worker client (stdin/stdout JSON subprocess)
pub struct DelegateClient {
    command: Vec<String>,
    timeout: Duration,
}

impl DelegateClient {
    pub fn new(command: Vec<String>, timeout: Duration) -> Self {
        Self { command, timeout }
    }

    /// Run the delegate against a prepared clip
    pub async fn analyze(
        &self,
        video_path: &Path,
        fps: Option<f64>,
        roi: Option<[f64; 4]>,
    ) -> Result<DelegateReport, DelegateError> {
        let (program, args) = self
            .command
            .split_first()
            .ok_or_else(|| DelegateError::Spawn("empty delegate command".to_string()))?;

        let request = serde_json::json!({
            "path": video_path.to_string_lossy(),
            "fps": fps,
            "roi": roi,
        });

        tracing::debug!(
            video = %video_path.display(),
            "running delegate analysis"
        );

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| DelegateError::Spawn(e.to_string()))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(request.to_string().as_bytes()).await?;
            drop(stdin);
        }

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| DelegateError::Timeout(self.timeout.as_secs()))??;

        if !output.status.success() {
            return Err(DelegateError::Failed {
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        serde_json::from_str::<DelegateReport>(&stdout)
            .map_err(|e| DelegateError::Parse(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_report_maps_to_result() {
        let raw = r#"{
            "swing": {
                "club_path_angle": 3.2,
                "on_plane_ratio": 0.8,
                "plane_deviation_std": 0.25,
                "backswing_time_ms": 750.0,
                "downswing_time_ms": 250.0,
                "tempo_ratio": 3.0
            },
            "ballFlight": {"horizontal_launch_direction": 1.4},
            "shot_type": "draw",
            "coach_summary": ["impact frame: 42, tracked 18 pts", "shot=draw"],
            "analysis_id": "7f6c0f04-52d5-4bb6-9f3e-6a4f8f0f2a10"
        }"#;
        let report: DelegateReport = serde_json::from_str(raw).unwrap();
        let result = report.into_result();

        assert_eq!(result.source, AnalysisSource::Delegate);
        assert_eq!(result.metrics.swing_plane.label, PlaneLabel::InsideOut);
        assert!((result.metrics.swing_plane.confidence - 0.8).abs() < 1e-9);
        assert_eq!(result.metrics.tempo.ratio, Some(3.0));
        assert_eq!(result.metrics.impact_stability.label, StabilityLabel::Stable);
        assert_eq!(
            result.metrics.summary,
            "impact frame: 42, tracked 18 pts shot=draw"
        );
        assert_eq!(
            result.analysis_id.to_string(),
            "7f6c0f04-52d5-4bb6-9f3e-6a4f8f0f2a10"
        );
        // The delegate carries no event timeline
        assert_eq!(result.events, SwingEvents::default());
    }

    #[test]
    fn sparse_report_stays_null() {
        let raw = r#"{
            "swing": null,
            "ballFlight": null,
            "shot_type": "unknown",
            "coach_summary": ["analysis failed: insufficient ball trajectory"],
            "analysis_id": "not-a-uuid"
        }"#;
        let report: DelegateReport = serde_json::from_str(raw).unwrap();
        let result = report.into_result();

        assert_eq!(result.metrics.tempo, Tempo::default());
        assert_eq!(result.metrics.swing_plane.label, PlaneLabel::Neutral);
        assert_eq!(result.metrics.swing_plane.confidence, 0.0);
        assert!(result
            .metrics
            .summary
            .contains("insufficient ball trajectory"));
    }

    #[test]
    fn negative_path_angle_reads_outside_in() {
        let report = DelegateReport {
            swing: Some(DelegateSwing {
                club_path_angle: Some(-4.5),
                ..DelegateSwing::default()
            }),
            ball_flight: None,
            shot_type: None,
            coach_summary: Vec::new(),
            analysis_id: None,
        };
        let result = report.into_result();
        assert_eq!(result.metrics.swing_plane.label, PlaneLabel::OutsideIn);
        assert!((result.metrics.swing_plane.confidence - 0.45).abs() < 1e-9);
    }

    #[tokio::test]
    async fn missing_worker_is_spawn_error() {
        let client = DelegateClient::new(
            vec!["/nonexistent/analysis-worker".to_string()],
            Duration::from_secs(5),
        );
        let err = client
            .analyze(Path::new("/tmp/clip.mp4"), Some(30.0), None)
            .await
            .unwrap_err();
        assert!(matches!(err, DelegateError::Spawn(_)));
    }
}
