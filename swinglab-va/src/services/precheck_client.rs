//! Swing precheck gate
//!
//! **[SVA-PRE-010]** A bounded-time, low-resolution motion-sampling worker
//! decides whether a clip plausibly contains a swing before the expensive
//! analysis runs. Only a definitive negative aborts the pipeline; a missing
//! worker, timeout, parse failure, or inconclusive result always proceeds.

use serde::Deserialize;
use serde_json::Value;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Sampling parameters fed to the precheck worker
#[derive(Debug, Clone, serde::Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrecheckSettings {
    pub sample_window_sec: f64,
    pub sample_frames: u32,
    pub min_duration_sec: f64,
    pub min_frames: u32,
    pub motion_threshold: f64,
    pub resize_width: u32,
}

impl Default for PrecheckSettings {
    fn default() -> Self {
        Self {
            sample_window_sec: 1.0,
            sample_frames: 8,
            min_duration_sec: 0.6,
            min_frames: 20,
            motion_threshold: 2.0,
            resize_width: 160,
        }
    }
}

/// Worker response on stdout
#[derive(Debug, Clone, Deserialize)]
pub struct PrecheckReport {
    pub ok: bool,
    #[serde(rename = "isSwing")]
    pub is_swing: bool,
    pub reason: String,
    #[serde(default)]
    pub metrics: Value,
}

/// Gate decision
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrecheckDecision {
    /// Run full analysis (positive or inconclusive precheck)
    Proceed { reason: String },
    /// Definitive negative: abort before analysis
    NotSwing { reason: String },
}

/// Precheck worker client (stdin/stdout JSON subprocess)
pub struct PrecheckClient {
    command: Vec<String>,
    settings: PrecheckSettings,
    timeout: Duration,
}

impl PrecheckClient {
    pub fn new(command: Vec<String>, settings: PrecheckSettings, timeout: Duration) -> Self {
        Self {
            command,
            settings,
            timeout,
        }
    }

    /// Run the gate; never errors — degraded paths proceed
    pub async fn run(&self, video_path: &Path) -> PrecheckDecision {
        let request = serde_json::json!({
            "path": video_path.to_string_lossy(),
            "sampleWindowSec": self.settings.sample_window_sec,
            "sampleFrames": self.settings.sample_frames,
            "minDurationSec": self.settings.min_duration_sec,
            "minFrames": self.settings.min_frames,
            "motionThreshold": self.settings.motion_threshold,
            "resizeWidth": self.settings.resize_width,
        });

        let stdout = match self.invoke(&request.to_string()).await {
            Ok(out) => out,
            Err(reason) => {
                tracing::warn!(reason = %reason, "precheck worker unavailable, proceeding");
                return PrecheckDecision::Proceed { reason };
            }
        };

        match serde_json::from_str::<PrecheckReport>(&stdout) {
            Ok(report) => decide(&report),
            Err(e) => {
                tracing::warn!(error = %e, "unparseable precheck output, proceeding");
                PrecheckDecision::Proceed {
                    reason: "unparseable precheck output".to_string(),
                }
            }
        }
    }

    async fn invoke(&self, request: &str) -> Result<String, String> {
        let (program, args) = self
            .command
            .split_first()
            .ok_or_else(|| "empty precheck command".to_string())?;

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| format!("spawn failed: {}", e))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(request.as_bytes())
                .await
                .map_err(|e| format!("stdin write failed: {}", e))?;
            // Close stdin so the worker sees EOF
            drop(stdin);
        }

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| format!("timed out after {}s", self.timeout.as_secs()))?
            .map_err(|e| format!("wait failed: {}", e))?;

        if !output.status.success() {
            return Err(format!(
                "exit {:?}: {}",
                output.status.code(),
                String::from_utf8_lossy(&output.stderr)
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

/// Only `ok && !isSwing` with a non-error reason is a definitive negative
pub fn decide(report: &PrecheckReport) -> PrecheckDecision {
    if report.ok && !report.is_swing && report.reason != "error" {
        PrecheckDecision::NotSwing {
            reason: report.reason.clone(),
        }
    } else {
        PrecheckDecision::Proceed {
            reason: report.reason.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(raw: &str) -> PrecheckReport {
        serde_json::from_str(raw).unwrap()
    }

    #[test]
    fn low_motion_is_definitive_negative() {
        let r = report(
            r#"{"ok": true, "isSwing": false, "reason": "low_motion",
                "metrics": {"meanDiff": 0.4, "motionThreshold": 2.0}}"#,
        );
        assert_eq!(
            decide(&r),
            PrecheckDecision::NotSwing {
                reason: "low_motion".to_string()
            }
        );
    }

    #[test]
    fn too_short_is_definitive_negative() {
        let r = report(r#"{"ok": true, "isSwing": false, "reason": "too_short"}"#);
        assert!(matches!(decide(&r), PrecheckDecision::NotSwing { .. }));
    }

    #[test]
    fn positive_result_proceeds() {
        let r = report(r#"{"ok": true, "isSwing": true, "reason": "ok"}"#);
        assert!(matches!(decide(&r), PrecheckDecision::Proceed { .. }));
    }

    #[test]
    fn worker_error_is_inconclusive() {
        // Worker could not open the clip; be conservative and analyze
        let r = report(
            r#"{"ok": true, "isSwing": true, "reason": "error",
                "metrics": {"error": "cannot open video"}}"#,
        );
        assert!(matches!(decide(&r), PrecheckDecision::Proceed { .. }));
    }

    #[test]
    fn not_ok_report_proceeds() {
        let r = report(r#"{"ok": false, "isSwing": false, "reason": "low_motion"}"#);
        assert!(matches!(decide(&r), PrecheckDecision::Proceed { .. }));
    }

    #[tokio::test]
    async fn missing_worker_proceeds() {
        let client = PrecheckClient::new(
            vec!["/nonexistent/precheck-worker".to_string()],
            PrecheckSettings::default(),
            Duration::from_secs(5),
        );
        let decision = client.run(Path::new("/tmp/clip.mp4")).await;
        assert!(matches!(decision, PrecheckDecision::Proceed { .. }));
    }

    #[test]
    fn default_settings_match_worker_contract() {
        let s = PrecheckSettings::default();
        assert_eq!(s.sample_frames, 8);
        assert_eq!(s.min_frames, 20);
        assert!((s.motion_threshold - 2.0).abs() < f64::EPSILON);
        assert_eq!(s.resize_width, 160);
    }
}
