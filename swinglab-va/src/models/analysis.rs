//! Analysis result types
//!
//! **[SVA-RES-010]** Events and metrics are always structurally complete:
//! a field the pipeline could not derive is null, never a fabricated value.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Swing timing events, all nullable, in milliseconds on the clip timeline
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwingEvents {
    pub address_ms: Option<f64>,
    pub top_ms: Option<f64>,
    pub impact_ms: Option<f64>,
    pub finish_ms: Option<f64>,
}

/// Swing-plane tendency classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PlaneLabel {
    InsideOut,
    OutsideIn,
    Neutral,
}

impl std::fmt::Display for PlaneLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PlaneLabel::InsideOut => "inside-out",
            PlaneLabel::OutsideIn => "outside-in",
            PlaneLabel::Neutral => "neutral",
        };
        f.write_str(s)
    }
}

/// Swing-plane tendency with confidence in [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SwingPlane {
    pub label: PlaneLabel,
    pub confidence: f64,
}

impl Default for SwingPlane {
    fn default() -> Self {
        Self {
            label: PlaneLabel::Neutral,
            confidence: 0.0,
        }
    }
}

/// Tempo breakdown; fully null unless address, top, and impact all resolved
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tempo {
    pub backswing_ms: Option<f64>,
    pub downswing_ms: Option<f64>,
    pub ratio: Option<f64>,
}

/// Impact stability label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StabilityLabel {
    Stable,
    Unstable,
}

impl std::fmt::Display for StabilityLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            StabilityLabel::Stable => "stable",
            StabilityLabel::Unstable => "unstable",
        };
        f.write_str(s)
    }
}

/// Clubhead positional stability through the impact window, score in [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImpactStability {
    pub label: StabilityLabel,
    pub score: f64,
}

impl Default for ImpactStability {
    fn default() -> Self {
        Self {
            label: StabilityLabel::Unstable,
            score: 0.0,
        }
    }
}

/// Coaching metrics plus the generated summary text
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwingMetrics {
    pub swing_plane: SwingPlane,
    pub tempo: Tempo,
    pub impact_stability: ImpactStability,
    pub summary: String,
}

/// Which path produced the analysis
///
/// Explicit variant instead of exception-driven fallback branching: the
/// delegate either succeeded or the locally computed result stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisSource {
    /// Metrics Engine over externally supplied detections
    Detections,
    /// External analysis delegate succeeded
    Delegate,
    /// Delegate unavailable or failed; local heuristic stub
    LocalFallback,
}

/// Persisted analysis result attached to a terminal job
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub analysis_id: Uuid,
    pub source: AnalysisSource,
    /// Which track supplied the impact instant ("ball"/"club"), when resolved
    pub impact_source: Option<String>,
    pub events: SwingEvents,
    pub metrics: SwingMetrics,
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl AnalysisResult {
    /// Null-filled result used for precheck aborts and fallback paths
    pub fn unavailable(source: AnalysisSource, summary: String) -> Self {
        Self {
            analysis_id: Uuid::new_v4(),
            source,
            impact_source: None,
            events: SwingEvents::default(),
            metrics: SwingMetrics {
                summary,
                ..SwingMetrics::default()
            },
            warnings: Vec::new(),
        }
    }
}
