//! Centroid track extraction
//!
//! **[SVA-TRK-010]** One best-confidence centroid track per object class
//! across frames. Coordinate domain (pixel vs. normalized) is inferred per
//! track and threaded through every downstream threshold — different
//! upstream producers emit different domains in the same deployment.

use crate::services::detection_normalizer::{Detection, Frame};

/// Label synonyms matched case-insensitively as substrings
const BALL_SYNONYMS: &[&str] = &["ball", "golfball", "golf_ball", "golf ball", "sports ball"];
const CLUBHEAD_SYNONYMS: &[&str] = &["club", "clubhead", "club_head", "club head", "golf club"];

/// Coordinate domain of a track, computed from observed magnitudes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinateDomain {
    /// Positions are fractions of the frame (0..1)
    Normalized,
    /// Positions are absolute pixels
    Pixel,
}

impl CoordinateDomain {
    /// Classify a point set: normalized iff the maximum absolute coordinate
    /// lies in (0, 1.5]. Empty tracks default to pixel; nothing downstream
    /// consumes the domain of an empty track.
    pub fn infer(points: &[TrackPoint]) -> Self {
        let max_coord = points
            .iter()
            .flat_map(|p| [p.x.abs(), p.y.abs()])
            .fold(0.0_f64, f64::max);
        if max_coord > 0.0 && max_coord <= 1.5 {
            CoordinateDomain::Normalized
        } else {
            CoordinateDomain::Pixel
        }
    }

    /// Pick the domain-scaled variant of a threshold
    pub fn scale(&self, normalized: f64, pixel: f64) -> f64 {
        match self {
            CoordinateDomain::Normalized => normalized,
            CoordinateDomain::Pixel => pixel,
        }
    }
}

/// One tracked centroid sample
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackPoint {
    pub timestamp_ms: f64,
    pub frame_index: Option<i64>,
    pub x: f64,
    pub y: f64,
    pub confidence: f64,
}

/// Time-ordered centroid track for one object class
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    pub points: Vec<TrackPoint>,
    pub domain: CoordinateDomain,
}

impl Track {
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }
}

/// Class predicate: label synonyms plus an optional numeric class id;
/// either signal alone is sufficient
#[derive(Debug, Clone)]
pub struct ClassTarget {
    synonyms: &'static [&'static str],
    class_id: Option<i64>,
}

impl ClassTarget {
    pub fn ball(class_id: Option<i64>) -> Self {
        Self {
            synonyms: BALL_SYNONYMS,
            class_id,
        }
    }

    pub fn clubhead(class_id: Option<i64>) -> Self {
        Self {
            synonyms: CLUBHEAD_SYNONYMS,
            class_id,
        }
    }

    pub fn matches(&self, detection: &Detection) -> bool {
        if let Some(label) = &detection.label {
            let lowered = label.to_lowercase();
            if self.synonyms.iter().any(|s| lowered.contains(s)) {
                return true;
            }
        }
        match (self.class_id, detection.class_id) {
            (Some(want), Some(got)) => want == got,
            _ => false,
        }
    }
}

/// Build a track by selecting, per frame, the single highest-confidence
/// matching detection
///
/// A detection with no confidence scores 0, so any confidence-bearing match
/// outranks it; ties keep the first encountered. Frames without a qualifying
/// detection contribute no point.
pub fn build_track(frames: &[Frame], target: &ClassTarget) -> Track {
    let mut points = Vec::new();

    for frame in frames {
        let mut best: Option<&Detection> = None;
        for det in frame.detections.iter().filter(|d| target.matches(d)) {
            let score = det.confidence.unwrap_or(0.0);
            match best {
                // Strict > keeps the first on ties
                Some(b) if score <= b.confidence.unwrap_or(0.0) => {}
                _ => best = Some(det),
            }
        }

        if let Some(det) = best {
            let (x, y) = det.bbox.center();
            points.push(TrackPoint {
                timestamp_ms: frame.timestamp_ms,
                frame_index: frame.frame_index,
                x,
                y,
                confidence: det.confidence.unwrap_or(0.0),
            });
        }
    }

    let domain = CoordinateDomain::infer(&points);
    Track { points, domain }
}
