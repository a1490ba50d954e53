//! Coaching metrics derivation
//!
//! **[SVA-MET-010]** Computes swing-plane tendency, tempo ratio, and impact
//! stability from the club track and detected events, plus a deterministic
//! textual summary with caveats. Insufficient data degrades to null/zero
//! fields and explicit notes, never fabricated precision.

use crate::models::{
    ImpactStability, PlaneLabel, StabilityLabel, SwingEvents, SwingMetrics, SwingPlane, Tempo,
};
use crate::services::event_detector::EventSignals;
use crate::services::track_builder::{Track, TrackPoint};

/// Club-track window around impact for plane classification, ms
const PLANE_WINDOW_MS: f64 = 250.0;
/// Club-track window around impact for stability scoring, ms
const STABILITY_WINDOW_MS: f64 = 200.0;
/// Net horizontal shift classification threshold (normalized / pixel)
const PLANE_SHIFT_NORM: f64 = 0.02;
const PLANE_SHIFT_PX: f64 = 20.0;
/// Positional spread reference for stability scoring (normalized / pixel)
const STABILITY_SPREAD_NORM: f64 = 0.05;
const STABILITY_SPREAD_PX: f64 = 50.0;
/// Below this confidence the summary carries a low-confidence caveat
const LOW_CONFIDENCE: f64 = 0.4;
/// Stability score at or above this is labeled stable
const STABLE_SCORE: f64 = 0.6;

/// Compute all coaching metrics and the summary text
pub fn compute_metrics(events: &SwingEvents, signals: &EventSignals, club: &Track) -> SwingMetrics {
    let swing_plane = classify_swing_plane(club, events.impact_ms);
    let tempo = compute_tempo(events);
    let impact_stability = score_impact_stability(club, events.impact_ms);
    let summary = build_summary(&swing_plane, &tempo, &impact_stability, events, signals);

    SwingMetrics {
        swing_plane,
        tempo,
        impact_stability,
        summary,
    }
}

/// Window the track to points within `window_ms` of impact; falls back to
/// the full track when impact is unknown or the window yields < 2 points
fn window_around_impact<'a>(
    track: &'a Track,
    impact_ms: Option<f64>,
    window_ms: f64,
) -> Vec<&'a TrackPoint> {
    if let Some(impact) = impact_ms {
        let windowed: Vec<&TrackPoint> = track
            .points
            .iter()
            .filter(|p| (p.timestamp_ms - impact).abs() <= window_ms)
            .collect();
        if windowed.len() >= 2 {
            return windowed;
        }
    }
    track.points.iter().collect()
}

/// Net horizontal displacement across the impact window classifies the path
/// tendency; positive x-shift reads inside-out for a down-the-line camera
fn classify_swing_plane(club: &Track, impact_ms: Option<f64>) -> SwingPlane {
    let window = window_around_impact(club, impact_ms, PLANE_WINDOW_MS);
    if window.len() < 2 {
        return SwingPlane::default();
    }

    let threshold = club.domain.scale(PLANE_SHIFT_NORM, PLANE_SHIFT_PX);
    let shift = window[window.len() - 1].x - window[0].x;

    let label = if shift > threshold {
        PlaneLabel::InsideOut
    } else if shift < -threshold {
        PlaneLabel::OutsideIn
    } else {
        PlaneLabel::Neutral
    };
    let confidence = (shift.abs() / (2.0 * threshold)).clamp(0.0, 1.0);

    SwingPlane { label, confidence }
}

/// Tempo needs address, top, and impact all resolved; a zero-length phase
/// nulls the whole metric rather than reporting a degenerate ratio
fn compute_tempo(events: &SwingEvents) -> Tempo {
    let (address, top, impact) = match (events.address_ms, events.top_ms, events.impact_ms) {
        (Some(a), Some(t), Some(i)) => (a, t, i),
        _ => return Tempo::default(),
    };

    let backswing_ms = (top - address).max(0.0);
    let downswing_ms = (impact - top).max(0.0);
    if backswing_ms <= 0.0 || downswing_ms <= 0.0 {
        return Tempo::default();
    }

    Tempo {
        backswing_ms: Some(backswing_ms),
        downswing_ms: Some(downswing_ms),
        ratio: Some(round2(backswing_ms / downswing_ms)),
    }
}

/// Positional standard deviation through the impact window, combined via
/// Euclidean norm and scored against a domain-scaled reference spread
fn score_impact_stability(club: &Track, impact_ms: Option<f64>) -> ImpactStability {
    let window = window_around_impact(club, impact_ms, STABILITY_WINDOW_MS);
    if window.len() < 2 {
        return ImpactStability::default();
    }

    let n = window.len() as f64;
    let mean_x = window.iter().map(|p| p.x).sum::<f64>() / n;
    let mean_y = window.iter().map(|p| p.y).sum::<f64>() / n;
    let var_x = window.iter().map(|p| (p.x - mean_x).powi(2)).sum::<f64>() / n;
    let var_y = window.iter().map(|p| (p.y - mean_y).powi(2)).sum::<f64>() / n;
    let spread = (var_x + var_y).sqrt();

    let reference = club
        .domain
        .scale(STABILITY_SPREAD_NORM, STABILITY_SPREAD_PX);
    let score = (1.0 - spread / reference).clamp(0.0, 1.0);
    let label = if score >= STABLE_SCORE {
        StabilityLabel::Stable
    } else {
        StabilityLabel::Unstable
    };

    ImpactStability { label, score }
}

/// Deterministic clause order: plane, stability, tempo, optional notes
fn build_summary(
    plane: &SwingPlane,
    tempo: &Tempo,
    stability: &ImpactStability,
    events: &SwingEvents,
    signals: &EventSignals,
) -> String {
    let mut clauses = Vec::with_capacity(4);

    let mut plane_clause = format!("Swing path tendency: {}", plane.label);
    if plane.confidence < LOW_CONFIDENCE {
        plane_clause.push_str(" (low confidence)");
    }
    plane_clause.push('.');
    clauses.push(plane_clause);

    clauses.push(format!("Impact stability: {}.", stability.label));

    match (tempo.ratio, tempo.backswing_ms, tempo.downswing_ms) {
        (Some(ratio), Some(back), Some(down)) => {
            clauses.push(format!(
                "Tempo {:.2}:1 (backswing {:.0} ms, downswing {:.0} ms).",
                ratio, back, down
            ));
        }
        _ => clauses.push("Tempo unavailable.".to_string()),
    }

    let mut notes = Vec::new();
    if !signals.club_track {
        notes.push("clubhead not detected");
    }
    if events.impact_ms.is_none() {
        notes.push("impact unknown");
    }
    if !notes.is_empty() {
        clauses.push(format!("Notes: {}.", notes.join(", ")));
    }

    clauses.join(" ")
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::track_builder::CoordinateDomain;

    fn point(ts: f64, x: f64, y: f64) -> TrackPoint {
        TrackPoint {
            timestamp_ms: ts,
            frame_index: None,
            x,
            y,
            confidence: 0.9,
        }
    }

    fn track(points: Vec<TrackPoint>) -> Track {
        let domain = CoordinateDomain::infer(&points);
        Track { points, domain }
    }

    fn signals(ball: bool, club: bool) -> EventSignals {
        EventSignals {
            ball_track: ball,
            club_track: club,
            impact_source: None,
        }
    }

    #[test]
    fn tempo_from_resolved_events() {
        let events = SwingEvents {
            address_ms: Some(0.0),
            top_ms: Some(800.0),
            impact_ms: Some(1200.0),
            finish_ms: Some(1600.0),
        };
        let tempo = compute_tempo(&events);
        assert_eq!(tempo.backswing_ms, Some(800.0));
        assert_eq!(tempo.downswing_ms, Some(400.0));
        assert_eq!(tempo.ratio, Some(2.0));
    }

    #[test]
    fn tempo_fully_null_when_any_event_missing() {
        let events = SwingEvents {
            address_ms: Some(0.0),
            top_ms: None,
            impact_ms: Some(1200.0),
            finish_ms: Some(1600.0),
        };
        assert_eq!(compute_tempo(&events), Tempo::default());
    }

    #[test]
    fn tempo_fully_null_on_zero_phase() {
        // Top coincides with impact: downswing would be zero
        let events = SwingEvents {
            address_ms: Some(0.0),
            top_ms: Some(1200.0),
            impact_ms: Some(1200.0),
            finish_ms: Some(1600.0),
        };
        let tempo = compute_tempo(&events);
        assert_eq!(tempo.backswing_ms, None);
        assert_eq!(tempo.ratio, None);
    }

    #[test]
    fn plane_inside_out_on_positive_shift() {
        // Net +0.06 shift through a 0.02-threshold window
        let club = track(vec![
            point(1000.0, 0.40, 0.5),
            point(1100.0, 0.43, 0.5),
            point(1200.0, 0.46, 0.5),
        ]);
        let plane = classify_swing_plane(&club, Some(1100.0));
        assert_eq!(plane.label, PlaneLabel::InsideOut);
        // 0.06 / (2 * 0.02) clamped
        assert!((plane.confidence - 1.0).abs() < 1e-9);
    }

    #[test]
    fn plane_outside_in_on_negative_shift() {
        let club = track(vec![
            point(1000.0, 0.46, 0.5),
            point(1200.0, 0.40, 0.5),
        ]);
        let plane = classify_swing_plane(&club, Some(1100.0));
        assert_eq!(plane.label, PlaneLabel::OutsideIn);
    }

    #[test]
    fn plane_neutral_inside_threshold() {
        let club = track(vec![
            point(1000.0, 0.50, 0.5),
            point(1200.0, 0.51, 0.5),
        ]);
        let plane = classify_swing_plane(&club, Some(1100.0));
        assert_eq!(plane.label, PlaneLabel::Neutral);
        assert!((plane.confidence - 0.25).abs() < 1e-9);
    }

    #[test]
    fn plane_window_falls_back_to_full_track() {
        // Only one point near impact; the full track decides instead
        let club = track(vec![
            point(0.0, 0.40, 0.5),
            point(2000.0, 0.50, 0.5),
        ]);
        let plane = classify_swing_plane(&club, Some(2000.0));
        assert_eq!(plane.label, PlaneLabel::InsideOut);
    }

    #[test]
    fn sparse_track_degrades_to_neutral_zero() {
        let club = track(vec![point(0.0, 0.5, 0.5)]);
        let plane = classify_swing_plane(&club, None);
        assert_eq!(plane.label, PlaneLabel::Neutral);
        assert_eq!(plane.confidence, 0.0);

        let stability = score_impact_stability(&club, None);
        assert_eq!(stability.label, StabilityLabel::Unstable);
        assert_eq!(stability.score, 0.0);
    }

    #[test]
    fn tight_cluster_scores_stable() {
        let club = track(vec![
            point(1000.0, 0.500, 0.500),
            point(1050.0, 0.501, 0.499),
            point(1100.0, 0.500, 0.501),
            point(1150.0, 0.499, 0.500),
        ]);
        let stability = score_impact_stability(&club, Some(1100.0));
        assert_eq!(stability.label, StabilityLabel::Stable);
        assert!(stability.score > 0.9);
    }

    #[test]
    fn wide_scatter_scores_unstable() {
        let club = track(vec![
            point(1000.0, 0.40, 0.40),
            point(1050.0, 0.48, 0.52),
            point(1100.0, 0.42, 0.46),
            point(1150.0, 0.50, 0.41),
        ]);
        let stability = score_impact_stability(&club, Some(1100.0));
        assert_eq!(stability.label, StabilityLabel::Unstable);
    }

    #[test]
    fn domain_sensitivity_same_labels() {
        // Identical relative motion, normalized vs. pixel ×1000
        let norm = track(vec![
            point(1000.0, 0.40, 0.50),
            point(1100.0, 0.43, 0.50),
            point(1200.0, 0.46, 0.50),
        ]);
        let px = track(vec![
            point(1000.0, 400.0, 500.0),
            point(1100.0, 430.0, 500.0),
            point(1200.0, 460.0, 500.0),
        ]);
        assert_eq!(norm.domain, CoordinateDomain::Normalized);
        assert_eq!(px.domain, CoordinateDomain::Pixel);

        let plane_norm = classify_swing_plane(&norm, Some(1100.0));
        let plane_px = classify_swing_plane(&px, Some(1100.0));
        assert_eq!(plane_norm.label, plane_px.label);

        let stab_norm = score_impact_stability(&norm, Some(1100.0));
        let stab_px = score_impact_stability(&px, Some(1100.0));
        assert_eq!(stab_norm.label, stab_px.label);
    }

    #[test]
    fn summary_contains_tempo_unavailable_without_events() {
        let club = track(vec![]);
        let metrics = compute_metrics(&SwingEvents::default(), &signals(false, false), &club);
        assert!(metrics.summary.contains("Tempo unavailable."));
        assert!(metrics.summary.contains("clubhead not detected"));
        assert!(metrics.summary.contains("impact unknown"));
        assert!(metrics.summary.contains("(low confidence)"));
    }

    #[test]
    fn summary_clause_structure_is_deterministic() {
        let events = SwingEvents {
            address_ms: Some(0.0),
            top_ms: Some(800.0),
            impact_ms: Some(1200.0),
            finish_ms: Some(1600.0),
        };
        let club = track(vec![
            point(1000.0, 0.40, 0.50),
            point(1100.0, 0.43, 0.50),
            point(1200.0, 0.46, 0.50),
        ]);
        let metrics = compute_metrics(&events, &signals(true, true), &club);
        // The lateral drift that classifies inside-out also spreads the
        // impact window, so this swing reads unstable.
        assert_eq!(
            metrics.summary,
            "Swing path tendency: inside-out. Impact stability: unstable. \
             Tempo 2.00:1 (backswing 800 ms, downswing 400 ms)."
        );
    }
}
