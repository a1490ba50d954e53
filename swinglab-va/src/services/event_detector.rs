//! Swing timing event detection
//!
//! **[SVA-EVT-010]** Locates the impact instant from ball/club tracks and
//! back-computes address, top of backswing, and finish. Any of the four
//! events may be unresolved; that is a valid outcome, not a failure.

use crate::models::SwingEvents;
use crate::services::detection_normalizer::Frame;
use crate::services::track_builder::{build_track, ClassTarget, Track};

/// Impact displacement thresholds (normalized / pixel)
const BALL_IMPACT_DIST_NORM: f64 = 0.04;
const BALL_IMPACT_DIST_PX: f64 = 40.0;
/// Club fallback uses a coarser displacement gate than the ball path
const CLUB_IMPACT_DIST_NORM: f64 = 0.06;
const CLUB_IMPACT_DIST_PX: f64 = 60.0;
/// Instantaneous speed threshold, units per second; never relaxed
const IMPACT_SPEED_NORM: f64 = 1.5;
const IMPACT_SPEED_PX: f64 = 1500.0;

/// Which track supplied the impact instant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImpactSource {
    Ball,
    Club,
}

impl ImpactSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImpactSource::Ball => "ball",
            ImpactSource::Club => "club",
        }
    }
}

/// Track availability signals for downstream confidence/caveat generation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EventSignals {
    /// Ball track had at least one point
    pub ball_track: bool,
    /// Club track had at least one point
    pub club_track: bool,
    pub impact_source: Option<ImpactSource>,
}

/// Detector output: events, signals, and the tracks they were derived from
#[derive(Debug, Clone)]
pub struct DetectedEvents {
    pub events: SwingEvents,
    pub signals: EventSignals,
    pub ball: Track,
    pub club: Track,
}

/// Detect swing events from normalized frames
///
/// Optional numeric class ids come from deployment config; label synonyms
/// alone are otherwise sufficient.
pub fn detect_events(
    frames: &[Frame],
    ball_class_id: Option<i64>,
    club_class_id: Option<i64>,
) -> DetectedEvents {
    let ball = build_track(frames, &ClassTarget::ball(ball_class_id));
    let club = build_track(frames, &ClassTarget::clubhead(club_class_id));

    let mut signals = EventSignals {
        ball_track: !ball.is_empty(),
        club_track: !club.is_empty(),
        impact_source: None,
    };

    // Neither track usable: every event is unresolved, including the
    // boundary-derived ones.
    if ball.len() < 2 && club.len() < 2 {
        return DetectedEvents {
            events: SwingEvents::default(),
            signals,
            ball,
            club,
        };
    }

    // Ball track is preferred; club is the coarser fallback
    let impact_ms = match find_impact(&ball, BALL_IMPACT_DIST_NORM, BALL_IMPACT_DIST_PX) {
        Some(ts) => {
            signals.impact_source = Some(ImpactSource::Ball);
            Some(ts)
        }
        None => match find_impact(&club, CLUB_IMPACT_DIST_NORM, CLUB_IMPACT_DIST_PX) {
            Some(ts) => {
                signals.impact_source = Some(ImpactSource::Club);
                Some(ts)
            }
            None => None,
        },
    };

    let top_ms = find_top(&club, impact_ms);

    // Address/finish are boundary-derived, not motion-derived
    let address_ms = frames.first().map(|f| f.timestamp_ms);
    let finish_ms = frames.last().map(|f| f.timestamp_ms);

    DetectedEvents {
        events: SwingEvents {
            address_ms,
            top_ms,
            impact_ms,
            finish_ms,
        },
        signals,
        ball,
        club,
    }
}

/// Earliest point whose displacement or instantaneous speed relative to the
/// previous point crosses the domain-scaled threshold
///
/// If no point crosses, the single highest-speed point qualifies only if its
/// speed still meets the (non-relaxed) speed threshold.
fn find_impact(track: &Track, dist_norm: f64, dist_px: f64) -> Option<f64> {
    if track.len() < 2 {
        return None;
    }
    let dist_threshold = track.domain.scale(dist_norm, dist_px);
    let speed_threshold = track.domain.scale(IMPACT_SPEED_NORM, IMPACT_SPEED_PX);

    let mut max_speed = 0.0_f64;
    let mut max_speed_ts = None;

    for pair in track.points.windows(2) {
        let (prev, cur) = (&pair[0], &pair[1]);
        let displacement = (cur.x - prev.x).hypot(cur.y - prev.y);
        let dt_ms = cur.timestamp_ms - prev.timestamp_ms;
        let speed = if dt_ms > 0.0 {
            displacement / dt_ms * 1000.0
        } else {
            0.0
        };

        if displacement >= dist_threshold || speed >= speed_threshold {
            return Some(cur.timestamp_ms);
        }
        if speed > max_speed {
            max_speed = speed;
            max_speed_ts = Some(cur.timestamp_ms);
        }
    }

    if max_speed >= speed_threshold {
        max_speed_ts
    } else {
        None
    }
}

/// Top of backswing: club-track point of minimum vertical coordinate at or
/// before the impact timestamp (whole track if impact is unknown); ties keep
/// the first found
fn find_top(club: &Track, impact_ms: Option<f64>) -> Option<f64> {
    let mut best: Option<&crate::services::track_builder::TrackPoint> = None;
    for point in &club.points {
        if let Some(impact) = impact_ms {
            if point.timestamp_ms > impact {
                continue;
            }
        }
        match best {
            Some(b) if point.y >= b.y => {}
            _ => best = Some(point),
        }
    }
    best.map(|p| p.timestamp_ms)
}
