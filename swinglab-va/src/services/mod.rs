//! Service modules for the swing analysis pipeline
//!
//! **[SVA-COMP-010]** Component implementations: payload normalization,
//! track/event/metrics derivation, and the external tool clients.

pub mod delegate_client;
pub mod detection_normalizer;
pub mod event_detector;
pub mod metrics_engine;
pub mod precheck_client;
pub mod track_builder;
pub mod video_preparer;

pub use delegate_client::{DelegateClient, DelegateError, DelegateReport};
pub use detection_normalizer::{normalize_payload, Detection, Frame, NormalizedClip};
pub use event_detector::{detect_events, DetectedEvents, EventSignals, ImpactSource};
pub use metrics_engine::compute_metrics;
pub use precheck_client::{PrecheckClient, PrecheckDecision, PrecheckSettings};
pub use track_builder::{build_track, ClassTarget, CoordinateDomain, Track, TrackPoint};
pub use video_preparer::{
    is_decode_failure_text, is_supported_extension, PrepareError, PreparedVideo, VideoPreparer,
};
