//! Detection payload normalization
//!
//! **[SVA-NORM-010]** Converts arbitrary upstream detection JSON into a
//! canonical ordered frame sequence. Upstream producers disagree on field
//! names, units, and bbox encodings; every extractor here is an ordered list
//! of accessor rules tried in priority order. Malformed input never errors —
//! it degrades to empty output and downstream components report
//! "insufficient data".

use serde_json::{Map, Value};

/// Default frame rate assumed when neither the caller nor the payload
/// declares one
pub const DEFAULT_FPS: f64 = 30.0;

/// Container fields that may wrap the frame array
const FRAME_CONTAINER_KEYS: &[&str] = &[
    "frames",
    "results",
    "data",
    "items",
    "detections",
    "predictions",
];

/// Per-frame timestamp fields, highest priority first
const TIMESTAMP_KEYS: &[&str] = &[
    "timestampMs",
    "timestamp_ms",
    "timestamp",
    "timeMs",
    "time_ms",
    "time",
    "ts",
    "t",
];

/// Per-frame index fields
const FRAME_INDEX_KEYS: &[&str] = &[
    "frameIndex",
    "frame_index",
    "frameNum",
    "frame_num",
    "frame",
    "index",
    "idx",
];

/// Payload-level frame rate fields
const FPS_KEYS: &[&str] = &["fps", "frameRate", "frame_rate", "framerate"];

/// Per-frame object-list detection fields
const DETECTION_LIST_KEYS: &[&str] = &["detections", "objects", "preds"];

const LABEL_KEYS: &[&str] = &["label", "class_name", "className", "name", "category"];
const CLASS_ID_KEYS: &[&str] = &["classId", "class_id", "category_id"];
const CONFIDENCE_KEYS: &[&str] = &["confidence", "score", "conf", "probability", "prob"];
const BBOX_KEYS: &[&str] = &["bbox", "box", "bounding_box", "boundingBox", "rect"];

/// Axis-aligned bounding box in payload coordinates (pixel or normalized)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

impl BoundingBox {
    /// Centroid of the box
    pub fn center(&self) -> (f64, f64) {
        (self.x + self.w / 2.0, self.y + self.h / 2.0)
    }
}

/// One typed detection within a frame
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub label: Option<String>,
    pub class_id: Option<i64>,
    pub confidence: Option<f64>,
    pub bbox: BoundingBox,
}

/// One canonical frame: resolved timestamp plus its detections
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub timestamp_ms: f64,
    pub frame_index: Option<i64>,
    pub detections: Vec<Detection>,
}

/// Normalizer output: ordered frames plus the resolved frame rate
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedClip {
    pub frames: Vec<Frame>,
    pub fps: f64,
}

impl NormalizedClip {
    pub fn empty() -> Self {
        Self {
            frames: Vec::new(),
            fps: DEFAULT_FPS,
        }
    }
}

/// Normalize an arbitrary detection payload
///
/// `declared_fps` (from the upstream producer) outranks any frame rate
/// embedded in the payload; 30 fps is the last resort.
pub fn normalize_payload(payload: &Value, declared_fps: Option<f64>) -> NormalizedClip {
    let fps = declared_fps
        .filter(|f| f.is_finite() && *f > 0.0)
        .or_else(|| payload.as_object().and_then(|o| first_number(o, FPS_KEYS)))
        .filter(|f| f.is_finite() && *f > 0.0)
        .unwrap_or(DEFAULT_FPS);

    let raw_frames = match extract_frame_array(payload) {
        Some(arr) => arr,
        None => return NormalizedClip { frames: Vec::new(), fps },
    };

    // (sort_key, frame); frames without an explicit index take their
    // encounter ordinal so the stable index sort stays total.
    let mut indexed: Vec<(i64, Frame)> = Vec::with_capacity(raw_frames.len());
    for (ordinal, raw) in raw_frames.iter().enumerate() {
        let obj = match raw.as_object() {
            Some(o) => o,
            None => continue,
        };

        let frame_index = first_integer(obj, FRAME_INDEX_KEYS);

        let timestamp_ms = match resolve_timestamp(obj, frame_index, fps) {
            Some(ts) => ts,
            None => continue, // frame without a resolvable timestamp is dropped
        };

        let detections = extract_detections(obj);

        indexed.push((
            frame_index.unwrap_or(ordinal as i64),
            Frame {
                timestamp_ms,
                frame_index,
                detections,
            },
        ));
    }

    // Stable: ties keep encounter order
    indexed.sort_by_key(|(key, _)| *key);

    NormalizedClip {
        frames: indexed.into_iter().map(|(_, f)| f).collect(),
        fps,
    }
}

/// Locate the frame array: top-level array, or wrapped under a known key
fn extract_frame_array(payload: &Value) -> Option<&Vec<Value>> {
    if let Some(arr) = payload.as_array() {
        return Some(arr);
    }
    let obj = payload.as_object()?;
    for key in FRAME_CONTAINER_KEYS {
        if let Some(arr) = obj.get(*key).and_then(Value::as_array) {
            return Some(arr);
        }
    }
    None
}

/// Timestamp resolution, in priority order:
/// 1. explicit timestamp field, magnitude-inferred units (< 1000 ⇒ seconds)
/// 2. frame index over the known frame rate
fn resolve_timestamp(obj: &Map<String, Value>, frame_index: Option<i64>, fps: f64) -> Option<f64> {
    if let Some(raw) = first_number(obj, TIMESTAMP_KEYS) {
        if raw.is_finite() {
            // Unit inference: sub-1000 values are seconds, larger already ms
            let ms = if raw.abs() < 1000.0 { raw * 1000.0 } else { raw };
            return Some(ms);
        }
    }
    let idx = frame_index?;
    Some(idx as f64 / fps * 1000.0)
}

/// Detections may be an object list or parallel arrays keyed by index
fn extract_detections(frame: &Map<String, Value>) -> Vec<Detection> {
    for key in DETECTION_LIST_KEYS {
        if let Some(list) = frame.get(*key).and_then(Value::as_array) {
            // An array of objects is the detection list; an array of arrays
            // under "detections" would be a mislabeled parallel form and
            // falls through to the parallel-array path below.
            if list.iter().all(|v| v.is_object()) && !list.is_empty() {
                return list
                    .iter()
                    .filter_map(|v| v.as_object())
                    .filter_map(parse_detection_object)
                    .collect();
            }
            if list.is_empty() {
                return Vec::new();
            }
        }
    }
    parse_parallel_arrays(frame)
}

/// Parse one detection object; drops silently without a positive-area bbox
fn parse_detection_object(det: &Map<String, Value>) -> Option<Detection> {
    let bbox = resolve_bbox(det)?;

    let mut label = first_string(det, LABEL_KEYS);
    let mut class_id = first_integer(det, CLASS_ID_KEYS);

    // "class" is overloaded upstream: string ⇒ label, number ⇒ class id
    if let Some(class_value) = det.get("class") {
        match class_value {
            Value::String(s) if label.is_none() => label = Some(s.clone()),
            Value::Number(_) if class_id.is_none() => {
                class_id = coerce_integer(class_value);
            }
            _ => {}
        }
    }

    let confidence = first_number(det, CONFIDENCE_KEYS).filter(|c| c.is_finite());

    Some(Detection {
        label,
        class_id,
        confidence,
        bbox,
    })
}

/// Parallel-array form: boxes/scores/classes/labels keyed by index
fn parse_parallel_arrays(frame: &Map<String, Value>) -> Vec<Detection> {
    let boxes = match frame.get("boxes").and_then(Value::as_array) {
        Some(b) => b,
        None => return Vec::new(),
    };
    let scores = frame.get("scores").and_then(Value::as_array);
    let classes = frame
        .get("classes")
        .or_else(|| frame.get("class_ids"))
        .and_then(Value::as_array);
    let labels = frame.get("labels").and_then(Value::as_array);

    let mut detections = Vec::with_capacity(boxes.len());
    for (i, raw_box) in boxes.iter().enumerate() {
        let bbox = match bbox_from_value(raw_box) {
            Some(b) => b,
            None => continue,
        };
        let confidence = scores
            .and_then(|s| s.get(i))
            .and_then(coerce_number)
            .filter(|c| c.is_finite());
        let class_id = classes.and_then(|c| c.get(i)).and_then(coerce_integer);
        let label = labels
            .and_then(|l| l.get(i))
            .and_then(Value::as_str)
            .map(str::to_string);
        detections.push(Detection {
            label,
            class_id,
            confidence,
            bbox,
        });
    }
    detections
}

/// Resolve a bbox nested under a known key, or inline on the detection
fn resolve_bbox(det: &Map<String, Value>) -> Option<BoundingBox> {
    for key in BBOX_KEYS {
        if let Some(value) = det.get(*key) {
            if let Some(bbox) = bbox_from_value(value) {
                return Some(bbox);
            }
        }
    }
    bbox_from_object(det)
}

/// Accept a bbox object or a 4-element corner-pair array
fn bbox_from_value(value: &Value) -> Option<BoundingBox> {
    match value {
        Value::Object(obj) => bbox_from_object(obj),
        Value::Array(arr) if arr.len() == 4 => {
            let x1 = coerce_number(arr.get(0)?)?;
            let y1 = coerce_number(arr.get(1)?)?;
            let x2 = coerce_number(arr.get(2)?)?;
            let y2 = coerce_number(arr.get(3)?)?;
            validate_bbox(x1, y1, x2 - x1, y2 - y1)
        }
        _ => None,
    }
}

/// Bbox key-name variants: x/y/w/h, width/height, corner pairs
fn bbox_from_object(obj: &Map<String, Value>) -> Option<BoundingBox> {
    // Width/height forms
    if let (Some(x), Some(y)) = (first_number(obj, &["x"]), first_number(obj, &["y"])) {
        let w = first_number(obj, &["w", "width"]);
        let h = first_number(obj, &["h", "height"]);
        if let (Some(w), Some(h)) = (w, h) {
            return validate_bbox(x, y, w, h);
        }
    }

    // Corner-pair forms
    let corner_sets: &[(&str, &str, &str, &str)] = &[
        ("x1", "y1", "x2", "y2"),
        ("xmin", "ymin", "xmax", "ymax"),
        ("left", "top", "right", "bottom"),
    ];
    for &(kx1, ky1, kx2, ky2) in corner_sets {
        if let (Some(x1), Some(y1), Some(x2), Some(y2)) = (
            first_number(obj, &[kx1]),
            first_number(obj, &[ky1]),
            first_number(obj, &[kx2]),
            first_number(obj, &[ky2]),
        ) {
            return validate_bbox(x1, y1, x2 - x1, y2 - y1);
        }
    }

    None
}

/// Positive-area filter: width/height must be > 0 and finite
fn validate_bbox(x: f64, y: f64, w: f64, h: f64) -> Option<BoundingBox> {
    if !(x.is_finite() && y.is_finite() && w.is_finite() && h.is_finite()) {
        return None;
    }
    if w <= 0.0 || h <= 0.0 {
        return None;
    }
    Some(BoundingBox { x, y, w, h })
}

// ============================================================================
// First-matching-accessor helpers
// ============================================================================

/// First key whose value coerces to a number (JSON number or numeric string)
fn first_number(obj: &Map<String, Value>, keys: &[&str]) -> Option<f64> {
    keys.iter().find_map(|k| obj.get(*k).and_then(coerce_number))
}

/// First key whose value coerces to an integer
fn first_integer(obj: &Map<String, Value>, keys: &[&str]) -> Option<i64> {
    keys.iter().find_map(|k| obj.get(*k).and_then(coerce_integer))
}

/// First key whose value is a non-empty string
fn first_string(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| {
        obj.get(*k)
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .map(str::to_string)
    })
}

fn coerce_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn coerce_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}
