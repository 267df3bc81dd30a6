//! Home Hazard Monitor kernel
//!
//! This crate implements the decision core of a home safety monitor: it takes
//! object detections produced by an external vision detector, decides whether
//! each one violates the safety policy of the room it was seen in, and emits
//! deduplicated alerts.
//!
//! # Architecture
//!
//! ```text
//! Detection -> PositionClassifier -> RuleEngine (PolicyStore) -> AlertManager -> DeduplicationStore
//! ```
//!
//! The kernel guarantees two things and nothing more:
//!
//! 1. **Correct verdicts**: a detection is a violation exactly when the room
//!    policy forbids its class, or forbids it on the floor and it sits on the floor.
//! 2. **Correct deduplication**: one accepted alert per fingerprint per window.
//!
//! Frame acquisition, the detector model, dashboards and notification
//! backends live outside the kernel. Sinks receive finalized `AlertRecord`s
//! only and delivery is best-effort.
//!
//! # Module Structure
//!
//! - `detect`: detection input types and the detection source seam
//! - `ingest`: JSON-lines detection payloads
//! - `position`: height band classification
//! - `policy` / `camera`: static lookup tables built once from `config`
//! - `rules`: verdicts
//! - `dedup` / `alert`: duplicate suppression and alert emission
//! - `pipeline`: the per-detection orchestration used by the binaries

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use std::sync::{Mutex, OnceLock};

pub mod alert;
pub mod camera;
pub mod config;
pub mod dedup;
pub mod detect;
pub mod ingest;
pub mod pipeline;
pub mod policy;
pub mod position;
pub mod rules;

pub use alert::{
    AlertManager, AlertRecord, AlertSink, CollectingSink, JsonLinesSink, LogAlertSink,
};
pub use camera::{CameraDirectory, RoomContext, UNKNOWN_ROOM_NAME, UNKNOWN_ROOM_TYPE};
pub use config::MonitorConfig;
pub use dedup::{AlertFingerprint, DedupSettings, DeduplicationStore};
pub use detect::{
    calculate_iou, BoundingBox, BoxInFrame, Detection, DetectionSource, FrameContext,
    FrameGeometry, ScriptedSource,
};
pub use ingest::{parse_detection_payload, JsonLinesSource};
pub use pipeline::{DetectionOutcome, Pipeline, PipelineStats};
pub use policy::{ObjectCategories, PolicyStore, RoomPolicy, RuleToken};
pub use position::{GeometryError, PositionClassifier, PositionLabel, PositionThresholds};
pub use rules::{RuleEngine, Severity, ViolationKind, ViolationVerdict};

// -------------------- Clock --------------------

/// Source of "now" for deduplication and alert stamping.
///
/// Injected into the `AlertManager` so tests and replays control time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually advanced clock for tests and synthetic runs.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Starts at a fixed epoch offset; convenient for deterministic tests.
    pub fn at_epoch_secs(secs: i64) -> Self {
        Self::new(DateTime::from_timestamp(secs, 0).unwrap_or_default())
    }

    pub fn set(&self, now: DateTime<Utc>) {
        let mut guard = self.now.lock().unwrap_or_else(|poison| poison.into_inner());
        *guard = now;
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut guard = self.now.lock().unwrap_or_else(|poison| poison.into_inner());
        *guard += by;
    }

    pub fn advance_secs_f64(&self, secs: f64) {
        self.advance(chrono::Duration::milliseconds((secs * 1000.0).round() as i64));
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|poison| poison.into_inner())
    }
}

// -------------------- Identifier Discipline --------------------

/// Camera identifiers are short opaque tokens, e.g. `CAM_001`, `porch-2`.
pub fn validate_camera_id(camera_id: &str) -> Result<()> {
    static CAMERA_ID_RE: OnceLock<regex::Regex> = OnceLock::new();
    let re =
        CAMERA_ID_RE.get_or_init(|| regex::Regex::new(r"^[A-Za-z0-9_-]{1,64}$").unwrap());
    if !re.is_match(camera_id) {
        return Err(anyhow!(
            "camera_id {:?} must match ^[A-Za-z0-9_-]{{1,64}}$",
            camera_id
        ));
    }
    Ok(())
}

/// Room types are lowercase policy keys, e.g. `kitchen`, `child_room`.
pub fn validate_room_type(room_type: &str) -> Result<()> {
    static ROOM_TYPE_RE: OnceLock<regex::Regex> = OnceLock::new();
    let re = ROOM_TYPE_RE.get_or_init(|| regex::Regex::new(r"^[a-z0-9_]{1,64}$").unwrap());
    if !re.is_match(room_type) {
        return Err(anyhow!(
            "room_type {:?} must match ^[a-z0-9_]{{1,64}}$",
            room_type
        ));
    }
    Ok(())
}
