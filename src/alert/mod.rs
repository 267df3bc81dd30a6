//! Alert emission.
//!
//! `AlertManager` turns violation verdicts into `AlertRecord`s, dropping any
//! violation whose fingerprint was accepted less than one dedup window ago.
//! Records are final once built; sinks only ever see finished records.

mod sink;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::dedup::{AlertFingerprint, DeduplicationStore};
use crate::detect::{BoundingBox, Detection};
use crate::position::PositionLabel;
use crate::rules::{Severity, ViolationKind, ViolationVerdict};
use crate::Clock;

pub use sink::{AlertSink, CollectingSink, JsonLinesSink, LogAlertSink};

/// Finalized alert handed to sinks. Flat so it maps onto a table row, a log
/// line or a JSON document without reshaping.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AlertRecord {
    pub alert_id: String,
    /// Capture time of the originating frame.
    pub timestamp: DateTime<Utc>,
    /// When the kernel accepted the alert.
    pub emitted_at: DateTime<Utc>,
    pub camera_id: String,
    pub room_type: String,
    pub room_name: String,
    pub object_class: String,
    pub position: PositionLabel,
    pub violation_kind: ViolationKind,
    pub severity: Severity,
    pub message: String,
    pub confidence: f32,
    pub bbox: BoundingBox,
    pub fingerprint: String,
}

pub struct AlertManager {
    dedup: DeduplicationStore,
    clock: Arc<dyn Clock>,
}

impl AlertManager {
    pub fn new(dedup: DeduplicationStore, clock: Arc<dyn Clock>) -> Self {
        Self { dedup, clock }
    }

    /// Returns a record for a real, non-duplicate violation and `None` otherwise.
    ///
    /// Non-violations never touch the dedup store.
    pub fn process(
        &self,
        detection: &Detection,
        position: PositionLabel,
        verdict: &ViolationVerdict,
    ) -> Option<AlertRecord> {
        if !verdict.is_violation {
            return None;
        }

        let fingerprint = AlertFingerprint::of(detection, position);
        let now = self.clock.now();
        if self.dedup.should_suppress(&fingerprint, now) {
            log::debug!("suppressed duplicate alert for {}", fingerprint);
            return None;
        }

        let ctx = &detection.frame_context;
        let record = AlertRecord {
            alert_id: new_alert_id(),
            timestamp: ctx.timestamp,
            emitted_at: now,
            camera_id: ctx.camera_id.clone(),
            room_type: ctx.room_type.clone(),
            room_name: ctx.room_name.clone(),
            object_class: detection.class_name.clone(),
            position,
            violation_kind: verdict.violation_kind,
            severity: verdict.severity,
            message: verdict.message.clone(),
            confidence: detection.confidence,
            bbox: detection.bbox,
            fingerprint: fingerprint.short_hex(),
        };
        log::info!(
            "alert {} accepted: [{}] {} (camera={})",
            record.alert_id,
            record.severity,
            record.message,
            record.camera_id
        );
        Some(record)
    }

    /// Drop expired dedup entries as of the manager's clock.
    pub fn sweep(&self) -> usize {
        self.dedup.sweep(self.clock.now())
    }

    pub fn dedup(&self) -> &DeduplicationStore {
        &self.dedup
    }
}

fn new_alert_id() -> String {
    let mut bytes = [0u8; 8];
    rand::thread_rng().fill_bytes(&mut bytes);
    format!("alert-{}", hex::encode(bytes))
}
