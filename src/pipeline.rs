//! Per-detection orchestration.
//!
//! confidence gate -> position -> policy lookup -> verdict -> alert manager
//!
//! Every failure here is local to one detection: it is counted, logged and
//! skipped, and the next detection is processed normally.

use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;

use crate::alert::{AlertManager, AlertRecord, AlertSink};
use crate::config::MonitorConfig;
use crate::dedup::DeduplicationStore;
use crate::detect::Detection;
use crate::policy::PolicyStore;
use crate::position::{GeometryError, PositionClassifier, PositionLabel};
use crate::rules::{RuleEngine, ViolationVerdict};
use crate::Clock;

/// What happened to one detection.
#[derive(Clone, Debug, PartialEq)]
pub enum DetectionOutcome {
    BelowThreshold,
    InvalidGeometry(GeometryError),
    Clean(PositionLabel),
    Suppressed(PositionLabel, ViolationVerdict),
    Alert(AlertRecord),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStats {
    pub seen: u64,
    pub below_threshold: u64,
    pub invalid_geometry: u64,
    pub clean: u64,
    pub violations: u64,
    pub suppressed: u64,
    pub emitted: u64,
    pub sink_failures: u64,
}

impl PipelineStats {
    pub fn merge(&mut self, other: &PipelineStats) {
        self.seen += other.seen;
        self.below_threshold += other.below_threshold;
        self.invalid_geometry += other.invalid_geometry;
        self.clean += other.clean;
        self.violations += other.violations;
        self.suppressed += other.suppressed;
        self.emitted += other.emitted;
        self.sink_failures += other.sink_failures;
    }
}

pub struct Pipeline {
    classifier: PositionClassifier,
    rules: RuleEngine,
    policies: Arc<PolicyStore>,
    alerts: Arc<AlertManager>,
    confidence_threshold: f32,
    stats: PipelineStats,
}

impl Pipeline {
    pub fn new(
        classifier: PositionClassifier,
        policies: Arc<PolicyStore>,
        alerts: Arc<AlertManager>,
        confidence_threshold: f32,
    ) -> Self {
        Self {
            classifier,
            rules: RuleEngine::new(),
            policies,
            alerts,
            confidence_threshold,
            stats: PipelineStats::default(),
        }
    }

    pub fn from_config(cfg: &MonitorConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        let dedup = DeduplicationStore::new(cfg.dedup_settings())?;
        Ok(Self::new(
            PositionClassifier::new(cfg.position_thresholds),
            Arc::new(cfg.policy_store()),
            Arc::new(AlertManager::new(dedup, clock)),
            cfg.confidence_threshold,
        ))
    }

    /// Another pipeline over the same policies and alert manager, with its
    /// own counters. One per camera stream when fanning in.
    pub fn fork(&self) -> Self {
        Self {
            classifier: self.classifier,
            rules: self.rules,
            policies: Arc::clone(&self.policies),
            alerts: Arc::clone(&self.alerts),
            confidence_threshold: self.confidence_threshold,
            stats: PipelineStats::default(),
        }
    }

    pub fn process(&mut self, detection: &Detection) -> DetectionOutcome {
        self.stats.seen += 1;

        if detection.confidence.is_nan() || detection.confidence < self.confidence_threshold {
            self.stats.below_threshold += 1;
            log::debug!(
                "dropping {} at confidence {:.2} (< {:.2})",
                detection.class_name,
                detection.confidence,
                self.confidence_threshold
            );
            return DetectionOutcome::BelowThreshold;
        }

        let placement = detection.placement();
        let position = match placement
            .bbox
            .ensure_non_degenerate()
            .and_then(|()| self.classifier.classify_placement(&placement))
        {
            Ok(position) => position,
            Err(e) => {
                self.stats.invalid_geometry += 1;
                log::warn!(
                    "skipping {} from {}: {}",
                    detection.class_name,
                    detection.frame_context.camera_id,
                    e
                );
                return DetectionOutcome::InvalidGeometry(e);
            }
        };

        let policy = self.policies.lookup(&detection.frame_context.room_type);
        let verdict = self.rules.evaluate(detection, position, policy);
        if !verdict.is_violation {
            self.stats.clean += 1;
            return DetectionOutcome::Clean(position);
        }

        self.stats.violations += 1;
        match self.alerts.process(detection, position, &verdict) {
            Some(record) => {
                self.stats.emitted += 1;
                DetectionOutcome::Alert(record)
            }
            None => {
                self.stats.suppressed += 1;
                DetectionOutcome::Suppressed(position, verdict)
            }
        }
    }

    /// Process one frame's detections and hand accepted alerts to `sinks`.
    pub fn process_batch(
        &mut self,
        batch: &[Detection],
        sinks: &mut [Box<dyn AlertSink>],
    ) -> Vec<AlertRecord> {
        let mut emitted = Vec::new();
        for detection in batch {
            if let DetectionOutcome::Alert(record) = self.process(detection) {
                for sink in sinks.iter_mut() {
                    if let Err(e) = sink.deliver(&record) {
                        self.stats.sink_failures += 1;
                        log::error!(
                            "sink {} failed for alert {}: {}",
                            sink.name(),
                            record.alert_id,
                            e
                        );
                    }
                }
                emitted.push(record);
            }
        }
        emitted
    }

    pub fn stats(&self) -> PipelineStats {
        self.stats
    }

    pub fn policies(&self) -> &PolicyStore {
        &self.policies
    }

    pub fn alerts(&self) -> &AlertManager {
        &self.alerts
    }
}
