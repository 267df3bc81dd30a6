//! Violation verdicts.
//!
//! Rules are checked in a fixed order and the first match wins. An object the
//! room forbids outright is always reported as such, even when it also sits
//! on a forbidden floor.

use serde::{Deserialize, Serialize};

use crate::detect::Detection;
use crate::policy::RoomPolicy;
use crate::position::PositionLabel;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    ForbiddenObject,
    ForbiddenOnFloor,
    None,
}

impl ViolationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ViolationKind::ForbiddenObject => "forbidden_object",
            ViolationKind::ForbiddenOnFloor => "forbidden_on_floor",
            ViolationKind::None => "none",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Info,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "CRITICAL",
            Severity::High => "HIGH",
            Severity::Medium => "MEDIUM",
            Severity::Info => "INFO",
        }
    }

    /// Overlay colour (B, G, R) used by dashboards.
    pub fn bgr_color(&self) -> (u8, u8, u8) {
        match self {
            Severity::Critical => (0, 0, 255),
            Severity::High => (0, 165, 255),
            _ => (0, 255, 255),
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViolationVerdict {
    pub is_violation: bool,
    pub violation_kind: ViolationKind,
    pub severity: Severity,
    pub message: String,
}

impl ViolationVerdict {
    pub fn clean() -> Self {
        Self {
            is_violation: false,
            violation_kind: ViolationKind::None,
            severity: Severity::Info,
            message: String::new(),
        }
    }
}

/// Stateless rule evaluation.
#[derive(Clone, Copy, Debug, Default)]
pub struct RuleEngine;

impl RuleEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn evaluate(
        &self,
        detection: &Detection,
        position: PositionLabel,
        policy: &RoomPolicy,
    ) -> ViolationVerdict {
        let class_name = detection.class_name.as_str();

        if policy.forbids_object(class_name) {
            return ViolationVerdict {
                is_violation: true,
                violation_kind: ViolationKind::ForbiddenObject,
                severity: Severity::Critical,
                message: format!(
                    "{} detected in {}",
                    class_name, detection.frame_context.room_name
                ),
            };
        }

        if position == PositionLabel::Floor && policy.forbids_on_floor(class_name) {
            return ViolationVerdict {
                is_violation: true,
                violation_kind: ViolationKind::ForbiddenOnFloor,
                severity: Severity::High,
                message: format!("{} found in a disallowed floor position", class_name),
            };
        }

        ViolationVerdict::clean()
    }
}
