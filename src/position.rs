//! Height band classification.
//!
//! A detection's vertical centre, relative to the height of the frame its box
//! was measured in, decides whether the object sits on the floor or higher up.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::detect::{BoundingBox, BoxInFrame};

/// Discrete height band of a detection within its frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionLabel {
    Floor,
    Low,
    Mid,
    High,
}

impl PositionLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            PositionLabel::Floor => "floor",
            PositionLabel::Low => "low",
            PositionLabel::Mid => "mid",
            PositionLabel::High => "high",
        }
    }
}

impl std::fmt::Display for PositionLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Malformed detection geometry. The pipeline skips the detection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GeometryError {
    #[error("invalid geometry: reference frame height must be > 0 (got {height})")]
    NonPositiveFrameHeight { height: u32 },

    #[error("invalid geometry: box is inverted (y1={y1} > y2={y2})")]
    InvertedBox { y1: i32, y2: i32 },

    #[error("invalid geometry: degenerate box [{x1}, {y1}, {x2}, {y2}]")]
    DegenerateBox { x1: i32, y1: i32, x2: i32, y2: i32 },
}

/// Band cut-offs on `relative_y` (0 = top of frame, 1 = bottom).
///
/// A value strictly greater than a cut-off falls into the band below it.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PositionThresholds {
    pub floor: f64,
    pub low: f64,
    pub mid: f64,
}

impl Default for PositionThresholds {
    fn default() -> Self {
        Self {
            floor: 0.8,
            low: 0.5,
            mid: 0.3,
        }
    }
}

impl PositionThresholds {
    /// Cut-offs must be strictly decreasing inside (0, 1).
    pub fn validate(&self) -> anyhow::Result<()> {
        let ordered = 1.0 > self.floor
            && self.floor > self.low
            && self.low > self.mid
            && self.mid > 0.0;
        if !ordered {
            return Err(anyhow::anyhow!(
                "position thresholds must satisfy 1 > floor > low > mid > 0 (got {}/{}/{})",
                self.floor,
                self.low,
                self.mid
            ));
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct PositionClassifier {
    thresholds: PositionThresholds,
}

impl PositionClassifier {
    pub fn new(thresholds: PositionThresholds) -> Self {
        Self { thresholds }
    }

    /// Classify `bbox` against the height of the frame its coordinates belong to.
    pub fn classify(
        &self,
        bbox: &BoundingBox,
        reference_frame_height: u32,
    ) -> Result<PositionLabel, GeometryError> {
        if reference_frame_height == 0 {
            return Err(GeometryError::NonPositiveFrameHeight {
                height: reference_frame_height,
            });
        }
        if bbox.y2 < bbox.y1 {
            return Err(GeometryError::InvertedBox {
                y1: bbox.y1,
                y2: bbox.y2,
            });
        }

        let relative_y = bbox.center_y() / f64::from(reference_frame_height);
        let t = &self.thresholds;
        let label = if relative_y > t.floor {
            PositionLabel::Floor
        } else if relative_y > t.low {
            PositionLabel::Low
        } else if relative_y > t.mid {
            PositionLabel::Mid
        } else {
            PositionLabel::High
        };
        Ok(label)
    }

    pub fn classify_placement(&self, placed: &BoxInFrame) -> Result<PositionLabel, GeometryError> {
        self.classify(&placed.bbox, placed.frame.height)
    }
}
