use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::position::GeometryError;

/// Pixel dimensions of the frame a set of coordinates refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameGeometry {
    pub width: u32,
    pub height: u32,
}

impl FrameGeometry {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Axis-aligned box `[x1, y1, x2, y2]` in pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "[i32; 4]", into = "[i32; 4]")]
pub struct BoundingBox {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl BoundingBox {
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn center_y(&self) -> f64 {
        (f64::from(self.y1) + f64::from(self.y2)) / 2.0
    }

    pub fn area(&self) -> i64 {
        let width = (i64::from(self.x2) - i64::from(self.x1)).max(0);
        let height = (i64::from(self.y2) - i64::from(self.y1)).max(0);
        width * height
    }

    /// A detection box must have strictly positive extent on both axes.
    pub fn ensure_non_degenerate(&self) -> Result<(), GeometryError> {
        if self.x2 <= self.x1 || self.y2 <= self.y1 {
            return Err(GeometryError::DegenerateBox {
                x1: self.x1,
                y1: self.y1,
                x2: self.x2,
                y2: self.y2,
            });
        }
        Ok(())
    }
}

impl From<[i32; 4]> for BoundingBox {
    fn from(v: [i32; 4]) -> Self {
        Self::new(v[0], v[1], v[2], v[3])
    }
}

impl From<BoundingBox> for [i32; 4] {
    fn from(b: BoundingBox) -> Self {
        [b.x1, b.y1, b.x2, b.y2]
    }
}

/// A bounding box paired with the geometry its coordinates were computed in.
///
/// Position classification only ever sees a `BoxInFrame`. Rescaling rounds
/// coordinates to whole pixels, so classify before rescaling, never after.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoxInFrame {
    pub bbox: BoundingBox,
    pub frame: FrameGeometry,
}

impl BoxInFrame {
    pub fn new(bbox: BoundingBox, frame: FrameGeometry) -> Self {
        Self { bbox, frame }
    }

    /// Rescale into `target` geometry, rounding to the nearest pixel.
    pub fn rescale_to(&self, target: FrameGeometry) -> Result<Self, GeometryError> {
        if self.frame.width == 0 || self.frame.height == 0 {
            return Err(GeometryError::NonPositiveFrameHeight {
                height: self.frame.height.min(self.frame.width),
            });
        }
        let sx = f64::from(target.width) / f64::from(self.frame.width);
        let sy = f64::from(target.height) / f64::from(self.frame.height);
        let scale = |v: i32, s: f64| (f64::from(v) * s).round() as i32;
        Ok(Self {
            bbox: BoundingBox::new(
                scale(self.bbox.x1, sx),
                scale(self.bbox.y1, sy),
                scale(self.bbox.x2, sx),
                scale(self.bbox.y2, sy),
            ),
            frame: target,
        })
    }
}

/// Where and when a detection was captured.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FrameContext {
    pub camera_id: String,
    pub room_type: String,
    pub room_name: String,
    pub timestamp: DateTime<Utc>,
    /// Geometry of the original (unscaled) frame; `bbox` is expressed in it.
    pub frame: FrameGeometry,
}

/// A single object detection handed over by the external detector.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub class_name: String,
    pub confidence: f32,
    /// Box in original-frame coordinates, as reported on alerts.
    pub bbox: BoundingBox,
    pub frame_context: FrameContext,
    /// The box as the detector measured it, when that was in a different
    /// geometry than the original frame.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inference: Option<BoxInFrame>,
}

impl Detection {
    /// The box position is classified on: the detector-space box when
    /// present, otherwise `bbox` in the original frame.
    pub fn placement(&self) -> BoxInFrame {
        self.inference
            .unwrap_or_else(|| BoxInFrame::new(self.bbox, self.frame_context.frame))
    }
}

/// Intersection over union of two boxes, in `0.0..=1.0`.
///
/// Diagnostic helper; duplicate suppression does not consult box overlap.
pub fn calculate_iou(a: &BoundingBox, b: &BoundingBox) -> f64 {
    let left = a.x1.max(b.x1);
    let top = a.y1.max(b.y1);
    let right = a.x2.min(b.x2);
    let bottom = a.y2.min(b.y2);
    if right < left || bottom < top {
        return 0.0;
    }
    let intersection =
        (i64::from(right) - i64::from(left)) * (i64::from(bottom) - i64::from(top));
    let union = a.area() + b.area() - intersection;
    if union > 0 {
        intersection as f64 / union as f64
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bbox_serializes_as_flat_array() {
        let json = serde_json::to_string(&BoundingBox::new(1, 2, 3, 4)).unwrap();
        assert_eq!(json, "[1,2,3,4]");
        let back: BoundingBox = serde_json::from_str("[10,20,30,40]").unwrap();
        assert_eq!(back, BoundingBox::new(10, 20, 30, 40));
    }

    #[test]
    fn degenerate_boxes_are_rejected() {
        assert!(BoundingBox::new(0, 0, 10, 10).ensure_non_degenerate().is_ok());
        assert!(BoundingBox::new(5, 0, 5, 10).ensure_non_degenerate().is_err());
        assert!(BoundingBox::new(0, 10, 10, 2).ensure_non_degenerate().is_err());
    }

    #[test]
    fn rescale_moves_box_and_geometry_together() {
        let inference = BoxInFrame::new(
            BoundingBox::new(320, 320, 640, 640),
            FrameGeometry::new(640, 640),
        );
        let original = inference
            .rescale_to(FrameGeometry::new(1280, 720))
            .expect("rescale");
        assert_eq!(original.frame, FrameGeometry::new(1280, 720));
        assert_eq!(original.bbox, BoundingBox::new(640, 360, 1280, 720));

        let relative_before = inference.bbox.center_y() / f64::from(inference.frame.height);
        let relative_after = original.bbox.center_y() / f64::from(original.frame.height);
        assert!((relative_before - relative_after).abs() < 1e-9);
    }

    #[test]
    fn rescale_rounds_to_nearest_pixel() {
        let inference = BoxInFrame::new(
            BoundingBox::new(100, 509, 140, 516),
            FrameGeometry::new(640, 640),
        );
        let original = inference
            .rescale_to(FrameGeometry::new(1920, 1080))
            .expect("rescale");
        assert_eq!(original.bbox, BoundingBox::new(300, 859, 420, 871));
    }

    #[test]
    fn placement_prefers_detector_space_box() {
        let inference = BoxInFrame::new(
            BoundingBox::new(100, 509, 140, 516),
            FrameGeometry::new(640, 640),
        );
        let mut det = Detection {
            class_name: "knife".to_string(),
            confidence: 0.9,
            bbox: BoundingBox::new(300, 859, 420, 871),
            frame_context: FrameContext {
                camera_id: "CAM_001".to_string(),
                room_type: "kitchen".to_string(),
                room_name: "Kitchen".to_string(),
                timestamp: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
                frame: FrameGeometry::new(1920, 1080),
            },
            inference: Some(inference),
        };
        assert_eq!(det.placement(), inference);
        det.inference = None;
        assert_eq!(det.placement().frame, FrameGeometry::new(1920, 1080));
    }

    #[test]
    fn extreme_coordinates_do_not_overflow() {
        let wide = BoundingBox::new(-2_000_000_000, 0, 2_000_000_000, 10);
        assert_eq!(wide.area(), 40_000_000_000);
        assert_eq!(calculate_iou(&wide, &wide), 1.0);
        let other = BoundingBox::new(-2_000_000_000, 0, 0, 10);
        assert!((calculate_iou(&wide, &other) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn rescale_from_empty_frame_fails() {
        let b = BoxInFrame::new(BoundingBox::new(0, 0, 1, 1), FrameGeometry::new(0, 0));
        assert!(b.rescale_to(FrameGeometry::new(10, 10)).is_err());
    }

    #[test]
    fn iou_of_identical_and_disjoint_boxes() {
        let a = BoundingBox::new(0, 0, 10, 10);
        let b = BoundingBox::new(20, 20, 30, 30);
        assert_eq!(calculate_iou(&a, &a), 1.0);
        assert_eq!(calculate_iou(&a, &b), 0.0);
        let c = BoundingBox::new(5, 0, 15, 10);
        let iou = calculate_iou(&a, &c);
        assert!((iou - 50.0 / 150.0).abs() < 1e-9);
    }
}
