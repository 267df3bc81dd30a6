mod result;
mod source;

pub use result::{calculate_iou, BoundingBox, BoxInFrame, Detection, FrameContext, FrameGeometry};
pub use source::{DetectionSource, ScriptedSource};
