use std::collections::VecDeque;

use anyhow::Result;

use crate::detect::result::Detection;

/// Source of detections produced by the external detector.
///
/// # Boundary
///
/// The kernel never runs a model itself. A source hands over finished
/// detections, one frame batch at a time, and must not block the kernel on
/// anything other than producing its next batch.
pub trait DetectionSource {
    /// Source identifier for logs.
    fn name(&self) -> &str;

    /// Next batch of detections (one frame).
    ///
    /// `Ok(None)` means the source is exhausted.
    fn next_batch(&mut self) -> Result<Option<Vec<Detection>>>;
}

/// In-memory source replaying prepared frames. Used by tests and the demo.
pub struct ScriptedSource {
    name: String,
    frames: VecDeque<Vec<Detection>>,
}

impl ScriptedSource {
    pub fn new(name: &str, frames: Vec<Vec<Detection>>) -> Self {
        Self {
            name: name.to_string(),
            frames: frames.into(),
        }
    }
}

impl DetectionSource for ScriptedSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn next_batch(&mut self) -> Result<Option<Vec<Detection>>> {
        Ok(self.frames.pop_front())
    }
}
