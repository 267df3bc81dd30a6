//! Line-delimited JSON detection source.
//!
//! Each non-empty line is either one detection payload or an array of
//! payloads belonging to the same frame. Lines starting with `#` are ignored.
//! A malformed line is logged and skipped; the stream continues.

use std::io::BufRead;
use std::sync::Arc;

use anyhow::Result;
use serde_json::Value;

use super::payload::parse_detection_payload;
use crate::camera::CameraDirectory;
use crate::detect::{Detection, DetectionSource};
use crate::Clock;

pub struct JsonLinesSource<R: BufRead> {
    name: String,
    reader: R,
    cameras: Arc<CameraDirectory>,
    clock: Arc<dyn Clock>,
    line_no: u64,
    rejected: u64,
}

impl<R: BufRead> JsonLinesSource<R> {
    pub fn new(name: &str, reader: R, cameras: Arc<CameraDirectory>, clock: Arc<dyn Clock>) -> Self {
        Self {
            name: name.to_string(),
            reader,
            cameras,
            clock,
            line_no: 0,
            rejected: 0,
        }
    }

    /// Payloads dropped because they failed to parse.
    pub fn rejected(&self) -> u64 {
        self.rejected
    }

    pub fn lines_read(&self) -> u64 {
        self.line_no
    }

    fn parse_line(&mut self, line: &str) -> Vec<Detection> {
        let value: Value = match serde_json::from_str(line) {
            Ok(value) => value,
            Err(e) => {
                self.rejected += 1;
                log::warn!("{}:{}: not valid JSON: {}", self.name, self.line_no, e);
                return Vec::new();
            }
        };
        let payloads = match value {
            Value::Array(items) => items,
            other => vec![other],
        };
        let received_at = self.clock.now();
        let mut detections = Vec::with_capacity(payloads.len());
        for payload in &payloads {
            match parse_detection_payload(payload, &self.cameras, received_at) {
                Ok(det) => detections.push(det),
                Err(e) => {
                    self.rejected += 1;
                    log::warn!("{}:{}: detection rejected: {}", self.name, self.line_no, e);
                }
            }
        }
        detections
    }
}

impl<R: BufRead> DetectionSource for JsonLinesSource<R> {
    fn name(&self) -> &str {
        &self.name
    }

    fn next_batch(&mut self) -> Result<Option<Vec<Detection>>> {
        let mut line = String::new();
        loop {
            line.clear();
            if self.reader.read_line(&mut line)? == 0 {
                return Ok(None);
            }
            self.line_no += 1;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            return Ok(Some(self.parse_line(trimmed)));
        }
    }
}
