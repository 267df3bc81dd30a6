use std::io::Write;

use anyhow::{anyhow, Result};

use super::AlertRecord;

/// Downstream consumer of accepted alerts.
///
/// Delivery is best-effort: a failing sink is logged by the caller and never
/// rolls back the dedup decision.
pub trait AlertSink {
    fn name(&self) -> &'static str;

    fn deliver(&mut self, record: &AlertRecord) -> Result<()>;
}

/// Console-style line: `[SEVERITY] message (YYYY-MM-DD HH:MM:SS)`.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogAlertSink;

impl LogAlertSink {
    pub fn format(record: &AlertRecord) -> String {
        format!(
            "[{}] {} ({})",
            record.severity,
            record.message,
            record.timestamp.format("%Y-%m-%d %H:%M:%S")
        )
    }
}

impl AlertSink for LogAlertSink {
    fn name(&self) -> &'static str {
        "log"
    }

    fn deliver(&mut self, record: &AlertRecord) -> Result<()> {
        log::warn!("{}", Self::format(record));
        Ok(())
    }
}

/// One JSON document per line.
pub struct JsonLinesSink<W: Write> {
    out: W,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> AlertSink for JsonLinesSink<W> {
    fn name(&self) -> &'static str {
        "jsonl"
    }

    fn deliver(&mut self, record: &AlertRecord) -> Result<()> {
        serde_json::to_writer(&mut self.out, record)
            .map_err(|e| anyhow!("failed to encode alert {}: {}", record.alert_id, e))?;
        self.out.write_all(b"\n")?;
        self.out.flush()?;
        Ok(())
    }
}

/// Keeps every record in memory.
#[derive(Debug, Default)]
pub struct CollectingSink {
    pub records: Vec<AlertRecord>,
}

impl AlertSink for CollectingSink {
    fn name(&self) -> &'static str {
        "collect"
    }

    fn deliver(&mut self, record: &AlertRecord) -> Result<()> {
        self.records.push(record.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::BoundingBox;
    use crate::position::PositionLabel;
    use crate::rules::{Severity, ViolationKind};
    use chrono::DateTime;

    fn record() -> AlertRecord {
        let ts = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        AlertRecord {
            alert_id: "alert-0011223344556677".to_string(),
            timestamp: ts,
            emitted_at: ts,
            camera_id: "CAM_002".to_string(),
            room_type: "child_room".to_string(),
            room_name: "Children's room".to_string(),
            object_class: "scissors".to_string(),
            position: PositionLabel::Mid,
            violation_kind: ViolationKind::ForbiddenObject,
            severity: Severity::Critical,
            message: "scissors detected in Children's room".to_string(),
            confidence: 0.77,
            bbox: BoundingBox::new(1, 2, 3, 4),
            fingerprint: "00".to_string(),
        }
    }

    #[test]
    fn log_line_matches_console_format() {
        assert_eq!(
            LogAlertSink::format(&record()),
            "[CRITICAL] scissors detected in Children's room (2023-11-14 22:13:20)"
        );
    }

    #[test]
    fn json_lines_are_flat_documents() {
        let mut sink = JsonLinesSink::new(Vec::new());
        sink.deliver(&record()).unwrap();
        sink.deliver(&record()).unwrap();
        let out = String::from_utf8(sink.into_inner()).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 2);
        let value: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(value["severity"], "CRITICAL");
        assert_eq!(value["violation_kind"], "forbidden_object");
        assert_eq!(value["position"], "mid");
        assert_eq!(value["room_name"], "Children's room");
        assert_eq!(value["bbox"], serde_json::json!([1, 2, 3, 4]));
    }
}
