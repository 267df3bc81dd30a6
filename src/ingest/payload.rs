use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::camera::CameraDirectory;
use crate::detect::{BoundingBox, BoxInFrame, Detection, FrameContext, FrameGeometry};
use crate::validate_camera_id;

const ROOT_FIELDS: [&str; 7] = [
    "camera_id",
    "class_name",
    "confidence",
    "bbox",
    "frame",
    "timestamp",
    "inference",
];
const GEOMETRY_FIELDS: [&str; 2] = ["width", "height"];

fn ensure_allowed_fields(
    context: &str,
    obj: &serde_json::Map<String, Value>,
    allowed: &[&str],
) -> Result<()> {
    let extras: Vec<String> = obj
        .keys()
        .filter(|key| !allowed.contains(&key.as_str()))
        .cloned()
        .collect();
    if extras.is_empty() {
        return Ok(());
    }
    Err(anyhow!(
        "{} payload contains extra fields: {}",
        context,
        extras.join(", ")
    ))
}

fn parse_geometry(context: &str, value: &Value) -> Result<FrameGeometry> {
    let obj = value
        .as_object()
        .ok_or_else(|| anyhow!("{} must be an object", context))?;
    ensure_allowed_fields(context, obj, &GEOMETRY_FIELDS)?;
    let dim = |name: &str| -> Result<u32> {
        let raw = obj
            .get(name)
            .and_then(Value::as_u64)
            .ok_or_else(|| anyhow!("{}.{} must be a non-negative integer", context, name))?;
        u32::try_from(raw).map_err(|_| anyhow!("{}.{} out of range", context, name))
    };
    Ok(FrameGeometry::new(dim("width")?, dim("height")?))
}

fn parse_bbox(value: &Value) -> Result<BoundingBox> {
    let items = value
        .as_array()
        .filter(|items| items.len() == 4)
        .ok_or_else(|| anyhow!("bbox must be an array of four integers"))?;
    let mut coords = [0i32; 4];
    for (slot, item) in coords.iter_mut().zip(items) {
        let raw = item
            .as_i64()
            .ok_or_else(|| anyhow!("bbox coordinates must be integers"))?;
        *slot = i32::try_from(raw).map_err(|_| anyhow!("bbox coordinate out of range"))?;
    }
    Ok(BoundingBox::from(coords))
}

fn parse_timestamp(value: &Value) -> Result<DateTime<Utc>> {
    let raw = value
        .as_str()
        .ok_or_else(|| anyhow!("timestamp must be an RFC 3339 string"))?;
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| anyhow!("invalid timestamp {:?}: {}", raw, e))
}

/// Parse one detection payload, rejecting unknown fields.
///
/// Room metadata comes from the camera directory, never from the payload.
/// When `inference` is present the box is in the detector's input geometry.
/// It is kept as measured for position classification, and a copy rescaled
/// into `frame` becomes the detection's `bbox`.
/// A missing `timestamp` falls back to `received_at`.
pub fn parse_detection_payload(
    payload: &Value,
    cameras: &CameraDirectory,
    received_at: DateTime<Utc>,
) -> Result<Detection> {
    let obj = payload
        .as_object()
        .ok_or_else(|| anyhow!("detection payload must be a JSON object"))?;
    ensure_allowed_fields("detection", obj, &ROOT_FIELDS)?;

    let camera_id = obj
        .get("camera_id")
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow!("camera_id must be a string"))?;
    validate_camera_id(camera_id)?;

    let class_name = obj
        .get("class_name")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .ok_or_else(|| anyhow!("class_name must be a non-empty string"))?
        .to_string();

    let confidence = obj
        .get("confidence")
        .and_then(Value::as_f64)
        .ok_or_else(|| anyhow!("confidence must be a number"))?;
    if !(0.0..=1.0).contains(&confidence) {
        return Err(anyhow!("confidence out of bounds: {}", confidence));
    }

    let bbox = obj
        .get("bbox")
        .ok_or_else(|| anyhow!("bbox is required"))
        .and_then(parse_bbox)?;
    let frame = obj
        .get("frame")
        .ok_or_else(|| anyhow!("frame is required"))
        .and_then(|v| parse_geometry("frame", v))?;

    let (bbox, inference) = match obj.get("inference") {
        Some(value) => {
            let measured = BoxInFrame::new(bbox, parse_geometry("inference", value)?);
            (measured.rescale_to(frame)?.bbox, Some(measured))
        }
        None => (bbox, None),
    };

    let timestamp = match obj.get("timestamp") {
        Some(value) => parse_timestamp(value)?,
        None => received_at,
    };

    let room = cameras.resolve(camera_id);
    Ok(Detection {
        class_name,
        confidence: confidence as f32,
        bbox,
        frame_context: FrameContext {
            camera_id: camera_id.to_string(),
            room_type: room.room_type.clone(),
            room_name: room.room_name.clone(),
            timestamp,
            frame,
        },
        inference,
    })
}
