//! Detection ingestion.
//!
//! The external detector hands detections over as JSON payloads. This layer:
//! - Rejects payloads with fields outside the allowlist
//! - Resolves room metadata from the camera directory
//! - Moves inference-space boxes into original-frame coordinates
//!
//! The ingestion layer MUST NOT decide anything about violations; malformed
//! payloads are dropped here, everything else flows into the pipeline.

pub mod jsonl;
mod payload;

pub use jsonl::JsonLinesSource;
pub use payload::parse_detection_payload;
