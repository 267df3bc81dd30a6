//! Alert deduplication.
//!
//! The store remembers, per fingerprint, when an alert was last accepted. A
//! new violation with the same fingerprint inside the window is suppressed
//! and does not move the window. The check and the update happen under one
//! lock, so concurrent callers racing on a fingerprint get exactly one
//! acceptance per window.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::detect::Detection;
use crate::position::PositionLabel;

pub const DEFAULT_DEDUP_WINDOW: Duration = Duration::from_secs(30);
pub const DEFAULT_DEDUP_MAX_ENTRIES: usize = 4096;

/// "The same kind of problem in the same place."
///
/// Box coordinates and confidence are deliberately not part of the key.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AlertFingerprint {
    pub camera_id: String,
    pub class_name: String,
    pub position: PositionLabel,
}

impl AlertFingerprint {
    pub fn new(camera_id: &str, class_name: &str, position: PositionLabel) -> Self {
        Self {
            camera_id: camera_id.to_string(),
            class_name: class_name.to_string(),
            position,
        }
    }

    pub fn of(detection: &Detection, position: PositionLabel) -> Self {
        Self::new(
            &detection.frame_context.camera_id,
            &detection.class_name,
            position,
        )
    }

    /// Stable digest used to correlate alerts in downstream logs.
    pub fn digest(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(self.camera_id.as_bytes());
        hasher.update([0u8]);
        hasher.update(self.class_name.as_bytes());
        hasher.update([0u8]);
        hasher.update(self.position.as_str().as_bytes());
        hasher.finalize().into()
    }

    pub fn short_hex(&self) -> String {
        hex::encode(&self.digest()[..8])
    }
}

impl std::fmt::Display for AlertFingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.camera_id, self.class_name, self.position)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DedupSettings {
    pub window: Duration,
    /// Upper bound on remembered fingerprints.
    pub max_entries: usize,
}

impl Default for DedupSettings {
    fn default() -> Self {
        Self {
            window: DEFAULT_DEDUP_WINDOW,
            max_entries: DEFAULT_DEDUP_MAX_ENTRIES,
        }
    }
}

pub struct DeduplicationStore {
    window: chrono::Duration,
    max_entries: usize,
    last_accepted: Mutex<HashMap<AlertFingerprint, DateTime<Utc>>>,
    evicted: AtomicU64,
}

impl DeduplicationStore {
    pub fn new(settings: DedupSettings) -> Result<Self> {
        if settings.window.is_zero() {
            return Err(anyhow!("dedup window must be greater than zero"));
        }
        if settings.max_entries == 0 {
            return Err(anyhow!("dedup max_entries must be greater than zero"));
        }
        let window = chrono::Duration::from_std(settings.window)
            .map_err(|e| anyhow!("dedup window out of range: {}", e))?;
        Ok(Self {
            window,
            max_entries: settings.max_entries,
            last_accepted: Mutex::new(HashMap::new()),
            evicted: AtomicU64::new(0),
        })
    }

    /// Returns true when `fingerprint` was accepted less than one window
    /// before `now`. Otherwise records `now` as its acceptance time.
    ///
    /// A gap of exactly one window is not a duplicate. A `now` earlier than
    /// the recorded time (clock stepped back) counts as inside the window.
    pub fn should_suppress(&self, fingerprint: &AlertFingerprint, now: DateTime<Utc>) -> bool {
        let mut entries = self.lock();
        if let Some(&last) = entries.get(fingerprint) {
            if now.signed_duration_since(last) < self.window {
                return true;
            }
        } else if entries.len() >= self.max_entries {
            self.make_room(&mut entries, now);
        }
        entries.insert(fingerprint.clone(), now);
        false
    }

    /// Drop fingerprints whose window has fully elapsed. Returns how many.
    ///
    /// Such entries can no longer suppress anything, so removing them never
    /// changes a decision.
    pub fn sweep(&self, now: DateTime<Utc>) -> usize {
        let mut entries = self.lock();
        self.sweep_locked(&mut entries, now)
    }

    pub fn last_accepted(&self, fingerprint: &AlertFingerprint) -> Option<DateTime<Utc>> {
        self.lock().get(fingerprint).copied()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Entries removed by sweeps and capacity pressure.
    pub fn evicted_count(&self) -> u64 {
        self.evicted.load(Ordering::Relaxed)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<AlertFingerprint, DateTime<Utc>>> {
        self.last_accepted
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
    }

    fn sweep_locked(
        &self,
        entries: &mut HashMap<AlertFingerprint, DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> usize {
        let before = entries.len();
        entries.retain(|_, last| now.signed_duration_since(*last) < self.window);
        let removed = before - entries.len();
        if removed > 0 {
            self.evicted.fetch_add(removed as u64, Ordering::Relaxed);
            log::debug!("dedup sweep removed {} stale fingerprints", removed);
        }
        removed
    }

    fn make_room(&self, entries: &mut HashMap<AlertFingerprint, DateTime<Utc>>, now: DateTime<Utc>) {
        self.sweep_locked(entries, now);
        while entries.len() >= self.max_entries {
            let oldest = entries
                .iter()
                .min_by_key(|(_, last)| **last)
                .map(|(fp, _)| fp.clone());
            let Some(oldest) = oldest else {
                break;
            };
            entries.remove(&oldest);
            self.evicted.fetch_add(1, Ordering::Relaxed);
            log::warn!(
                "dedup store full ({} entries); evicted live fingerprint {}",
                self.max_entries,
                oldest
            );
        }
    }
}
