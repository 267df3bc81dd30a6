//! Camera -> room metadata.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

pub const UNKNOWN_ROOM_TYPE: &str = "unknown";
pub const UNKNOWN_ROOM_NAME: &str = "Unknown Room";

/// Room a camera watches.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomContext {
    pub room_id: String,
    pub room_type: String,
    pub room_name: String,
}

impl RoomContext {
    pub fn unknown() -> Self {
        Self {
            room_id: UNKNOWN_ROOM_TYPE.to_string(),
            room_type: UNKNOWN_ROOM_TYPE.to_string(),
            room_name: UNKNOWN_ROOM_NAME.to_string(),
        }
    }
}

/// Read-only camera table. Unknown cameras resolve to the unknown room.
pub struct CameraDirectory {
    cameras: HashMap<String, RoomContext>,
    fallback: RoomContext,
    misses: AtomicU64,
    warned: Mutex<BTreeSet<String>>,
}

impl CameraDirectory {
    pub fn new(cameras: HashMap<String, RoomContext>) -> Self {
        Self {
            cameras,
            fallback: RoomContext::unknown(),
            misses: AtomicU64::new(0),
            warned: Mutex::new(BTreeSet::new()),
        }
    }

    pub fn resolve(&self, camera_id: &str) -> &RoomContext {
        if let Some(room) = self.cameras.get(camera_id) {
            return room;
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        let first = self
            .warned
            .lock()
            .map(|mut warned| warned.insert(camera_id.to_string()))
            .unwrap_or(false);
        if first {
            log::warn!(
                "camera {} is not configured; treating it as room type {:?}",
                camera_id,
                UNKNOWN_ROOM_TYPE
            );
        }
        &self.fallback
    }

    pub fn len(&self) -> usize {
        self.cameras.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cameras.is_empty()
    }

    pub fn miss_count(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }
}
