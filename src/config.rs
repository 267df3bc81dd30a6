use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::time::Duration;

use crate::camera::{CameraDirectory, RoomContext};
use crate::dedup::{DedupSettings, DEFAULT_DEDUP_MAX_ENTRIES};
use crate::policy::{ObjectCategories, PolicyStore, RoomRules, CATEGORY_PREFIX};
use crate::position::PositionThresholds;

const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.5;
const DEFAULT_DEDUP_WINDOW_SECS: u64 = 30;

#[derive(Debug, Deserialize, Default)]
struct MonitorConfigFile {
    confidence_threshold: Option<f32>,
    dedup: Option<DedupConfigFile>,
    position: Option<PositionConfigFile>,
    categories: Option<BTreeMap<String, Vec<String>>>,
    sentinels: Option<BTreeMap<String, Vec<String>>>,
    cameras: Option<BTreeMap<String, CameraConfigFile>>,
    rules: Option<BTreeMap<String, RoomRules>>,
}

#[derive(Debug, Deserialize, Default)]
struct DedupConfigFile {
    window_secs: Option<u64>,
    max_entries: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
struct PositionConfigFile {
    floor: Option<f64>,
    low: Option<f64>,
    mid: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct CameraConfigFile {
    room_id: Option<String>,
    room_type: String,
    room_name: Option<String>,
}

/// Static configuration, loaded once at start.
///
/// Tables given in the file replace the built-in table of the same name
/// wholesale; they are not merged entry by entry.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub confidence_threshold: f32,
    pub dedup_window: Duration,
    pub dedup_max_entries: usize,
    pub position_thresholds: PositionThresholds,
    pub categories: BTreeMap<String, Vec<String>>,
    pub sentinels: BTreeMap<String, Vec<String>>,
    pub cameras: BTreeMap<String, RoomContext>,
    pub rules: BTreeMap<String, RoomRules>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self::from_file(MonitorConfigFile::default())
    }
}

impl MonitorConfig {
    /// File named by `MONITOR_CONFIG` (if any), then env overrides, then validation.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("MONITOR_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Like `load`, but from an explicit path; env overrides still apply.
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut cfg = Self::from_file(read_config_file(path)?);
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: MonitorConfigFile) -> Self {
        let defaults = PositionThresholds::default();
        let position_thresholds = PositionThresholds {
            floor: file
                .position
                .as_ref()
                .and_then(|p| p.floor)
                .unwrap_or(defaults.floor),
            low: file
                .position
                .as_ref()
                .and_then(|p| p.low)
                .unwrap_or(defaults.low),
            mid: file
                .position
                .as_ref()
                .and_then(|p| p.mid)
                .unwrap_or(defaults.mid),
        };
        let dedup_window = Duration::from_secs(
            file.dedup
                .as_ref()
                .and_then(|d| d.window_secs)
                .unwrap_or(DEFAULT_DEDUP_WINDOW_SECS),
        );
        let dedup_max_entries = file
            .dedup
            .as_ref()
            .and_then(|d| d.max_entries)
            .unwrap_or(DEFAULT_DEDUP_MAX_ENTRIES);
        let cameras = match file.cameras {
            Some(cameras) => cameras
                .into_iter()
                .map(|(camera_id, cam)| {
                    let room = RoomContext {
                        room_id: cam.room_id.unwrap_or_else(|| cam.room_type.clone()),
                        room_name: cam.room_name.unwrap_or_else(|| cam.room_type.clone()),
                        room_type: cam.room_type,
                    };
                    (camera_id, room)
                })
                .collect(),
            None => default_cameras(),
        };

        Self {
            confidence_threshold: file
                .confidence_threshold
                .unwrap_or(DEFAULT_CONFIDENCE_THRESHOLD),
            dedup_window,
            dedup_max_entries,
            position_thresholds,
            categories: file.categories.unwrap_or_else(default_categories),
            sentinels: file.sentinels.unwrap_or_else(default_sentinels),
            cameras,
            rules: file.rules.unwrap_or_else(default_rules),
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(raw) = std::env::var("MONITOR_CONFIDENCE_THRESHOLD") {
            self.confidence_threshold = raw
                .trim()
                .parse()
                .map_err(|_| anyhow!("MONITOR_CONFIDENCE_THRESHOLD must be a number"))?;
        }
        if let Ok(raw) = std::env::var("MONITOR_DEDUP_WINDOW_SECS") {
            let seconds: u64 = raw.trim().parse().map_err(|_| {
                anyhow!("MONITOR_DEDUP_WINDOW_SECS must be an integer number of seconds")
            })?;
            self.dedup_window = Duration::from_secs(seconds);
        }
        if let Ok(raw) = std::env::var("MONITOR_DEDUP_MAX_ENTRIES") {
            self.dedup_max_entries = raw
                .trim()
                .parse()
                .map_err(|_| anyhow!("MONITOR_DEDUP_MAX_ENTRIES must be an integer"))?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(anyhow!(
                "confidence_threshold must be within 0..=1 (got {})",
                self.confidence_threshold
            ));
        }
        if self.dedup_window.is_zero() {
            return Err(anyhow!("dedup window must be greater than zero"));
        }
        if self.dedup_max_entries == 0 {
            return Err(anyhow!("dedup max_entries must be greater than zero"));
        }
        self.position_thresholds.validate()?;

        for room_type in self.rules.keys() {
            crate::validate_room_type(room_type)?;
        }
        for (camera_id, room) in &self.cameras {
            crate::validate_camera_id(camera_id)?;
            crate::validate_room_type(&room.room_type)?;
            if !self.rules.contains_key(&room.room_type) {
                log::warn!(
                    "camera {} watches room type {:?} which has no rules; it will never alert",
                    camera_id,
                    room.room_type
                );
            }
        }
        for (sentinel, targets) in &self.sentinels {
            for category in targets {
                if !self.categories.contains_key(category) {
                    log::warn!(
                        "sentinel {} refers to undefined category {}",
                        sentinel,
                        category
                    );
                }
            }
        }
        for (room_type, rules) in &self.rules {
            for entry in &rules.forbidden_objects {
                if entry.starts_with(CATEGORY_PREFIX) || self.sentinels.contains_key(entry) {
                    return Err(anyhow!(
                        "rules.{}.forbidden_objects takes class names only (got {:?})",
                        room_type,
                        entry
                    ));
                }
            }
        }
        Ok(())
    }

    pub fn dedup_settings(&self) -> DedupSettings {
        DedupSettings {
            window: self.dedup_window,
            max_entries: self.dedup_max_entries,
        }
    }

    pub fn policy_store(&self) -> PolicyStore {
        PolicyStore::new(
            ObjectCategories::new(self.categories.clone()),
            self.sentinels.clone(),
            self.rules.clone(),
        )
    }

    pub fn camera_directory(&self) -> CameraDirectory {
        let cameras: HashMap<String, RoomContext> = self
            .cameras
            .iter()
            .map(|(id, room)| (id.clone(), room.clone()))
            .collect();
        CameraDirectory::new(cameras)
    }
}

fn read_config_file(path: &Path) -> Result<MonitorConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn default_categories() -> BTreeMap<String, Vec<String>> {
    BTreeMap::from([
        (
            "DANGEROUS".to_string(),
            strings(&["knife", "scissors", "razor", "needle", "lighter"]),
        ),
        (
            "FRAGILE".to_string(),
            strings(&["glass", "cup", "plate", "vase"]),
        ),
        (
            "CHEMICAL".to_string(),
            strings(&["detergent", "bleach", "medicine"]),
        ),
    ])
}

fn default_sentinels() -> BTreeMap<String, Vec<String>> {
    BTreeMap::from([("any_sharp_object".to_string(), strings(&["DANGEROUS"]))])
}

fn default_cameras() -> BTreeMap<String, RoomContext> {
    BTreeMap::from([
        (
            "CAM_001".to_string(),
            RoomContext {
                room_id: "kitchen_01".to_string(),
                room_type: "kitchen".to_string(),
                room_name: "Kitchen, ground floor".to_string(),
            },
        ),
        (
            "CAM_002".to_string(),
            RoomContext {
                room_id: "child_01".to_string(),
                room_type: "child_room".to_string(),
                room_name: "Children's room".to_string(),
            },
        ),
    ])
}

fn default_rules() -> BTreeMap<String, RoomRules> {
    BTreeMap::from([
        (
            "kitchen".to_string(),
            RoomRules {
                forbidden_objects: Vec::new(),
                forbidden_on_floor: strings(&["knife", "glass", "hot_pan"]),
                description: "Sharp or hot objects on the kitchen floor".to_string(),
            },
        ),
        (
            "child_room".to_string(),
            RoomRules {
                forbidden_objects: strings(&["knife", "scissors", "medicine", "lighter"]),
                forbidden_on_floor: strings(&["any_sharp_object"]),
                description: "Dangerous objects are not allowed in the children's room"
                    .to_string(),
            },
        ),
        (
            "living_room".to_string(),
            RoomRules {
                forbidden_objects: Vec::new(),
                forbidden_on_floor: strings(&["glass", "medicine"]),
                description: String::new(),
            },
        ),
    ])
}
