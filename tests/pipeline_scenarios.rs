use std::collections::BTreeMap;
use std::sync::{Arc, Barrier};
use std::thread;

use chrono::{DateTime, Utc};

use home_hazard_monitor::config::MonitorConfig;
use home_hazard_monitor::policy::RoomRules;
use home_hazard_monitor::{
    parse_detection_payload, AlertFingerprint, AlertSink, BoundingBox, Clock, CollectingSink, DedupSettings,
    DeduplicationStore, Detection, DetectionOutcome, FrameContext, FrameGeometry, ManualClock,
    Pipeline, PositionClassifier, PositionLabel, Severity, ViolationKind,
};

const START: i64 = 1_700_000_000;

fn config() -> MonitorConfig {
    let mut cfg = MonitorConfig::default();
    cfg.categories = BTreeMap::from([(
        "DANGEROUS".to_string(),
        vec!["knife".to_string(), "scissors".to_string()],
    )]);
    cfg.rules = BTreeMap::from([
        (
            "kitchen".to_string(),
            RoomRules {
                forbidden_on_floor: vec!["knife".to_string(), "glass".to_string()],
                ..RoomRules::default()
            },
        ),
        (
            "child_room".to_string(),
            RoomRules {
                forbidden_objects: vec!["knife".to_string()],
                forbidden_on_floor: vec!["any_sharp_object".to_string()],
                ..RoomRules::default()
            },
        ),
    ]);
    cfg
}

fn pipeline() -> (Pipeline, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::at_epoch_secs(START));
    let pipeline = Pipeline::from_config(&config(), clock.clone()).expect("pipeline");
    (pipeline, clock)
}

fn frame_time() -> DateTime<Utc> {
    DateTime::from_timestamp(START, 0).unwrap()
}

fn detection(room_type: &str, class_name: &str, bbox: BoundingBox) -> Detection {
    Detection {
        class_name: class_name.to_string(),
        confidence: 0.9,
        bbox,
        frame_context: FrameContext {
            camera_id: format!("CAM_{}", room_type),
            room_type: room_type.to_string(),
            room_name: format!("test {}", room_type),
            timestamp: frame_time(),
            frame: FrameGeometry::new(640, 480),
        },
        inference: None,
    }
}

// center_y 445 / 480 = 0.93
fn floor_box() -> BoundingBox {
    BoundingBox::new(200, 420, 260, 470)
}

// center_y 60 / 480 = 0.125
fn shelf_box() -> BoundingBox {
    BoundingBox::new(200, 40, 260, 80)
}

#[test]
fn threshold_boundaries_fall_to_the_lower_band() {
    let classifier = PositionClassifier::default();
    let at = |center: i32| BoundingBox::new(0, center - 10, 10, center + 10);
    assert_eq!(classifier.classify(&at(80), 100).unwrap(), PositionLabel::Low);
    assert_eq!(classifier.classify(&at(50), 100).unwrap(), PositionLabel::Mid);
    assert_eq!(classifier.classify(&at(30), 100).unwrap(), PositionLabel::High);
    assert_eq!(classifier.classify(&at(81), 100).unwrap(), PositionLabel::Floor);
}

#[test]
fn forbidden_object_takes_precedence_over_floor_rule() {
    let (mut p, _) = pipeline();
    match p.process(&detection("child_room", "knife", floor_box())) {
        DetectionOutcome::Alert(record) => {
            assert_eq!(record.violation_kind, ViolationKind::ForbiddenObject);
            assert_eq!(record.severity, Severity::Critical);
            assert_eq!(record.message, "knife detected in test child_room");
        }
        other => panic!("expected alert, got {other:?}"),
    }
}

#[test]
fn sentinel_expands_to_category_members_on_the_floor() {
    let (mut p, _) = pipeline();
    match p.process(&detection("child_room", "scissors", floor_box())) {
        DetectionOutcome::Alert(record) => {
            assert_eq!(record.violation_kind, ViolationKind::ForbiddenOnFloor);
            assert_eq!(record.severity, Severity::High);
        }
        other => panic!("expected alert, got {other:?}"),
    }
    assert_eq!(
        p.process(&detection("child_room", "cup", floor_box())),
        DetectionOutcome::Clean(PositionLabel::Floor)
    );
    assert_eq!(
        p.process(&detection("child_room", "scissors", shelf_box())),
        DetectionOutcome::Clean(PositionLabel::High)
    );
}

#[test]
fn duplicates_inside_the_window_yield_one_alert() {
    let (mut p, clock) = pipeline();
    let det = detection("kitchen", "knife", floor_box());
    let mut sinks: Vec<Box<dyn AlertSink>> = Vec::new();

    let mut emitted = p.process_batch(std::slice::from_ref(&det), &mut sinks);
    clock.advance_secs_f64(5.0);
    emitted.extend(p.process_batch(std::slice::from_ref(&det), &mut sinks));
    assert_eq!(emitted.len(), 1);
}

#[test]
fn duplicates_past_the_window_yield_two_alerts() {
    let (mut p, clock) = pipeline();
    let det = detection("kitchen", "knife", floor_box());
    let mut sinks: Vec<Box<dyn AlertSink>> = Vec::new();

    let mut emitted = p.process_batch(std::slice::from_ref(&det), &mut sinks);
    clock.advance_secs_f64(31.0);
    emitted.extend(p.process_batch(std::slice::from_ref(&det), &mut sinks));
    assert_eq!(emitted.len(), 2);
    assert_ne!(emitted[0].alert_id, emitted[1].alert_id);
    assert_eq!(emitted[0].fingerprint, emitted[1].fingerprint);
}

#[test]
fn gap_of_exactly_one_window_is_not_a_duplicate() {
    let (mut p, clock) = pipeline();
    let det = detection("kitchen", "knife", floor_box());
    assert!(matches!(p.process(&det), DetectionOutcome::Alert(_)));
    clock.advance_secs_f64(30.0);
    assert!(matches!(p.process(&det), DetectionOutcome::Alert(_)));
}

#[test]
fn unknown_room_type_never_violates() {
    let (mut p, _) = pipeline();
    for class_name in ["knife", "scissors", "glass", "lighter"] {
        for bbox in [floor_box(), shelf_box()] {
            let outcome = p.process(&detection("garage", class_name, bbox));
            assert!(
                matches!(outcome, DetectionOutcome::Clean(_)),
                "{class_name} in garage: {outcome:?}"
            );
        }
    }
    assert_eq!(p.stats().violations, 0);
    assert!(p.policies().miss_count() >= 8);
}

#[test]
fn kitchen_floor_knife_end_to_end() {
    let (mut p, clock) = pipeline();
    let det = detection("kitchen", "knife", floor_box());
    let mut sinks: Vec<Box<dyn AlertSink>> = vec![Box::new(CollectingSink::default())];

    let first = p.process_batch(std::slice::from_ref(&det), &mut sinks);
    assert_eq!(first.len(), 1);
    let record = &first[0];
    assert_eq!(record.violation_kind, ViolationKind::ForbiddenOnFloor);
    assert_eq!(record.severity, Severity::High);
    assert_eq!(record.message, "knife found in a disallowed floor position");
    assert_eq!(record.position, PositionLabel::Floor);
    assert_eq!(record.timestamp, frame_time());
    assert_eq!(record.emitted_at, clock.now());

    clock.advance_secs_f64(10.0);
    let repeat = p.process_batch(std::slice::from_ref(&det), &mut sinks);
    assert!(repeat.is_empty());

    let stats = p.stats();
    assert_eq!(stats.violations, 2);
    assert_eq!(stats.emitted, 1);
    assert_eq!(stats.suppressed, 1);
    assert_eq!(stats.sink_failures, 0);
}

#[test]
fn glass_away_from_the_floor_is_clean() {
    let (mut p, _) = pipeline();
    assert_eq!(
        p.process(&detection("kitchen", "glass", shelf_box())),
        DetectionOutcome::Clean(PositionLabel::High)
    );
}

#[test]
fn concurrent_identical_violations_yield_exactly_one_acceptance() {
    let store = Arc::new(DeduplicationStore::new(DedupSettings::default()).unwrap());
    let fingerprint = AlertFingerprint::new("CAM_001", "knife", PositionLabel::Floor);
    let now = frame_time();
    let threads = 8;
    let barrier = Arc::new(Barrier::new(threads));

    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let store = Arc::clone(&store);
            let barrier = Arc::clone(&barrier);
            let fingerprint = fingerprint.clone();
            thread::spawn(move || {
                barrier.wait();
                !store.should_suppress(&fingerprint, now)
            })
        })
        .collect();

    let accepted = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|accepted| *accepted)
        .count();
    assert_eq!(accepted, 1);
}

#[test]
fn forked_pipelines_on_threads_share_one_dedup_store() {
    let (base, _) = pipeline();
    let det = detection("kitchen", "knife", floor_box());
    let threads = 4;
    let barrier = Arc::new(Barrier::new(threads));

    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let mut fork = base.fork();
            let barrier = Arc::clone(&barrier);
            let det = det.clone();
            thread::spawn(move || {
                barrier.wait();
                fork.process(&det);
                fork.stats()
            })
        })
        .collect();

    let mut total = base.stats();
    for handle in handles {
        total.merge(&handle.join().unwrap());
    }
    assert_eq!(total.seen, 4);
    assert_eq!(total.emitted, 1);
    assert_eq!(total.suppressed, 3);
}

#[test]
fn detector_space_floor_box_survives_ingest_rescale() {
    let cfg = MonitorConfig::default();
    let clock = Arc::new(ManualClock::at_epoch_secs(START));
    let mut p = Pipeline::from_config(&cfg, clock.clone()).expect("pipeline");
    let payload = serde_json::json!({
        "camera_id": "CAM_001",
        "class_name": "knife",
        "confidence": 0.9,
        "bbox": [100, 509, 140, 516],
        "inference": { "width": 640, "height": 640 },
        "frame": { "width": 1920, "height": 1080 }
    });
    let det = parse_detection_payload(&payload, &cfg.camera_directory(), clock.now())
        .expect("payload");
    match p.process(&det) {
        DetectionOutcome::Alert(record) => {
            assert_eq!(record.position, PositionLabel::Floor);
            assert_eq!(record.violation_kind, ViolationKind::ForbiddenOnFloor);
            assert_eq!(record.bbox, BoundingBox::new(300, 859, 420, 871));
        }
        other => panic!("expected floor alert, got {other:?}"),
    }
}

#[test]
fn thin_detector_box_is_not_invalid_after_rescale() {
    let cfg = MonitorConfig::default();
    let clock = Arc::new(ManualClock::at_epoch_secs(START));
    let mut p = Pipeline::from_config(&cfg, clock.clone()).expect("pipeline");
    let payload = serde_json::json!({
        "camera_id": "CAM_001",
        "class_name": "knife",
        "confidence": 0.9,
        "bbox": [100, 600, 101, 601],
        "inference": { "width": 640, "height": 640 },
        "frame": { "width": 160, "height": 160 }
    });
    let det = parse_detection_payload(&payload, &cfg.camera_directory(), clock.now())
        .expect("payload");
    assert!(matches!(p.process(&det), DetectionOutcome::Alert(_)));
    assert_eq!(p.stats().invalid_geometry, 0);
}
