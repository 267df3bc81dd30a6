//! demo - synthetic end-to-end run of the home hazard monitor
//!
//! Replays a scripted sequence of frames through the default deployment on a
//! manual clock, so dedup windows elapse instantly.

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;

use home_hazard_monitor::{
    AlertSink, BoundingBox, CameraDirectory, Clock, CollectingSink, Detection, DetectionSource,
    FrameContext, FrameGeometry, LogAlertSink, ManualClock, MonitorConfig, Pipeline,
    ScriptedSource,
};

const FRAME: FrameGeometry = FrameGeometry {
    width: 640,
    height: 480,
};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Dedup window in seconds.
    #[arg(long, default_value_t = 30)]
    dedup_window: u64,
    /// Print accepted alerts as JSON instead of log lines.
    #[arg(long)]
    json: bool,
    /// Start time of the synthetic clock (unix seconds).
    #[arg(long, default_value_t = 1_700_000_000)]
    start: i64,
}

struct Step {
    advance_secs: f64,
    label: &'static str,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();
    if args.dedup_window == 0 {
        return Err(anyhow!("dedup window must be >= 1 second"));
    }

    stage("load default deployment");
    let cfg = MonitorConfig {
        dedup_window: Duration::from_secs(args.dedup_window),
        ..MonitorConfig::default()
    };
    let clock = Arc::new(ManualClock::at_epoch_secs(args.start));
    let cameras = cfg.camera_directory();
    let mut pipeline = Pipeline::from_config(&cfg, clock.clone())?;

    stage("script frames");
    let window = args.dedup_window as f64;
    let steps = [
        Step {
            advance_secs: 0.0,
            label: "knife and cup on the kitchen floor, scissors on a child's shelf",
        },
        Step {
            advance_secs: 5.0_f64.min(window / 2.0),
            label: "same knife again, inside the window",
        },
        Step {
            advance_secs: window - 5.0_f64.min(window / 2.0),
            label: "same knife, one full window after the first alert",
        },
        Step {
            advance_secs: 1.0,
            label: "faint glass, knife on an unknown camera, inverted box",
        },
    ];

    let floor = BoundingBox::new(100, 420, 180, 470);
    let shelf = BoundingBox::new(300, 60, 340, 120);
    let inverted = BoundingBox::new(10, 200, 40, 150);
    let frames = {
        let mut at = clock.now();
        let mut frame_time = |advance_secs: f64| {
            at += secs(advance_secs);
            at
        };
        let t0 = frame_time(steps[0].advance_secs);
        let t1 = frame_time(steps[1].advance_secs);
        let t2 = frame_time(steps[2].advance_secs);
        let t3 = frame_time(steps[3].advance_secs);
        vec![
            vec![
                detection(&cameras, "CAM_001", "knife", 0.91, floor, t0),
                detection(&cameras, "CAM_001", "cup", 0.77, floor, t0),
                detection(&cameras, "CAM_002", "scissors", 0.84, shelf, t0),
            ],
            vec![detection(&cameras, "CAM_001", "knife", 0.88, floor, t1)],
            vec![detection(&cameras, "CAM_001", "knife", 0.90, floor, t2)],
            vec![
                detection(&cameras, "CAM_001", "glass", 0.31, floor, t3),
                detection(&cameras, "CAM_404", "knife", 0.95, floor, t3),
                detection(&cameras, "CAM_002", "lighter", 0.70, inverted, t3),
            ],
        ]
    };
    let mut source = ScriptedSource::new("demo", frames);

    stage("run pipeline");
    let mut sinks: Vec<Box<dyn AlertSink>> = vec![Box::new(CollectingSink::default())];
    let mut steps = steps.iter();
    while let Some(batch) = source.next_batch()? {
        let Some(step) = steps.next() else {
            break;
        };
        clock.advance_secs_f64(step.advance_secs);
        eprintln!(
            "demo: {} frame (+{:.0}s): {}",
            source.name(),
            step.advance_secs,
            step.label
        );
        for record in pipeline.process_batch(&batch, &mut sinks) {
            if args.json {
                println!("{}", serde_json::to_string(&record)?);
            } else {
                let (b, g, r) = record.severity.bgr_color();
                println!(
                    "{}  overlay=#{:02x}{:02x}{:02x}",
                    LogAlertSink::format(&record),
                    r,
                    g,
                    b
                );
            }
        }
    }

    stage("summary");
    let stats = pipeline.stats();
    eprintln!(
        "demo: seen={} alerts={} suppressed={} clean={} below_threshold={} invalid_geometry={}",
        stats.seen,
        stats.emitted,
        stats.suppressed,
        stats.clean,
        stats.below_threshold,
        stats.invalid_geometry
    );
    eprintln!(
        "demo: unknown cameras={} unknown room types={} dedup entries={}",
        cameras.miss_count(),
        pipeline.policies().miss_count(),
        pipeline.alerts().dedup().len()
    );
    Ok(())
}

fn secs(value: f64) -> chrono::Duration {
    chrono::Duration::milliseconds((value * 1000.0).round() as i64)
}

fn detection(
    cameras: &CameraDirectory,
    camera_id: &str,
    class_name: &str,
    confidence: f32,
    bbox: BoundingBox,
    timestamp: DateTime<Utc>,
) -> Detection {
    let room = cameras.resolve(camera_id);
    Detection {
        class_name: class_name.to_string(),
        confidence,
        bbox,
        frame_context: FrameContext {
            camera_id: camera_id.to_string(),
            room_type: room.room_type.clone(),
            room_name: room.room_name.clone(),
            timestamp,
            frame: FRAME,
        },
        inference: None,
    }
}

fn stage(msg: &str) {
    eprintln!("demo: {}", msg);
}
