//! monitord - home hazard monitor daemon
//!
//! This daemon:
//! 1. Reads detection payloads as JSON lines from a file or stdin
//! 2. Resolves each camera to its room and evaluates the room policy
//! 3. Suppresses duplicate alerts inside the dedup window
//! 4. Writes accepted alerts to stdout as JSON lines and to the log
//! 5. Sweeps expired dedup entries periodically

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::PathBuf;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use home_hazard_monitor::{
    AlertSink, Clock, Detection, DetectionSource, JsonLinesSink, JsonLinesSource, LogAlertSink,
    MonitorConfig, Pipeline, SystemClock,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Evaluate detections against room safety policies")]
struct Args {
    /// Detection payloads, one JSON object or array per line. Reads stdin when omitted or "-".
    #[arg(long)]
    input: Option<PathBuf>,

    /// Configuration file (TOML or JSON). Built-in defaults apply when unset.
    #[arg(long, env = "MONITOR_CONFIG")]
    config: Option<PathBuf>,

    /// Seconds between sweeps of expired dedup entries.
    #[arg(long, default_value_t = 10)]
    sweep_secs: u64,

    /// Do not echo alerts to the log.
    #[arg(long)]
    no_log_sink: bool,
}

enum Message {
    Batch(Vec<Detection>),
    Eof { lines: u64, rejected: u64 },
    ReadFailed(anyhow::Error),
    Shutdown,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    if args.sweep_secs == 0 {
        return Err(anyhow!("--sweep-secs must be >= 1"));
    }

    let cfg = match &args.config {
        Some(path) => MonitorConfig::load_from(path)?,
        None => MonitorConfig::load()?,
    };
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let cameras = Arc::new(cfg.camera_directory());
    let mut pipeline = Pipeline::from_config(&cfg, Arc::clone(&clock))?;

    log::info!(
        "monitord running: {} cameras, {} room policies, dedup window {}s, confidence >= {:.2}",
        cameras.len(),
        pipeline.policies().room_types().count(),
        cfg.dedup_window.as_secs(),
        cfg.confidence_threshold
    );

    let (reader, input_name): (Box<dyn BufRead + Send>, String) = match &args.input {
        Some(path) if path.as_os_str() != "-" => {
            let file = File::open(path)
                .with_context(|| format!("failed to open input {}", path.display()))?;
            (Box::new(BufReader::new(file)), path.display().to_string())
        }
        _ => (Box::new(BufReader::new(io::stdin())), "stdin".to_string()),
    };

    let (tx, rx) = mpsc::channel();
    let shutdown_tx = tx.clone();
    ctrlc::set_handler(move || {
        let _ = shutdown_tx.send(Message::Shutdown);
    })
    .context("error setting Ctrl-C handler")?;

    let mut source = JsonLinesSource::new(&input_name, reader, Arc::clone(&cameras), clock);
    thread::spawn(move || loop {
        match source.next_batch() {
            Ok(Some(batch)) => {
                if tx.send(Message::Batch(batch)).is_err() {
                    return;
                }
            }
            Ok(None) => {
                let _ = tx.send(Message::Eof {
                    lines: source.lines_read(),
                    rejected: source.rejected(),
                });
                return;
            }
            Err(e) => {
                let _ = tx.send(Message::ReadFailed(e));
                return;
            }
        }
    });

    let mut sinks: Vec<Box<dyn AlertSink>> = vec![Box::new(JsonLinesSink::new(io::stdout()))];
    if !args.no_log_sink {
        sinks.push(Box::new(LogAlertSink));
    }

    let sweep_every = Duration::from_secs(args.sweep_secs);
    let mut last_sweep = Instant::now();
    loop {
        match rx.recv_timeout(sweep_every) {
            Ok(Message::Batch(batch)) => {
                pipeline.process_batch(&batch, &mut sinks);
            }
            Ok(Message::Eof { lines, rejected }) => {
                log::info!(
                    "{}: end of input after {} lines ({} payloads rejected)",
                    input_name,
                    lines,
                    rejected
                );
                break;
            }
            Ok(Message::ReadFailed(e)) => {
                log::error!("{}: read failed: {}", input_name, e);
                break;
            }
            Ok(Message::Shutdown) => {
                log::info!("shutdown signal received");
                break;
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }

        if last_sweep.elapsed() >= sweep_every {
            let removed = pipeline.alerts().sweep();
            if removed > 0 {
                log::debug!("dedup sweep removed {} expired entries", removed);
            }
            last_sweep = Instant::now();
        }
    }

    let stats = pipeline.stats();
    log::info!(
        "processed {} detections: {} alerts, {} suppressed, {} clean, {} below threshold, {} invalid geometry, {} sink failures",
        stats.seen,
        stats.emitted,
        stats.suppressed,
        stats.clean,
        stats.below_threshold,
        stats.invalid_geometry,
        stats.sink_failures
    );
    if cameras.miss_count() > 0 || pipeline.policies().miss_count() > 0 {
        log::warn!(
            "{} detections from unknown cameras, {} lookups of room types without policy",
            cameras.miss_count(),
            pipeline.policies().miss_count()
        );
    }
    Ok(())
}
