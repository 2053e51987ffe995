//! sync_capture - Fire ESP32-CAM captures on a trigger schedule and score them.
//!
//! Start this alongside the conveyor video: after the lead-in, each trigger
//! row fires one capture at its target offset, the JPEG is saved and the
//! paint dot is judged. Ctrl-C skips whatever is left and still writes the
//! report.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::time::Duration;

use dot_sync::storage::FilesystemArtifactStore;
use dot_sync::{
    CaptureClient, CaptureScheduler, DotClassifier, MarkerClassifier, RigConfig,
    SchedulerOptions, SessionReport, TriggerSchedule,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Synchronized ESP32-CAM capture and dot classification")]
struct Args {
    /// Trigger CSV (frame_index,target_time_sec,entity_id,label,expected_verdict).
    schedule: PathBuf,

    /// Rig configuration file (TOML or JSON).
    #[arg(long, env = "DOTSYNC_CONFIG")]
    config: Option<PathBuf>,

    /// Camera device: serial path or tcp://host:port.
    #[arg(long)]
    device: Option<String>,

    /// Directory for captured JPEGs and the session report.
    #[arg(long)]
    artifact_dir: Option<PathBuf>,

    /// Delay before the session clock starts.
    #[arg(long, default_value_t = 1500)]
    lead_in_ms: u64,

    /// Report path (default: <artifact_dir>/session_report.json).
    #[arg(long)]
    report: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut cfg = RigConfig::load_from(args.config.as_deref())?;
    if let Some(device) = args.device {
        cfg.camera.device = device;
    }
    if let Some(dir) = args.artifact_dir {
        cfg.artifact_dir = dir;
    }
    cfg.validate()?;

    let schedule = TriggerSchedule::load(&args.schedule)?;
    log::info!(
        "loaded {} triggers from {} ({} duplicate rows dropped)",
        schedule.len(),
        args.schedule.display(),
        schedule.duplicates_dropped()
    );

    let mut camera = CaptureClient::connect(&cfg.camera);
    if camera.is_available() {
        match camera.status() {
            Ok(status) => log::info!("camera status: {}", status),
            Err(e) => log::warn!("camera status query failed: {}", e),
        }
    }

    let classifier = DotClassifier::new(&cfg.classifier);
    let mut store = FilesystemArtifactStore::new(&cfg.artifact_dir)?;

    let mut scheduler = CaptureScheduler::new(
        &schedule,
        SchedulerOptions {
            lead_in: Duration::from_millis(args.lead_in_ms),
        },
    );
    let stop = scheduler.stop_handle();
    ctrlc::set_handler(move || {
        log::warn!("interrupt received, skipping remaining triggers");
        stop.store(true, Ordering::SeqCst);
    })
    .context("install Ctrl-C handler")?;

    let session = scheduler.run(&mut camera, &classifier, &mut store)?;
    session.log_summary();

    let stats = camera.stats();
    log::info!(
        "camera: {} frames, {} timeouts, {} end-marker mismatches, {} bytes",
        stats.frames_captured,
        stats.timeouts,
        stats.end_marker_mismatches,
        stats.bytes_received
    );

    let report_path = args
        .report
        .unwrap_or_else(|| cfg.artifact_dir.join("session_report.json"));
    SessionReport::new(&session, camera.describe(), classifier.name()).write_to(&report_path)?;
    Ok(())
}
