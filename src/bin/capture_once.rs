//! capture_once - Query camera status, grab a single frame and save it.

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::path::PathBuf;

use dot_sync::{CaptureClient, DotClassifier, RigConfig};

#[derive(Parser, Debug)]
#[command(author, version, about = "Single ESP32-CAM capture for wiring checks")]
struct Args {
    /// Rig configuration file (TOML or JSON).
    #[arg(long, env = "DOTSYNC_CONFIG")]
    config: Option<PathBuf>,

    /// Camera device: serial path or tcp://host:port.
    #[arg(long)]
    device: Option<String>,

    /// Where to write the captured JPEG.
    #[arg(long, default_value = "capture.jpg")]
    output: PathBuf,

    /// Also run the dot classifier on the capture.
    #[arg(long)]
    analyze: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut cfg = RigConfig::load_from(args.config.as_deref())?;
    if let Some(device) = args.device {
        cfg.camera.device = device;
    }
    cfg.validate()?;

    let mut camera = CaptureClient::open(&cfg.camera)?;
    let status = camera.status().map_err(|e| anyhow!("status query: {}", e))?;
    if status.is_empty() {
        log::warn!("camera sent no status reply");
    } else {
        log::info!("camera status: {}", status);
    }

    let frame = camera.capture().map_err(|e| anyhow!("capture: {}", e))?;
    if !frame.end_marker_ok {
        log::warn!("frame end marker did not match; payload kept");
    }
    std::fs::write(&args.output, &frame.payload)
        .with_context(|| format!("write {}", args.output.display()))?;
    log::info!("saved {} bytes to {}", frame.len(), args.output.display());

    if args.analyze {
        let analysis = DotClassifier::new(&cfg.classifier).analyze(&frame.payload)?;
        match analysis.features {
            Some(features) => log::info!(
                "{}: area {:.0} px², solidity {:.3}, circularity {:.3}",
                analysis.verdict,
                features.area,
                features.solidity,
                features.circularity
            ),
            None => log::info!("no dot found"),
        }
    }
    Ok(())
}
