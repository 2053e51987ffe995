//! manual_capture - Press ENTER to capture and analyze, `q` to quit.
//!
//! Used for positioning the camera and tuning thresholds by hand. Every
//! capture is saved as `manual_NN.jpg` in the artifact directory.

use anyhow::{anyhow, Result};
use clap::Parser;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use dot_sync::storage::{manual_artifact_name, FilesystemArtifactStore};
use dot_sync::{ArtifactStore, CaptureClient, DotClassifier, RigConfig};

#[derive(Parser, Debug)]
#[command(author, version, about = "Interactive ESP32-CAM capture and dot analysis")]
struct Args {
    /// Rig configuration file (TOML or JSON).
    #[arg(long, env = "DOTSYNC_CONFIG")]
    config: Option<PathBuf>,

    /// Camera device: serial path or tcp://host:port.
    #[arg(long)]
    device: Option<String>,

    /// Directory for captured JPEGs.
    #[arg(long)]
    artifact_dir: Option<PathBuf>,
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

    let mut camera = CaptureClient::open(&cfg.camera)?;
    let classifier = DotClassifier::new(&cfg.classifier);
    let mut store = FilesystemArtifactStore::new(&cfg.artifact_dir)?;

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    let mut count = 0u32;
    loop {
        print!("[ENTER] capture, [q] quit > ");
        io::stdout().flush()?;
        let Some(line) = lines.next() else {
            break;
        };
        if line?.trim().eq_ignore_ascii_case("q") {
            break;
        }

        let frame = match camera.capture() {
            Ok(frame) => frame,
            Err(e) => {
                log::warn!("{}", e);
                if !camera.is_available() {
                    return Err(anyhow!("camera lost: {}", e));
                }
                continue;
            }
        };
        count += 1;
        let artifact = store.store(&manual_artifact_name(count), &frame.payload)?;

        match classifier.analyze(&frame.payload) {
            Ok(analysis) => match analysis.features {
                Some(features) => println!(
                    "{}  {}  area {:.0}  solidity {:.3}  circularity {:.3}",
                    artifact.name,
                    analysis.verdict,
                    features.area,
                    features.solidity,
                    features.circularity
                ),
                None => println!("{}  no dot found", artifact.name),
            },
            Err(e) => println!("{}  could not decode: {:#}", artifact.name, e),
        }
    }

    log::info!("{} captures saved to {}", count, store.dir().display());
    Ok(())
}
