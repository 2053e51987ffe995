//! fake_cam - Loopback ESP32-CAM on TCP for bench runs without hardware.
//!
//! Point the rig at `tcp://<listen>` and every capture is answered with the
//! same JPEG: either a file from disk or a rendered test dot.

use anyhow::{Context, Result};
use clap::Parser;
use std::net::TcpListener;
use std::path::PathBuf;

use dot_sync::sim::{encode_jpeg, render_dot, DotColor, DotShape, LoopbackCamera, Reply};

#[derive(Parser, Debug)]
#[command(author, version, about = "TCP loopback stand-in for the ESP32-CAM")]
struct Args {
    /// Address to listen on.
    #[arg(long, env = "DOTSYNC_FAKE_CAM_ADDR", default_value = "127.0.0.1:8765")]
    listen: String,

    /// JPEG to serve. Without it a test dot is rendered.
    #[arg(long)]
    jpeg: Option<PathBuf>,

    /// Rendered dot shape: circle, pacman, donut or none.
    #[arg(long, default_value = "circle")]
    shape: DotShape,

    /// Render the dot red instead of yellow.
    #[arg(long)]
    red: bool,

    /// Send a damaged end marker with every frame.
    #[arg(long)]
    corrupt_end: bool,

    /// Serve a single client and exit.
    #[arg(long)]
    once: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let jpeg = match &args.jpeg {
        Some(path) => std::fs::read(path).with_context(|| format!("read {}", path.display()))?,
        None => {
            let color = if args.red { DotColor::Red } else { DotColor::Yellow };
            encode_jpeg(&render_dot(320, 240, args.shape, color, 40))?
        }
    };
    let reply = if args.corrupt_end {
        Reply::CorruptEnd
    } else {
        Reply::Frame
    };
    let camera = LoopbackCamera::new(jpeg).with_reply(reply);

    let listener =
        TcpListener::bind(&args.listen).with_context(|| format!("bind {}", args.listen))?;
    log::info!("fake camera listening on tcp://{}", listener.local_addr()?);
    loop {
        match camera.serve_one(&listener) {
            Ok(served) => log::info!("client disconnected after {} captures", served),
            Err(e) => log::warn!("client error: {:#}", e),
        }
        if args.once {
            return Ok(());
        }
    }
}
