//! Loopback camera for bench runs without hardware.
//!
//! `LoopbackCamera` speaks the same `C`/`S` protocol as the ESP32 firmware over
//! TCP and answers every capture with one fixed JPEG. The render helpers draw
//! the dot styles used by the conveyor test video, so the full
//! capture → classify path can be exercised end to end.

use anyhow::{anyhow, Context, Result};
use image::{DynamicImage, GrayImage, ImageFormat, Luma, Rgb, RgbImage};
use std::io::{Cursor, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::str::FromStr;

use crate::capture::{CMD_CAPTURE, CMD_STATUS};
use crate::transport::{encode_frame, FRAME_END};

const RUBBER: Rgb<u8> = Rgb([25, 25, 25]);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DotShape {
    Circle,
    /// Circle with a 90° wedge missing.
    Pacman,
    /// Ring with an inner radius of half the outer radius.
    Donut,
    None,
}

impl FromStr for DotShape {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "circle" => Ok(DotShape::Circle),
            "pacman" => Ok(DotShape::Pacman),
            "donut" => Ok(DotShape::Donut),
            "none" => Ok(DotShape::None),
            other => Err(anyhow!("unknown dot shape '{}'", other)),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DotColor {
    Yellow,
    Red,
}

impl DotColor {
    fn rgb(self) -> Rgb<u8> {
        match self {
            DotColor::Yellow => Rgb([255, 230, 0]),
            DotColor::Red => Rgb([230, 0, 0]),
        }
    }
}

fn in_shape(dx: i64, dy: i64, shape: DotShape, radius: u32) -> bool {
    let r = radius as i64;
    let d2 = dx * dx + dy * dy;
    if d2 > r * r {
        return false;
    }
    match shape {
        DotShape::Circle => true,
        DotShape::Pacman => !(dx > 0 && dy.abs() <= dx),
        DotShape::Donut => {
            let inner = r / 2;
            d2 > inner * inner
        }
        DotShape::None => false,
    }
}

/// Binary mask of a dot centered in a `width` x `height` frame.
pub fn render_mask(width: u32, height: u32, shape: DotShape, radius: u32) -> GrayImage {
    let (cx, cy) = (width as i64 / 2, height as i64 / 2);
    GrayImage::from_fn(width, height, |x, y| {
        if in_shape(x as i64 - cx, y as i64 - cy, shape, radius) {
            Luma([255])
        } else {
            Luma([0])
        }
    })
}

/// Painted dot on dark rubber.
pub fn render_dot(
    width: u32,
    height: u32,
    shape: DotShape,
    color: DotColor,
    radius: u32,
) -> RgbImage {
    let (cx, cy) = (width as i64 / 2, height as i64 / 2);
    let paint = color.rgb();
    RgbImage::from_fn(width, height, |x, y| {
        if in_shape(x as i64 - cx, y as i64 - cy, shape, radius) {
            paint
        } else {
            RUBBER
        }
    })
}

pub fn encode_jpeg(image: &RgbImage) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    DynamicImage::ImageRgb8(image.clone())
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Jpeg)
        .context("encode jpeg")?;
    Ok(bytes)
}

/// How the loopback camera answers a capture request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Reply {
    Frame,
    /// Valid frame with a damaged end marker.
    CorruptEnd,
    /// Only the first `n` bytes of the frame, then nothing.
    Truncated(usize),
    /// Never answer captures.
    Silent,
}

pub struct LoopbackCamera {
    jpeg: Vec<u8>,
    reply: Reply,
    noise: Vec<u8>,
}

impl LoopbackCamera {
    pub fn new(jpeg: Vec<u8>) -> Self {
        Self {
            jpeg,
            reply: Reply::Frame,
            noise: Vec::new(),
        }
    }

    pub fn with_reply(mut self, reply: Reply) -> Self {
        self.reply = reply;
        self
    }

    /// Bytes sent ahead of every frame (UART garbage, debug prints).
    pub fn with_noise(mut self, noise: Vec<u8>) -> Self {
        self.noise = noise;
        self
    }

    /// Bytes written in answer to `command`; `served` counts prior captures.
    pub fn response_to(&self, command: u8, served: u64) -> Vec<u8> {
        match command {
            CMD_CAPTURE => {
                let mut frame = encode_frame(&self.jpeg);
                match self.reply {
                    Reply::Frame => {}
                    Reply::CorruptEnd => {
                        let n = frame.len();
                        frame[n - FRAME_END.len()..].copy_from_slice(&[0, 0, 0, 0]);
                    }
                    Reply::Truncated(keep) => frame.truncate(keep),
                    Reply::Silent => return Vec::new(),
                }
                let mut out = self.noise.clone();
                out.extend(frame);
                out
            }
            CMD_STATUS => format!(
                "OK loopback jpeg_bytes={} captures={}\r\n",
                self.jpeg.len(),
                served
            )
            .into_bytes(),
            _ => Vec::new(),
        }
    }

    /// Answer commands until the peer disconnects. Returns captures answered.
    pub fn serve_connection(&self, mut stream: TcpStream) -> Result<u64> {
        stream.set_nodelay(true).context("set TCP_NODELAY")?;
        let mut served = 0u64;
        let mut command = [0u8; 1];
        loop {
            match stream.read(&mut command) {
                Ok(0) => break,
                Ok(_) => {}
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == std::io::ErrorKind::ConnectionReset => break,
                Err(e) => return Err(e).context("read command"),
            }
            let reply = self.response_to(command[0], served);
            if command[0] == CMD_CAPTURE {
                served += 1;
            }
            if reply.is_empty() {
                continue;
            }
            if let Err(e) = stream.write_all(&reply) {
                log::debug!("loopback peer went away: {}", e);
                break;
            }
        }
        Ok(served)
    }

    /// Accept one client and serve it to completion.
    pub fn serve_one(&self, listener: &TcpListener) -> Result<u64> {
        let (stream, peer) = listener.accept().context("accept camera client")?;
        log::info!("loopback camera client connected from {}", peer);
        self.serve_connection(stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::FrameDecoder;

    #[test]
    fn pacman_mask_misses_a_quarter() {
        let full = render_mask(64, 64, DotShape::Circle, 20);
        let bitten = render_mask(64, 64, DotShape::Pacman, 20);
        let count = |m: &GrayImage| m.pixels().filter(|p| p[0] > 0).count() as f64;
        let ratio = count(&bitten) / count(&full);
        assert!(ratio > 0.70 && ratio < 0.80, "ratio {}", ratio);
    }

    #[test]
    fn capture_reply_decodes_after_noise() {
        let camera = LoopbackCamera::new(b"jpeg".to_vec()).with_noise(b"boot\r\n".to_vec());
        let mut decoder = FrameDecoder::default();
        decoder.push(&camera.response_to(CMD_CAPTURE, 0));
        assert_eq!(decoder.next_frame().unwrap().payload, b"jpeg");
    }

    #[test]
    fn corrupt_end_reply_flags_marker() {
        let camera = LoopbackCamera::new(b"jpeg".to_vec()).with_reply(Reply::CorruptEnd);
        let mut decoder = FrameDecoder::default();
        decoder.push(&camera.response_to(CMD_CAPTURE, 0));
        assert!(!decoder.next_frame().unwrap().end_marker_ok);
    }

    #[test]
    fn status_reply_is_plain_text() {
        let camera = LoopbackCamera::new(vec![0; 10]);
        let text = String::from_utf8(camera.response_to(CMD_STATUS, 3)).unwrap();
        assert!(text.starts_with("OK loopback"));
        assert!(text.contains("captures=3"));
        assert!(camera.response_to(b'\n', 0).is_empty());
    }

    #[test]
    fn parses_shape_names() {
        assert_eq!("donut".parse::<DotShape>().unwrap(), DotShape::Donut);
        assert!("square".parse::<DotShape>().is_err());
    }
}
