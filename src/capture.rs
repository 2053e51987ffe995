//! Capture client for the ESP32-CAM command protocol.
//!
//! One request at a time: `C` asks for a framed JPEG, `S` for a short
//! free-form status line. Link failures are fatal to the client instance and
//! degrade it to "camera unavailable"; timeouts are not.

use anyhow::{anyhow, Result};
use std::time::{Duration, Instant};

use crate::config::CaptureSettings;
use crate::transport::{self, open_link, ByteLink, Frame, FrameDecoder, TransportError};

pub const CMD_CAPTURE: u8 = b'C';
pub const CMD_STATUS: u8 = b'S';

/// Longest status reply kept; anything beyond is left unread.
const STATUS_MAX_BYTES: usize = 4096;

#[derive(Debug)]
pub enum CaptureError {
    /// No complete frame before the per-capture deadline. The client stays usable.
    Timeout { waited: Duration, buffered: usize },
    /// The link is gone or was never opened.
    DeviceUnavailable(String),
}

impl std::fmt::Display for CaptureError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CaptureError::Timeout { waited, buffered } => write!(
                f,
                "capture timed out after {}ms ({} bytes received)",
                waited.as_millis(),
                buffered
            ),
            CaptureError::DeviceUnavailable(reason) => {
                write!(f, "camera unavailable: {}", reason)
            }
        }
    }
}

impl std::error::Error for CaptureError {}

/// The part of a camera the scheduler needs.
pub trait Camera {
    fn is_available(&self) -> bool;

    fn capture(&mut self) -> Result<Frame, CaptureError>;
}

/// Counters for one client instance.
#[derive(Clone, Debug, Default)]
pub struct CaptureStats {
    pub frames_captured: u64,
    pub timeouts: u64,
    pub end_marker_mismatches: u64,
    pub bytes_received: u64,
}

pub struct CaptureClient {
    link: Option<Box<dyn ByteLink>>,
    decoder: FrameDecoder,
    settings: CaptureSettings,
    unavailable: Option<String>,
    stats: CaptureStats,
}

impl CaptureClient {
    /// Open the configured device, or fail.
    pub fn open(settings: &CaptureSettings) -> Result<Self> {
        let link = open_link(&settings.device, settings.baud)?;
        log::info!("opened camera link {}", link.describe());
        let mut client = Self::with_link(link, settings);
        // The ESP32 resets when the port opens; let it boot, then drop the boot log.
        std::thread::sleep(settings.settle_delay);
        client.discard_input().map_err(|e| anyhow!("{}", e))?;
        Ok(client)
    }

    /// Open the configured device, degrading to an unavailable client on failure.
    pub fn connect(settings: &CaptureSettings) -> Self {
        match Self::open(settings) {
            Ok(client) => client,
            Err(e) => {
                let reason = format!("{:#}", e);
                log::error!("could not connect to camera {}: {}", settings.device, reason);
                Self::unavailable(settings, reason)
            }
        }
    }

    /// Wrap an already-open link.
    pub fn with_link(link: Box<dyn ByteLink>, settings: &CaptureSettings) -> Self {
        Self {
            link: Some(link),
            decoder: FrameDecoder::new(settings.max_frame_bytes),
            settings: settings.clone(),
            unavailable: None,
            stats: CaptureStats::default(),
        }
    }

    /// A client with no device behind it; every capture is refused.
    pub fn unavailable(settings: &CaptureSettings, reason: impl Into<String>) -> Self {
        Self {
            link: None,
            decoder: FrameDecoder::new(settings.max_frame_bytes),
            settings: settings.clone(),
            unavailable: Some(reason.into()),
            stats: CaptureStats::default(),
        }
    }

    pub fn is_available(&self) -> bool {
        self.link.is_some()
    }

    pub fn unavailable_reason(&self) -> Option<&str> {
        self.unavailable.as_deref()
    }

    pub fn describe(&self) -> String {
        match &self.link {
            Some(link) => link.describe(),
            None => format!("{} (unavailable)", self.settings.device),
        }
    }

    pub fn stats(&self) -> CaptureStats {
        self.stats.clone()
    }

    /// Request one still and wait for its frame.
    pub fn capture(&mut self) -> Result<Frame, CaptureError> {
        self.discard_input()?;
        self.send(CMD_CAPTURE)?;

        let timeout = self.settings.capture_timeout;
        let Some(link) = self.link.as_mut() else {
            return Err(CaptureError::DeviceUnavailable(
                self.unavailable.clone().unwrap_or_default(),
            ));
        };
        let result = transport::read_frame(link.as_mut(), &mut self.decoder, timeout);
        match result {
            Ok(frame) => {
                self.stats.frames_captured += 1;
                self.stats.bytes_received += frame.len() as u64;
                if !frame.end_marker_ok {
                    self.stats.end_marker_mismatches += 1;
                }
                log::debug!("captured {} byte frame", frame.len());
                Ok(frame)
            }
            Err(TransportError::Timeout { waited, buffered }) => {
                self.stats.timeouts += 1;
                log::warn!("capture timed out ({} bytes buffered)", buffered);
                Err(CaptureError::Timeout { waited, buffered })
            }
            Err(TransportError::Io(e)) => Err(self.mark_unavailable(format!("read failed: {}", e))),
        }
    }

    /// Ask the camera for its status line. Diagnostic only; waits a fixed time.
    ///
    /// The reply is collected for at most one more `status_wait` and capped at
    /// `STATUS_MAX_BYTES`, so a camera that never goes quiet cannot stall the caller.
    pub fn status(&mut self) -> Result<String, CaptureError> {
        self.discard_input()?;
        self.send(CMD_STATUS)?;
        std::thread::sleep(self.settings.status_wait);

        let deadline = Instant::now() + self.settings.status_wait;
        let mut text = Vec::new();
        let mut chunk = [0u8; 1024];
        while text.len() < STATUS_MAX_BYTES {
            let link = self.link_mut()?;
            match link.read_available(&mut chunk, Duration::from_millis(1)) {
                Ok(0) => break,
                Ok(n) => text.extend_from_slice(&chunk[..n]),
                Err(e) => return Err(self.mark_unavailable(format!("read failed: {}", e))),
            }
            if Instant::now() >= deadline {
                break;
            }
        }
        text.truncate(STATUS_MAX_BYTES);
        Ok(String::from_utf8_lossy(&text).trim().to_string())
    }

    /// Close the link. Further captures report the device unavailable.
    pub fn close(&mut self) {
        if let Some(link) = self.link.take() {
            log::info!("closing camera link {}", link.describe());
            self.unavailable = Some("link closed".to_string());
        }
    }

    fn send(&mut self, command: u8) -> Result<(), CaptureError> {
        let link = self.link_mut()?;
        if let Err(e) = link.write_all(&[command]) {
            return Err(self.mark_unavailable(format!("write failed: {}", e)));
        }
        Ok(())
    }

    fn discard_input(&mut self) -> Result<(), CaptureError> {
        let link = self.link_mut()?;
        if let Err(e) = link.discard_input() {
            return Err(self.mark_unavailable(format!("flush failed: {}", e)));
        }
        Ok(())
    }

    fn link_mut(&mut self) -> Result<&mut Box<dyn ByteLink>, CaptureError> {
        let reason = self.unavailable.clone();
        self.link
            .as_mut()
            .ok_or_else(|| CaptureError::DeviceUnavailable(reason.unwrap_or_default()))
    }

    fn mark_unavailable(&mut self, reason: String) -> CaptureError {
        log::error!("camera link failed, disabling captures: {}", reason);
        self.link = None;
        self.unavailable = Some(reason.clone());
        CaptureError::DeviceUnavailable(reason)
    }
}

impl Camera for CaptureClient {
    fn is_available(&self) -> bool {
        CaptureClient::is_available(self)
    }

    fn capture(&mut self) -> Result<Frame, CaptureError> {
        CaptureClient::capture(self)
    }
}

impl Drop for CaptureClient {
    fn drop(&mut self) {
        self.close();
    }
}
