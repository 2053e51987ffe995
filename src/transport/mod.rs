//! Byte transport between the rig and the camera.
//!
//! The camera answers a capture command with one length-delimited frame:
//!
//! ```text
//! FF AA 55 BB | u32 LE length | <length> bytes JPEG | FF BB 55 AA
//! ```
//!
//! `codec` turns an incrementally fed byte buffer into frames, `link`
//! provides the byte sources (serial tty, TCP bridge) the codec reads from.

mod codec;
mod link;

pub use codec::{
    encode_frame, read_frame, Frame, FrameDecoder, DEFAULT_MAX_FRAME_BYTES, FRAME_END,
    FRAME_START, HEADER_LEN, TRAILER_LEN,
};
pub use link::{open_link, ByteLink, TcpLink};
#[cfg(target_os = "linux")]
pub use link::SerialLink;

use std::time::Duration;

/// Failure while pulling one frame off a link.
#[derive(Debug)]
pub enum TransportError {
    /// No complete frame was assembled before the deadline.
    Timeout {
        waited: Duration,
        buffered: usize,
    },
    /// The link itself failed (closed, unplugged, permission revoked).
    Io(std::io::Error),
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportError::Timeout { waited, buffered } => write!(
                f,
                "no complete frame within {}ms ({} bytes buffered)",
                waited.as_millis(),
                buffered
            ),
            TransportError::Io(e) => write!(f, "link error: {}", e),
        }
    }
}

impl std::error::Error for TransportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TransportError::Io(e) => Some(e),
            TransportError::Timeout { .. } => None,
        }
    }
}

impl From<std::io::Error> for TransportError {
    fn from(e: std::io::Error) -> Self {
        TransportError::Io(e)
    }
}
