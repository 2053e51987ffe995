use std::time::{Duration, Instant};

use super::{ByteLink, TransportError};

pub const FRAME_START: [u8; 4] = [0xFF, 0xAA, 0x55, 0xBB];
pub const FRAME_END: [u8; 4] = [0xFF, 0xBB, 0x55, 0xAA];
/// Start marker plus the little-endian length field.
pub const HEADER_LEN: usize = 8;
pub const TRAILER_LEN: usize = 4;
/// Largest payload accepted from a length field (a UXGA JPEG stays well below).
pub const DEFAULT_MAX_FRAME_BYTES: usize = 5 * 1024 * 1024;

/// Upper bound on a single blocking read, so the deadline is re-checked often.
const READ_SLICE: Duration = Duration::from_millis(20);
const READ_CHUNK: usize = 8192;

/// One complete frame taken off the wire.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    pub payload: Vec<u8>,
    /// False when the four bytes after the payload were not `FRAME_END`.
    /// The payload is still delivered in that case.
    pub end_marker_ok: bool,
}

impl Frame {
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

/// Incremental frame parser.
///
/// Bytes are pushed as they arrive; `next_frame` yields a frame once the
/// header, payload and trailer are all buffered. Anything before a start
/// marker is discarded and never re-parsed.
#[derive(Debug)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
    synced: bool,
    max_frame_bytes: usize,
}

impl FrameDecoder {
    pub fn new(max_frame_bytes: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(64 * 1024),
            synced: false,
            max_frame_bytes,
        }
    }

    /// Drop all buffered bytes and start scanning for a fresh start marker.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.synced = false;
    }

    pub fn push(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Bytes currently held (after any resynchronization).
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn next_frame(&mut self) -> Option<Frame> {
        loop {
            if !self.synced {
                match find_marker(&self.buffer, &FRAME_START) {
                    Some(idx) => {
                        if idx > 0 {
                            log::debug!("discarding {} bytes ahead of start marker", idx);
                        }
                        self.buffer.drain(..idx);
                        self.synced = true;
                    }
                    None => {
                        // Keep a tail that may be the first bytes of a split marker.
                        let keep = (FRAME_START.len() - 1).min(self.buffer.len());
                        let drop_len = self.buffer.len() - keep;
                        self.buffer.drain(..drop_len);
                        return None;
                    }
                }
            }

            if self.buffer.len() < HEADER_LEN {
                return None;
            }

            let declared = u32::from_le_bytes([
                self.buffer[4],
                self.buffer[5],
                self.buffer[6],
                self.buffer[7],
            ]) as usize;
            if declared > self.max_frame_bytes {
                log::warn!(
                    "frame header declares {} bytes (max {}); resynchronizing",
                    declared,
                    self.max_frame_bytes
                );
                self.buffer.drain(..FRAME_START.len());
                self.synced = false;
                continue;
            }

            let total = HEADER_LEN + declared + TRAILER_LEN;
            if self.buffer.len() < total {
                return None;
            }

            let payload = self.buffer[HEADER_LEN..HEADER_LEN + declared].to_vec();
            let end_marker_ok = self.buffer[HEADER_LEN + declared..total] == FRAME_END;
            if !end_marker_ok {
                log::warn!(
                    "end marker mismatch after {} byte payload; keeping payload",
                    declared
                );
            }
            self.buffer.drain(..total);
            self.synced = false;
            return Some(Frame {
                payload,
                end_marker_ok,
            });
        }
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_BYTES)
    }
}

/// Build the wire representation of a payload.
pub fn encode_frame(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_LEN + payload.len() + TRAILER_LEN);
    out.extend_from_slice(&FRAME_START);
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(payload);
    out.extend_from_slice(&FRAME_END);
    out
}

/// Read exactly one frame from `link`, giving up once `timeout` has elapsed.
///
/// The decoder is reset first, so a call after a timeout starts a fresh scan.
/// A timeout never yields a partial payload.
pub fn read_frame(
    link: &mut dyn ByteLink,
    decoder: &mut FrameDecoder,
    timeout: Duration,
) -> Result<Frame, TransportError> {
    decoder.reset();
    let started = Instant::now();
    let deadline = started + timeout;
    let mut chunk = vec![0u8; READ_CHUNK];
    loop {
        if let Some(frame) = decoder.next_frame() {
            return Ok(frame);
        }
        let now = Instant::now();
        if now >= deadline {
            return Err(TransportError::Timeout {
                waited: now.duration_since(started),
                buffered: decoder.buffered(),
            });
        }
        let wait = (deadline - now).min(READ_SLICE);
        let read = link.read_available(&mut chunk, wait)?;
        decoder.push(&chunk[..read]);
    }
}

fn find_marker(haystack: &[u8], marker: &[u8; 4]) -> Option<usize> {
    haystack
        .windows(marker.len())
        .position(|window| window == marker)
}
