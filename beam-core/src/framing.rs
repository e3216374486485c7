//! Length-prefixed wire framing for the screen stream.
//!
//! ## Wire format
//!
//! One framed message per compressed frame:
//! ```text
//! length:   u32  (4 bytes, big-endian)
//! payload:  [u8] (exactly `length` bytes, opaque JPEG data)
//! ```
//!
//! No magic number, no version field, no checksum — both ends must agree
//! on the codec family carried in the payload.
//!
//! [`encode_frame`] produces the framed bytes for the sender;
//! [`FrameAssembler`] reassembles the receiver's continuous byte stream
//! into discrete payloads. One network read may carry several complete
//! messages, so callers drain [`try_extract`](FrameAssembler::try_extract)
//! in a loop until it yields `None`.

use bytes::{Buf, Bytes, BytesMut};

use crate::error::BeamError;

// ── Constants ────────────────────────────────────────────────────

/// Size of the length prefix on the wire.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Default ceiling on a single payload.
///
/// The protocol itself never bounds the announced length, so a buggy or
/// hostile peer could otherwise force unbounded buffering while the
/// receiver waits for bytes that never come. Anything above the ceiling
/// is treated as a corrupt stream.
pub const DEFAULT_MAX_PAYLOAD: usize = 64 * 1024 * 1024;

// ── Encoding ─────────────────────────────────────────────────────

/// Wrap `payload` into a framed message: 4-byte big-endian length
/// followed by the payload bytes.
///
/// Never fails for payloads representable in 32 bits.
pub fn encode_frame(payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(LENGTH_PREFIX_SIZE + payload.len());
    buf.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    buf.extend_from_slice(payload);
    buf.freeze()
}

// ── FrameAssembler ───────────────────────────────────────────────

/// Streaming decoder that turns a byte stream back into payloads.
///
/// After every extraction attempt the buffer holds either nothing or the
/// prefix of a message that has not yet fully arrived. Bytes are never
/// reordered; extraction always consumes from the front. The length
/// header is re-read from the buffer front on each call rather than
/// cached — O(1) and simpler than tracking partial-parse state.
#[derive(Debug)]
pub struct FrameAssembler {
    buf: BytesMut,
    max_payload: usize,
}

impl Default for FrameAssembler {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameAssembler {
    /// Create an assembler with the default payload ceiling.
    pub fn new() -> Self {
        Self::with_max_payload(DEFAULT_MAX_PAYLOAD)
    }

    /// Create an assembler with an explicit payload ceiling.
    pub fn with_max_payload(max_payload: usize) -> Self {
        Self {
            buf: BytesMut::new(),
            max_payload,
        }
    }

    /// Append bytes received from the network.
    pub fn feed(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Try to extract the next complete payload.
    ///
    /// Returns `Ok(None)` without mutating the buffer when the header or
    /// payload has not fully arrived. Returns
    /// [`BeamError::PayloadTooLarge`] when the header announces a length
    /// above the ceiling; the stream is unrecoverable at that point and
    /// the caller should tear the connection down.
    pub fn try_extract(&mut self) -> Result<Option<Bytes>, BeamError> {
        if self.buf.len() < LENGTH_PREFIX_SIZE {
            return Ok(None);
        }

        let len_bytes: [u8; LENGTH_PREFIX_SIZE] = self.buf[..LENGTH_PREFIX_SIZE]
            .try_into()
            .map_err(|_| BeamError::Other("length prefix slice".into()))?;
        let payload_len = u32::from_be_bytes(len_bytes) as usize;

        if payload_len > self.max_payload {
            return Err(BeamError::PayloadTooLarge {
                size: payload_len,
                max: self.max_payload,
            });
        }

        if self.buf.len() < LENGTH_PREFIX_SIZE + payload_len {
            return Ok(None);
        }

        self.buf.advance(LENGTH_PREFIX_SIZE);
        Ok(Some(self.buf.split_to(payload_len).freeze()))
    }

    /// Bytes currently buffered and not yet extracted.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Drop all buffered bytes (connection teardown).
    pub fn clear(&mut self) {
        self.buf.clear();
    }
}

// ── Tests ────────────────────────────────────────────────────────
