//! Shared types for the capture/stream pipeline.
//!
//! [`Frame`] is the in-memory raster passed between pipeline stages; it is
//! transient and carries no identity beyond its position in the stream. The
//! *wire* representation is an opaque JPEG byte string produced by
//! [`crate::codec::JpegCodec`].

// ── Frame ────────────────────────────────────────────────────────

/// An uncompressed 3-channel image as produced by a frame source or
/// reconstructed by the codec adapter.
///
/// `data` holds `height` rows of `width * 3` bytes each (RGB8, tightly
/// packed, no row padding).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Raw pixel data — `width * height * 3` bytes.
    pub data: Vec<u8>,
}

impl Frame {
    /// Bytes consumed by a single pixel.
    pub const BYTES_PER_PIXEL: usize = 3;

    /// Allocate a zeroed frame of the given dimensions.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0; width as usize * height as usize * Self::BYTES_PER_PIXEL],
        }
    }

    /// Total byte size of the raster.
    pub fn byte_len(&self) -> usize {
        self.data.len()
    }

    /// Returns the pixel bytes at `(x, y)`.
    ///
    /// # Panics
    ///
    /// Panics if `(x, y)` is out of bounds.
    pub fn pixel(&self, x: u32, y: u32) -> &[u8] {
        let offset =
            (y as usize * self.width as usize + x as usize) * Self::BYTES_PER_PIXEL;
        &self.data[offset..offset + Self::BYTES_PER_PIXEL]
    }
}

// ── MonitorRegion ────────────────────────────────────────────────

/// A capturable screen region advertised by a frame source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorRegion {
    /// Left edge in virtual-desktop coordinates.
    pub left: i32,
    /// Top edge in virtual-desktop coordinates.
    pub top: i32,
    /// Region width in pixels.
    pub width: u32,
    /// Region height in pixels.
    pub height: u32,
}
