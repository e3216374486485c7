//! JPEG codec adapter for the stream pipeline.
//!
//! Sits at the opaque compress/decompress boundary: raster in, bytes out.
//! Scaling (when the scale knob is below 1.0) happens *before* compression
//! using linear interpolation, so quality and scale trade off
//! independently of each other and of the frame rate.

use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::RgbImage;

use crate::error::BeamError;
use crate::frame::Frame;

// ── JpegCodec ────────────────────────────────────────────────────

/// Compresses frames for network transmission.
///
/// Quality and scale are runtime-tunable; both setters clamp to the
/// protocol ranges (quality 1..=100, scale 0.1..=1.0) so a wild value
/// from a UI slider can never produce a zero-sized or absurd frame.
#[derive(Debug, Clone)]
pub struct JpegCodec {
    quality: u8,
    scale: f32,
}

impl JpegCodec {
    /// Create a codec with the given quality and scale (clamped).
    pub fn new(quality: u8, scale: f32) -> Self {
        let mut codec = Self {
            quality: 50,
            scale: 1.0,
        };
        codec.set_quality(quality);
        codec.set_scale(scale);
        codec
    }

    /// Update the compression quality (clamped to 1..=100).
    pub fn set_quality(&mut self, quality: u8) {
        self.quality = quality.clamp(1, 100);
    }

    /// Update the scale factor (clamped to 0.1..=1.0).
    pub fn set_scale(&mut self, scale: f32) {
        self.scale = scale.clamp(0.1, 1.0);
    }

    /// Current compression quality.
    pub fn quality(&self) -> u8 {
        self.quality
    }

    /// Current scale factor.
    pub fn scale(&self) -> f32 {
        self.scale
    }

    /// Compress a frame into a JPEG byte string.
    pub fn compress(&self, frame: &Frame) -> Result<Vec<u8>, BeamError> {
        let img = RgbImage::from_raw(frame.width, frame.height, frame.data.clone())
            .ok_or_else(|| {
                BeamError::Encode(format!(
                    "raster size mismatch: {}x{} with {} bytes",
                    frame.width,
                    frame.height,
                    frame.data.len()
                ))
            })?;

        let img = if (self.scale - 1.0).abs() > f32::EPSILON {
            let width = ((frame.width as f32 * self.scale) as u32).max(1);
            let height = ((frame.height as f32 * self.scale) as u32).max(1);
            imageops::resize(&img, width, height, FilterType::Triangle)
        } else {
            img
        };

        let mut out = Vec::new();
        let mut encoder = JpegEncoder::new_with_quality(&mut out, self.quality);
        encoder
            .encode(img.as_raw(), img.width(), img.height(), image::ColorType::Rgb8)
            .map_err(|e| BeamError::Encode(e.to_string()))?;

        Ok(out)
    }
}

impl Default for JpegCodec {
    fn default() -> Self {
        Self::new(50, 1.0)
    }
}

// ── Decompression ────────────────────────────────────────────────

/// Decode a JPEG byte string back into a [`Frame`].
///
/// A corrupt or truncated payload is a [`BeamError::Decode`]; framing
/// state is unaffected (the bytes were already consumed as a complete
/// message), so the caller drops this one frame and keeps parsing.
pub fn decompress(data: &[u8]) -> Result<Frame, BeamError> {
    let img = image::load_from_memory_with_format(data, image::ImageFormat::Jpeg)
        .map_err(|e| BeamError::Decode(e.to_string()))?
        .into_rgb8();

    Ok(Frame {
        width: img.width(),
        height: img.height(),
        data: img.into_raw(),
    })
}

// ── Tests ────────────────────────────────────────────────────────
