//! Frame-source boundary for the broadcast engine.
//!
//! The engine owns exactly one [`FrameSource`] instance for its lifetime;
//! the backend is chosen once at startup and is otherwise opaque to the
//! core. OS capture backends (DXGI, CoreGraphics, X11, …) live outside
//! this crate and plug in through the trait. [`SyntheticSource`] ships
//! in-tree for demos and tests.

use crate::error::BeamError;
use crate::frame::{Frame, MonitorRegion};

// ── FrameSource ──────────────────────────────────────────────────

/// A backend that produces one raw frame per invocation.
pub trait FrameSource: Send {
    /// Capture a single frame.
    ///
    /// A failure here is treated as a transient glitch by the broadcast
    /// engine: reported, then the next cycle tries again.
    fn capture(&mut self) -> Result<Frame, BeamError>;

    /// Capturable regions this backend can see.
    fn monitors(&self) -> Vec<MonitorRegion>;

    /// Release backend resources. Called once when the engine stops.
    fn close(&mut self) {}
}

// ── SyntheticSource ──────────────────────────────────────────────

/// Deterministic moving-gradient source.
///
/// Each captured frame shifts the gradient by one pixel, so consecutive
/// frames differ and an end-to-end test can tell frames apart.
pub struct SyntheticSource {
    width: u32,
    height: u32,
    tick: u64,
}

impl SyntheticSource {
    /// Create a source producing `width` × `height` frames.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            tick: 0,
        }
    }

    /// Number of frames captured so far.
    pub fn tick(&self) -> u64 {
        self.tick
    }
}

impl FrameSource for SyntheticSource {
    fn capture(&mut self) -> Result<Frame, BeamError> {
        let mut frame = Frame::new(self.width, self.height);
        let shift = self.tick as u32;
        for y in 0..self.height {
            for x in 0..self.width {
                let i = (y as usize * self.width as usize + x as usize) * 3;
                frame.data[i] = ((x + shift) % 256) as u8;
                frame.data[i + 1] = ((y + shift) % 256) as u8;
                frame.data[i + 2] = ((x ^ y) % 256) as u8;
            }
        }
        self.tick += 1;
        Ok(frame)
    }

    fn monitors(&self) -> Vec<MonitorRegion> {
        vec![MonitorRegion {
            left: 0,
            top: 0,
            width: self.width,
            height: self.height,
        }]
    }
}

// ── Tests ────────────────────────────────────────────────────────
