//! Domain-specific error types for the screenbeam pipeline.
//!
//! All fallible operations return `Result<T, BeamError>`.
//! Per-cycle faults (capture glitches, undecodable frames) are absorbed
//! and reported by the engine loops; only start-up faults propagate.

use std::time::Duration;
use thiserror::Error;

/// The canonical error type for the screenbeam core.
#[derive(Debug, Error)]
pub enum BeamError {
    // ── Transport Errors ─────────────────────────────────────────
    /// The TCP/IO layer reported an error.
    #[error("connection error: {0}")]
    Connection(#[from] std::io::Error),

    /// An operation exceeded its deadline (connect timeout).
    #[error("timeout after {0:?}")]
    Timeout(Duration),

    // ── Framing Errors ───────────────────────────────────────────
    /// A length header announced a payload above the configured ceiling.
    #[error("payload too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    // ── Codec Errors ─────────────────────────────────────────────
    /// Compressing a frame failed.
    #[error("encode error: {0}")]
    Encode(String),

    /// A received payload could not be decoded into an image.
    #[error("decode error: {0}")]
    Decode(String),

    // ── Capture Errors ───────────────────────────────────────────
    /// The frame-source backend failed to produce a frame.
    #[error("capture error: {0}")]
    Capture(String),

    // ── Lifecycle Errors ─────────────────────────────────────────
    /// A session phase transition was attempted from the wrong state.
    #[error("invalid session transition: {0}")]
    InvalidTransition(&'static str),

    /// Catch-all for errors that do not fit another variant.
    #[error("{0}")]
    Other(String),
}

// ── Convenient From implementations ──────────────────────────────

impl From<String> for BeamError {
    fn from(s: String) -> Self {
        BeamError::Other(s)
    }
}

impl From<&str> for BeamError {
    fn from(s: &str) -> Self {
        BeamError::Other(s.to_string())
    }
}
