//! # beam-core
//!
//! Core library for screenbeam: a TCP screen-streaming pipeline that
//! fans captured frames out from one producer to N concurrently
//! connected consumers, with runtime-tunable quality, frame rate, and
//! scale.
//!
//! ```text
//! SENDER                                      RECEIVER
//! ┌──────────────────────────┐                ┌───────────────────────┐
//! │ FrameSource              │                │ FrameAssembler        │
//! │   ↓                      │                │   ↓                   │
//! │ JpegCodec (quality/scale)│     TCP        │ codec::decompress     │
//! │   ↓                      │ ──────────►    │   ↓                   │
//! │ framing::encode_frame    │  (per client)  │ latest-frame slot     │
//! │   ↓                      │                │ (watch channel)       │
//! │ StreamServer fan-out     │                │ StreamClient          │
//! └──────────────────────────┘                └───────────────────────┘
//! ```
//!
//! | Module    | Purpose                                             |
//! |-----------|-----------------------------------------------------|
//! | `frame`   | In-memory raster and monitor-region types           |
//! | `framing` | Length-prefixed wire framing + stream reassembly    |
//! | `codec`   | JPEG compress/decompress adapter                    |
//! | `capture` | Frame-source boundary trait + synthetic backend     |
//! | `server`  | Broadcast engine, acceptor, client registry         |
//! | `client`  | Stream receiver with latest-wins frame slot         |
//! | `session` | Shared start/stop lifecycle state machine           |
//! | `event`   | Outbound observer event channels                    |
//! | `error`   | `BeamError` — typed, `thiserror`-based errors       |

pub mod capture;
pub mod client;
pub mod codec;
pub mod error;
pub mod event;
pub mod frame;
pub mod framing;
pub mod server;
pub mod session;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use capture::{FrameSource, SyntheticSource};
pub use client::{StreamClient, CONNECT_TIMEOUT};
pub use codec::{decompress, JpegCodec};
pub use error::BeamError;
pub use event::{ClientEvent, Outbox, ServerEvent};
pub use frame::{Frame, MonitorRegion};
pub use framing::{encode_frame, FrameAssembler, DEFAULT_MAX_PAYLOAD, LENGTH_PREFIX_SIZE};
pub use server::{local_ip, ServerConfig, StreamServer, StreamSettings};
pub use session::{SessionPhase, SharedPhase};
