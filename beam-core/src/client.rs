//! Stream receiver — one TCP connection, one read loop.
//!
//! [`StreamClient`] connects to a broadcast server, reassembles the byte
//! stream into framed payloads, decodes them, and publishes the newest
//! frame through a `tokio::sync::watch` channel. Consumers always see a
//! complete, possibly-stale snapshot (latest-wins) and never block the
//! read loop; older undelivered frames are silently dropped.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch, Notify};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::codec;
use crate::error::BeamError;
use crate::event::{ClientEvent, Outbox};
use crate::frame::Frame;
use crate::framing::FrameAssembler;
use crate::session::{SessionPhase, SharedPhase};

// ── Constants ────────────────────────────────────────────────────

/// Bounded connect timeout — fail fast on unreachable hosts.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Maximum bytes pulled from the socket per read.
const RECV_CHUNK: usize = 64 * 1024;

/// Width of the frame-rate estimation window.
const RATE_WINDOW: Duration = Duration::from_secs(1);

// ── StreamClient ─────────────────────────────────────────────────

/// TCP client that receives the screen stream from one server.
///
/// The steady-state read has no timeout; an explicit
/// [`disconnect`](Self::disconnect) (or the peer closing) unblocks it.
/// Faults are reported, never retried — reconnection is the caller's
/// responsibility.
pub struct StreamClient {
    host: String,
    port: u16,
    running: Arc<AtomicBool>,
    phase: Arc<SharedPhase>,
    shutdown: Arc<Notify>,
    frame_tx: watch::Sender<Option<Frame>>,
    frame_rx: watch::Receiver<Option<Frame>>,
    frame_rate: Arc<AtomicU32>,
    events: Outbox<ClientEvent>,
}

impl StreamClient {
    /// Create a client targeting `host:port` and the event receiver
    /// observers listen on.
    pub fn new(
        host: impl Into<String>,
        port: u16,
    ) -> (Self, mpsc::UnboundedReceiver<ClientEvent>) {
        let (events, event_rx) = Outbox::channel();
        let (frame_tx, frame_rx) = watch::channel(None);
        let client = Self {
            host: host.into(),
            port,
            running: Arc::new(AtomicBool::new(false)),
            phase: Arc::new(SharedPhase::new()),
            shutdown: Arc::new(Notify::new()),
            frame_tx,
            frame_rx,
            frame_rate: Arc::new(AtomicU32::new(0)),
            events,
        };
        (client, event_rx)
    }

    /// A receiver for the Current Frame Slot.
    ///
    /// `borrow()` yields the most recently decoded frame (or `None`
    /// before the first one); `changed().await` wakes on new frames.
    pub fn frame_slot(&self) -> watch::Receiver<Option<Frame>> {
        self.frame_rx.clone()
    }

    /// Frames completed in the last full one-second window.
    pub fn frame_rate(&self) -> u32 {
        self.frame_rate.load(Ordering::SeqCst)
    }

    /// Whether the receive loop is currently up.
    pub fn is_connected(&self) -> bool {
        self.phase.is_running()
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> SessionPhase {
        self.phase.get()
    }

    /// Connect to the server and spawn the receive loop.
    ///
    /// Uses a bounded connect timeout ([`CONNECT_TIMEOUT`]); once
    /// established, the steady-state read has no timeout and relies on
    /// [`disconnect`](Self::disconnect) or peer close to unblock.
    pub async fn connect(&self) -> Result<(), BeamError> {
        self.phase.begin_start()?;

        let stream = match timeout(
            CONNECT_TIMEOUT,
            TcpStream::connect((self.host.as_str(), self.port)),
        )
        .await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                self.phase.force_idle();
                self.events
                    .send(ClientEvent::Error(format!("connection failed: {e}")));
                return Err(e.into());
            }
            Err(_) => {
                self.phase.force_idle();
                self.events
                    .send(ClientEvent::Error("connection timed out".into()));
                return Err(BeamError::Timeout(CONNECT_TIMEOUT));
            }
        };

        if let Err(e) = stream.set_nodelay(true) {
            debug!("set_nodelay failed: {e}");
        }

        self.running.store(true, Ordering::SeqCst);

        tokio::spawn(receive_loop(
            stream,
            self.frame_tx.clone(),
            Arc::clone(&self.frame_rate),
            Arc::clone(&self.running),
            Arc::clone(&self.phase),
            Arc::clone(&self.shutdown),
            self.events.clone(),
        ));

        self.phase.mark_running()?;
        info!(host = %self.host, port = self.port, "connected");
        self.events.send(ClientEvent::Status(format!(
            "connected to {}:{}",
            self.host, self.port
        )));
        Ok(())
    }

    /// Disconnect from the server.
    ///
    /// Re-entrant-safe: disconnecting an already-disconnected client is
    /// a no-op. Unblocks a pending read so teardown completes promptly.
    pub fn disconnect(&self) {
        if !self.phase.begin_stop() {
            return;
        }
        self.running.store(false, Ordering::SeqCst);
        // notify_one stores a permit, so the wakeup is not lost even if
        // the read loop is between awaits right now.
        self.shutdown.notify_one();
    }
}

// ── Receive loop ─────────────────────────────────────────────────

/// Read chunks, reassemble framed payloads, decode, publish.
///
/// Exits on explicit shutdown, a clean peer close (zero-byte read), a
/// read fault, or an over-ceiling length header (corrupt stream). All
/// exit paths funnel into the same teardown.
async fn receive_loop(
    mut stream: TcpStream,
    frame_tx: watch::Sender<Option<Frame>>,
    frame_rate: Arc<AtomicU32>,
    running: Arc<AtomicBool>,
    phase: Arc<SharedPhase>,
    shutdown: Arc<Notify>,
    events: Outbox<ClientEvent>,
) {
    let mut assembler = FrameAssembler::new();
    let mut chunk = vec![0u8; RECV_CHUNK];
    let mut window_count: u32 = 0;
    let mut window_start = Instant::now();

    'read: while running.load(Ordering::SeqCst) {
        let n = tokio::select! {
            _ = shutdown.notified() => break 'read,
            result = stream.read(&mut chunk) => match result {
                Ok(0) => {
                    // Peer closed the connection cleanly.
                    info!("server closed connection");
                    events.send(ClientEvent::Status("server closed connection".into()));
                    break 'read;
                }
                Ok(n) => n,
                Err(e) => {
                    if running.load(Ordering::SeqCst) {
                        warn!("receive error: {e}");
                        events.send(ClientEvent::Error(format!("receive error: {e}")));
                    }
                    break 'read;
                }
            },
        };

        assembler.feed(&chunk[..n]);

        // One read may carry several complete messages.
        loop {
            match assembler.try_extract() {
                Ok(Some(payload)) => match codec::decompress(&payload) {
                    Ok(frame) => {
                        frame_tx.send_replace(Some(frame));
                        window_count += 1;
                        if window_start.elapsed() >= RATE_WINDOW {
                            frame_rate.store(window_count, Ordering::SeqCst);
                            window_count = 0;
                            window_start = Instant::now();
                        }
                    }
                    Err(e) => {
                        // The message was framed correctly; only the image
                        // reconstruction failed. Drop it and keep parsing.
                        warn!("frame decode failed: {e}");
                        events.send(ClientEvent::Error(format!("frame decode failed: {e}")));
                    }
                },
                Ok(None) => break,
                Err(e) => {
                    warn!("framing error: {e}");
                    events.send(ClientEvent::Error(format!("framing error: {e}")));
                    break 'read;
                }
            }
        }
    }

    // Teardown — shared by every exit path.
    running.store(false, Ordering::SeqCst);
    let _ = stream.shutdown().await;
    assembler.clear();
    phase.force_idle();
    info!("disconnected");
    events.send(ClientEvent::Status("disconnected".into()));
    events.send(ClientEvent::Disconnected);
}
