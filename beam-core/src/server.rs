//! Broadcast engine and connection acceptor.
//!
//! [`StreamServer`] owns the capture → compress → frame → fan-out loop
//! and the live client registry. The acceptor runs concurrently on the
//! same listener and inserts new connections into the registry; the
//! broadcast loop evicts dead ones. A slow or dead client never stalls
//! delivery to the others, and frames are never queued to "catch up" —
//! the engine always broadcasts the most current capture.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::capture::FrameSource;
use crate::codec::JpegCodec;
use crate::error::BeamError;
use crate::event::{Outbox, ServerEvent};
use crate::framing;
use crate::session::{SessionPhase, SharedPhase};

// ── Constants ────────────────────────────────────────────────────

/// How long the acceptor waits on `accept` before re-checking the
/// running flag. Bounds observable shutdown latency.
const ACCEPT_POLL: Duration = Duration::from_secs(1);

// ── ServerConfig ─────────────────────────────────────────────────

/// Startup configuration for [`StreamServer`].
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to (`0.0.0.0` for all interfaces).
    pub bind_addr: IpAddr,
    /// TCP port to listen on (0 = OS-assigned).
    pub port: u16,
    /// Initial JPEG quality (1..=100).
    pub quality: u8,
    /// Initial target frames per second (1..=60).
    pub fps: u32,
    /// Initial scale factor (0.1..=1.0).
    pub scale: f32,
    /// Monitor index the caller resolves against the backend's monitor
    /// list when choosing what to capture (0 = primary).
    pub monitor: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 9999,
            quality: 50,
            fps: 30,
            scale: 1.0,
            monitor: 0,
        }
    }
}

// ── StreamSettings ───────────────────────────────────────────────

/// Runtime-tunable stream parameters.
///
/// Stored as atomic scalars so setters from any task take effect on the
/// next broadcast cycle without restarting the loop. All setters clamp
/// to the protocol ranges.
#[derive(Debug)]
pub struct StreamSettings {
    fps: AtomicU32,
    quality: AtomicU32,
    scale_bits: AtomicU32,
}

impl StreamSettings {
    fn new(quality: u8, fps: u32, scale: f32) -> Self {
        let settings = Self {
            fps: AtomicU32::new(30),
            quality: AtomicU32::new(50),
            scale_bits: AtomicU32::new(1.0f32.to_bits()),
        };
        settings.set_quality(quality as u32);
        settings.set_fps(fps);
        settings.set_scale(scale);
        settings
    }

    /// Update the target frame rate (clamped to 1..=60).
    pub fn set_fps(&self, fps: u32) {
        self.fps.store(fps.clamp(1, 60), Ordering::SeqCst);
    }

    /// Current target frame rate.
    pub fn fps(&self) -> u32 {
        self.fps.load(Ordering::SeqCst)
    }

    /// Update the JPEG quality (clamped to 1..=100).
    pub fn set_quality(&self, quality: u32) {
        self.quality.store(quality.clamp(1, 100), Ordering::SeqCst);
    }

    /// Current JPEG quality.
    pub fn quality(&self) -> u8 {
        self.quality.load(Ordering::SeqCst) as u8
    }

    /// Update the scale factor (clamped to 0.1..=1.0).
    pub fn set_scale(&self, scale: f32) {
        self.scale_bits
            .store(scale.clamp(0.1, 1.0).to_bits(), Ordering::SeqCst);
    }

    /// Current scale factor.
    pub fn scale(&self) -> f32 {
        f32::from_bits(self.scale_bits.load(Ordering::SeqCst))
    }
}

// ── Client registry ──────────────────────────────────────────────

/// One live outbound connection in the registry.
struct ClientHandle {
    addr: SocketAddr,
    stream: TcpStream,
}

type Registry = Arc<Mutex<Vec<ClientHandle>>>;

// ── StreamServer ─────────────────────────────────────────────────

/// TCP server that streams captured frames to every connected client.
///
/// `start` binds the listener and spawns the accept and broadcast loops
/// as independent tasks; `stop` is cooperative and re-entrant-safe.
pub struct StreamServer {
    config: ServerConfig,
    settings: Arc<StreamSettings>,
    clients: Registry,
    client_count: Arc<AtomicUsize>,
    running: Arc<AtomicBool>,
    phase: Arc<SharedPhase>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    events: Outbox<ServerEvent>,
}

impl StreamServer {
    /// Create a server and the event receiver observers listen on.
    pub fn new(config: ServerConfig) -> (Self, mpsc::UnboundedReceiver<ServerEvent>) {
        let (events, event_rx) = Outbox::channel();
        let settings = Arc::new(StreamSettings::new(
            config.quality,
            config.fps,
            config.scale,
        ));
        let server = Self {
            config,
            settings,
            clients: Arc::new(Mutex::new(Vec::new())),
            client_count: Arc::new(AtomicUsize::new(0)),
            running: Arc::new(AtomicBool::new(false)),
            phase: Arc::new(SharedPhase::new()),
            tasks: Mutex::new(Vec::new()),
            events,
        };
        (server, event_rx)
    }

    /// The startup configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Runtime-tunable settings handle.
    pub fn settings(&self) -> Arc<StreamSettings> {
        Arc::clone(&self.settings)
    }

    /// Update streaming quality; takes effect on the next cycle.
    pub fn set_quality(&self, quality: u32) {
        self.settings.set_quality(quality);
    }

    /// Update the target frame rate; takes effect on the next cycle.
    pub fn set_fps(&self, fps: u32) {
        self.settings.set_fps(fps);
    }

    /// Update the frame scale; takes effect on the next cycle.
    pub fn set_scale(&self, scale: f32) {
        self.settings.set_scale(scale);
    }

    /// Number of currently connected clients.
    pub fn client_count(&self) -> usize {
        self.client_count.load(Ordering::SeqCst)
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> SessionPhase {
        self.phase.get()
    }

    /// Start streaming: bind the listener, then spawn the accept loop
    /// and the broadcast loop.
    ///
    /// Returns the bound address (useful with port 0). A bind failure
    /// fails the start synchronously and the session returns to idle.
    pub async fn start(&self, source: Box<dyn FrameSource>) -> Result<SocketAddr, BeamError> {
        self.phase.begin_start()?;

        let listener = match TcpListener::bind((self.config.bind_addr, self.config.port)).await
        {
            Ok(l) => l,
            Err(e) => {
                self.phase.force_idle();
                self.events
                    .send(ServerEvent::Error(format!("failed to start server: {e}")));
                return Err(e.into());
            }
        };
        let local_addr = listener.local_addr()?;

        self.running.store(true, Ordering::SeqCst);

        let acceptor = tokio::spawn(accept_loop(
            listener,
            Arc::clone(&self.clients),
            Arc::clone(&self.client_count),
            Arc::clone(&self.running),
            self.events.clone(),
        ));

        let broadcaster = tokio::spawn(broadcast_loop(
            source,
            JpegCodec::new(self.settings.quality(), self.settings.scale()),
            Arc::clone(&self.settings),
            Arc::clone(&self.clients),
            Arc::clone(&self.client_count),
            Arc::clone(&self.running),
            self.events.clone(),
        ));

        *self.tasks.lock().await = vec![acceptor, broadcaster];

        self.phase.mark_running()?;
        info!(%local_addr, "streaming server started");
        self.events
            .send(ServerEvent::Status(format!("server started on {local_addr}")));
        Ok(local_addr)
    }

    /// Stop streaming and tear down every client connection.
    ///
    /// Safe to call repeatedly; stopping an already-stopped server is a
    /// no-op. Waits for the accept and broadcast loops to exit (bounded
    /// by one accept-wait / frame budget) before the session returns to
    /// idle, so a subsequent `start` never races the old loops and the
    /// old listener is closed by the time this returns.
    pub async fn stop(&self) {
        if !self.phase.begin_stop() {
            return;
        }
        self.running.store(false, Ordering::SeqCst);

        let tasks: Vec<JoinHandle<()>> = self.tasks.lock().await.drain(..).collect();
        for task in tasks {
            let _ = task.await;
        }

        let mut dropped = Vec::new();
        {
            let mut clients = self.clients.lock().await;
            for mut client in clients.drain(..) {
                let _ = client.stream.shutdown().await;
                dropped.push(client.addr);
            }
            self.client_count.store(0, Ordering::SeqCst);
        }
        for addr in dropped {
            self.events.send(ServerEvent::ClientDisconnected(addr));
        }

        info!("streaming server stopped");
        self.events
            .send(ServerEvent::Status("server stopped".into()));
        self.phase.force_idle();
    }
}

// ── Accept loop ──────────────────────────────────────────────────

/// Accept incoming connections until the running flag drops.
///
/// The bounded accept-wait lets the loop observe a stop within
/// [`ACCEPT_POLL`] instead of blocking forever in `accept`.
async fn accept_loop(
    listener: TcpListener,
    clients: Registry,
    client_count: Arc<AtomicUsize>,
    running: Arc<AtomicBool>,
    events: Outbox<ServerEvent>,
) {
    while running.load(Ordering::SeqCst) {
        match timeout(ACCEPT_POLL, listener.accept()).await {
            Err(_) => continue, // accept-wait elapsed; re-check the flag
            Ok(Ok((stream, addr))) => {
                // Framed headers are small; do not let Nagle coalesce them.
                if let Err(e) = stream.set_nodelay(true) {
                    debug!(%addr, "set_nodelay failed: {e}");
                }

                {
                    let mut guard = clients.lock().await;
                    guard.push(ClientHandle { addr, stream });
                    client_count.store(guard.len(), Ordering::SeqCst);
                }

                // Notify outside the registry lock.
                info!(%addr, "client connected");
                events.send(ServerEvent::Status(format!("client connected: {addr}")));
                events.send(ServerEvent::ClientConnected(addr));
            }
            Ok(Err(e)) => {
                if running.load(Ordering::SeqCst) {
                    warn!("accept error: {e}");
                    events.send(ServerEvent::Error(format!("accept error: {e}")));
                }
            }
        }
    }
    debug!("accept loop exited");
}

// ── Broadcast loop ───────────────────────────────────────────────

/// Capture, compress, frame, and fan out until the running flag drops.
///
/// Per-cycle capture and encode faults are reported and absorbed; the
/// loop keeps going. Pacing uses a monotonic clock and sleeps only the
/// positive remainder of the frame budget — an overrunning cycle rolls
/// straight into the next one.
async fn broadcast_loop(
    mut source: Box<dyn FrameSource>,
    mut codec: JpegCodec,
    settings: Arc<StreamSettings>,
    clients: Registry,
    client_count: Arc<AtomicUsize>,
    running: Arc<AtomicBool>,
    events: Outbox<ServerEvent>,
) {
    while running.load(Ordering::SeqCst) {
        let cycle_start = Instant::now();

        match source.capture() {
            Ok(frame) => {
                codec.set_quality(settings.quality());
                codec.set_scale(settings.scale());

                match codec.compress(&frame) {
                    Ok(payload) => {
                        let framed = framing::encode_frame(&payload);
                        fan_out(&clients, &client_count, &events, framed).await;
                    }
                    Err(e) => {
                        warn!("encode error: {e}");
                        events.send(ServerEvent::Error(format!("stream error: {e}")));
                    }
                }
            }
            Err(e) => {
                // Transient capture glitch — report and try the next cycle.
                warn!("capture error: {e}");
                events.send(ServerEvent::Error(format!("stream error: {e}")));
            }
        }

        let budget = Duration::from_secs_f64(1.0 / settings.fps() as f64);
        let elapsed = cycle_start.elapsed();
        if elapsed < budget {
            tokio::time::sleep(budget - elapsed).await;
        }
    }

    source.close();
    debug!("broadcast loop exited");
}

/// Write one framed message to every registry entry.
///
/// A write fault marks the entry for removal but never aborts delivery
/// to the remaining entries. Marked entries are closed and evicted
/// before the registry lock is released; disconnect events fire after.
async fn fan_out(
    clients: &Registry,
    client_count: &AtomicUsize,
    events: &Outbox<ServerEvent>,
    framed: Bytes,
) {
    let mut dropped: Vec<SocketAddr> = Vec::new();

    {
        let mut guard = clients.lock().await;
        let mut live = Vec::with_capacity(guard.len());
        for mut client in guard.drain(..) {
            match client.stream.write_all(&framed).await {
                Ok(()) => live.push(client),
                Err(e) => {
                    debug!(addr = %client.addr, "write failed: {e}");
                    let _ = client.stream.shutdown().await;
                    dropped.push(client.addr);
                }
            }
        }
        *guard = live;
        client_count.store(guard.len(), Ordering::SeqCst);
    }

    for addr in dropped {
        info!(%addr, "client disconnected");
        events.send(ServerEvent::Status(format!("client disconnected: {addr}")));
        events.send(ServerEvent::ClientDisconnected(addr));
    }
}

// ── Local address discovery ──────────────────────────────────────

/// Best-effort local IP discovery for operator-facing output.
///
/// Opens a UDP socket toward a public address (nothing is sent) and
/// reads back the chosen source address. Falls back to loopback.
pub fn local_ip() -> IpAddr {
    fn probe() -> std::io::Result<IpAddr> {
        let socket = std::net::UdpSocket::bind("0.0.0.0:0")?;
        socket.connect("8.8.8.8:80")?;
        Ok(socket.local_addr()?.ip())
    }
    probe().unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_clamp_on_construction() {
        let s = StreamSettings::new(0, 1000, 5.0);
        assert_eq!(s.quality(), 1);
        assert_eq!(s.fps(), 60);
        assert!((s.scale() - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn fps_clamping() {
        let s = StreamSettings::new(50, 30, 1.0);
        s.set_fps(0);
        assert_eq!(s.fps(), 1);
        s.set_fps(1000);
        assert_eq!(s.fps(), 60);
        s.set_fps(24);
        assert_eq!(s.fps(), 24);
    }

    #[test]
    fn scale_clamping() {
        let s = StreamSettings::new(50, 30, 1.0);
        s.set_scale(5.0);
        assert!((s.scale() - 1.0).abs() < f32::EPSILON);
        s.set_scale(0.0);
        assert!((s.scale() - 0.1).abs() < f32::EPSILON);
        s.set_scale(0.5);
        assert!((s.scale() - 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn quality_clamping() {
        let s = StreamSettings::new(50, 30, 1.0);
        s.set_quality(0);
        assert_eq!(s.quality(), 1);
        s.set_quality(500);
        assert_eq!(s.quality(), 100);
    }

    #[test]
    fn default_config_matches_protocol_defaults() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.port, 9999);
        assert_eq!(cfg.quality, 50);
        assert_eq!(cfg.fps, 30);
    }

    #[tokio::test]
    async fn stop_before_start_is_noop() {
        let (server, _events) = StreamServer::new(ServerConfig::default());
        server.stop().await;
        server.stop().await;
        assert_eq!(server.phase(), SessionPhase::Idle);
        assert_eq!(server.client_count(), 0);
    }
}
