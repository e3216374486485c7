//! Integration tests — full sender/receiver sessions, broadcast
//! isolation, and error scenarios over real TCP connections on
//! localhost ephemeral ports.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use beam_core::{
    ClientEvent, ServerConfig, ServerEvent, SessionPhase, StreamClient, StreamServer,
    SyntheticSource,
};
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::timeout;

// ── Helpers ──────────────────────────────────────────────────────

const LOCALHOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

/// Start a server on an OS-assigned port with a small synthetic source.
async fn start_test_server(
    fps: u32,
) -> (StreamServer, UnboundedReceiver<ServerEvent>, SocketAddr) {
    let config = ServerConfig {
        bind_addr: LOCALHOST,
        port: 0,
        quality: 50,
        fps,
        scale: 1.0,
        monitor: 0,
    };
    let (server, events) = StreamServer::new(config);
    let addr = server
        .start(Box::new(SyntheticSource::new(64, 48)))
        .await
        .unwrap();
    (server, events, addr)
}

/// Read one framed message from a raw client socket.
async fn read_framed(stream: &mut TcpStream) -> Vec<u8> {
    let mut len_buf = [0u8; 4];
    stream.read_exact(&mut len_buf).await.unwrap();
    let len = u32::from_be_bytes(len_buf) as usize;
    let mut payload = vec![0u8; len];
    stream.read_exact(&mut payload).await.unwrap();
    payload
}

/// Wait for a specific event, skipping others.
async fn wait_for_client_event(
    rx: &mut UnboundedReceiver<ClientEvent>,
    want: fn(&ClientEvent) -> bool,
) -> ClientEvent {
    timeout(Duration::from_secs(5), async {
        loop {
            let ev = rx.recv().await.expect("event channel closed");
            if want(&ev) {
                return ev;
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

// ── End-to-end delivery ──────────────────────────────────────────

#[tokio::test]
async fn stream_delivery_and_rate_estimate() {
    let (server, _server_events, addr) = start_test_server(25).await;

    let (client, _client_events) = StreamClient::new(addr.ip().to_string(), addr.port());
    client.connect().await.unwrap();
    assert!(client.is_connected());

    // The Current Frame Slot becomes non-empty once the first frame
    // makes it through capture → compress → wire → decode.
    let mut slot = client.frame_slot();
    timeout(Duration::from_secs(5), async {
        while slot.borrow_and_update().is_none() {
            slot.changed().await.unwrap();
        }
    })
    .await
    .expect("no frame arrived");

    let frame = slot.borrow().clone().unwrap();
    assert_eq!(frame.width, 64);
    assert_eq!(frame.height, 48);

    // After more than a full window the rate estimate is live and
    // bounded by the configured frame budget.
    tokio::time::sleep(Duration::from_millis(1600)).await;
    let rate = client.frame_rate();
    assert!(rate > 0, "rate estimate never computed");
    assert!(rate <= 30, "rate {rate} exceeds the frame budget");

    client.disconnect();
    server.stop().await;
}

#[tokio::test]
async fn latest_wins_slot_skips_to_newest() {
    let (server, _server_events, addr) = start_test_server(30).await;

    let (client, _client_events) = StreamClient::new(addr.ip().to_string(), addr.port());
    client.connect().await.unwrap();

    let mut slot = client.frame_slot();
    timeout(Duration::from_secs(5), async {
        while slot.borrow_and_update().is_none() {
            slot.changed().await.unwrap();
        }
    })
    .await
    .expect("no frame arrived");
    let first = slot.borrow().clone().unwrap();

    // A slow consumer that comes back later sees only the newest frame.
    tokio::time::sleep(Duration::from_millis(500)).await;
    let later = slot.borrow().clone().unwrap();
    assert_ne!(
        first.data, later.data,
        "slot should have advanced past the first frame"
    );

    client.disconnect();
    server.stop().await;
}

// ── Broadcast isolation ──────────────────────────────────────────

#[tokio::test]
async fn dead_client_does_not_starve_live_one() {
    let (server, mut server_events, addr) = start_test_server(30).await;

    let mut live = TcpStream::connect(addr).await.unwrap();
    let doomed = TcpStream::connect(addr).await.unwrap();

    // Both registered and receiving.
    let _ = read_framed(&mut live).await;
    timeout(Duration::from_secs(5), async {
        while server.client_count() < 2 {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("second client never registered");

    // Close one socket externally.
    drop(doomed);

    // The live client keeps receiving subsequent frames.
    for _ in 0..5 {
        let payload = read_framed(&mut live).await;
        assert!(!payload.is_empty());
    }

    // The dead one is evicted and reported, without killing the fan-out.
    timeout(Duration::from_secs(5), async {
        while server.client_count() != 1 {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("dead client never evicted");

    let disconnected = timeout(Duration::from_secs(5), async {
        loop {
            match server_events.recv().await.expect("event channel closed") {
                ServerEvent::ClientDisconnected(a) => return a,
                _ => continue,
            }
        }
    })
    .await
    .expect("no disconnect event");
    assert_ne!(disconnected, live.local_addr().unwrap());

    server.stop().await;
}

// ── Lifecycle ────────────────────────────────────────────────────

#[tokio::test]
async fn server_stop_unblocks_receiver() {
    let (server, _server_events, addr) = start_test_server(30).await;

    let (client, mut client_events) = StreamClient::new(addr.ip().to_string(), addr.port());
    client.connect().await.unwrap();

    // Let at least one frame through first.
    let mut slot = client.frame_slot();
    timeout(Duration::from_secs(5), async {
        while slot.borrow_and_update().is_none() {
            slot.changed().await.unwrap();
        }
    })
    .await
    .expect("no frame arrived");

    // Stopping the server closes the socket; the receiver observes the
    // peer close and winds down on its own.
    server.stop().await;
    wait_for_client_event(&mut client_events, |e| matches!(e, ClientEvent::Disconnected))
        .await;
    assert!(!client.is_connected());
    assert_eq!(client.phase(), SessionPhase::Idle);
}

#[tokio::test]
async fn client_disconnect_is_reentrant() {
    let (server, _server_events, addr) = start_test_server(30).await;

    let (client, mut client_events) = StreamClient::new(addr.ip().to_string(), addr.port());
    client.connect().await.unwrap();

    client.disconnect();
    client.disconnect(); // no-op, not a fault

    wait_for_client_event(&mut client_events, |e| matches!(e, ClientEvent::Disconnected))
        .await;
    assert_eq!(client.phase(), SessionPhase::Idle);

    server.stop().await;
}

#[tokio::test]
async fn restart_does_not_resurrect_old_loops() {
    // Low frame budget so delivery counts are easy to reason about.
    let (server, _events, old_addr) = start_test_server(1).await;
    tokio::time::sleep(Duration::from_millis(200)).await;

    // stop() waits for the old accept and broadcast loops to exit, so
    // the restarted session is the only producer.
    server.stop().await;
    assert!(
        TcpStream::connect(old_addr).await.is_err(),
        "old listener still bound after stop"
    );

    let new_addr = server
        .start(Box::new(SyntheticSource::new(64, 48)))
        .await
        .unwrap();
    let mut stream = TcpStream::connect(new_addr).await.unwrap();

    // At one frame per second a single live loop delivers at most ~5
    // frames in this window; a leaked second loop would double that.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(4);
    let mut frames = 0u32;
    loop {
        let remaining = deadline - tokio::time::Instant::now();
        if remaining.is_zero() {
            break;
        }
        match timeout(remaining, read_framed(&mut stream)).await {
            Ok(payload) => {
                assert!(!payload.is_empty());
                frames += 1;
            }
            Err(_) => break,
        }
    }
    assert!(frames >= 2, "restarted stream never delivered");
    assert!(frames <= 5, "{frames} frames in 4 s at 1 fps — old loop still running");

    server.stop().await;
}

#[tokio::test]
async fn double_start_is_rejected() {
    let (server, _events, _addr) = start_test_server(30).await;
    let result = server.start(Box::new(SyntheticSource::new(8, 8))).await;
    assert!(result.is_err());
    server.stop().await;
}

// ── Error scenarios ──────────────────────────────────────────────

#[tokio::test]
async fn connect_refused_fails_start() {
    // Grab a port that nothing is listening on.
    let probe = tokio::net::TcpListener::bind((LOCALHOST, 0)).await.unwrap();
    let dead_port = probe.local_addr().unwrap().port();
    drop(probe);

    let (client, mut events) = StreamClient::new("127.0.0.1", dead_port);
    let result = client.connect().await;
    assert!(result.is_err());
    assert_eq!(client.phase(), SessionPhase::Idle);

    wait_for_client_event(&mut events, |e| matches!(e, ClientEvent::Error(_))).await;

    // The failed start left the session reusable.
    assert!(!client.is_connected());
}

#[tokio::test]
async fn bind_in_use_fails_start() {
    let occupied = tokio::net::TcpListener::bind((LOCALHOST, 0)).await.unwrap();
    let port = occupied.local_addr().unwrap().port();

    let config = ServerConfig {
        bind_addr: LOCALHOST,
        port,
        ..ServerConfig::default()
    };
    let (server, mut events) = StreamServer::new(config);
    let result = server.start(Box::new(SyntheticSource::new(8, 8))).await;
    assert!(result.is_err());
    assert_eq!(server.phase(), SessionPhase::Idle);

    let ev = timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("timeout")
        .expect("event channel closed");
    assert!(matches!(ev, ServerEvent::Error(_)));
}

#[tokio::test]
async fn over_ceiling_header_disconnects_client() {
    // A hand-rolled peer announces a payload above the ceiling and then
    // keeps the socket open, as a hostile or corrupt sender would.
    let listener = tokio::net::TcpListener::bind((LOCALHOST, 0)).await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let oversized = (beam_core::DEFAULT_MAX_PAYLOAD as u32) + 1;
        tokio::io::AsyncWriteExt::write_all(&mut stream, &oversized.to_be_bytes())
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;
        drop(stream);
    });

    let (client, mut events) = StreamClient::new(addr.ip().to_string(), addr.port());
    client.connect().await.unwrap();

    // The corrupt header is fatal: reported, then torn down.
    let reported = wait_for_client_event(&mut events, |e| matches!(e, ClientEvent::Error(_)))
        .await;
    if let ClientEvent::Error(msg) = reported {
        assert!(msg.contains("payload too large"), "unexpected error: {msg}");
    }
    wait_for_client_event(&mut events, |e| matches!(e, ClientEvent::Disconnected)).await;
    assert!(!client.is_connected());
    assert_eq!(client.phase(), SessionPhase::Idle);
}

// ── Capture faults ───────────────────────────────────────────────

/// Source that fails every other capture.
struct FlakySource {
    inner: SyntheticSource,
    calls: u32,
}

impl beam_core::FrameSource for FlakySource {
    fn capture(&mut self) -> Result<beam_core::Frame, beam_core::BeamError> {
        self.calls += 1;
        if self.calls % 2 == 0 {
            Err(beam_core::BeamError::Capture("flaky backend".into()))
        } else {
            self.inner.capture()
        }
    }

    fn monitors(&self) -> Vec<beam_core::MonitorRegion> {
        self.inner.monitors()
    }
}

#[tokio::test]
async fn capture_glitch_does_not_stop_the_stream() {
    let config = ServerConfig {
        bind_addr: LOCALHOST,
        port: 0,
        fps: 30,
        ..ServerConfig::default()
    };
    let (server, mut events) = StreamServer::new(config);
    let source = FlakySource {
        inner: SyntheticSource::new(32, 32),
        calls: 0,
    };
    let addr = server.start(Box::new(source)).await.unwrap();

    // Good cycles keep delivering frames despite the failing ones.
    let mut stream = TcpStream::connect(addr).await.unwrap();
    for _ in 0..3 {
        let payload = read_framed(&mut stream).await;
        assert!(!payload.is_empty());
    }

    // And the glitches were reported, not swallowed.
    let reported = timeout(Duration::from_secs(5), async {
        loop {
            if let ServerEvent::Error(msg) =
                events.recv().await.expect("event channel closed")
            {
                return msg;
            }
        }
    })
    .await
    .expect("no capture error reported");
    assert!(reported.contains("flaky backend"));

    server.stop().await;
}

// ── Runtime settings over a live session ─────────────────────────

#[tokio::test]
async fn settings_update_without_restart() {
    let (server, _events, addr) = start_test_server(30).await;

    let (client, _client_events) = StreamClient::new(addr.ip().to_string(), addr.port());
    client.connect().await.unwrap();

    let mut slot = client.frame_slot();
    timeout(Duration::from_secs(5), async {
        while slot.borrow_and_update().is_none() {
            slot.changed().await.unwrap();
        }
    })
    .await
    .expect("no frame arrived");

    // Halve the scale mid-session; upcoming frames shrink accordingly.
    server.set_scale(0.5);
    timeout(Duration::from_secs(5), async {
        loop {
            slot.changed().await.unwrap();
            let dims = slot
                .borrow_and_update()
                .as_ref()
                .map(|f| (f.width, f.height));
            if dims == Some((32, 24)) {
                return;
            }
        }
    })
    .await
    .expect("scaled frame never arrived");

    client.disconnect();
    server.stop().await;
}
