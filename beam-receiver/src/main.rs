//! screenbeam receiver — entry point.
//!
//! Connects to a sender, keeps the latest-frame slot warm, and logs the
//! stream geometry and rate estimate once per second. Rendering the
//! frames is left to a display layer built on
//! [`beam_core::StreamClient::frame_slot`].

use std::time::Duration;

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use beam_core::{ClientEvent, StreamClient};

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "beam-receiver", about = "screenbeam streaming client")]
struct Cli {
    /// Server address to connect to.
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Server port to connect to.
    #[arg(long, default_value_t = 9999)]
    port: u16,

    /// Log level: "trace", "debug", "info", "warn", "error".
    #[arg(long, default_value = "info")]
    log_level: String,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("beam-receiver v{}", env!("CARGO_PKG_VERSION"));
    info!("connecting to {}:{}", cli.host, cli.port);

    let (client, mut events) = StreamClient::new(cli.host.clone(), cli.port);
    client.connect().await?;

    let slot = client.frame_slot();
    let mut ticker = tokio::time::interval(Duration::from_secs(1));

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl-C received — disconnecting");
                client.disconnect();
            }
            ev = events.recv() => match ev {
                Some(ClientEvent::Status(msg)) => info!("{msg}"),
                Some(ClientEvent::Error(msg)) => warn!("{msg}"),
                Some(ClientEvent::Disconnected) | None => break,
            },
            _ = ticker.tick() => {
                if let Some(frame) = slot.borrow().as_ref() {
                    info!(
                        fps = client.frame_rate(),
                        width = frame.width,
                        height = frame.height,
                        "stream"
                    );
                }
            }
        }
    }

    Ok(())
}
