//! screenbeam sender — entry point.
//!
//! ```text
//! beam-sender                    Run with beam-sender.toml (or defaults)
//! beam-sender --config <path>    Load a custom config TOML
//! beam-sender --gen-config       Write default config to stdout
//! beam-sender --port 9999 --quality 50 --fps 30 --scale 1.0
//! ```
//!
//! Ships with the synthetic demo frame source; OS capture backends plug
//! into [`beam_core::FrameSource`] in place of it.

mod config;

use std::path::PathBuf;

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use beam_core::{
    local_ip, FrameSource, MonitorRegion, ServerEvent, StreamServer, SyntheticSource,
};

use crate::config::SenderConfig;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "beam-sender", about = "screenbeam streaming server")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "beam-sender.toml")]
    config: PathBuf,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,

    /// Override the listen port.
    #[arg(long)]
    port: Option<u16>,

    /// Override the JPEG quality (1-100).
    #[arg(long)]
    quality: Option<u8>,

    /// Override the target FPS (1-60).
    #[arg(long)]
    fps: Option<u32>,

    /// Override the scale factor (0.1-1.0).
    #[arg(long)]
    scale: Option<f32>,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // --gen-config: dump defaults and exit.
    if cli.gen_config {
        let text = toml::to_string_pretty(&SenderConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    let mut config = SenderConfig::load(&cli.config);
    if let Some(port) = cli.port {
        config.network.port = port;
    }
    if let Some(quality) = cli.quality {
        config.stream.quality = quality;
    }
    if let Some(fps) = cli.fps {
        config.stream.fps = fps;
    }
    if let Some(scale) = cli.scale {
        config.stream.scale = scale;
    }

    // Init tracing.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("beam-sender v{}", env!("CARGO_PKG_VERSION"));
    info!("local IP: {}", local_ip());
    info!("port: {}", config.network.port);
    info!(
        "quality: {}  fps: {}  scale: {}",
        config.stream.quality, config.stream.fps, config.stream.scale
    );

    let server_config = config.to_server_config();
    let source = SyntheticSource::new(config.stream.source_width, config.stream.source_height);

    let monitors = source.monitors();
    let monitor = select_monitor(&monitors, server_config.monitor);
    if monitor != server_config.monitor {
        warn!(
            "monitor {} not available ({} detected); using {monitor}",
            server_config.monitor,
            monitors.len()
        );
    }
    if let Some(region) = monitors.get(monitor) {
        info!(
            "monitor {monitor}: {}x{} at ({}, {})",
            region.width, region.height, region.left, region.top
        );
    }

    let (server, mut events) = StreamServer::new(server_config);

    // Event logger.
    tokio::spawn(async move {
        while let Some(ev) = events.recv().await {
            match ev {
                ServerEvent::Status(msg) => info!("{msg}"),
                ServerEvent::Error(msg) => warn!("{msg}"),
                ServerEvent::ClientConnected(addr) => info!("viewer joined: {addr}"),
                ServerEvent::ClientDisconnected(addr) => info!("viewer left: {addr}"),
            }
        }
    });

    server.start(Box::new(source)).await?;

    tokio::signal::ctrl_c().await?;
    info!("Ctrl-C received — shutting down");
    server.stop().await;

    Ok(())
}

// ── Monitor selection ────────────────────────────────────────────

/// Pick the configured monitor, falling back to the primary when the
/// index is out of range for the backend's monitor list.
fn select_monitor(monitors: &[MonitorRegion], index: usize) -> usize {
    if index < monitors.len() {
        index
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region(width: u32, height: u32) -> MonitorRegion {
        MonitorRegion {
            left: 0,
            top: 0,
            width,
            height,
        }
    }

    #[test]
    fn in_range_monitor_is_kept() {
        let monitors = [region(1920, 1080), region(1280, 720)];
        assert_eq!(select_monitor(&monitors, 1), 1);
    }

    #[test]
    fn out_of_range_monitor_falls_back_to_primary() {
        let monitors = [region(1920, 1080)];
        assert_eq!(select_monitor(&monitors, 3), 0);
    }
}
