//! Configuration for the sender binary.

use std::net::{IpAddr, Ipv4Addr};
use std::path::Path;

use serde::{Deserialize, Serialize};

use beam_core::ServerConfig;

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SenderConfig {
    /// Network settings.
    pub network: NetworkConfig,
    /// Stream tuning.
    pub stream: StreamConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// Network configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Address to bind to (`0.0.0.0` for all interfaces).
    pub bind_addr: String,
    /// TCP port to listen on.
    pub port: u16,
}

/// Stream tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// JPEG quality (1-100).
    pub quality: u8,
    /// Target frames per second (1-60).
    pub fps: u32,
    /// Frame scale factor (0.1-1.0).
    pub scale: f32,
    /// Monitor index to capture (0 = primary).
    pub monitor: usize,
    /// Synthetic-source frame width (demo backend).
    pub source_width: u32,
    /// Synthetic-source frame height (demo backend).
    pub source_height: u32,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            network: NetworkConfig::default(),
            stream: StreamConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0".into(),
            port: 9999,
        }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            quality: 50,
            fps: 30,
            scale: 1.0,
            monitor: 0,
            source_width: 1280,
            source_height: 720,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl SenderConfig {
    /// Load configuration from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("invalid config {}: {e}; using defaults", path.display());
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    /// Convert into the core's server configuration.
    pub fn to_server_config(&self) -> ServerConfig {
        let bind_addr: IpAddr = self
            .network
            .bind_addr
            .parse()
            .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));
        ServerConfig {
            bind_addr,
            port: self.network.port,
            quality: self.stream.quality,
            fps: self.stream.fps,
            scale: self.stream.scale,
            monitor: self.stream.monitor,
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let cfg = SenderConfig::default();
        let text = toml::to_string_pretty(&cfg).unwrap();
        assert!(text.contains("port"));
        assert!(text.contains("quality"));
    }

    #[test]
    fn roundtrip_config() {
        let cfg = SenderConfig::default();
        let text = toml::to_string_pretty(&cfg).unwrap();
        let parsed: SenderConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.network.port, 9999);
        assert_eq!(parsed.stream.fps, 30);
    }

    #[test]
    fn bad_bind_addr_falls_back_to_unspecified() {
        let mut cfg = SenderConfig::default();
        cfg.network.bind_addr = "not-an-ip".into();
        let server = cfg.to_server_config();
        assert_eq!(server.bind_addr, IpAddr::V4(Ipv4Addr::UNSPECIFIED));
    }
}
