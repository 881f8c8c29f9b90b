//! Configuration for AirTrans.
//!
//! Everything is read from `AIRTRANS_*` environment variables with built-in
//! defaults; there is no config file. Unparsable values fall back to the
//! default for that key rather than failing startup — `validate()` then
//! catches combinations that cannot work.

use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::integrity::HashAlgorithm;

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub api: ApiConfig,
    pub transfer: TransferConfig,
    pub discovery: DiscoveryConfig,
    pub paths: PathsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Bind address for the HTTP session service.
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferConfig {
    /// First data port; a transfer with N parts uses ports base..base+N.
    pub base_port: u16,
    /// Largest N any session may request.
    pub max_ports: usize,
    /// Default N when the caller does not choose one.
    pub num_parts: usize,
    /// Target part size used by `optimal_parts`.
    pub target_chunk_size: u64,
    /// Wall-clock ceiling for a whole transfer, seconds.
    pub timeout_secs: u64,
    /// Per-connection connect/read timeout, seconds.
    pub connect_timeout_secs: u64,
    /// Stream block size in bytes.
    pub buffer_size: usize,
    /// Digest algorithm tag, e.g. "sha256". Must match on both sides.
    pub checksum: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// UDP broadcast port.
    pub port: u16,
    pub multicast_group: Ipv4Addr,
    pub multicast_port: u16,
    /// Enable the multicast variant alongside broadcast.
    pub multicast: bool,
    /// Seconds between announcements.
    pub interval_secs: u64,
    /// Seconds after which a silent peer is evicted.
    pub peer_timeout_secs: u64,
    /// Name announced to other hosts.
    pub device_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    pub temp_dir: PathBuf,
    pub download_dir: PathBuf,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for Config {
    fn default() -> Self {
        Self {
            api: ApiConfig {
                host: "0.0.0.0".into(),
                port: 8000,
            },
            transfer: TransferConfig {
                base_port: 5001,
                max_ports: 32,
                num_parts: 8,
                target_chunk_size: 100 * 1024 * 1024,
                timeout_secs: 300,
                connect_timeout_secs: 10,
                buffer_size: 1024 * 1024,
                checksum: "sha256".into(),
            },
            discovery: DiscoveryConfig {
                port: 37020,
                multicast_group: Ipv4Addr::new(224, 0, 0, 251),
                multicast_port: 37021,
                multicast: false,
                interval_secs: 5,
                peer_timeout_secs: 30,
                device_name: default_device_name(),
            },
            paths: PathsConfig {
                temp_dir: PathBuf::from("/tmp/airtrans"),
                download_dir: home_dir().join("Downloads").join("AirTrans"),
            },
        }
    }
}

fn home_dir() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

fn default_device_name() -> String {
    if let Ok(name) = std::env::var("HOSTNAME") {
        if !name.is_empty() {
            return name;
        }
    }
    std::fs::read_to_string("/etc/hostname")
        .map(|s| s.trim().to_string())
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "airtrans".to_string())
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("base_port {0} leaves no room for {1} data ports below 65536")]
    BasePortOutOfRange(u16, usize),
    #[error("max_ports {0} out of range 1..=64")]
    MaxPortsOutOfRange(usize),
    #[error("num_parts {0} out of range 1..={1}")]
    NumPartsOutOfRange(usize, usize),
    #[error("unknown checksum algorithm '{0}'")]
    UnknownAlgorithm(String),
    #[error("failed to create {0}: {1}")]
    CreateDir(PathBuf, std::io::Error),
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl Config {
    /// Build a config from `AIRTRANS_*` env vars over defaults.
    pub fn from_env() -> Self {
        let mut config = Config::default();

        if let Ok(v) = std::env::var("AIRTRANS_API_HOST") {
            config.api.host = v;
        }
        env_parse("AIRTRANS_API_PORT", &mut config.api.port);
        env_parse("AIRTRANS_BASE_PORT", &mut config.transfer.base_port);
        env_parse("AIRTRANS_MAX_PORTS", &mut config.transfer.max_ports);
        env_parse("AIRTRANS_NUM_PARTS", &mut config.transfer.num_parts);
        env_parse("AIRTRANS_CHUNK_SIZE", &mut config.transfer.target_chunk_size);
        env_parse("AIRTRANS_TIMEOUT", &mut config.transfer.timeout_secs);
        env_parse(
            "AIRTRANS_CONN_TIMEOUT",
            &mut config.transfer.connect_timeout_secs,
        );
        env_parse("AIRTRANS_BUFFER_SIZE", &mut config.transfer.buffer_size);
        if let Ok(v) = std::env::var("AIRTRANS_CHECKSUM") {
            config.transfer.checksum = v;
        }
        env_parse("AIRTRANS_DISCOVERY_PORT", &mut config.discovery.port);
        env_parse(
            "AIRTRANS_MULTICAST_GROUP",
            &mut config.discovery.multicast_group,
        );
        env_parse(
            "AIRTRANS_MULTICAST_PORT",
            &mut config.discovery.multicast_port,
        );
        if let Ok(v) = std::env::var("AIRTRANS_MULTICAST") {
            config.discovery.multicast = v == "true" || v == "1";
        }
        env_parse(
            "AIRTRANS_DISCOVERY_INTERVAL",
            &mut config.discovery.interval_secs,
        );
        env_parse(
            "AIRTRANS_PEER_TIMEOUT",
            &mut config.discovery.peer_timeout_secs,
        );
        if let Ok(v) = std::env::var("AIRTRANS_DEVICE_NAME") {
            if !v.is_empty() {
                config.discovery.device_name = v;
            }
        }
        if let Ok(v) = std::env::var("AIRTRANS_TEMP_DIR") {
            config.paths.temp_dir = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("AIRTRANS_DOWNLOAD_DIR") {
            config.paths.download_dir = PathBuf::from(v);
        }

        config
    }

    /// Reject combinations that cannot work.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let t = &self.transfer;
        if t.max_ports == 0 || t.max_ports > 64 {
            return Err(ConfigError::MaxPortsOutOfRange(t.max_ports));
        }
        if t.base_port < 1024 || usize::from(t.base_port) + t.max_ports > 65536 {
            return Err(ConfigError::BasePortOutOfRange(t.base_port, t.max_ports));
        }
        if t.num_parts == 0 || t.num_parts > t.max_ports {
            return Err(ConfigError::NumPartsOutOfRange(t.num_parts, t.max_ports));
        }
        if HashAlgorithm::parse(&t.checksum).is_none() {
            return Err(ConfigError::UnknownAlgorithm(t.checksum.clone()));
        }
        Ok(())
    }

    /// Create the temp and download directories if missing.
    pub fn ensure_dirs(&self) -> Result<(), ConfigError> {
        for dir in [&self.paths.temp_dir, &self.paths.download_dir] {
            std::fs::create_dir_all(dir)
                .map_err(|e| ConfigError::CreateDir(dir.clone(), e))?;
        }
        Ok(())
    }

    /// The parsed digest algorithm. Call after `validate()`.
    pub fn algorithm(&self) -> HashAlgorithm {
        HashAlgorithm::parse(&self.transfer.checksum).unwrap_or_default()
    }

    /// Recommended part count for a file of `filesize` bytes: one part per
    /// `target_chunk_size`, clamped to 1..=max_ports.
    pub fn optimal_parts(&self, filesize: u64) -> usize {
        let by_size = (filesize / self.transfer.target_chunk_size.max(1)) as usize;
        by_size.clamp(1, self.transfer.max_ports)
    }

    pub fn transfer_timeout(&self) -> Duration {
        Duration::from_secs(self.transfer.timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.transfer.connect_timeout_secs)
    }

    pub fn peer_timeout(&self) -> Duration {
        Duration::from_secs(self.discovery.peer_timeout_secs)
    }
}

/// Overwrite `slot` with the parsed value of env var `key`, if present and
/// parsable. Unparsable values are ignored.
fn env_parse<T: std::str::FromStr>(key: &str, slot: &mut T) {
    if let Ok(raw) = std::env::var(key) {
        if let Ok(value) = raw.parse() {
            *slot = value;
        }
    }
}
