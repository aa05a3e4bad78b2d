//! Configuration system for Cumulus.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $CUMULUS_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/cumulus/config.toml
//!   3. ~/.config/cumulus/config.toml

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use crate::wire::{
    CHUNK_HEADER_LEN, CLIENT_PORT, DEFAULT_CHUNK_SIZE, MAX_CHUNK_SIZE, MAX_DATAGRAM,
    MAX_FILE_NAME_LEN, SCAN_INTERVAL_SECS, SERVER_PORT, STATUS_INTERVAL_SECS,
};

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CumulusConfig {
    pub network: NetworkConfig,
    pub client: ClientConfig,
    pub server: ServerConfig,
    pub transfer: TransferConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Where the client sends chunks and commands.
    pub server_addr: IpAddr,
    /// UDP port the server listens on.
    pub server_port: u16,
    /// UDP port the client listens on for server-issued commands.
    pub client_port: u16,
    /// Local address both endpoints bind to.
    pub bind_addr: IpAddr,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Directory kept in sync with the server.
    pub sync_dir: PathBuf,
    /// Seconds between scans of `sync_dir`.
    pub scan_interval_secs: u64,
    /// Seconds between sync-state reports.
    pub status_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Directory received files are written into.
    pub storage_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Chunk payload bound in bytes. Client and server must agree on it,
    /// since the server places block N at byte N * chunk_size.
    pub chunk_size: usize,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for CumulusConfig {
    fn default() -> Self {
        Self {
            network: NetworkConfig::default(),
            client: ClientConfig::default(),
            server: ServerConfig::default(),
            transfer: TransferConfig::default(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            server_addr: IpAddr::V4(Ipv4Addr::LOCALHOST),
            server_port: SERVER_PORT,
            client_port: CLIENT_PORT,
            bind_addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            sync_dir: data_dir().join("sync"),
            scan_interval_secs: SCAN_INTERVAL_SECS,
            status_interval_secs: STATUS_INTERVAL_SECS,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            storage_dir: data_dir().join("storage"),
        }
    }
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".config"))
        .join("cumulus")
}

pub fn data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".local").join("share"))
        .join("cumulus")
}

fn dirs_or_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
    #[error("failed to serialize: {0}")]
    SerializeFailed(toml::ser::Error),
    #[error("invalid setting {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl CumulusConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::file_path();
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadFailed(path.clone(), e))?;
            toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.clone(), e))?
        } else {
            CumulusConfig::default()
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("CUMULUS_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Write default config if none exists. Returns the path.
    pub fn write_default_if_missing() -> Result<PathBuf, ConfigError> {
        let path = Self::file_path();
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
            }
            let text = toml::to_string_pretty(&CumulusConfig::default())
                .map_err(ConfigError::SerializeFailed)?;
            std::fs::write(&path, text).map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
        }
        Ok(path)
    }

    /// Reject settings the engines cannot run with.
    ///
    /// A chunk size whose envelope exceeds one UDP datagram is allowed but
    /// logged: sends of files larger than one datagram will then fail at the
    /// socket and be retried every scan.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let chunk_size = self.transfer.chunk_size;
        if chunk_size == 0 || chunk_size > MAX_CHUNK_SIZE {
            return Err(ConfigError::Invalid {
                field: "transfer.chunk_size",
                reason: format!("must be between 1 and {MAX_CHUNK_SIZE}, got {chunk_size}"),
            });
        }
        if self.client.scan_interval_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "client.scan_interval_secs",
                reason: "must be non-zero".into(),
            });
        }
        if self.client.status_interval_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "client.status_interval_secs",
                reason: "must be non-zero".into(),
            });
        }
        if !self.fits_datagram() {
            tracing::warn!(
                chunk_size,
                max_datagram = MAX_DATAGRAM,
                "chunk envelope can exceed one UDP datagram; large files will fail to send"
            );
        }
        Ok(())
    }

    /// Whether the largest possible chunk envelope fits in one datagram.
    pub fn fits_datagram(&self) -> bool {
        self.transfer.chunk_size + CHUNK_HEADER_LEN + MAX_FILE_NAME_LEN <= MAX_DATAGRAM
    }

    /// Server endpoint the client sends to.
    pub fn server_endpoint(&self) -> SocketAddr {
        SocketAddr::new(self.network.server_addr, self.network.server_port)
    }

    /// Local address the server binds.
    pub fn server_bind(&self) -> SocketAddr {
        SocketAddr::new(self.network.bind_addr, self.network.server_port)
    }

    /// Local address the client binds.
    pub fn client_bind(&self) -> SocketAddr {
        SocketAddr::new(self.network.bind_addr, self.network.client_port)
    }

    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.client.scan_interval_secs)
    }

    pub fn status_interval(&self) -> Duration {
        Duration::from_secs(self.client.status_interval_secs)
    }

    /// Apply CUMULUS_* env var overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("CUMULUS_NETWORK__SERVER_ADDR") {
            if let Ok(addr) = v.parse() {
                self.network.server_addr = addr;
            }
        }
        if let Ok(v) = std::env::var("CUMULUS_NETWORK__SERVER_PORT") {
            if let Ok(p) = v.parse() {
                self.network.server_port = p;
            }
        }
        if let Ok(v) = std::env::var("CUMULUS_NETWORK__CLIENT_PORT") {
            if let Ok(p) = v.parse() {
                self.network.client_port = p;
            }
        }
        if let Ok(v) = std::env::var("CUMULUS_CLIENT__SYNC_DIR") {
            self.client.sync_dir = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("CUMULUS_SERVER__STORAGE_DIR") {
            self.server.storage_dir = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("CUMULUS_TRANSFER__CHUNK_SIZE") {
            if let Ok(n) = v.parse() {
                self.transfer.chunk_size = n;
            }
        }
    }
}
