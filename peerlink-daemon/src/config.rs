//! Daemon configuration
//!
//! TOML configuration for the peerlink daemon. Every field has a
//! default, so a missing file or an empty document yields a working
//! configuration.

use anyhow::{Context, Result};
use peerlink_core::{
    AutoConnectConfig, LinkConfig, ScanConfig, TcpBindingConfig, DEFAULT_REGISTRY_CAPACITY,
    TCP_TRANSPORT_ID,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Daemon configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Transport configuration
    #[serde(default)]
    pub transport: TransportSection,

    /// Scan configuration
    #[serde(default)]
    pub scan: ScanSection,

    /// Auto-connect configuration
    #[serde(default)]
    pub autoconnect: AutoConnectSection,

    /// Registry configuration
    #[serde(default)]
    pub registry: RegistrySection,
}

/// Transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportSection {
    /// Transport the auto-connect loop should use
    #[serde(default = "default_preferred")]
    pub preferred: String,

    /// TCP binding settings
    #[serde(default)]
    pub tcp: TcpSection,
}

impl Default for TransportSection {
    fn default() -> Self {
        Self {
            preferred: default_preferred(),
            tcp: TcpSection::default(),
        }
    }
}

/// TCP binding settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TcpSection {
    /// Candidate endpoints probed during discovery
    #[serde(default)]
    pub endpoints: Vec<SocketAddr>,

    /// Per-endpoint probe timeout in milliseconds
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,

    /// Connect timeout in milliseconds
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

impl Default for TcpSection {
    fn default() -> Self {
        Self {
            endpoints: Vec::new(),
            probe_timeout_ms: default_probe_timeout_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

/// Scan settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanSection {
    /// Pause between discovery passes in milliseconds
    #[serde(default = "default_scan_poll_ms")]
    pub poll_interval_ms: u64,
}

impl Default for ScanSection {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_scan_poll_ms(),
        }
    }
}

/// Auto-connect settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoConnectSection {
    /// Whether the auto-connect loop runs at startup
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Safety-net poll interval in milliseconds
    #[serde(default = "default_autoconnect_poll_ms")]
    pub poll_interval_ms: u64,

    /// Pause between attempts in milliseconds
    #[serde(default = "default_retry_pause_ms")]
    pub retry_pause_ms: u64,
}

impl Default for AutoConnectSection {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval_ms: default_autoconnect_poll_ms(),
            retry_pause_ms: default_retry_pause_ms(),
        }
    }
}

/// Registry settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrySection {
    /// Maximum number of remembered discovered addresses
    #[serde(default = "default_registry_capacity")]
    pub capacity: usize,
}

impl Default for RegistrySection {
    fn default() -> Self {
        Self {
            capacity: default_registry_capacity(),
        }
    }
}

fn default_preferred() -> String {
    TCP_TRANSPORT_ID.to_string()
}

fn default_probe_timeout_ms() -> u64 {
    500
}

fn default_connect_timeout_ms() -> u64 {
    3000
}

fn default_scan_poll_ms() -> u64 {
    1000
}

fn default_autoconnect_poll_ms() -> u64 {
    1000
}

fn default_retry_pause_ms() -> u64 {
    1000
}

fn default_registry_capacity() -> usize {
    DEFAULT_REGISTRY_CAPACITY
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Default configuration file location
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("peerlink")
            .join("config.toml")
    }

    /// Load a configuration file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        toml::from_str(&text)
            .with_context(|| format!("failed to parse config file {}", path.display()))
    }

    /// Load a configuration file, falling back to defaults if absent
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            debug!("no config file at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Core service configuration derived from this file
    pub fn link_config(&self) -> LinkConfig {
        LinkConfig {
            scan: ScanConfig {
                poll_interval: Duration::from_millis(self.scan.poll_interval_ms),
            },
            autoconnect: AutoConnectConfig {
                preferred_transport: self.transport.preferred.clone(),
                poll_interval: Duration::from_millis(self.autoconnect.poll_interval_ms),
                retry_pause: Duration::from_millis(self.autoconnect.retry_pause_ms),
            },
            autoconnect_enabled: self.autoconnect.enabled,
            registry_capacity: self.registry.capacity,
        }
    }

    /// TCP binding configuration derived from this file
    pub fn tcp_binding_config(&self) -> TcpBindingConfig {
        TcpBindingConfig {
            endpoints: self.transport.tcp.endpoints.clone(),
            probe_timeout: Duration::from_millis(self.transport.tcp.probe_timeout_ms),
            connect_timeout: Duration::from_millis(self.transport.tcp.connect_timeout_ms),
            ..Default::default()
        }
    }
}
