//! Configuration module for the osprobe fingerprinter

use crate::ScanError;
use log::info;
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Ports tried when the caller does not know an open one
pub const COMMON_PORTS: [u16; 10] = [80, 443, 22, 21, 25, 3389, 445, 139, 8080, 53];

/// Run configuration for one fingerprinting pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FingerprintConfig {
    /// IPv4 address of the host to fingerprint
    pub target: String,

    /// TCP port the probes are sent to
    pub port: u16,

    /// Path to the signature database
    pub database: PathBuf,

    /// How long to wait for a reply to each probe, in milliseconds
    pub probe_timeout_ms: u64,

    /// Delay between the receiver becoming ready and the probe being sent
    pub send_delay_ms: u64,

    /// Number of ranked candidates to report
    pub top_matches: usize,

    /// Candidate ports for an open-port search
    pub discovery_ports: Vec<u16>,

    /// Fixed source port; random per probe when unset
    pub source_port: Option<u16>,
}

impl Default for FingerprintConfig {
    fn default() -> Self {
        Self {
            target: "127.0.0.1".to_string(),
            port: 80,
            database: PathBuf::from("data/os-fingerprints.db"),
            probe_timeout_ms: 2000,
            send_delay_ms: 100,
            top_matches: 3,
            discovery_ports: COMMON_PORTS.to_vec(),
            source_port: None,
        }
    }
}

impl FingerprintConfig {
    /// Create a new configuration for a target
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            ..Default::default()
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_database<P: Into<PathBuf>>(mut self, database: P) -> Self {
        self.database = database.into();
        self
    }

    /// Set the per-probe timeout in milliseconds
    pub fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.probe_timeout_ms = timeout_ms;
        self
    }

    pub fn with_send_delay(mut self, delay_ms: u64) -> Self {
        self.send_delay_ms = delay_ms;
        self
    }

    pub fn with_top_matches(mut self, top_matches: usize) -> Self {
        self.top_matches = top_matches;
        self
    }

    pub fn with_source_port(mut self, port: u16) -> Self {
        self.source_port = Some(port);
        self
    }

    /// Parsed target address
    pub fn target_ip(&self) -> crate::Result<Ipv4Addr> {
        self.target
            .trim()
            .parse::<Ipv4Addr>()
            .map_err(|_| ScanError::InvalidTarget(format!("not an IPv4 address: {}", self.target)))
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn send_delay(&self) -> Duration {
        Duration::from_millis(self.send_delay_ms)
    }

    /// Load configuration from TOML file
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| {
            ScanError::ConfigError(format!(
                "Failed to read config file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        let config: FingerprintConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load `~/.osprobe.toml` if present, defaults otherwise
    pub fn load_default_config() -> Self {
        let home_dir = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        let path = home_dir.join(".osprobe.toml");

        if path.exists() {
            if let Ok(config) = Self::from_toml_file(&path) {
                info!("Loaded config from {}", path.display());
                return config;
            }
        }

        Self::default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> crate::Result<()> {
        self.target_ip()?;

        if self.port == 0 {
            return Err(ScanError::ConfigError("Port must be in 1-65535".to_string()));
        }

        if self.probe_timeout_ms == 0 {
            return Err(ScanError::ConfigError(
                "Probe timeout must be greater than 0".to_string(),
            ));
        }

        if self.send_delay_ms >= self.probe_timeout_ms {
            return Err(ScanError::ConfigError(
                "Send delay must be shorter than the probe timeout".to_string(),
            ));
        }

        if self.top_matches == 0 {
            return Err(ScanError::ConfigError(
                "At least one match must be reported".to_string(),
            ));
        }

        Ok(())
    }
}
