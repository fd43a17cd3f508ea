//! Configuration loaded from TOML.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use macroboard_discovery::{DiscoveryConfig, DISCOVERY_PORT};
use macroboard_types::GridKeyLayout;
use serde::{Deserialize, Serialize};

use crate::client::ClientOptions;
use crate::error::RemoteError;

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub discovery: DiscoverySettings,
    #[serde(default)]
    pub host: HostConfig,
    #[serde(default)]
    pub layout: LayoutConfig,
    #[serde(default)]
    pub client: ClientConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            discovery: DiscoverySettings::default(),
            host: HostConfig::default(),
            layout: LayoutConfig::default(),
            client: ClientConfig::default(),
        }
    }
}

/// UDP discovery settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoverySettings {
    #[serde(default = "default_discovery_port")]
    pub port: u16,
    #[serde(default = "default_discovery_bind")]
    pub bind: String,
    #[serde(default = "default_broadcast")]
    pub broadcast: String,
    #[serde(default = "default_probe_interval_ms")]
    pub probe_interval_ms: u64,
    #[serde(default = "default_beacon_timeout_ms")]
    pub beacon_timeout_ms: u64,
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            port: default_discovery_port(),
            bind: default_discovery_bind(),
            broadcast: default_broadcast(),
            probe_interval_ms: default_probe_interval_ms(),
            beacon_timeout_ms: default_beacon_timeout_ms(),
        }
    }
}

impl DiscoverySettings {
    pub fn to_discovery_config(&self) -> Result<DiscoveryConfig, RemoteError> {
        Ok(DiscoveryConfig {
            port: self.port,
            bind: parse_ip("discovery.bind", &self.bind)?,
            broadcast: parse_ip("discovery.broadcast", &self.broadcast)?,
            probe_interval: positive_millis("discovery.probe_interval_ms", self.probe_interval_ms)?,
            beacon_timeout: positive_millis("discovery.beacon_timeout_ms", self.beacon_timeout_ms)?,
        })
    }
}

/// Board host settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostConfig {
    #[serde(default = "default_host_bind")]
    pub bind: String,
    /// TCP port for control connections, 0 lets the OS choose.
    #[serde(default)]
    pub port: u16,
    #[serde(default = "default_device_name")]
    pub device_name: String,
    /// Generated on startup when empty.
    #[serde(default)]
    pub serial_number: String,
    #[serde(default = "default_firmware_version")]
    pub firmware_version: String,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            bind: default_host_bind(),
            port: 0,
            device_name: default_device_name(),
            serial_number: String::new(),
            firmware_version: default_firmware_version(),
        }
    }
}

impl HostConfig {
    pub fn bind_addr(&self) -> Result<SocketAddr, RemoteError> {
        Ok(SocketAddr::new(parse_ip("host.bind", &self.bind)?, self.port))
    }
}

/// Key layout of a hosted console board.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayoutConfig {
    #[serde(default = "default_keys_x")]
    pub keys_x: u16,
    #[serde(default = "default_keys_y")]
    pub keys_y: u16,
    #[serde(default = "default_key_size")]
    pub key_size: u32,
    #[serde(default = "default_key_gap")]
    pub key_gap: u32,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            keys_x: default_keys_x(),
            keys_y: default_keys_y(),
            key_size: default_key_size(),
            key_gap: default_key_gap(),
        }
    }
}

impl LayoutConfig {
    pub fn to_layout(&self) -> Result<GridKeyLayout, RemoteError> {
        Ok(GridKeyLayout::new(
            self.keys_x,
            self.keys_y,
            self.key_size,
            self.key_gap,
        )?)
    }
}

/// Remote board client timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default = "default_reconnect_pause_ms")]
    pub reconnect_pause_ms: u64,
    #[serde(default = "default_backoff_start_ms")]
    pub backoff_start_ms: u64,
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            reconnect_pause_ms: default_reconnect_pause_ms(),
            backoff_start_ms: default_backoff_start_ms(),
            backoff_max_ms: default_backoff_max_ms(),
        }
    }
}

impl ClientConfig {
    pub fn to_options(&self) -> ClientOptions {
        ClientOptions {
            reconnect_pause: Duration::from_millis(self.reconnect_pause_ms),
            backoff_start: Duration::from_millis(self.backoff_start_ms),
            backoff_max: Duration::from_millis(self.backoff_max_ms),
        }
    }
}

fn parse_ip(field: &str, value: &str) -> Result<IpAddr, RemoteError> {
    value
        .parse()
        .map_err(|e| RemoteError::Config(format!("invalid {field} address {value:?}: {e}")))
}

fn positive_millis(field: &str, value: u64) -> Result<Duration, RemoteError> {
    if value == 0 {
        return Err(RemoteError::Config(format!("{field} must be greater than zero")));
    }
    Ok(Duration::from_millis(value))
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_discovery_port() -> u16 {
    DISCOVERY_PORT
}

fn default_discovery_bind() -> String {
    "0.0.0.0".to_string()
}

fn default_broadcast() -> String {
    "255.255.255.255".to_string()
}

fn default_probe_interval_ms() -> u64 {
    2000
}

fn default_beacon_timeout_ms() -> u64 {
    5000
}

fn default_host_bind() -> String {
    "127.0.0.1".to_string()
}

fn default_device_name() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "macroboard".to_string())
}

fn default_firmware_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

fn default_keys_x() -> u16 {
    5
}

fn default_keys_y() -> u16 {
    3
}

fn default_key_size() -> u32 {
    72
}

fn default_key_gap() -> u32 {
    25
}

fn default_reconnect_pause_ms() -> u64 {
    500
}

fn default_backoff_start_ms() -> u64 {
    250
}

fn default_backoff_max_ms() -> u64 {
    10_000
}
