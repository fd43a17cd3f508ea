//! Discovery runtime settings.

use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

/// Well-known UDP port beacons listen on.
pub const DISCOVERY_PORT: u16 = 35891;

/// Settings shared by beacons and probes.
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// UDP port beacons bind and probes broadcast to.
    pub port: u16,
    /// Local address the discovery sockets bind to.
    pub bind: IpAddr,
    /// Destination address for probe broadcasts.
    pub broadcast: IpAddr,
    /// Period between two probe broadcasts.
    pub probe_interval: Duration,
    /// Beacons not heard from for longer than this are dropped.
    pub beacon_timeout: Duration,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            port: DISCOVERY_PORT,
            bind: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            broadcast: IpAddr::V4(Ipv4Addr::BROADCAST),
            probe_interval: Duration::from_secs(2),
            beacon_timeout: Duration::from_secs(5),
        }
    }
}
