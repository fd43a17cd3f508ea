//! Discovery prober.

use std::cmp::Ordering;
use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use macroboard_protocol::wire::{decode_string, encode_string, has_prefix};
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::config::DiscoveryConfig;
use crate::error::DiscoveryError;
use crate::socket::bind_udp;

/// Largest beacon response a probe reads.
const MAX_RESPONSE_SIZE: usize = 64 * 1024;

/// A beacon that answered a probe.
///
/// Two locations are equal when their addresses are equal, whatever their
/// payloads.
#[derive(Debug, Clone)]
pub struct BeaconLocation {
    /// Beacon host IP and the port it advertises.
    pub address: SocketAddr,
    /// Opaque payload sent by the beacon.
    pub data: String,
    /// When the beacon last answered.
    pub last_advertised: Instant,
}

impl BeaconLocation {
    pub fn new(address: SocketAddr, data: impl Into<String>, last_advertised: Instant) -> Self {
        Self {
            address,
            data: data.into(),
            last_advertised,
        }
    }
}

impl PartialEq for BeaconLocation {
    fn eq(&self, other: &Self) -> bool {
        self.address == other.address
    }
}

impl Eq for BeaconLocation {}

impl std::hash::Hash for BeaconLocation {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.address.hash(state);
    }
}

/// Sort beacons by payload, then by address (IPv4 before IPv6, then by
/// octets, then by port).
pub fn sort_beacons(beacons: &mut [BeaconLocation]) {
    beacons.sort_by(|a, b| {
        a.data
            .cmp(&b.data)
            .then_with(|| compare_addresses(&a.address, &b.address))
    });
}

fn compare_addresses(a: &SocketAddr, b: &SocketAddr) -> Ordering {
    let ip_order = match (a.ip(), b.ip()) {
        (IpAddr::V4(a), IpAddr::V4(b)) => a.octets().cmp(&b.octets()),
        (IpAddr::V6(a), IpAddr::V6(b)) => a.octets().cmp(&b.octets()),
        (IpAddr::V4(_), IpAddr::V6(_)) => Ordering::Less,
        (IpAddr::V6(_), IpAddr::V4(_)) => Ordering::Greater,
    };
    ip_order.then_with(|| a.port().cmp(&b.port()))
}

/// Insert `beacon`, replacing any entry with the same address, and re-sort.
pub fn upsert_beacon(beacons: &mut Vec<BeaconLocation>, beacon: BeaconLocation) {
    beacons.retain(|b| *b != beacon);
    beacons.push(beacon);
    sort_beacons(beacons);
}

/// Remove beacons last advertised more than `timeout` before `now`.
///
/// Returns whether anything was removed.
pub fn prune_stale(beacons: &mut Vec<BeaconLocation>, now: Instant, timeout: Duration) -> bool {
    let before = beacons.len();
    beacons.retain(|b| now.saturating_duration_since(b.last_advertised) <= timeout);
    beacons.len() != before
}

/// Parse a beacon response that starts with `prefix`.
///
/// Returns the advertised port and the payload.
pub fn parse_response(datagram: &[u8], prefix: &[u8]) -> Option<(u16, String)> {
    if !has_prefix(datagram, prefix) {
        return None;
    }
    let rest = &datagram[prefix.len()..];
    let port = u16::from_be_bytes([*rest.first()?, *rest.get(1)?]);
    let (payload, _) = decode_string(&rest[2..]).ok()?;
    Some((port, payload))
}

/// Periodically broadcasts probes and tracks the beacons that answer.
///
/// The current sorted beacon list is published through a
/// [`watch`] channel; subscribers always see the full list and never slow
/// down the probe.
pub struct Probe {
    beacon_type: String,
    beacons: Arc<watch::Sender<Vec<BeaconLocation>>>,
    local_addr: SocketAddr,
    cancel: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Probe {
    /// Bind an ephemeral port on `config.bind` and start probing for
    /// `beacon_type`.
    pub fn start(
        beacon_type: impl Into<String>,
        config: &DiscoveryConfig,
    ) -> Result<Self, DiscoveryError> {
        let beacon_type = beacon_type.into();
        let prefix = encode_string(&beacon_type)?;
        let socket = Arc::new(bind_udp(SocketAddr::new(config.bind, 0))?);
        let local_addr = socket.local_addr()?;

        let (beacons, _) = watch::channel(Vec::new());
        let beacons = Arc::new(beacons);
        let cancel = CancellationToken::new();

        let target = SocketAddr::new(config.broadcast, config.port);
        let broadcast = tokio::spawn(broadcast_loop(
            socket.clone(),
            prefix.clone(),
            target,
            config.probe_interval,
            config.beacon_timeout,
            beacons.clone(),
            cancel.clone(),
        ));
        let receive = tokio::spawn(receive_loop(
            socket,
            prefix,
            beacons.clone(),
            cancel.clone(),
        ));

        info!(addr = %local_addr, target = %target, beacon_type = %beacon_type, "probe started");

        Ok(Self {
            beacon_type,
            beacons,
            local_addr,
            cancel,
            tasks: Mutex::new(vec![broadcast, receive]),
        })
    }

    pub fn beacon_type(&self) -> &str {
        &self.beacon_type
    }

    /// Address the probe socket is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Receive every published beacon list from now on.
    pub fn subscribe(&self) -> watch::Receiver<Vec<BeaconLocation>> {
        self.beacons.subscribe()
    }

    /// The most recently published beacon list.
    pub fn beacons(&self) -> Vec<BeaconLocation> {
        self.beacons.borrow().clone()
    }

    /// Stop probing and wait for both tasks to exit.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let tasks = std::mem::take(&mut *self.tasks.lock().unwrap_or_else(|e| e.into_inner()));
        if tasks.is_empty() {
            return;
        }
        for task in tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "probe task failed");
            }
        }
        info!(addr = %self.local_addr, "probe stopped");
    }
}

impl Drop for Probe {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn broadcast_loop(
    socket: Arc<UdpSocket>,
    probe: Vec<u8>,
    target: SocketAddr,
    interval: Duration,
    timeout: Duration,
    beacons: Arc<watch::Sender<Vec<BeaconLocation>>>,
    cancel: CancellationToken,
) {
    loop {
        match socket.send_to(&probe, target).await {
            Ok(_) => trace!(target = %target, "probe sent"),
            Err(e) => debug!(target = %target, error = %e, "failed to send probe"),
        }

        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(interval) => {}
        }

        let now = Instant::now();
        let pruned = beacons.send_if_modified(|list| prune_stale(list, now, timeout));
        if pruned {
            debug!(remaining = beacons.borrow().len(), "pruned stale beacons");
        }
    }
}

async fn receive_loop(
    socket: Arc<UdpSocket>,
    prefix: Vec<u8>,
    beacons: Arc<watch::Sender<Vec<BeaconLocation>>>,
    cancel: CancellationToken,
) {
    let mut buf = vec![0u8; MAX_RESPONSE_SIZE];
    loop {
        let (len, from) = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            result = socket.recv_from(&mut buf) => match result {
                Ok(received) => received,
                // ICMP unreachable from a vanished beacon surfaces here on some platforms
                Err(e) if matches!(
                    e.kind(),
                    std::io::ErrorKind::ConnectionReset | std::io::ErrorKind::ConnectionRefused
                ) => continue,
                Err(e) => {
                    warn!(error = %e, "probe receive failed");
                    break;
                }
            },
        };

        let Some((port, payload)) = parse_response(&buf[..len], &prefix) else {
            debug!(from = %from, len, "dropping unrecognised response");
            continue;
        };

        let location = BeaconLocation::new(SocketAddr::new(from.ip(), port), payload, Instant::now());
        trace!(addr = %location.address, "beacon answered");
        beacons.send_modify(|list| upsert_beacon(list, location));
    }
}
