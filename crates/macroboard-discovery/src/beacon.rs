//! Discovery announcer.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex, RwLock};

use macroboard_protocol::wire::{encode_string, has_prefix};
use macroboard_protocol::ProtocolError;
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::error::DiscoveryError;
use crate::socket::bind_udp;

/// Largest probe datagram a beacon reads.
const MAX_PROBE_SIZE: usize = 1024;

/// Build the answer to a probe:
/// `encode(beacon_type) ++ u16_be(advertised_port) ++ encode(payload)`.
pub fn build_response(
    beacon_type: &str,
    advertised_port: u16,
    payload: &str,
) -> Result<Vec<u8>, ProtocolError> {
    let mut response = encode_string(beacon_type)?;
    response.extend_from_slice(&advertised_port.to_be_bytes());
    response.extend(encode_string(payload)?);
    Ok(response)
}

/// Answers discovery probes for one beacon type.
pub struct Beacon {
    beacon_type: String,
    advertised_port: u16,
    payload: Arc<RwLock<String>>,
    local_addr: SocketAddr,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Beacon {
    /// Bind `bind` and start answering probes for `beacon_type` with
    /// `advertised_port` and an empty payload.
    pub fn start(
        beacon_type: impl Into<String>,
        advertised_port: u16,
        bind: SocketAddr,
    ) -> Result<Self, DiscoveryError> {
        let beacon_type = beacon_type.into();
        let prefix = encode_string(&beacon_type)?;
        let socket = bind_udp(bind)?;
        let local_addr = socket.local_addr()?;

        let payload = Arc::new(RwLock::new(String::new()));
        let cancel = CancellationToken::new();

        let task = tokio::spawn(receive_loop(
            socket,
            beacon_type.clone(),
            prefix,
            advertised_port,
            payload.clone(),
            cancel.clone(),
        ));

        info!(addr = %local_addr, beacon_type = %beacon_type, advertised_port, "beacon started");

        Ok(Self {
            beacon_type,
            advertised_port,
            payload,
            local_addr,
            cancel,
            task: Mutex::new(Some(task)),
        })
    }

    pub fn beacon_type(&self) -> &str {
        &self.beacon_type
    }

    pub fn advertised_port(&self) -> u16 {
        self.advertised_port
    }

    /// Address the beacon socket is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Replace the payload sent with future responses.
    pub fn set_payload(&self, payload: impl Into<String>) -> Result<(), DiscoveryError> {
        let payload = payload.into();
        // A payload that cannot be encoded would make every response fail
        encode_string(&payload)?;
        *self.payload.write().unwrap_or_else(|e| e.into_inner()) = payload;
        Ok(())
    }

    pub fn payload(&self) -> String {
        self.payload
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Stop answering probes and wait for the receive task to exit.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let task = self.task.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!(error = %e, "beacon task failed");
            }
            info!(addr = %self.local_addr, "beacon stopped");
        }
    }
}

impl Drop for Beacon {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn receive_loop(
    socket: UdpSocket,
    beacon_type: String,
    prefix: Vec<u8>,
    advertised_port: u16,
    payload: Arc<RwLock<String>>,
    cancel: CancellationToken,
) {
    let mut buf = [0u8; MAX_PROBE_SIZE];
    loop {
        let (len, from) = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            result = socket.recv_from(&mut buf) => match result {
                Ok(received) => received,
                Err(e) if e.kind() == std::io::ErrorKind::ConnectionReset => continue,
                Err(e) => {
                    warn!(error = %e, "beacon receive failed");
                    break;
                }
            },
        };

        if !has_prefix(&buf[..len], &prefix) {
            trace!(from = %from, len, "ignoring foreign datagram");
            continue;
        }

        let current = payload.read().unwrap_or_else(|e| e.into_inner()).clone();
        let response = match build_response(&beacon_type, advertised_port, &current) {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "cannot encode beacon response");
                continue;
            }
        };

        match socket.send_to(&response, from).await {
            Ok(_) => debug!(to = %from, "answered probe"),
            Err(e) => debug!(to = %from, error = %e, "failed to answer probe"),
        }
    }
}
