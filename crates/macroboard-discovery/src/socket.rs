//! Discovery socket setup.

use std::net::SocketAddr;

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;

use crate::error::DiscoveryError;

/// Bind a broadcast-capable UDP socket with `SO_REUSEADDR`, so several
/// beacons and probes on one machine can share the discovery port.
pub(crate) fn bind_udp(addr: SocketAddr) -> Result<UdpSocket, DiscoveryError> {
    let bind_err = |source| DiscoveryError::Bind { addr, source };

    let socket =
        Socket::new(Domain::for_address(addr), Type::DGRAM, Some(Protocol::UDP)).map_err(bind_err)?;
    socket.set_reuse_address(true).map_err(bind_err)?;
    socket.set_broadcast(true).map_err(bind_err)?;
    socket.set_nonblocking(true).map_err(bind_err)?;
    socket.bind(&addr.into()).map_err(bind_err)?;

    Ok(UdpSocket::from_std(socket.into())?)
}
