//! Discovery subsystem errors.

use macroboard_protocol::ProtocolError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("failed to bind discovery socket on {addr}: {source}")]
    Bind {
        addr: std::net::SocketAddr,
        source: std::io::Error,
    },

    #[error("invalid beacon string: {0}")]
    Encoding(#[from] ProtocolError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
