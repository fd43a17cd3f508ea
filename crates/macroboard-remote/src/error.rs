//! Remote board errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("protocol error: {0}")]
    Protocol(#[from] macroboard_protocol::ProtocolError),

    #[error("discovery error: {0}")]
    Discovery(#[from] macroboard_discovery::DiscoveryError),

    #[error("board error: {0}")]
    Board(#[from] macroboard_board::BoardError),

    #[error(transparent)]
    Types(#[from] macroboard_types::TypesError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
