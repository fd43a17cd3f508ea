//! Protocol and connection errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    #[error("string of {0} bytes does not fit a 16-bit length prefix")]
    StringTooLong(usize),

    #[error("image of {0} bytes exceeds the frame limit")]
    FrameTooLarge(usize),

    #[error("connection lost")]
    ConnectionLost,

    #[error("shutdown requested")]
    Shutdown,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ProtocolError {
    /// Whether the error means the underlying stream is no longer usable.
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Self::ConnectionLost | Self::Io(_))
    }
}
