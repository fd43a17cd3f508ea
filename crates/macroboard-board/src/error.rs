//! Board errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BoardError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("key {key} out of range, board has {count} keys")]
    KeyOutOfRange { key: u16, count: usize },
}
