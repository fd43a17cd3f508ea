//! Validation and decoding errors for shared types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TypesError {
    #[error("invalid key bitmap: {0}")]
    InvalidBitmap(String),

    #[error("invalid key layout: {0}")]
    InvalidLayout(String),

    #[error("invalid device metadata: {0}")]
    Metadata(#[from] serde_json::Error),
}
