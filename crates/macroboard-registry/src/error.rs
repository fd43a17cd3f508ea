//! Registry errors.

use macroboard_board::BoardError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("wait for device was cancelled")]
    Cancelled,

    #[error("source completed before a matching device was resolved")]
    DeviceNotResolved,

    #[error(transparent)]
    Board(#[from] BoardError),
}
