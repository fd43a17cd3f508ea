//! Board contracts for macroboard.
//!
//! This crate defines the [`MacroBoard`] trait implemented by anything that
//! can show key images and report key presses (a local device, a console
//! stand-in or a remote proxy), and the [`DeviceReference`] trait used by
//! discovery sources to hand out boards that can be opened later.
//! Decorators compose by wrapping an `Arc<dyn MacroBoard>`.

use async_trait::async_trait;
use macroboard_types::{BoardEvent, GridKeyLayout, KeyBitmap};
use tokio::sync::broadcast;

pub mod error;
#[cfg(feature = "mock")]
pub mod mock;
pub mod reference;

pub use error::BoardError;
pub use reference::{DeviceId, DeviceReference};

/// Highest accepted brightness in percent.
pub const MAX_BRIGHTNESS: u8 = 100;

/// A grid of keys with displays.
///
/// Setters may be called concurrently from any task.
#[async_trait]
pub trait MacroBoard: Send + Sync {
    /// Layout of the board's keys.
    fn keys(&self) -> GridKeyLayout;

    /// Set the display brightness (0–100).
    async fn set_brightness(&self, percent: u8) -> Result<(), BoardError>;

    /// Show `image` on `key`, or clear the key when `image` is `None`.
    async fn set_key_image(&self, key: u16, image: Option<KeyBitmap>) -> Result<(), BoardError>;

    /// Show the board's idle logo.
    async fn show_logo(&self) -> Result<(), BoardError>;

    /// Subscribe to key and connection events.
    fn events(&self) -> broadcast::Receiver<BoardEvent>;

    /// Whether the board is currently reachable.
    fn is_connected(&self) -> bool {
        true
    }

    fn firmware_version(&self) -> String;

    fn serial_number(&self) -> String;

    /// Release the board. Further calls have no visible effect.
    async fn shutdown(&self) {}
}

/// Reject brightness values above [`MAX_BRIGHTNESS`].
pub fn validate_brightness(percent: u8) -> Result<(), BoardError> {
    if percent > MAX_BRIGHTNESS {
        return Err(BoardError::InvalidArgument(format!(
            "brightness {percent} exceeds {MAX_BRIGHTNESS}"
        )));
    }
    Ok(())
}

/// Reject key indices outside `layout`.
pub fn validate_key(layout: &GridKeyLayout, key: u16) -> Result<(), BoardError> {
    if !layout.contains(key) {
        return Err(BoardError::KeyOutOfRange {
            key,
            count: layout.count(),
        });
    }
    Ok(())
}
