//! Shared types for macroboard.
//!
//! This crate contains the value types shared across the macroboard
//! workspace: key grid layouts, key bitmaps, board events and the metadata
//! record carried inside discovery beacons.

pub mod bitmap;
pub mod error;
pub mod event;
pub mod layout;
pub mod metadata;

pub use bitmap::{KeyBitmap, BYTES_PER_PIXEL};
pub use error::TypesError;
pub use event::{BoardEvent, KeyEvent};
pub use layout::{GridKeyLayout, KeyRect};
pub use metadata::{DeviceMetadata, KeyDetails, META_VERSION};
