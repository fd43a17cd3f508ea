//! Wire codec and control connection for macroboard.
//!
//! This crate contains the two binary formats spoken by macroboard peers:
//! the length-prefixed strings used by UDP discovery ([`wire`]) and the
//! tagged control frames exchanged over TCP ([`frame`]). [`Connection`]
//! wraps a single TCP stream and frames it in both directions.

pub mod connection;
pub mod error;
pub mod frame;
pub mod wire;

pub use connection::{Connection, FrameReceiver, FrameSender};
pub use error::ProtocolError;
pub use frame::{read_frame, Frame, MAX_IMAGE_BYTES};
