//! Remote boards for macroboard.
//!
//! A [`BoardHost`] makes a local board available on the network: it accepts
//! control connections and advertises itself through a discovery beacon. On
//! the other side a [`BoardListener`] finds hosts and hands out
//! [`SocketDeviceReference`]s, which open into [`RemoteBoard`]s that behave
//! like local boards and reconnect on their own.

pub mod client;
pub mod config;
pub mod error;
pub mod handler;
pub mod host;
pub mod listener;
pub mod reference;
pub mod setup;
pub mod state;

pub use client::{ClientOptions, RemoteBoard};
pub use config::Config;
pub use error::RemoteError;
pub use handler::ClientHandler;
pub use host::{BoardHost, HostIdentity};
pub use listener::BoardListener;
pub use reference::SocketDeviceReference;
pub use state::{Backoff, ConnectionState};

/// Beacon type board hosts advertise themselves with.
pub const BEACON_TYPE: &str = "#Rm7M?";
