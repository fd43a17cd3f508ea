//! UDP broadcast discovery for macroboard.
//!
//! A [`Beacon`] listens on the well-known discovery port and answers probes
//! for its beacon type with the TCP port it advertises and an opaque payload.
//! A [`Probe`] periodically broadcasts such probes, collects the answers and
//! publishes the sorted list of beacons that are still alive.

pub mod beacon;
pub mod config;
pub mod error;
pub mod probe;
mod socket;

pub use beacon::{build_response, Beacon};
pub use config::{DiscoveryConfig, DISCOVERY_PORT};
pub use error::DiscoveryError;
pub use probe::{BeaconLocation, Probe};
