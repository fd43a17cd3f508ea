//! Device registry for macroboard.
//!
//! A [`DeviceRegistry`] keeps an append-only list of every device any source
//! ever reported, together with its last known connection state, and hands
//! each subscriber exactly the state transitions it has not seen yet.
//! [`DeviceContext`] merges several [`DeviceStateSource`]s into one registry;
//! [`wait_for_device`] and [`open_device`] resolve a device from any source.

pub mod context;
pub mod error;
pub mod registry;
pub mod report;
pub mod source;
pub mod wait;

pub use context::DeviceContext;
pub use error::RegistryError;
pub use registry::{DeviceRegistry, MergedRegistry};
pub use report::{DeviceStateReport, KnownDevice};
pub use source::{DeviceStateObserver, DeviceStateSource, Subscription};
pub use wait::{open_device, wait_for_device};
