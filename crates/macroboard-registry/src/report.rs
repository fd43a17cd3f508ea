//! Device state reports.

use std::sync::Arc;

use macroboard_board::DeviceReference;

/// One state transition of a device, as seen by one subscriber.
#[derive(Debug, Clone)]
pub struct DeviceStateReport {
    pub device: Arc<dyn DeviceReference>,
    pub connected: bool,
    /// `true` the first time this subscriber hears about the device.
    pub is_new_device: bool,
}

impl DeviceStateReport {
    pub fn new(device: Arc<dyn DeviceReference>, connected: bool, is_new_device: bool) -> Self {
        Self {
            device,
            connected,
            is_new_device,
        }
    }
}

/// A device a registry has seen, with its current connection state.
#[derive(Debug, Clone)]
pub struct KnownDevice {
    pub device: Arc<dyn DeviceReference>,
    pub connected: bool,
}
