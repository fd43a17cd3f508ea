//! Device references for discovered board hosts.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use macroboard_board::{BoardError, DeviceId, DeviceReference, MacroBoard};
use macroboard_types::{DeviceMetadata, GridKeyLayout};

use crate::client::{ClientOptions, RemoteBoard};

/// A board host found on the network.
///
/// The id is derived from the endpoint, so two references to the same host
/// address denote the same device regardless of who created them.
#[derive(Debug, Clone)]
pub struct SocketDeviceReference {
    id: DeviceId,
    name: String,
    endpoint: SocketAddr,
    layout: GridKeyLayout,
    firmware_version: String,
    serial_number: String,
    options: ClientOptions,
}

impl SocketDeviceReference {
    pub fn new(
        name: impl Into<String>,
        endpoint: SocketAddr,
        layout: GridKeyLayout,
        options: ClientOptions,
    ) -> Self {
        Self {
            id: DeviceId::new(format!("tcp://{endpoint}")),
            name: name.into(),
            endpoint,
            layout,
            firmware_version: String::new(),
            serial_number: String::new(),
            options,
        }
    }

    /// Build a reference from an advertised metadata record.
    pub fn from_metadata(
        metadata: &DeviceMetadata,
        endpoint: SocketAddr,
        options: ClientOptions,
    ) -> Result<Self, macroboard_types::TypesError> {
        let mut reference = Self::new(metadata.device_name.clone(), endpoint, metadata.layout()?, options);
        reference.firmware_version.clone_from(&metadata.firmware_version);
        reference.serial_number.clone_from(&metadata.serial_number);
        Ok(reference)
    }

    pub fn endpoint(&self) -> SocketAddr {
        self.endpoint
    }

    /// Firmware version the host advertised, possibly empty.
    pub fn firmware_version(&self) -> &str {
        &self.firmware_version
    }

    /// Serial number the host advertised, possibly empty.
    pub fn serial_number(&self) -> &str {
        &self.serial_number
    }
}

#[async_trait]
impl DeviceReference for SocketDeviceReference {
    fn id(&self) -> DeviceId {
        self.id.clone()
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn keys(&self) -> GridKeyLayout {
        self.layout
    }

    async fn open(&self) -> Result<Arc<dyn MacroBoard>, BoardError> {
        Ok(Arc::new(RemoteBoard::new(
            self.endpoint,
            self.layout,
            self.options.clone(),
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> GridKeyLayout {
        GridKeyLayout::new(5, 3, 72, 25).unwrap()
    }

    #[test]
    fn id_is_derived_from_endpoint() {
        let endpoint: SocketAddr = "192.168.1.20:5000".parse().unwrap();
        let a = SocketDeviceReference::new("A", endpoint, layout(), ClientOptions::default());
        let b = SocketDeviceReference::new("renamed", endpoint, layout(), ClientOptions::default());
        assert_eq!(a.id().as_str(), "tcp://192.168.1.20:5000");
        assert_eq!(a.id(), b.id());
    }

    #[test]
    fn metadata_fields_are_carried_over() {
        let mut metadata = DeviceMetadata::new("Desk", layout());
        metadata.firmware_version = "2.1".to_string();
        metadata.serial_number = "SN42".to_string();

        let endpoint: SocketAddr = "10.0.0.2:4000".parse().unwrap();
        let reference =
            SocketDeviceReference::from_metadata(&metadata, endpoint, ClientOptions::default())
                .unwrap();
        assert_eq!(reference.name(), "Desk");
        assert_eq!(reference.keys().count(), 15);
        assert_eq!(reference.firmware_version(), "2.1");
        assert_eq!(reference.serial_number(), "SN42");
        assert_eq!(reference.endpoint(), endpoint);
    }

    #[tokio::test]
    async fn open_returns_disconnected_remote_board() {
        // Nothing listens on the discard port, so the board stays disconnected
        let endpoint: SocketAddr = "127.0.0.1:9".parse().unwrap();
        let reference = SocketDeviceReference::new("A", endpoint, layout(), ClientOptions::default());
        let board = reference.open().await.unwrap();
        assert_eq!(board.keys().count(), 15);
        assert!(!board.is_connected());
        assert_eq!(board.serial_number(), "");
        board.shutdown().await;
    }
}
