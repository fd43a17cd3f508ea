//! Device metadata carried as the discovery beacon payload.
//!
//! The record is serialized as compact JSON with deliberately short field
//! names, since it has to fit into a single UDP datagram:
//!
//! ```json
//! {"v":1,"name":"Desk","fwv":"1.0","sn":"abc","keys":{"x":5,"y":3,"s":72,"g":25}}
//! ```

use serde::{Deserialize, Serialize};

use crate::error::TypesError;
use crate::layout::GridKeyLayout;

/// Current metadata format version.
pub const META_VERSION: u32 = 1;

/// Metadata a board host advertises about itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceMetadata {
    /// Version of this record. Not checked yet.
    #[serde(rename = "v", default)]
    pub meta_version: u32,
    #[serde(rename = "name", default)]
    pub device_name: String,
    #[serde(rename = "fwv", default)]
    pub firmware_version: String,
    #[serde(rename = "sn", default)]
    pub serial_number: String,
    #[serde(rename = "keys")]
    pub keys: KeyDetails,
}

/// Key grid details inside [`DeviceMetadata`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyDetails {
    #[serde(rename = "x")]
    pub count_x: u16,
    #[serde(rename = "y")]
    pub count_y: u16,
    /// Key image size in pixels.
    #[serde(rename = "s")]
    pub key_size: u32,
    /// Gap between keys in pixels.
    #[serde(rename = "g")]
    pub gap_size: u32,
}

impl From<GridKeyLayout> for KeyDetails {
    fn from(layout: GridKeyLayout) -> Self {
        Self {
            count_x: layout.count_x(),
            count_y: layout.count_y(),
            key_size: layout.key_size(),
            gap_size: layout.gap_size(),
        }
    }
}

impl TryFrom<KeyDetails> for GridKeyLayout {
    type Error = TypesError;

    fn try_from(keys: KeyDetails) -> Result<Self, Self::Error> {
        GridKeyLayout::new(keys.count_x, keys.count_y, keys.key_size, keys.gap_size)
    }
}

impl DeviceMetadata {
    /// Build the metadata for a board named `device_name` with `layout`.
    pub fn new(device_name: impl Into<String>, layout: GridKeyLayout) -> Self {
        Self {
            meta_version: META_VERSION,
            device_name: device_name.into(),
            firmware_version: String::new(),
            serial_number: String::new(),
            keys: layout.into(),
        }
    }

    /// Serialize to the compact JSON beacon payload.
    pub fn to_json(&self) -> Result<String, TypesError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse a beacon payload.
    pub fn from_json(payload: &str) -> Result<Self, TypesError> {
        Ok(serde_json::from_str(payload)?)
    }

    /// The key layout described by this record.
    pub fn layout(&self) -> Result<GridKeyLayout, TypesError> {
        GridKeyLayout::try_from(self.keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_short_field_names() {
        let layout = GridKeyLayout::new(5, 3, 72, 25).unwrap();
        let mut meta = DeviceMetadata::new("Desk", layout);
        meta.serial_number = "abc".to_string();
        let json = meta.to_json().unwrap();
        assert_eq!(
            json,
            r#"{"v":1,"name":"Desk","fwv":"","sn":"abc","keys":{"x":5,"y":3,"s":72,"g":25}}"#
        );
    }

    #[test]
    fn parses_payload_and_layout() {
        let meta = DeviceMetadata::from_json(
            r#"{"v":1,"name":"Virtual","keys":{"x":8,"y":4,"s":96,"g":10}}"#,
        )
        .unwrap();
        assert_eq!(meta.device_name, "Virtual");
        assert!(meta.firmware_version.is_empty());
        let layout = meta.layout().unwrap();
        assert_eq!(layout.count(), 32);
        assert_eq!(layout.key_size(), 96);
    }

    #[test]
    fn malformed_payloads_are_errors() {
        assert!(DeviceMetadata::from_json("not json").is_err());
        assert!(DeviceMetadata::from_json(r#"{"v":1,"name":"x"}"#).is_err());
        assert!(DeviceMetadata::from_json(
            r#"{"name":"x","keys":{"x":-1,"y":3,"s":72,"g":25}}"#
        )
        .is_err());
    }

    #[test]
    fn zero_key_counts_parse_but_have_no_layout() {
        let meta =
            DeviceMetadata::from_json(r#"{"name":"x","keys":{"x":0,"y":3,"s":72,"g":25}}"#)
                .unwrap();
        assert!(meta.layout().is_err());
    }

    #[test]
    fn oversized_key_geometry_has_no_layout() {
        for payload in [
            r#"{"v":1,"name":"x","keys":{"x":5,"y":3,"s":72,"g":4294967295}}"#,
            r#"{"v":1,"name":"x","keys":{"x":5,"y":3,"s":4000000000,"g":25}}"#,
        ] {
            let meta = DeviceMetadata::from_json(payload).unwrap();
            assert!(meta.layout().is_err(), "{payload}");
        }
    }
}
