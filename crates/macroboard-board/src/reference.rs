//! Device references handed out by discovery sources.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use macroboard_types::GridKeyLayout;

use crate::error::BoardError;
use crate::MacroBoard;

/// Stable identity of a device.
///
/// Two references denote the same device exactly when their ids are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A board that is known but not necessarily open.
#[async_trait]
pub trait DeviceReference: Send + Sync + fmt::Debug {
    fn id(&self) -> DeviceId;

    /// Human-readable device name.
    fn name(&self) -> &str;

    fn keys(&self) -> GridKeyLayout;

    /// Open a live connection to the board.
    async fn open(&self) -> Result<Arc<dyn MacroBoard>, BoardError>;
}
