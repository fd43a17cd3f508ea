//! Board event types.

use serde::{Deserialize, Serialize};

/// A key was pressed or released.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyEvent {
    /// Row-major key index.
    pub key: u16,
    /// `true` when the key went down, `false` when it was released.
    pub is_down: bool,
}

impl KeyEvent {
    #[must_use]
    pub fn new(key: u16, is_down: bool) -> Self {
        Self { key, is_down }
    }
}

/// Events emitted by a board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BoardEvent {
    /// A key changed state.
    Key(KeyEvent),
    /// The board connection went up (`true`) or down (`false`).
    Connection(bool),
}
