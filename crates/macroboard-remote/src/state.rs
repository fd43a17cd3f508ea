//! Client connection state and reconnect backoff.

use std::time::Duration;

/// State of a remote board connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No usable socket.
    Disconnected,
    /// Dialing the host.
    Connecting,
    /// Socket established.
    Connected,
}

impl ConnectionState {
    pub fn is_connected(self) -> bool {
        self == Self::Connected
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected => write!(f, "Connected"),
        }
    }
}

/// Exponential backoff between failed flushes.
///
/// The delay starts at `start`, doubles after every failure and never
/// exceeds `max`. Only [`reset`](Self::reset) brings it back to `start`.
#[derive(Debug, Clone)]
pub struct Backoff {
    start: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(start: Duration, max: Duration) -> Self {
        let start = start.min(max);
        Self {
            start,
            max,
            current: start,
        }
    }

    /// The delay to wait now.
    pub fn current(&self) -> Duration {
        self.current
    }

    /// Double the delay, up to the cap.
    pub fn increase(&mut self) {
        self.current = self.current.saturating_mul(2).min(self.max);
    }

    pub fn reset(&mut self) {
        self.current = self.start;
    }
}
