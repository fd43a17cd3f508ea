//! Per-connection handler on the host side.

use std::net::SocketAddr;
use std::sync::Arc;

use macroboard_board::{MacroBoard, MAX_BRIGHTNESS};
use macroboard_protocol::{Connection, Frame};
use macroboard_types::BoardEvent;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// Serves one client connection against a shared board.
///
/// Key events of the board are forwarded to the client while commands from
/// the client are applied to the board. The handler ends when either
/// direction fails, the client disconnects or `cancel` fires.
pub struct ClientHandler {
    board: Arc<dyn MacroBoard>,
    connection: Arc<Connection>,
    cancel: CancellationToken,
}

impl ClientHandler {
    pub fn new(
        board: Arc<dyn MacroBoard>,
        connection: Arc<Connection>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            board,
            connection,
            cancel,
        }
    }

    pub fn peer(&self) -> SocketAddr {
        self.connection.remote_address()
    }

    /// Run until the connection ends, then release the socket and the
    /// board event subscription.
    pub async fn run(self) {
        let peer = self.peer();
        let events = self.board.events();

        tokio::select! {
            () = self.cancel.cancelled() => debug!(peer = %peer, "handler cancelled"),
            () = forward_events(&self.connection, events) => {}
            () = apply_commands(self.board.as_ref(), &self.connection) => {}
        }

        self.connection.invalidate();
        info!(peer = %peer, "client disconnected");
    }
}

async fn forward_events(connection: &Connection, mut events: broadcast::Receiver<BoardEvent>) {
    loop {
        match events.recv().await {
            Ok(BoardEvent::Key(event)) => {
                let frame = Frame::KeyStateChange {
                    key: event.key,
                    is_down: event.is_down,
                };
                if let Err(e) = connection.send(&frame).await {
                    debug!(peer = %connection.remote_address(), error = %e, "key event not delivered");
                    return;
                }
            }
            Ok(BoardEvent::Connection(_)) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(peer = %connection.remote_address(), skipped, "dropped key events for slow client");
            }
            Err(broadcast::error::RecvError::Closed) => {
                // The board is gone; keep serving commands until the client leaves
                connection.closed().await;
                return;
            }
        }
    }
}

async fn apply_commands(board: &dyn MacroBoard, connection: &Connection) {
    loop {
        let frame = match connection.recv().await {
            Ok(Some(frame)) => frame,
            Ok(None) => return,
            Err(e) => {
                debug!(peer = %connection.remote_address(), error = %e, "read failed");
                return;
            }
        };
        trace!(peer = %connection.remote_address(), frame = ?frame, "command received");

        let result = match frame {
            Frame::SetKeyImage { key, image } => board.set_key_image(key, image).await,
            Frame::SetBrightness(percent) => board.set_brightness(percent.min(MAX_BRIGHTNESS)).await,
            Frame::ShowLogo => board.show_logo().await,
            Frame::KeyStateChange { .. } => {
                debug!(peer = %connection.remote_address(), "ignoring key event from client");
                Ok(())
            }
        };
        if let Err(e) = result {
            warn!(peer = %connection.remote_address(), error = %e, "board rejected command");
        }
    }
}
