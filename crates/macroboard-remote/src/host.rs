//! Board host: exposes a local board to remote clients.
//!
//! The host accepts control connections on a TCP listener and advertises
//! that listener through a discovery [`Beacon`] whose payload is the board's
//! [`DeviceMetadata`]. Every accepted connection is served by its own
//! [`ClientHandler`] task against the shared board.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use macroboard_board::MacroBoard;
use macroboard_discovery::{Beacon, DiscoveryConfig};
use macroboard_protocol::Connection;
use macroboard_types::DeviceMetadata;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::RemoteError;
use crate::handler::ClientHandler;
use crate::BEACON_TYPE;

/// Pause after a failed accept before trying again.
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// How the host describes itself to listeners.
#[derive(Debug, Clone, Default)]
pub struct HostIdentity {
    pub device_name: String,
    pub serial_number: String,
    pub firmware_version: String,
}

impl HostIdentity {
    pub fn new(device_name: impl Into<String>) -> Self {
        Self {
            device_name: device_name.into(),
            ..Self::default()
        }
    }

    fn metadata(&self, board: &dyn MacroBoard) -> DeviceMetadata {
        let mut metadata = DeviceMetadata::new(self.device_name.clone(), board.keys());
        metadata.firmware_version.clone_from(&self.firmware_version);
        metadata.serial_number.clone_from(&self.serial_number);
        metadata
    }
}

type HandlerList = Arc<Mutex<Vec<JoinHandle<()>>>>;

/// Serves one board to any number of remote clients.
pub struct BoardHost {
    local_addr: SocketAddr,
    beacon: Beacon,
    cancel: CancellationToken,
    accept_task: Mutex<Option<JoinHandle<()>>>,
    handlers: HandlerList,
}

impl BoardHost {
    /// Listen on `bind` (port 0 lets the OS choose) and advertise the board
    /// through a beacon bound to `discovery.bind:discovery.port`.
    pub async fn start(
        board: Arc<dyn MacroBoard>,
        bind: SocketAddr,
        discovery: &DiscoveryConfig,
        identity: &HostIdentity,
    ) -> Result<Self, RemoteError> {
        let listener = TcpListener::bind(bind).await?;
        let local_addr = listener.local_addr()?;

        let payload = identity.metadata(board.as_ref()).to_json()?;
        let beacon = Beacon::start(
            BEACON_TYPE,
            local_addr.port(),
            SocketAddr::new(discovery.bind, discovery.port),
        )?;
        beacon.set_payload(payload)?;

        let cancel = CancellationToken::new();
        let handlers = HandlerList::default();
        let accept_task = tokio::spawn(accept_loop(
            listener,
            board,
            handlers.clone(),
            cancel.clone(),
        ));

        info!(
            addr = %local_addr,
            beacon = %beacon.local_addr(),
            name = %identity.device_name,
            "board host started"
        );

        Ok(Self {
            local_addr,
            beacon,
            cancel,
            accept_task: Mutex::new(Some(accept_task)),
            handlers,
        })
    }

    /// Address clients connect to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Address the discovery beacon is bound to.
    pub fn beacon_addr(&self) -> SocketAddr {
        self.beacon.local_addr()
    }

    /// Number of client handlers that are still running.
    pub fn active_clients(&self) -> usize {
        lock(&self.handlers)
            .iter()
            .filter(|h| !h.is_finished())
            .count()
    }

    /// Stop advertising, stop accepting and wait for every client handler.
    pub async fn shutdown(&self) {
        self.beacon.shutdown().await;
        self.cancel.cancel();

        let accept_task = lock(&self.accept_task).take();
        let Some(accept_task) = accept_task else {
            return;
        };
        if let Err(e) = accept_task.await {
            warn!(error = %e, "accept task failed");
        }

        let handlers = std::mem::take(&mut *lock(&self.handlers));
        let count = handlers.len();
        for handler in handlers {
            if let Err(e) = handler.await {
                warn!(error = %e, "client handler failed");
            }
        }
        info!(addr = %self.local_addr, handlers = count, "board host stopped");
    }
}

impl Drop for BoardHost {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn accept_loop(
    listener: TcpListener,
    board: Arc<dyn MacroBoard>,
    handlers: HandlerList,
    cancel: CancellationToken,
) {
    loop {
        let accepted = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            accepted = listener.accept() => accepted,
        };

        let stream = match accepted {
            Ok((stream, _)) => stream,
            Err(e) => {
                warn!(error = %e, "accept failed");
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    () = tokio::time::sleep(ACCEPT_RETRY_DELAY) => {}
                }
                continue;
            }
        };
        let connection = match Connection::from_stream(stream) {
            Ok(connection) => Arc::new(connection),
            Err(e) => {
                debug!(error = %e, "dropping accepted connection");
                continue;
            }
        };

        let handler = ClientHandler::new(board.clone(), connection, cancel.child_token());
        info!(peer = %handler.peer(), "client connected");
        add_handler(&handlers, tokio::spawn(handler.run()));
    }
    debug!("accept loop stopped");
}

/// Store `task`, reusing the slot of a finished handler when there is one.
fn add_handler(handlers: &Mutex<Vec<JoinHandle<()>>>, task: JoinHandle<()>) {
    let mut handlers = lock(handlers);
    match handlers.iter_mut().find(|h| h.is_finished()) {
        Some(slot) => *slot = task,
        None => handlers.push(task),
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn finished_handler_slots_are_reused() {
        let handlers = Mutex::new(Vec::new());
        let done = tokio::spawn(async {});
        done_wait(&done).await;
        add_handler(&handlers, done);

        let pending = tokio::spawn(std::future::pending::<()>());
        add_handler(&handlers, pending);
        assert_eq!(lock(&handlers).len(), 1);

        add_handler(&handlers, tokio::spawn(std::future::pending::<()>()));
        assert_eq!(lock(&handlers).len(), 2);

        for handler in lock(&handlers).drain(..) {
            handler.abort();
        }
    }

    async fn done_wait(handle: &JoinHandle<()>) {
        while !handle.is_finished() {
            tokio::task::yield_now().await;
        }
    }
}
