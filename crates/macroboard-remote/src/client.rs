//! Remote board client.
//!
//! [`RemoteBoard`] implements [`MacroBoard`] on top of a TCP connection to a
//! [`BoardHost`](crate::host::BoardHost). Setters never touch the network:
//! they overwrite a pending slot (brightness, one slot per key, the logo
//! flag) and wake the write loop, which sends whatever is pending once a
//! connection is available. A separate read loop turns key events from the
//! host into [`BoardEvent`]s. Both loops reconnect on their own.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use macroboard_board::{validate_brightness, validate_key, BoardError, MacroBoard};
use macroboard_protocol::{Connection, Frame, ProtocolError, MAX_IMAGE_BYTES};
use macroboard_types::{BoardEvent, GridKeyLayout, KeyBitmap, KeyEvent};
use tokio::sync::{broadcast, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::state::{Backoff, ConnectionState};

/// Client timing settings.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Pause between two failed dial attempts.
    pub reconnect_pause: Duration,
    /// First backoff delay after a failed flush.
    pub backoff_start: Duration,
    /// Backoff cap.
    pub backoff_max: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            reconnect_pause: Duration::from_millis(500),
            backoff_start: Duration::from_millis(250),
            backoff_max: Duration::from_secs(10),
        }
    }
}

struct PendingBrightness {
    value: u8,
    requested: bool,
}

#[derive(Default)]
struct KeySlot {
    image: Option<KeyBitmap>,
    /// Bumped on every write so a flush only clears what it actually sent.
    version: u64,
    requested: bool,
}

impl KeySlot {
    fn arm(&mut self, image: Option<KeyBitmap>) {
        self.image = image;
        self.version = self.version.wrapping_add(1);
        self.requested = true;
    }

    /// The image to send and the write it belongs to, if armed.
    fn pending(&self) -> Option<(Option<KeyBitmap>, u64)> {
        self.requested.then(|| (self.image.clone(), self.version))
    }

    /// Disarm, unless the slot was written again after `version` was taken.
    fn mark_sent(&mut self, version: u64) {
        if self.version == version {
            self.requested = false;
        }
    }
}

struct Shared {
    endpoint: SocketAddr,
    layout: GridKeyLayout,
    options: ClientOptions,
    cancel: CancellationToken,
    trigger: Notify,
    brightness: Mutex<PendingBrightness>,
    keys: Vec<Mutex<KeySlot>>,
    show_logo: AtomicBool,
    /// Current connection; the async lock makes reconnects exclusive.
    connection: tokio::sync::Mutex<Option<Arc<Connection>>>,
    state: Mutex<ConnectionState>,
    events: broadcast::Sender<BoardEvent>,
}

/// A board reached over the network.
pub struct RemoteBoard {
    shared: Arc<Shared>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl RemoteBoard {
    /// Start the read and write loops for the host at `endpoint`.
    ///
    /// Returns immediately; the first connection is made in the background.
    pub fn new(endpoint: SocketAddr, layout: GridKeyLayout, options: ClientOptions) -> Self {
        let shared = Arc::new(Shared::new(endpoint, layout, options));

        let write = tokio::spawn(write_loop(shared.clone()));
        let read = tokio::spawn(read_loop(shared.clone()));
        info!(endpoint = %endpoint, keys = shared.keys.len(), "remote board started");

        Self {
            shared,
            tasks: Mutex::new(vec![write, read]),
        }
    }

    pub fn endpoint(&self) -> SocketAddr {
        self.shared.endpoint
    }

    pub fn connection_state(&self) -> ConnectionState {
        *lock(&self.shared.state)
    }
}

#[async_trait]
impl MacroBoard for RemoteBoard {
    fn keys(&self) -> GridKeyLayout {
        self.shared.layout
    }

    async fn set_brightness(&self, percent: u8) -> Result<(), BoardError> {
        validate_brightness(percent)?;
        {
            let mut brightness = lock(&self.shared.brightness);
            brightness.value = percent;
            brightness.requested = true;
        }
        self.shared.trigger.notify_one();
        Ok(())
    }

    async fn set_key_image(&self, key: u16, image: Option<KeyBitmap>) -> Result<(), BoardError> {
        validate_key(&self.shared.layout, key)?;
        if let Some(image) = &image {
            if image.as_bytes().len() > MAX_IMAGE_BYTES {
                return Err(BoardError::InvalidArgument(format!(
                    "image of {} bytes exceeds {MAX_IMAGE_BYTES}",
                    image.as_bytes().len()
                )));
            }
        }
        let slot = self
            .shared
            .keys
            .get(usize::from(key))
            .ok_or(BoardError::KeyOutOfRange {
                key,
                count: self.shared.keys.len(),
            })?;
        lock(slot).arm(image);
        self.shared.trigger.notify_one();
        Ok(())
    }

    async fn show_logo(&self) -> Result<(), BoardError> {
        self.shared.show_logo.store(true, Ordering::SeqCst);
        self.shared.trigger.notify_one();
        Ok(())
    }

    fn events(&self) -> broadcast::Receiver<BoardEvent> {
        self.shared.events.subscribe()
    }

    fn is_connected(&self) -> bool {
        self.connection_state().is_connected()
    }

    fn firmware_version(&self) -> String {
        String::new()
    }

    fn serial_number(&self) -> String {
        String::new()
    }

    /// Request the logo, stop both loops after one last flush and release
    /// the socket.
    async fn shutdown(&self) {
        self.shared.show_logo.store(true, Ordering::SeqCst);
        self.shared.cancel.cancel();
        self.shared.trigger.notify_one();

        let tasks = std::mem::take(&mut *lock(&self.tasks));
        if tasks.is_empty() {
            return;
        }
        for task in tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "remote board task failed");
            }
        }

        if let Some(connection) = self.shared.connection.lock().await.take() {
            connection.invalidate();
        }
        self.shared.set_state(ConnectionState::Disconnected);
        info!(endpoint = %self.shared.endpoint, "remote board shut down");
    }
}

impl Drop for RemoteBoard {
    fn drop(&mut self) {
        self.shared.cancel.cancel();
    }
}

impl Shared {
    fn new(endpoint: SocketAddr, layout: GridKeyLayout, options: ClientOptions) -> Self {
        let (events, _) = broadcast::channel(256);
        let key_count = layout.count().min(usize::from(u16::MAX) + 1);
        Self {
            endpoint,
            layout,
            options,
            cancel: CancellationToken::new(),
            trigger: Notify::new(),
            brightness: Mutex::new(PendingBrightness {
                value: 0,
                requested: false,
            }),
            keys: (0..key_count).map(|_| Mutex::new(KeySlot::default())).collect(),
            show_logo: AtomicBool::new(false),
            connection: tokio::sync::Mutex::new(None),
            state: Mutex::new(ConnectionState::Disconnected),
            events,
        }
    }

    /// Move to `next`, emitting a connection event when connectivity flips.
    fn set_state(&self, next: ConnectionState) {
        let previous = std::mem::replace(&mut *lock(&self.state), next);
        if previous == next {
            return;
        }
        debug!(endpoint = %self.endpoint, from = %previous, to = %next, "connection state changed");
        if previous.is_connected() != next.is_connected() {
            let _ = self.events.send(BoardEvent::Connection(next.is_connected()));
        }
    }

    /// Return the current connection, dialing until one is established.
    ///
    /// Only fails when shutdown is requested.
    async fn ensure_connected(&self) -> Result<Arc<Connection>, ProtocolError> {
        let mut slot = tokio::select! {
            biased;
            () = self.cancel.cancelled() => return Err(ProtocolError::Shutdown),
            slot = self.connection.lock() => slot,
        };

        if let Some(connection) = slot.as_ref().filter(|c| !c.is_closed()) {
            self.set_state(ConnectionState::Connected);
            return Ok(connection.clone());
        }
        *slot = None;

        loop {
            self.set_state(ConnectionState::Connecting);
            let attempt = tokio::select! {
                biased;
                () = self.cancel.cancelled() => return Err(ProtocolError::Shutdown),
                attempt = Connection::connect(self.endpoint) => attempt,
            };

            match attempt {
                Ok(connection) => {
                    let connection = Arc::new(connection);
                    *slot = Some(connection.clone());
                    self.set_state(ConnectionState::Connected);
                    info!(endpoint = %self.endpoint, "connected to board host");
                    return Ok(connection);
                }
                Err(e) => {
                    self.set_state(ConnectionState::Disconnected);
                    debug!(endpoint = %self.endpoint, error = %e, "connect failed");
                    tokio::select! {
                        biased;
                        () = self.cancel.cancelled() => return Err(ProtocolError::Shutdown),
                        () = tokio::time::sleep(self.options.reconnect_pause) => {}
                    }
                }
            }
        }
    }

    /// The current connection if it is still usable, without dialing.
    async fn current_connection(&self) -> Option<Arc<Connection>> {
        self.connection
            .lock()
            .await
            .clone()
            .filter(|c| !c.is_closed())
    }

    /// Send everything pending: logo, brightness, then keys in ascending
    /// order. A slot is only cleared if it was not re-armed meanwhile.
    async fn flush(&self, connection: &Connection) -> Result<(), ProtocolError> {
        if self.show_logo.swap(false, Ordering::SeqCst) {
            if let Err(e) = connection.send(&Frame::ShowLogo).await {
                self.show_logo.store(true, Ordering::SeqCst);
                return Err(e);
            }
        }

        let brightness = {
            let pending = lock(&self.brightness);
            pending.requested.then_some(pending.value)
        };
        if let Some(value) = brightness {
            connection.send(&Frame::SetBrightness(value)).await?;
            let mut pending = lock(&self.brightness);
            if pending.value == value {
                pending.requested = false;
            }
        }

        for (key, slot) in (0..=u16::MAX).zip(&self.keys) {
            let Some((image, version)) = lock(slot).pending() else {
                continue;
            };
            connection.send(&Frame::SetKeyImage { key, image }).await?;
            lock(slot).mark_sent(version);
        }
        Ok(())
    }
}

async fn write_loop(shared: Arc<Shared>) {
    let mut backoff = Backoff::new(shared.options.backoff_start, shared.options.backoff_max);
    let mut successful = true;

    loop {
        // After a failure retry right away instead of waiting for new writes
        if successful && !shared.cancel.is_cancelled() {
            tokio::select! {
                biased;
                () = shared.cancel.cancelled() => {}
                () = shared.trigger.notified() => {}
            }
        }

        let shutting_down = shared.cancel.is_cancelled();
        let connection = if shutting_down {
            shared.current_connection().await
        } else {
            shared.ensure_connected().await.ok()
        };
        let result = match &connection {
            Some(connection) => shared.flush(connection).await,
            None => Err(ProtocolError::ConnectionLost),
        };

        if shutting_down {
            if let Err(e) = result {
                debug!(error = %e, "final flush failed");
            }
            break;
        }

        match result {
            Ok(()) => {
                successful = true;
                backoff.reset();
            }
            Err(e) => {
                successful = false;
                if let Some(connection) = connection {
                    connection.invalidate();
                }
                shared.set_state(ConnectionState::Disconnected);
                warn!(
                    endpoint = %shared.endpoint,
                    error = %e,
                    delay_ms = backoff.current().as_millis(),
                    "flush failed, backing off"
                );
                tokio::select! {
                    biased;
                    () = shared.cancel.cancelled() => {}
                    () = tokio::time::sleep(backoff.current()) => {}
                }
                backoff.increase();
            }
        }
    }
    debug!(endpoint = %shared.endpoint, "write loop stopped");
}

async fn read_loop(shared: Arc<Shared>) {
    while let Ok(connection) = shared.ensure_connected().await {
        loop {
            let frame = tokio::select! {
                biased;
                () = shared.cancel.cancelled() => return,
                frame = connection.recv() => frame,
            };
            match frame {
                Ok(Some(Frame::KeyStateChange { key, is_down })) => {
                    let _ = shared
                        .events
                        .send(BoardEvent::Key(KeyEvent::new(key, is_down)));
                }
                Ok(Some(other)) => debug!(frame = ?other, "ignoring unexpected frame from host"),
                Ok(None) => {
                    debug!(endpoint = %shared.endpoint, "host closed connection");
                    break;
                }
                Err(e) => {
                    debug!(endpoint = %shared.endpoint, error = %e, "read failed");
                    break;
                }
            }
        }
        connection.invalidate();
    }
    debug!(endpoint = %shared.endpoint, "read loop stopped");
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
mod tests {
    use std::io::{ErrorKind, Write};
    use std::net::{IpAddr, Ipv4Addr};

    use tokio::net::{TcpListener, TcpStream};

    use super::*;

    const LOCALHOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

    fn shared() -> Shared {
        let layout = GridKeyLayout::new(5, 3, 72, 25).unwrap();
        Shared::new(SocketAddr::new(LOCALHOST, 9), layout, ClientOptions::default())
    }

    /// A connection the peer has already reset, before anything noticed.
    async fn reset_connection() -> Connection {
        let listener = std::net::TcpListener::bind((LOCALHOST, 0)).unwrap();
        let stream = std::net::TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (peer, _) = listener.accept().unwrap();
        let mut watch = stream.try_clone().unwrap();
        stream.set_nonblocking(true).unwrap();
        let connection = Connection::from_stream(TcpStream::from_std(stream).unwrap()).unwrap();

        // Closing with unread data makes the peer answer with a reset
        watch.write_all(&[0]).unwrap();
        drop(peer);
        loop {
            match watch.peek(&mut [0; 1]) {
                Err(e) if e.kind() == ErrorKind::WouldBlock => {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                }
                _ => break,
            }
        }
        assert!(!connection.is_closed());
        connection
    }

    async fn connected_pair() -> (Connection, Connection) {
        let listener = TcpListener::bind((LOCALHOST, 0)).await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (client, accepted) = tokio::join!(Connection::connect(addr), listener.accept());
        let host = Connection::from_stream(accepted.unwrap().0).unwrap();
        (client.unwrap(), host)
    }

    #[test]
    fn rearming_a_key_while_it_is_sent_keeps_it_armed() {
        let image = KeyBitmap::solid(72, 72, [0, 128, 0]).unwrap();
        let mut slot = KeySlot::default();
        slot.arm(Some(image.clone()));

        let (sent, version) = slot.pending().unwrap();
        assert_eq!(sent.as_ref(), Some(&image));
        // Same image written again before the send completes
        slot.arm(Some(image.clone()));
        slot.mark_sent(version);

        let (again, version) = slot.pending().unwrap();
        assert_eq!(again, Some(image));
        slot.mark_sent(version);
        assert!(slot.pending().is_none());
    }

    #[tokio::test]
    async fn flush_sends_logo_then_brightness_then_keys_in_order() {
        let shared = shared();
        let red = KeyBitmap::solid(72, 72, [0, 0, 255]).unwrap();
        lock(&shared.keys[4]).arm(Some(red.clone()));
        lock(&shared.keys[1]).arm(None);
        {
            let mut brightness = lock(&shared.brightness);
            brightness.value = 30;
            brightness.requested = true;
        }
        shared.show_logo.store(true, Ordering::SeqCst);

        let (client, host) = connected_pair().await;
        shared.flush(&client).await.unwrap();

        let mut frames = Vec::new();
        for _ in 0..4 {
            frames.push(host.recv().await.unwrap().unwrap());
        }
        assert_eq!(
            frames,
            vec![
                Frame::ShowLogo,
                Frame::SetBrightness(30),
                Frame::SetKeyImage { key: 1, image: None },
                Frame::SetKeyImage {
                    key: 4,
                    image: Some(red)
                },
            ]
        );
        assert!(!shared.show_logo.load(Ordering::SeqCst));
        assert!(!lock(&shared.brightness).requested);
        assert!(shared.keys.iter().all(|slot| lock(slot).pending().is_none()));
    }

    #[tokio::test]
    async fn failed_flush_keeps_everything_pending_for_the_next_connection() {
        let shared = shared();
        let blue = KeyBitmap::solid(72, 72, [255, 0, 0]).unwrap();
        lock(&shared.keys[2]).arm(Some(blue.clone()));
        {
            let mut brightness = lock(&shared.brightness);
            brightness.value = 60;
            brightness.requested = true;
        }
        shared.show_logo.store(true, Ordering::SeqCst);

        let dead = reset_connection().await;
        assert!(shared.flush(&dead).await.is_err());
        assert!(shared.show_logo.load(Ordering::SeqCst));
        assert!(lock(&shared.brightness).requested);
        assert!(lock(&shared.keys[2]).pending().is_some());

        let (client, host) = connected_pair().await;
        shared.flush(&client).await.unwrap();
        assert_eq!(host.recv().await.unwrap(), Some(Frame::ShowLogo));
        assert_eq!(host.recv().await.unwrap(), Some(Frame::SetBrightness(60)));
        assert_eq!(
            host.recv().await.unwrap(),
            Some(Frame::SetKeyImage {
                key: 2,
                image: Some(blue)
            })
        );
    }
}
