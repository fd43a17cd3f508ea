//! Mock board and device reference for testing.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use macroboard_types::{BoardEvent, GridKeyLayout, KeyBitmap, KeyEvent};
use tokio::sync::broadcast;

use crate::error::BoardError;
use crate::reference::{DeviceId, DeviceReference};
use crate::{validate_brightness, validate_key, MacroBoard};

/// A command applied to a [`MockBoard`], in call order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoardCommand {
    SetBrightness(u8),
    SetKeyImage(u16, Option<KeyBitmap>),
    ShowLogo,
}

/// Shared state for observing what `MockBoard` did.
#[derive(Debug, Default)]
struct MockBoardState {
    commands: Vec<BoardCommand>,
}

/// Mock board that records every command it receives.
pub struct MockBoard {
    layout: GridKeyLayout,
    state: Arc<Mutex<MockBoardState>>,
    events: broadcast::Sender<BoardEvent>,
    connected: Arc<AtomicBool>,
}

impl MockBoard {
    /// Create a connected mock board with `layout`.
    pub fn new(layout: GridKeyLayout) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            layout,
            state: Arc::new(Mutex::new(MockBoardState::default())),
            events,
            connected: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Get a clonable handle for driving and observing the board from tests.
    pub fn handle(&self) -> MockBoardHandle {
        MockBoardHandle {
            state: Arc::clone(&self.state),
            events: self.events.clone(),
            connected: Arc::clone(&self.connected),
        }
    }

    fn record(&self, command: BoardCommand) {
        lock(&self.state).commands.push(command);
    }
}

/// Clonable handle for `MockBoard`.
///
/// Tests use it to inject key presses and to inspect applied commands.
#[derive(Clone)]
pub struct MockBoardHandle {
    state: Arc<Mutex<MockBoardState>>,
    events: broadcast::Sender<BoardEvent>,
    connected: Arc<AtomicBool>,
}

impl MockBoardHandle {
    /// Get a snapshot of all applied commands.
    pub fn commands(&self) -> Vec<BoardCommand> {
        lock(&self.state).commands.clone()
    }

    /// Forget the commands recorded so far.
    pub fn clear_commands(&self) {
        lock(&self.state).commands.clear();
    }

    /// Emit a key-down event.
    pub fn press(&self, key: u16) {
        let _ = self.events.send(BoardEvent::Key(KeyEvent::new(key, true)));
    }

    /// Emit a key-up event.
    pub fn release(&self, key: u16) {
        let _ = self.events.send(BoardEvent::Key(KeyEvent::new(key, false)));
    }

    /// Change the reported connection state and emit the event.
    pub fn set_connected(&self, connected: bool) {
        if self.connected.swap(connected, Ordering::SeqCst) != connected {
            let _ = self.events.send(BoardEvent::Connection(connected));
        }
    }

    /// Number of live event subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.events.receiver_count()
    }
}

#[async_trait]
impl MacroBoard for MockBoard {
    fn keys(&self) -> GridKeyLayout {
        self.layout
    }

    async fn set_brightness(&self, percent: u8) -> Result<(), BoardError> {
        validate_brightness(percent)?;
        self.record(BoardCommand::SetBrightness(percent));
        Ok(())
    }

    async fn set_key_image(&self, key: u16, image: Option<KeyBitmap>) -> Result<(), BoardError> {
        validate_key(&self.layout, key)?;
        self.record(BoardCommand::SetKeyImage(key, image));
        Ok(())
    }

    async fn show_logo(&self) -> Result<(), BoardError> {
        self.record(BoardCommand::ShowLogo);
        Ok(())
    }

    fn events(&self) -> broadcast::Receiver<BoardEvent> {
        self.events.subscribe()
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn firmware_version(&self) -> String {
        "mock-1.0".to_string()
    }

    fn serial_number(&self) -> String {
        "MOCK0001".to_string()
    }
}

/// Mock device reference that opens fresh [`MockBoard`]s.
#[derive(Debug, Clone)]
pub struct MockDeviceReference {
    id: DeviceId,
    name: String,
    layout: GridKeyLayout,
}

impl MockDeviceReference {
    pub fn new(id: &str, name: &str, layout: GridKeyLayout) -> Self {
        Self {
            id: DeviceId::new(id),
            name: name.to_string(),
            layout,
        }
    }
}

#[async_trait]
impl DeviceReference for MockDeviceReference {
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
        Ok(Arc::new(MockBoard::new(self.layout)))
    }
}

fn lock(state: &Mutex<MockBoardState>) -> MutexGuard<'_, MockBoardState> {
    state.lock().unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> GridKeyLayout {
        GridKeyLayout::new(5, 3, 72, 25).unwrap()
    }

    #[tokio::test]
    async fn records_commands_in_order() {
        let board = MockBoard::new(layout());
        let handle = board.handle();

        board.set_brightness(40).await.unwrap();
        board.set_key_image(2, None).await.unwrap();
        board.show_logo().await.unwrap();

        assert_eq!(
            handle.commands(),
            vec![
                BoardCommand::SetBrightness(40),
                BoardCommand::SetKeyImage(2, None),
                BoardCommand::ShowLogo,
            ]
        );
    }

    #[tokio::test]
    async fn rejects_invalid_arguments() {
        let board = MockBoard::new(layout());
        assert!(board.set_brightness(101).await.is_err());
        assert!(board.set_key_image(15, None).await.is_err());
        assert!(board.handle().commands().is_empty());
    }

    #[tokio::test]
    async fn handle_injects_events() {
        let board = MockBoard::new(layout());
        let handle = board.handle();
        let mut events = board.events();

        handle.press(3);
        handle.set_connected(false);
        handle.set_connected(false);
        handle.release(3);

        assert_eq!(
            events.recv().await.unwrap(),
            BoardEvent::Key(KeyEvent::new(3, true))
        );
        assert_eq!(events.recv().await.unwrap(), BoardEvent::Connection(false));
        assert_eq!(
            events.recv().await.unwrap(),
            BoardEvent::Key(KeyEvent::new(3, false))
        );
        assert!(!board.is_connected());
    }
}
