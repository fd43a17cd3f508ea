//! A board that lives in the terminal.
//!
//! Commands from remote clients are logged, and key presses are typed on
//! stdin as `press <key>` or `release <key>`.

use std::io::BufRead;

use async_trait::async_trait;
use macroboard_board::{validate_brightness, validate_key, BoardError, MacroBoard};
use macroboard_types::{BoardEvent, GridKeyLayout, KeyBitmap, KeyEvent};
use tokio::sync::{broadcast, mpsc};
use tracing::{info, warn};

pub struct ConsoleBoard {
    layout: GridKeyLayout,
    events: broadcast::Sender<BoardEvent>,
}

impl ConsoleBoard {
    pub fn new(layout: GridKeyLayout) -> Self {
        let (events, _) = broadcast::channel(64);
        Self { layout, events }
    }

    /// Turn input lines into key events until the sender goes away.
    pub async fn run_input(&self, mut lines: mpsc::Receiver<String>) {
        while let Some(line) = lines.recv().await {
            match parse_key_command(&line) {
                Some(event) if self.layout.contains(event.key) => {
                    let _ = self.events.send(BoardEvent::Key(event));
                }
                Some(event) => warn!(key = event.key, keys = self.layout.count(), "no such key"),
                None if line.trim().is_empty() => {}
                None => eprintln!("usage: press <key> | release <key>"),
            }
        }
    }
}

/// Read stdin lines on a detached thread.
///
/// A blocking read cannot be cancelled, so it must stay off the runtime or
/// shutdown would wait for the next line.
pub fn spawn_stdin_reader() -> std::io::Result<mpsc::Receiver<String>> {
    let (tx, rx) = mpsc::channel(16);
    std::thread::Builder::new()
        .name("stdin".to_string())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                match line {
                    Ok(line) => {
                        if tx.blocking_send(line).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "failed to read stdin");
                        break;
                    }
                }
            }
        })?;
    Ok(rx)
}

/// Parse `press <key>` or `release <key>`.
pub fn parse_key_command(line: &str) -> Option<KeyEvent> {
    let mut words = line.split_whitespace();
    let is_down = match words.next()? {
        "press" | "p" => true,
        "release" | "r" => false,
        _ => return None,
    };
    let key = words.next()?.parse().ok()?;
    if words.next().is_some() {
        return None;
    }
    Some(KeyEvent::new(key, is_down))
}

#[async_trait]
impl MacroBoard for ConsoleBoard {
    fn keys(&self) -> GridKeyLayout {
        self.layout
    }

    async fn set_brightness(&self, percent: u8) -> Result<(), BoardError> {
        validate_brightness(percent)?;
        info!(percent, "brightness");
        Ok(())
    }

    async fn set_key_image(&self, key: u16, image: Option<KeyBitmap>) -> Result<(), BoardError> {
        validate_key(&self.layout, key)?;
        match image {
            Some(image) => info!(key, width = image.width(), height = image.height(), "key image"),
            None => info!(key, "key cleared"),
        }
        Ok(())
    }

    async fn show_logo(&self) -> Result<(), BoardError> {
        info!("logo");
        Ok(())
    }

    fn events(&self) -> broadcast::Receiver<BoardEvent> {
        self.events.subscribe()
    }

    fn firmware_version(&self) -> String {
        env!("CARGO_PKG_VERSION").to_string()
    }

    fn serial_number(&self) -> String {
        String::new()
    }
}
