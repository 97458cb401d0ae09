//! Key listener.
//!
//! `s` asks for a snapshot, Ctrl+C interrupts, anything else quits. Reads
//! crossterm events on a dedicated thread and polls so it can be stopped.

use std::io;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use tokio::task;
use tokio_util::sync::CancellationToken;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    Snapshot,
    Shutdown,
    /// Ctrl+C typed while raw mode hides it from the signal handler.
    Interrupt,
}

/// Maps a key press to what the monitor should do. Releases and repeats
/// are ignored.
pub fn action_for(key: &KeyEvent) -> Option<KeyAction> {
    if key.kind != KeyEventKind::Press {
        return None;
    }
    match key.code {
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            Some(KeyAction::Interrupt)
        }
        KeyCode::Char('s' | 'S') => Some(KeyAction::Snapshot),
        // Bare modifier presses are reported by some terminals.
        KeyCode::Modifier(_) => None,
        _ => Some(KeyAction::Shutdown),
    }
}

pub struct KeyListener {
    stop: CancellationToken,
    thread: Option<JoinHandle<()>>,
}

impl KeyListener {
    /// Starts listening. The listener ends by itself after the first
    /// `Shutdown` or `Interrupt`.
    ///
    /// # Errors
    /// Returns an error if the thread cannot be spawned.
    pub fn spawn<F>(mut on_action: F) -> io::Result<Self>
    where
        F: FnMut(KeyAction) + Send + 'static,
    {
        let stop = CancellationToken::new();
        let thread_stop = stop.clone();
        let thread = thread::Builder::new()
            .name("gcmon-keys".to_string())
            .spawn(move || {
                if let Err(err) = listen(&thread_stop, &mut on_action) {
                    tracing::warn!(%err, "key listener failed");
                }
            })?;
        Ok(Self {
            stop,
            thread: Some(thread),
        })
    }

    /// Stops the listener and waits for its thread on the blocking pool.
    pub async fn stop(mut self) {
        self.stop.cancel();
        let Some(thread) = self.thread.take() else {
            return;
        };
        match task::spawn_blocking(move || thread.join()).await {
            Ok(Ok(())) => {}
            Ok(Err(_)) => tracing::warn!("key listener panicked"),
            Err(err) => tracing::warn!(%err, "failed to join key listener"),
        }
    }
}

/// Cancels without joining; the thread exits at its next poll.
impl Drop for KeyListener {
    fn drop(&mut self) {
        self.stop.cancel();
    }
}

fn listen(stop: &CancellationToken, on_action: &mut dyn FnMut(KeyAction)) -> io::Result<()> {
    while !stop.is_cancelled() {
        if !event::poll(POLL_INTERVAL)? {
            continue;
        }
        let Event::Key(key) = event::read()? else {
            continue;
        };
        let Some(action) = action_for(&key) else {
            continue;
        };
        tracing::debug!(?action, "key pressed");
        on_action(action);
        if action != KeyAction::Snapshot {
            break;
        }
    }
    Ok(())
}
