//! Raw-mode lifecycle for the key listener.
//!
//! The table scrolls in the normal screen, so only raw mode is toggled.
//! The terminal is restored on:
//! - Normal exit (via Drop)
//! - A forced exit on the second Ctrl+C (via the interrupt restore hook)

use std::io;

use anyhow::{Context, Result};
use crossterm::execute;
use crossterm::style::ResetColor;
use crossterm::terminal::{disable_raw_mode, enable_raw_mode, is_raw_mode_enabled};

use crate::interrupt;

/// Keeps the terminal in raw mode while alive.
pub struct RawModeGuard {
    _private: (),
}

impl RawModeGuard {
    /// Enables raw mode and registers the Ctrl+C restore hook.
    ///
    /// Raw mode swallows the terminal's own SIGINT, so the caller must
    /// forward Ctrl+C key presses to `interrupt::trigger_ctrl_c`.
    ///
    /// # Errors
    /// Returns an error if raw mode cannot be enabled.
    pub fn enable() -> Result<Self> {
        enable_raw_mode().context("Failed to enable raw mode")?;
        interrupt::set_restore_hook(|| {
            let _ = restore_terminal();
        });
        Ok(Self { _private: () })
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        if let Err(err) = restore_terminal() {
            tracing::warn!(error = %err, "failed to restore terminal");
        }
    }
}

/// Resets colours and leaves raw mode.
///
/// Idempotent.
///
/// # Errors
/// Returns an error if raw mode cannot be disabled.
pub fn restore_terminal() -> Result<()> {
    let _ = execute!(io::stdout(), ResetColor);
    if is_raw_mode_enabled().unwrap_or(true) {
        disable_raw_mode().context("Failed to disable raw mode")?;
    }
    Ok(())
}
